//! # 会话表
//!
//! 每次打开文件得到一个描述符 [`Fd`]，表项记录 inode 号与读写游标。
//! 表直接以描述符为键，同一文件可同时打开多次，各自持有独立的游标。

use alloc::vec::Vec;
use core::fmt;

use crate::{Error, Result};

/// 文件描述符
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(transparent)]
pub struct Fd(usize);

impl From<Fd> for usize {
    fn from(fd: Fd) -> Self {
        fd.0
    }
}

impl fmt::Display for Fd {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// 会话表项
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OpenFile {
    pub inode_id: u32,
    /// **文件**内的偏移量
    pub cursor: usize,
}

#[derive(Debug, Default)]
pub struct SessionTable(Vec<Option<OpenFile>>);

impl SessionTable {
    pub fn new() -> Self {
        Self(Vec::new())
    }

    /// 为 inode 建立游标为0的新会话，占用首个空槽位
    pub fn insert(&mut self, inode_id: u32) -> Fd {
        let entry = OpenFile {
            inode_id,
            cursor: 0,
        };

        let index = self.0.iter().position(Option::is_none).unwrap_or_else(|| {
            self.0.push(None);
            self.0.len() - 1
        });
        self.0[index] = Some(entry);
        Fd(index)
    }

    pub fn remove(&mut self, fd: Fd) -> Result<OpenFile> {
        self.0
            .get_mut(fd.0)
            .and_then(Option::take)
            .ok_or(Error::BadDescriptor)
    }

    pub fn get(&self, fd: Fd) -> Result<&OpenFile> {
        self.0
            .get(fd.0)
            .and_then(Option::as_ref)
            .ok_or(Error::BadDescriptor)
    }

    pub fn get_mut(&mut self, fd: Fd) -> Result<&mut OpenFile> {
        self.0
            .get_mut(fd.0)
            .and_then(Option::as_mut)
            .ok_or(Error::BadDescriptor)
    }

    /// 取出全部打开中的会话，表随之清空
    pub fn drain(&mut self) -> impl Iterator<Item = OpenFile> + '_ {
        self.0.drain(..).flatten()
    }

    /// 打开中的会话数
    pub fn len(&self) -> usize {
        self.0.iter().flatten().count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
