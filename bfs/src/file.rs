//! # 文件读写层
//!
//! 把字节流上的读写请求拆分为按块进行的读写：
//! 每一步取 `位置 / BLOCK_SIZE` 为文件块号，`位置 % BLOCK_SIZE` 为块内偏移，
//! 至多处理到块尾。
//!
//! - 读：不越过文件大小，未分配的块读作全零；
//! - 写：未分配的块按需分配，部分覆盖的块先读出再合并，整块覆盖则免去预读；
//!   写入末端超出文件大小时扩展大小。

use alloc::vec::Vec;

use enumflags2::{BitFlags, bitflags};

use crate::session::{Fd, OpenFile, SessionTable};
use crate::volume::Volume;
use crate::{BLOCK_SIZE, DataBlock, Error, Result};

#[rustfmt::skip]
#[allow(clippy::upper_case_acronyms)]
#[bitflags]
#[repr(u32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenFlag {
    /// 文件不存在则创建
    CREATE = 0b01,
    /// 先清空文件，再交给调用者
    TRUNC  = 0b10,
}

/// 定位的基准
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Whence {
    /// 文件开头
    Set,
    /// 当前游标
    Cur,
    /// 文件末尾
    End,
}

impl TryFrom<i32> for Whence {
    type Error = Error;

    fn try_from(raw: i32) -> Result<Self> {
        match raw {
            0 => Ok(Self::Set),
            1 => Ok(Self::Cur),
            2 => Ok(Self::End),
            raw => Err(Error::BadSeekBase(raw)),
        }
    }
}

/// 挂载后的文件系统：卷与会话表
pub struct FileSystem<V> {
    volume: V,
    sessions: SessionTable,
}

impl<V: Volume> FileSystem<V> {
    pub fn new(volume: V) -> Self {
        Self {
            volume,
            sessions: SessionTable::new(),
        }
    }

    #[inline]
    pub fn volume(&mut self) -> &mut V {
        &mut self.volume
    }

    #[inline]
    pub fn sessions(&self) -> &SessionTable {
        &self.sessions
    }

    /// 关闭所有会话，取回卷
    pub fn into_volume(mut self) -> V {
        for OpenFile { inode_id, .. } in self.sessions.drain() {
            self.volume.release(inode_id);
        }
        self.volume.sync();
        self.volume
    }

    /// 打开已有文件，游标位于开头
    pub fn open(&mut self, name: &str) -> Result<Fd> {
        self.open_with(name, BitFlags::empty())
    }

    /// 创建文件，已存在则清空
    pub fn create(&mut self, name: &str) -> Result<Fd> {
        self.open_with(name, OpenFlag::CREATE | OpenFlag::TRUNC)
    }

    pub fn open_with(&mut self, name: &str, flags: BitFlags<OpenFlag>) -> Result<Fd> {
        let inode_id = match self.volume.lookup(name) {
            Ok(inode_id) => {
                if flags.contains(OpenFlag::TRUNC) {
                    self.volume.truncate(inode_id);
                }
                inode_id
            }
            Err(Error::NotFound) if flags.contains(OpenFlag::CREATE) => {
                self.volume.create(name)?
            }
            Err(err) => return Err(err),
        };

        let fd = self.sessions.insert(inode_id);
        log::debug!("open {name:?}: fd {fd} -> inode {inode_id}");
        Ok(fd)
    }

    pub fn close(&mut self, fd: Fd) -> Result<()> {
        let OpenFile { inode_id, .. } = self.sessions.remove(fd)?;
        self.volume.release(inode_id);
        log::debug!("close fd {fd}");
        Ok(())
    }

    #[inline]
    pub fn tell(&self, fd: Fd) -> Result<usize> {
        Ok(self.sessions.get(fd)?.cursor)
    }

    /// 文件的逻辑大小
    pub fn size(&mut self, fd: Fd) -> Result<usize> {
        let inode_id = self.sessions.get(fd)?.inode_id;
        Ok(self.volume.size(inode_id))
    }

    /// 移动游标。偏移量不可为负；游标可越过文件末尾，
    /// 其间的空洞在下次写入时才真正占用空间。
    pub fn seek(&mut self, fd: Fd, offset: i64, whence: Whence) -> Result<()> {
        let offset = usize::try_from(offset).map_err(|_| Error::BadCursor)?;
        let OpenFile { inode_id, cursor } = *self.sessions.get(fd)?;

        let cursor = match whence {
            Whence::Set => offset,
            Whence::Cur => cursor.checked_add(offset).ok_or(Error::BadCursor)?,
            Whence::End => self
                .volume
                .size(inode_id)
                .checked_add(offset)
                .ok_or(Error::BadCursor)?,
        };

        self.sessions.get_mut(fd)?.cursor = cursor;
        Ok(())
    }

    /// 从游标处读出至多 `count` 字节到 `buf`，返回实际读出的字节数。
    /// 到达文件末尾时返回的字节数少于 `count`，游标处于末尾之后则返回0。
    pub fn read(&mut self, fd: Fd, count: isize, buf: &mut [u8]) -> Result<usize> {
        let count = Self::check_len(count, buf.len())?;
        if count == 0 {
            return Ok(0);
        }

        let OpenFile { inode_id, cursor } = *self.sessions.get(fd)?;
        let size = self.volume.size(inode_id);

        if cursor >= size {
            return Ok(0);
        }

        let end = (cursor + count).min(size);
        let mut block = [0; BLOCK_SIZE];
        let mut start = cursor;
        // 已读取多少字节
        let mut read_size = 0;

        while start < end {
            let block_index = (start / BLOCK_SIZE) as u32;
            let block_offset = start % BLOCK_SIZE;
            // 当前块的末地址(字节)
            let current_block_end = ((start / BLOCK_SIZE + 1) * BLOCK_SIZE).min(end);
            let block_read_size = current_block_end - start;

            self.fetch_block(inode_id, block_index, &mut block);
            buf[read_size..read_size + block_read_size]
                .copy_from_slice(&block[block_offset..block_offset + block_read_size]);

            read_size += block_read_size;
            start = current_block_end;
        }

        self.sessions.get_mut(fd)?.cursor += read_size;
        Ok(read_size)
    }

    /// 从游标处写入 `buf` 的前 `count` 字节，要么全部写入，要么失败。
    ///
    /// 空间不足时返回 [`Error::DiskFull`]：本次新分配的块全部归还，
    /// 原文件大小之外的字节恢复为零，游标与大小不变。
    pub fn write(&mut self, fd: Fd, count: isize, buf: &[u8]) -> Result<()> {
        let count = Self::check_len(count, buf.len())?;
        if count == 0 {
            return Ok(());
        }

        let OpenFile { inode_id, cursor } = *self.sessions.get(fd)?;
        let end = cursor.checked_add(count).ok_or(Error::DiskFull)?;

        // 本次写入新分配的文件块号
        let mut fresh = Vec::new();
        if let Err(err) = self.write_blocks(inode_id, cursor, &buf[..count], &mut fresh) {
            log::warn!(
                "inode {inode_id}: write of {count} bytes at {cursor} failed, {} blocks returned",
                fresh.len()
            );
            self.undo_write(inode_id, cursor, end, &fresh);
            return Err(err);
        }

        self.sessions.get_mut(fd)?.cursor = end;
        if end > self.volume.size(inode_id) {
            self.volume.set_size(inode_id, end);
        }
        self.volume.sync();

        Ok(())
    }
}

impl<V: Volume> FileSystem<V> {
    fn write_blocks(
        &mut self,
        inode_id: u32,
        cursor: usize,
        buf: &[u8],
        fresh: &mut Vec<u32>,
    ) -> Result<()> {
        let end = cursor + buf.len();
        let mut block = [0; BLOCK_SIZE];
        let mut start = cursor;
        let mut written_size = 0;

        while start < end {
            // 块号超出 u32 的位置不可能分配到块
            let block_index = u32::try_from(start / BLOCK_SIZE).map_err(|_| Error::DiskFull)?;
            let block_offset = start % BLOCK_SIZE;
            let current_block_end = ((start / BLOCK_SIZE + 1) * BLOCK_SIZE).min(end);
            let block_write_size = current_block_end - start;

            let block_id = match self.volume.block_id(inode_id, block_index) {
                Some(block_id) => {
                    // 部分覆盖：先读出原有内容再合并
                    if block_write_size < BLOCK_SIZE {
                        self.volume.read_block(block_id, &mut block);
                    }
                    block_id
                }
                None => {
                    let block_id = self
                        .volume
                        .alloc_block(inode_id, block_index)
                        .ok_or(Error::DiskFull)?;
                    fresh.push(block_index);
                    block.fill(0);
                    block_id
                }
            };

            block[block_offset..block_offset + block_write_size]
                .copy_from_slice(&buf[written_size..written_size + block_write_size]);
            self.volume.write_block(block_id, &block);

            written_size += block_write_size;
            start = current_block_end;
        }

        Ok(())
    }

    /// 撤销失败的写入在文件大小之外留下的痕迹
    fn undo_write(&mut self, inode_id: u32, cursor: usize, end: usize, fresh: &[u32]) {
        for &block_index in fresh.iter().rev() {
            self.volume.dealloc_block(inode_id, block_index);
        }

        // 原末尾所在的块已分配，其中大小之外的部分可能被写过
        let size = self.volume.size(inode_id);
        let tail = size % BLOCK_SIZE;
        if tail != 0 && end > size && cursor / BLOCK_SIZE <= size / BLOCK_SIZE {
            let block_index = (size / BLOCK_SIZE) as u32;
            if let Some(block_id) = self.volume.block_id(inode_id, block_index) {
                let mut block = [0; BLOCK_SIZE];
                self.volume.read_block(block_id, &mut block);
                block[tail..].fill(0);
                self.volume.write_block(block_id, &block);
            }
        }

        self.volume.sync();
    }

    /// 长度不可为负，缓冲区须容得下 `count` 字节
    fn check_len(count: isize, capacity: usize) -> Result<usize> {
        let count = usize::try_from(count).map_err(|_| Error::NegativeLength)?;
        if count > capacity {
            return Err(Error::NullBuffer);
        }
        Ok(count)
    }

    /// 取出文件内的一整块，未分配的块为全零
    fn fetch_block(&mut self, inode_id: u32, block_index: u32, block: &mut DataBlock) {
        match self.volume.block_id(inode_id, block_index) {
            Some(block_id) => self.volume.read_block(block_id, block),
            None => block.fill(0),
        }
    }
}
