//! # 协作者接口层
//!
//! 读写引擎只通过这里的特质访问存储：
//! - [`BlockIo`]：按设备块号整块读写；
//! - [`BlockMap`]：文件块号 → 设备块号，以及按需分配与归还；
//! - [`InodeStore`]：文件名 → inode 号，文件大小的读取与设置。

use crate::{DataBlock, Result};

pub trait BlockIo {
    fn read_block(&mut self, block_id: u32, buf: &mut DataBlock);
    fn write_block(&mut self, block_id: u32, buf: &DataBlock);

    /// 将缓冲的块写回设备
    fn sync(&mut self) {}
}

pub trait BlockMap {
    /// 文件内第 `block_index` 块所在的设备块号，未分配时为空
    fn block_id(&mut self, inode_id: u32, block_index: u32) -> Option<u32>;

    /// 为文件内第 `block_index` 块分配设备块，空间用尽时为空
    fn alloc_block(&mut self, inode_id: u32, block_index: u32) -> Option<u32>;

    /// 撤销文件内第 `block_index` 块的映射并归还其设备块，未分配时什么也不做
    fn dealloc_block(&mut self, inode_id: u32, block_index: u32);
}

pub trait InodeStore {
    /// 文件不存在时为 [`Error::NotFound`](crate::Error::NotFound)
    fn lookup(&mut self, name: &str) -> Result<u32>;

    /// 创建文件；同名文件已存在则清空它。
    /// 无法分配 inode 时同样为 [`Error::NotFound`](crate::Error::NotFound)
    fn create(&mut self, name: &str) -> Result<u32>;

    /// 释放文件的全部数据块，大小归零
    fn truncate(&mut self, inode_id: u32);

    fn size(&mut self, inode_id: u32) -> usize;
    fn set_size(&mut self, inode_id: u32, size: usize);

    /// 会话关闭时的通知
    #[allow(unused_variables)]
    fn release(&mut self, inode_id: u32) {}
}

/// 读写引擎所需的全部协作者
pub trait Volume: BlockIo + BlockMap + InodeStore {}

impl<T: BlockIo + BlockMap + InodeStore> Volume for T {}
