//! 磁盘上的 inode
//!
//! 前 [`DIRECT_COUNT`] 个文件块直接记录在 inode 内，
//! 之后的块记录在一个一级索引块中，该索引块在首次需要时才分配。
//! 块编号为0表示尚未分配。

use alloc::vec::Vec;

use crate::BLOCK_SIZE;
use crate::block_cache::BlockCacheManager;

/// 间接索引块的编号容量
const INDIRECT_COUNT: usize = BLOCK_SIZE / 4;
/// 间接索引块
type IndirectBlock = [u32; INDIRECT_COUNT];

/// 直接索引块可编号数量
const DIRECT_COUNT: usize = 13;
/// 单个文件最多占用的数据块数
pub const MAX_FILE_BLOCKS: usize = DIRECT_COUNT + INDIRECT_COUNT;

pub const INODES_PER_BLOCK: usize = BLOCK_SIZE / core::mem::size_of::<DiskInode>();

#[derive(Debug, Default, Clone, Copy)]
#[repr(C)]
pub struct DiskInode {
    // 不用usize是为了严控布局
    pub size: u32,
    /// 为0表示 inode 空闲
    pub links: u32,
    direct: [u32; DIRECT_COUNT],
    /// 指向一个一级索引块
    pub indirect: u32,
}

impl DiskInode {
    #[inline]
    pub fn init(&mut self) {
        *self = Self {
            links: 1,
            ..Default::default()
        }
    }

    #[inline]
    pub fn is_free(&self) -> bool {
        self.links == 0
    }

    /// 第 `block_index` 块需要一级索引块而它还不存在
    #[inline]
    pub fn lacks_indirect(&self, block_index: u32) -> bool {
        block_index as usize >= DIRECT_COUNT && self.indirect == 0
    }

    /// 文件内第 `block_index` 块的设备块号，未分配则为空
    pub fn block_id(&self, block_index: u32, cache: &mut BlockCacheManager) -> Option<u32> {
        let block_index = block_index as usize;

        let id = if block_index < DIRECT_COUNT {
            self.direct[block_index]
        } else if block_index < MAX_FILE_BLOCKS && self.indirect != 0 {
            cache
                .get(self.indirect as usize)
                .map(0, |indirect: &IndirectBlock| {
                    // 剔去直接索引的部分
                    indirect[block_index - DIRECT_COUNT]
                })
        } else {
            0
        };

        (id != 0).then_some(id)
    }

    /// 记录第 `block_index` 块的设备块号，越过直接索引时一级索引块必须已存在
    pub fn set_block_id(&mut self, block_index: u32, id: u32, cache: &mut BlockCacheManager) {
        let block_index = block_index as usize;
        assert!(block_index < MAX_FILE_BLOCKS);

        if block_index < DIRECT_COUNT {
            self.direct[block_index] = id;
        } else {
            assert_ne!(self.indirect, 0);
            cache
                .get(self.indirect as usize)
                .map_mut(0, |indirect: &mut IndirectBlock| {
                    indirect[block_index - DIRECT_COUNT] = id;
                });
        }
    }

    /// 一级索引块不再记录任何块时将其摘下，返回其编号
    pub fn take_empty_indirect(&mut self, cache: &mut BlockCacheManager) -> Option<u32> {
        if self.indirect == 0 {
            return None;
        }

        let empty = cache
            .get(self.indirect as usize)
            .map(0, |indirect: &IndirectBlock| indirect.iter().all(|&id| id == 0));
        empty.then(|| core::mem::take(&mut self.indirect))
    }

    /// 清空文件，返回需要释放的全部块（含一级索引块）
    pub fn clear(&mut self, cache: &mut BlockCacheManager) -> Vec<u32> {
        let mut drop_blocks: Vec<u32> = self.direct.iter().copied().filter(|&id| id != 0).collect();

        if self.indirect != 0 {
            cache
                .get(self.indirect as usize)
                .map(0, |indirect: &IndirectBlock| {
                    drop_blocks.extend(indirect.iter().copied().filter(|&id| id != 0));
                });
            drop_blocks.push(self.indirect);
        }

        let links = self.links;
        *self = Self {
            links,
            ..Default::default()
        };

        drop_blocks
    }
}
