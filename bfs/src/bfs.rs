//! # 磁盘块管理器层
//!
//! 构建出磁盘的布局并使用：inode 表、扁平的单层目录、空闲块位图。

use alloc::string::{String, ToString};
use alloc::sync::Arc;
use alloc::vec::Vec;
use core::mem;

use block_dev::BlockDevice;

use crate::block_cache::BlockCacheManager;
use crate::layout::*;
use crate::volume::{BlockIo, BlockMap, InodeStore};
use crate::{BLOCK_SIZE, DataBlock, Error, InitStage, Result};

const INODE_SIZE: usize = mem::size_of::<DiskInode>();

pub struct Bfs {
    cache: BlockCacheManager,
    super_block: SuperBlock,
    free_list: Bitmap,
}

impl Bfs {
    /// 在设备上建立新的文件系统。
    ///
    /// 依次初始化超级块、inode 表、目录、空闲块位图，任何一步失败即整体失败。
    /// 设备至少要有 `total_blocks` 块。
    pub fn format(block_device: Arc<dyn BlockDevice>, total_blocks: u32) -> Result<Self> {
        let super_block = SuperBlock::new(total_blocks);
        let mut cache = BlockCacheManager::new(block_device);

        Self::init_super(&mut cache, &super_block)?;
        Self::init_inodes(&mut cache, &super_block)?;
        Self::init_dir(&mut cache, &super_block)?;
        Self::init_free_list(&mut cache, &super_block)?;
        cache.sync_all();

        log::info!(
            "formatted: {total_blocks} blocks, {} for data",
            super_block.data_area_blocks
        );
        Ok(Self::with_super_block(cache, super_block))
    }

    /// 挂载设备上已有的文件系统
    pub fn mount(block_device: Arc<dyn BlockDevice>) -> Result<Self> {
        let mut cache = BlockCacheManager::new(block_device);
        let super_block = *cache.get(0).get::<SuperBlock>(0);

        if !super_block.is_valid() {
            return Err(Error::InvalidSuperBlock);
        }

        log::info!("mounted: {} blocks", super_block.total_blocks);
        Ok(Self::with_super_block(cache, super_block))
    }

    /// 数据区的总块数与空闲块数
    pub fn usage(&mut self) -> (usize, usize) {
        let total = self.free_list.capacity();
        (total, total - self.free_list.allocated(&mut self.cache))
    }

    /// 列出目录下所有文件名
    pub fn ls(&mut self) -> Vec<String> {
        let mut names = Vec::new();
        for block_id in self.dir_blocks() {
            self.cache.get(block_id).map(0, |entries: &DirBlock| {
                names.extend(
                    entries
                        .iter()
                        .filter(|entry| !entry.is_empty())
                        .map(|entry| entry.name().to_string()),
                );
            });
        }
        names
    }
}

// 格式化的四个阶段
impl Bfs {
    fn init_super(cache: &mut BlockCacheManager, super_block: &SuperBlock) -> Result<()> {
        if super_block.total_blocks == 0 {
            return Err(Error::InitFailed(InitStage::SuperBlock));
        }

        cache.get(0).map_mut(0, |block: &mut DataBlock| block.fill(0));
        *cache.get(0).get_mut::<SuperBlock>(0) = *super_block;
        Ok(())
    }

    fn init_inodes(cache: &mut BlockCacheManager, super_block: &SuperBlock) -> Result<()> {
        if super_block.dir_area_start() > super_block.total_blocks {
            return Err(Error::InitFailed(InitStage::Inodes));
        }

        Self::zero_blocks(
            cache,
            super_block.inode_area_start(),
            super_block.inode_area_blocks,
        );
        Ok(())
    }

    fn init_dir(cache: &mut BlockCacheManager, super_block: &SuperBlock) -> Result<()> {
        if super_block.free_list_start() > super_block.total_blocks {
            return Err(Error::InitFailed(InitStage::Directory));
        }

        Self::zero_blocks(
            cache,
            super_block.dir_area_start(),
            super_block.dir_area_blocks,
        );
        Ok(())
    }

    fn init_free_list(cache: &mut BlockCacheManager, super_block: &SuperBlock) -> Result<()> {
        // 至少要有一个位图块和一个数据块
        if super_block.data_area_blocks == 0 {
            return Err(Error::InitFailed(InitStage::FreeList));
        }

        Self::zero_blocks(
            cache,
            super_block.free_list_start(),
            super_block.free_list_blocks,
        );
        Ok(())
    }

    fn zero_blocks(cache: &mut BlockCacheManager, start: u32, blocks: u32) {
        for block_id in start..start + blocks {
            cache
                .get(block_id as usize)
                .map_mut(0, |block: &mut DataBlock| block.fill(0));
        }
    }
}

impl Bfs {
    fn with_super_block(cache: BlockCacheManager, super_block: SuperBlock) -> Self {
        let free_list = Bitmap::new(
            super_block.free_list_start() as usize,
            super_block.free_list_blocks as usize,
            super_block.data_area_blocks as usize,
        );

        Self {
            cache,
            super_block,
            free_list,
        }
    }

    /// 通过ID获取 inode 在磁盘上的位置：**块ID**以及**块内偏移**
    fn disk_inode_pos(&self, inode_id: u32) -> (usize, usize) {
        let block_id =
            self.super_block.inode_area_start() as usize + inode_id as usize / INODES_PER_BLOCK;
        let block_inoffset = inode_id as usize % INODES_PER_BLOCK * INODE_SIZE;

        (block_id, block_inoffset)
    }

    fn disk_inode(&mut self, inode_id: u32) -> DiskInode {
        let (block_id, offset) = self.disk_inode_pos(inode_id);
        *self.cache.get(block_id).get::<DiskInode>(offset)
    }

    fn store_disk_inode(&mut self, inode_id: u32, disk_inode: &DiskInode) {
        let (block_id, offset) = self.disk_inode_pos(inode_id);
        *self.cache.get(block_id).get_mut::<DiskInode>(offset) = *disk_inode;
    }

    fn alloc_inode(&mut self) -> Option<u32> {
        let inode_id = (0..INODE_COUNT as u32).find(|&id| self.disk_inode(id).is_free())?;

        let mut disk_inode = DiskInode::default();
        disk_inode.init();
        self.store_disk_inode(inode_id, &disk_inode);
        Some(inode_id)
    }

    fn dealloc_inode(&mut self, inode_id: u32) {
        self.store_disk_inode(inode_id, &DiskInode::default());
    }

    /// 在磁盘上分配新的数据块并返回其ID，块内容清零
    fn alloc_data(&mut self) -> Option<u32> {
        let block_id =
            self.super_block.data_area_start() + self.free_list.alloc(&mut self.cache)?;
        self.cache
            .get(block_id as usize)
            .map_mut(0, |block: &mut DataBlock| block.fill(0));
        Some(block_id)
    }

    fn dealloc_data(&mut self, block_id: u32) {
        let data_area_start = self.super_block.data_area_start();
        self.free_list
            .dealloc(&mut self.cache, block_id - data_area_start);
    }

    fn dir_blocks(&self) -> core::ops::Range<usize> {
        let start = self.super_block.dir_area_start() as usize;
        start..start + self.super_block.dir_area_blocks as usize
    }

    /// 在目录中查找名字，返回其 inode 号
    fn find_entry(&mut self, name: &str) -> Option<u32> {
        self.dir_blocks().find_map(|block_id| {
            self.cache.get(block_id).map(0, |entries: &DirBlock| {
                entries
                    .iter()
                    .find(|entry| !entry.is_empty() && entry.name() == name)
                    .map(DirEntry::inode_id)
            })
        })
    }

    /// 将目录项写入首个空槽位；目录已满则失败
    fn insert_entry(&mut self, entry: DirEntry) -> Option<()> {
        for block_id in self.dir_blocks() {
            let cache = self.cache.get(block_id);
            let slot = cache.map(0, |entries: &DirBlock| {
                entries.iter().position(DirEntry::is_empty)
            });

            if let Some(slot) = slot {
                *cache.get_mut::<DirEntry>(slot * DirEntry::SIZE) = entry;
                return Some(());
            }
        }

        None
    }
}

impl BlockIo for Bfs {
    fn read_block(&mut self, block_id: u32, buf: &mut DataBlock) {
        self.cache
            .get(block_id as usize)
            .map(0, |block: &DataBlock| buf.copy_from_slice(block));
    }

    fn write_block(&mut self, block_id: u32, buf: &DataBlock) {
        self.cache
            .get(block_id as usize)
            .map_mut(0, |block: &mut DataBlock| block.copy_from_slice(buf));
    }

    #[inline]
    fn sync(&mut self) {
        self.cache.sync_all();
    }
}

impl BlockMap for Bfs {
    fn block_id(&mut self, inode_id: u32, block_index: u32) -> Option<u32> {
        self.disk_inode(inode_id)
            .block_id(block_index, &mut self.cache)
    }

    fn alloc_block(&mut self, inode_id: u32, block_index: u32) -> Option<u32> {
        if block_index as usize >= MAX_FILE_BLOCKS {
            log::warn!("inode {inode_id}: block {block_index} exceeds the largest file");
            return None;
        }

        let mut disk_inode = self.disk_inode(inode_id);

        // 一级索引块按需分配
        let new_indirect = if disk_inode.lacks_indirect(block_index) {
            let Some(indirect) = self.alloc_data() else {
                log::warn!("inode {inode_id}: no free block for the indirect block");
                return None;
            };
            disk_inode.indirect = indirect;
            Some(indirect)
        } else {
            None
        };

        let Some(block_id) = self.alloc_data() else {
            if let Some(indirect) = new_indirect {
                self.dealloc_data(indirect);
            }
            log::warn!("inode {inode_id}: no free block for block {block_index}");
            return None;
        };

        disk_inode.set_block_id(block_index, block_id, &mut self.cache);
        self.store_disk_inode(inode_id, &disk_inode);

        log::debug!("inode {inode_id}: block {block_index} -> {block_id}");
        Some(block_id)
    }

    fn dealloc_block(&mut self, inode_id: u32, block_index: u32) {
        let mut disk_inode = self.disk_inode(inode_id);
        let Some(block_id) = disk_inode.block_id(block_index, &mut self.cache) else {
            return;
        };

        disk_inode.set_block_id(block_index, 0, &mut self.cache);
        self.dealloc_data(block_id);
        if let Some(indirect) = disk_inode.take_empty_indirect(&mut self.cache) {
            self.dealloc_data(indirect);
        }
        self.store_disk_inode(inode_id, &disk_inode);

        log::debug!("inode {inode_id}: block {block_index} returned");
    }
}

impl InodeStore for Bfs {
    fn lookup(&mut self, name: &str) -> Result<u32> {
        if !DirEntry::is_valid_name(name) {
            return Err(Error::InvalidName);
        }

        self.find_entry(name).ok_or(Error::NotFound)
    }

    fn create(&mut self, name: &str) -> Result<u32> {
        if !DirEntry::is_valid_name(name) {
            return Err(Error::InvalidName);
        }

        // 同名文件已存在则清空
        if let Some(inode_id) = self.find_entry(name) {
            self.truncate(inode_id);
            return Ok(inode_id);
        }

        let Some(inode_id) = self.alloc_inode() else {
            log::warn!("no free inode for {name:?}");
            return Err(Error::NotFound);
        };
        if self.insert_entry(DirEntry::new(name, inode_id)).is_none() {
            log::warn!("directory is full");
            self.dealloc_inode(inode_id);
            return Err(Error::NotFound);
        }
        self.cache.sync_all();

        log::debug!("created {name:?} as inode {inode_id}");
        Ok(inode_id)
    }

    fn truncate(&mut self, inode_id: u32) {
        let mut disk_inode = self.disk_inode(inode_id);
        for block_id in disk_inode.clear(&mut self.cache) {
            self.dealloc_data(block_id);
        }
        self.store_disk_inode(inode_id, &disk_inode);
        self.cache.sync_all();
    }

    #[inline]
    fn size(&mut self, inode_id: u32) -> usize {
        self.disk_inode(inode_id).size as usize
    }

    fn set_size(&mut self, inode_id: u32, size: usize) {
        // 分配上限保证了大小能装进 u32
        debug_assert!(size <= MAX_FILE_BLOCKS * BLOCK_SIZE);
        let mut disk_inode = self.disk_inode(inode_id);
        disk_inode.size = size as u32;
        self.store_disk_inode(inode_id, &disk_inode);
    }

    fn release(&mut self, inode_id: u32) {
        log::debug!("inode {inode_id} released");
        self.cache.sync_all();
    }
}

#[cfg(test)]
mod tests {
    use block_dev::RamDisk;

    use super::*;

    fn format(blocks: u32) -> Result<Bfs> {
        let disk = Arc::new(RamDisk::new(BLOCK_SIZE, blocks as usize));
        Bfs::format(disk, blocks)
    }

    #[test]
    fn format_stops_at_first_failed_stage() {
        assert_eq!(
            format(5).err(),
            Some(Error::InitFailed(InitStage::Inodes))
        );
        assert_eq!(
            format(10).err(),
            Some(Error::InitFailed(InitStage::Directory))
        );
        assert_eq!(
            format(13).err(),
            Some(Error::InitFailed(InitStage::FreeList))
        );
        assert!(format(15).is_ok());
    }

    #[test]
    fn mount_rejects_unformatted_device() {
        let disk = Arc::new(RamDisk::new(BLOCK_SIZE, 64));
        assert_eq!(Bfs::mount(disk).err(), Some(Error::InvalidSuperBlock));
    }

    #[test]
    fn files_survive_remount() {
        let disk = Arc::new(RamDisk::new(BLOCK_SIZE, 64));
        let inode_id = {
            let mut bfs = Bfs::format(disk.clone(), 64).unwrap();
            let inode_id = bfs.create("kept").unwrap();
            bfs.set_size(inode_id, 42);
            inode_id
        };

        let mut bfs = Bfs::mount(disk).unwrap();
        assert_eq!(bfs.lookup("kept"), Ok(inode_id));
        assert_eq!(bfs.size(inode_id), 42);
        assert_eq!(bfs.ls(), ["kept"]);
    }

    #[test]
    fn lazy_indirect_block() {
        let mut bfs = format(64).unwrap();
        let inode_id = bfs.create("f").unwrap();
        let (_, free) = bfs.usage();

        assert_eq!(bfs.block_id(inode_id, 20), None);
        let block_id = bfs.alloc_block(inode_id, 20).unwrap();
        assert_eq!(bfs.block_id(inode_id, 20), Some(block_id));
        // 数据块与一级索引块
        assert_eq!(bfs.usage().1, free - 2);

        bfs.alloc_block(inode_id, 21).unwrap();
        assert_eq!(bfs.usage().1, free - 3);
        assert_eq!(bfs.block_id(inode_id, 19), None);
    }

    #[test]
    fn dealloc_returns_emptied_indirect_block() {
        let mut bfs = format(64).unwrap();
        let inode_id = bfs.create("f").unwrap();
        let (_, free) = bfs.usage();

        bfs.alloc_block(inode_id, 0).unwrap();
        bfs.alloc_block(inode_id, 20).unwrap();
        bfs.alloc_block(inode_id, 21).unwrap();
        assert_eq!(bfs.usage().1, free - 4);

        bfs.dealloc_block(inode_id, 20);
        assert_eq!(bfs.block_id(inode_id, 20), None);
        assert_eq!(bfs.usage().1, free - 3);

        // 最后一个间接块归还后，一级索引块随之归还
        bfs.dealloc_block(inode_id, 21);
        assert_eq!(bfs.usage().1, free - 1);
        assert!(bfs.block_id(inode_id, 0).is_some());

        // 未分配的块
        bfs.dealloc_block(inode_id, 5);
        assert_eq!(bfs.usage().1, free - 1);
    }

    #[test]
    fn alloc_beyond_largest_file_fails() {
        let mut bfs = format(512).unwrap();
        let inode_id = bfs.create("f").unwrap();
        assert_eq!(bfs.alloc_block(inode_id, MAX_FILE_BLOCKS as u32), None);
    }

    #[test]
    fn exhaustion_rolls_back_indirect_block() {
        // 数据区只有1块
        let mut bfs = format(15).unwrap();
        assert_eq!(bfs.usage(), (1, 1));
        let inode_id = bfs.create("f").unwrap();

        assert_eq!(bfs.alloc_block(inode_id, 13), None);
        assert_eq!(bfs.usage(), (1, 1));
        assert!(bfs.alloc_block(inode_id, 0).is_some());
        assert_eq!(bfs.alloc_block(inode_id, 1), None);
    }

    #[test]
    fn create_truncates_existing_file() {
        let mut bfs = format(64).unwrap();
        let inode_id = bfs.create("f").unwrap();
        let (_, free) = bfs.usage();
        bfs.alloc_block(inode_id, 0).unwrap();
        bfs.alloc_block(inode_id, 30).unwrap();
        bfs.set_size(inode_id, 31 * BLOCK_SIZE);

        assert_eq!(bfs.create("f"), Ok(inode_id));
        assert_eq!(bfs.size(inode_id), 0);
        assert_eq!(bfs.block_id(inode_id, 0), None);
        assert_eq!(bfs.usage().1, free);
    }

    #[test]
    fn inode_exhaustion_reads_as_not_found() {
        let mut bfs = format(64).unwrap();
        for i in 0..INODE_COUNT {
            bfs.create(&alloc::format!("f{i}")).unwrap();
        }
        assert_eq!(bfs.create("one-more"), Err(Error::NotFound));
        assert_eq!(bfs.ls().len(), INODE_COUNT);
    }

    #[test]
    fn names_are_validated() {
        let mut bfs = format(64).unwrap();
        assert_eq!(bfs.create(""), Err(Error::InvalidName));
        assert_eq!(
            bfs.lookup(&"x".repeat(NAME_MAX_LEN + 1)),
            Err(Error::InvalidName)
        );
        assert_eq!(bfs.lookup("missing"), Err(Error::NotFound));
    }
}
