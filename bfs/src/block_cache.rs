//! # 块缓存层
//!
//! 块设备读写速度一般慢于内存读写速度，因此我们在内存中开辟缓冲区，
//! 把即将操作的块复制到内存中，提高对块设备的操作效率。
//!
//! 缓存归属于所在的卷，而非全局共享：同一进程内可以同时挂载多个设备。
//! 脏块在被踢出、[`BlockCacheManager::sync_all`] 或缓存销毁时写回。

use alloc::collections::VecDeque;
use alloc::sync::Arc;
use core::mem;

use block_dev::BlockDevice;

use crate::{BLOCK_SIZE, DataBlock};

/// 按8字节对齐，使块内的 `u32`/`u64` 结构可以直接映射
#[repr(C, align(8))]
struct AlignedBlock(DataBlock);

/// 内存中的块缓存
pub struct BlockCache {
    /// 缓存的数据
    data: AlignedBlock,
    /// 对应的块ID
    block_id: usize,
    /// 是否为脏块
    modified: bool,
}

impl BlockCache {
    fn load(block_id: usize, block_device: &Arc<dyn BlockDevice>) -> Self {
        let mut data = AlignedBlock([0; BLOCK_SIZE]);
        block_device.read_block(block_id, &mut data.0);

        Self {
            data,
            block_id,
            modified: false,
        }
    }

    fn sync(&mut self, block_device: &Arc<dyn BlockDevice>) {
        if self.modified {
            self.modified = false;
            block_device.write_block(self.block_id, &self.data.0);
        }
    }

    pub fn get<T: Sized>(&self, offset: usize) -> &T {
        let type_size = mem::size_of::<T>();
        assert!(type_size + offset <= BLOCK_SIZE);
        assert_eq!(offset % mem::align_of::<T>(), 0);
        let addr = self.data.0[offset..].as_ptr().cast::<T>();
        unsafe { &*addr }
    }

    pub fn get_mut<T: Sized>(&mut self, offset: usize) -> &mut T {
        let type_size = mem::size_of::<T>();
        assert!(type_size + offset <= BLOCK_SIZE);
        assert_eq!(offset % mem::align_of::<T>(), 0);
        self.modified = true;
        let addr = self.data.0[offset..].as_mut_ptr().cast::<T>();
        unsafe { &mut *addr }
    }

    #[inline]
    pub fn map<T: Sized, V>(&self, offset: usize, f: impl FnOnce(&T) -> V) -> V {
        f(self.get(offset))
    }

    #[inline]
    pub fn map_mut<T: Sized, V>(&mut self, offset: usize, f: impl FnOnce(&mut T) -> V) -> V {
        f(self.get_mut(offset))
    }
}

/// 块缓存管理，缓存、调度块缓存
pub struct BlockCacheManager {
    block_device: Arc<dyn BlockDevice>,
    /// 队首为最久未使用的块
    queue: VecDeque<BlockCache>,
}

impl BlockCacheManager {
    /// 块缓存个数的上限
    const CAPACITY: usize = 16;

    pub fn new(block_device: Arc<dyn BlockDevice>) -> Self {
        Self {
            block_device,
            queue: VecDeque::with_capacity(Self::CAPACITY),
        }
    }

    // 块缓存调度策略：踢走最久未使用的块
    pub fn get(&mut self, block_id: usize) -> &mut BlockCache {
        let hit = self
            .queue
            .iter()
            .position(|cache| cache.block_id == block_id)
            .and_then(|index| self.queue.remove(index));

        let cache = match hit {
            Some(cache) => cache,
            None => {
                // 触及上限，写回一个块
                if self.queue.len() == Self::CAPACITY {
                    if let Some(mut evicted) = self.queue.pop_front() {
                        evicted.sync(&self.block_device);
                    }
                }
                BlockCache::load(block_id, &self.block_device)
            }
        };

        // 刚用到的块放在队尾
        self.queue.push_back(cache);
        let last = self.queue.len() - 1;
        &mut self.queue[last]
    }

    pub fn sync_all(&mut self) {
        let block_device = &self.block_device;
        self.queue
            .iter_mut()
            .for_each(|cache| cache.sync(block_device));
    }
}

impl Drop for BlockCacheManager {
    fn drop(&mut self) {
        self.sync_all();
    }
}

#[cfg(test)]
mod tests {
    use block_dev::RamDisk;

    use super::*;

    fn manager() -> (Arc<RamDisk>, BlockCacheManager) {
        let disk = Arc::new(RamDisk::new(BLOCK_SIZE, 32));
        let manager = BlockCacheManager::new(disk.clone());
        (disk, manager)
    }

    #[test]
    fn writes_stay_cached_until_sync() {
        let (disk, mut manager) = manager();
        manager
            .get(3)
            .map_mut(8, |word: &mut u32| *word = 0xdead_beef);
        assert!(disk.snapshot(3).iter().all(|&b| b == 0));

        manager.sync_all();
        assert_eq!(disk.snapshot(3)[8..12], 0xdead_beef_u32.to_ne_bytes());
    }

    #[test]
    fn eviction_writes_back_dirty_block() {
        let (disk, mut manager) = manager();
        manager.get(0).map_mut(0, |block: &mut DataBlock| block.fill(1));

        // 填满缓存后再多读一块，块0是最久未使用的
        for block_id in 1..=BlockCacheManager::CAPACITY {
            manager.get(block_id);
        }

        assert!(disk.snapshot(0).iter().all(|&b| b == 1));
    }

    #[test]
    fn hit_refreshes_recency() {
        let (disk, mut manager) = manager();
        manager.get(0).map_mut(0, |block: &mut DataBlock| block.fill(1));
        for block_id in 1..BlockCacheManager::CAPACITY {
            manager.get(block_id);
        }
        // 再次访问块0，踢出的应是块1
        manager.get(0);
        manager.get(BlockCacheManager::CAPACITY);

        assert!(disk.snapshot(0).iter().all(|&b| b == 0));
        assert!(manager.queue.iter().any(|cache| cache.block_id == 0));
        assert!(manager.queue.iter().all(|cache| cache.block_id != 1));
    }

    #[test]
    fn drop_flushes() {
        let (disk, mut manager) = manager();
        manager.get(5).map_mut(0, |block: &mut DataBlock| block.fill(9));
        drop(manager);

        assert!(disk.snapshot(5).iter().all(|&b| b == 9));
    }
}
