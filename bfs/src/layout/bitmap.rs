use crate::BLOCK_BITS;
use crate::block_cache::BlockCacheManager;

/// 位图区域内块的结构
type BitmapBlock = [u64; BLOCK_BITS / 64];

/// 位图区域，记录其指示区域的块分配情况
#[derive(Debug)]
pub struct Bitmap {
    /// 位图的起始块
    start_block_id: usize,
    /// 位图占用块数
    blocks: usize,
    /// 所指示区域的实际块数，不超过位图的位数
    capacity: usize,
}

/// 块编号
struct BlockID(u32);

impl Bitmap {
    #[inline]
    pub fn new(start_block_id: usize, blocks: usize, capacity: usize) -> Self {
        debug_assert!(capacity <= blocks * BLOCK_BITS);
        Self {
            start_block_id,
            blocks,
            capacity,
        }
    }

    /// 位图所指示区域的总块数
    #[inline]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// 在指示区域内分配新的块，返回其编号。
    /// 若区域的空间用尽，则返回空。
    pub fn alloc(&self, cache: &mut BlockCacheManager) -> Option<u32> {
        // 总是取最低的空闲位，所以找到的位越界即说明区域已满
        for block_index in 0..self.blocks {
            let block = cache.get(self.start_block_id + block_index);

            let Some((group_index, ingroup_index)) =
                block.map(0, |bitmap_block: &BitmapBlock| {
                    bitmap_block
                        .iter()
                        .enumerate()
                        .find_map(|(group_index, &bits)| {
                            (bits != u64::MAX).then_some((group_index, bits.trailing_ones()))
                        })
                })
            else {
                continue;
            };

            let id = BlockID::encode(block_index, group_index, ingroup_index as usize);
            if id as usize >= self.capacity {
                return None;
            }

            block.map_mut(0, |bitmap_block: &mut BitmapBlock| {
                bitmap_block[group_index] |= 1u64 << ingroup_index;
            });
            return Some(id);
        }

        None
    }

    pub fn dealloc(&self, cache: &mut BlockCacheManager, id: u32) {
        let (block_index, group_index, ingroup_index) = BlockID(id).decode();
        let bitmap_block: &mut BitmapBlock =
            cache.get(self.start_block_id + block_index).get_mut(0);

        // 编号一定得有对应的位
        assert_ne!(bitmap_block[group_index] & (1 << ingroup_index), 0);

        bitmap_block[group_index] &= !(1u64 << ingroup_index);
    }

    /// 已分配的块数
    pub fn allocated(&self, cache: &mut BlockCacheManager) -> usize {
        (0..self.blocks)
            .map(|block_index| {
                cache
                    .get(self.start_block_id + block_index)
                    .map(0, |bitmap_block: &BitmapBlock| {
                        bitmap_block
                            .iter()
                            .map(|bits| bits.count_ones() as usize)
                            .sum::<usize>()
                    })
            })
            .sum()
    }
}

impl BlockID {
    /// 线性映射编码得到块ID
    #[inline]
    fn encode(block_index: usize, group_index: usize, ingroup_index: usize) -> u32 {
        (block_index * BLOCK_BITS + group_index * 64 + ingroup_index) as u32
    }

    fn decode(self) -> (usize, usize, usize) {
        let mut block_id = self.0 as usize;

        let block_index = block_id / BLOCK_BITS;
        block_id %= BLOCK_BITS;
        (block_index, block_id / 64, block_id % 64)
    }
}

#[cfg(test)]
mod tests {
    use alloc::sync::Arc;

    use block_dev::{BlockDevice, RamDisk};

    use super::*;
    use crate::BLOCK_SIZE;

    #[test]
    fn alloc_respects_capacity() {
        let mut cache = BlockCacheManager::new(Arc::new(RamDisk::new(BLOCK_SIZE, 2)));
        let bitmap = Bitmap::new(1, 1, 3);

        assert_eq!(bitmap.alloc(&mut cache), Some(0));
        assert_eq!(bitmap.alloc(&mut cache), Some(1));
        assert_eq!(bitmap.alloc(&mut cache), Some(2));
        assert_eq!(bitmap.alloc(&mut cache), None);
        assert_eq!(bitmap.allocated(&mut cache), 3);

        bitmap.dealloc(&mut cache, 1);
        assert_eq!(bitmap.alloc(&mut cache), Some(1));
    }

    #[test]
    fn scanning_full_block_leaves_it_clean() {
        let disk = Arc::new(RamDisk::new(BLOCK_SIZE, 3));
        let mut cache = BlockCacheManager::new(disk.clone());
        let bitmap = Bitmap::new(1, 2, 2 * BLOCK_BITS);

        cache
            .get(1)
            .map_mut(0, |bitmap_block: &mut BitmapBlock| bitmap_block.fill(u64::MAX));
        cache.sync_all();

        assert_eq!(bitmap.alloc(&mut cache), Some(BLOCK_BITS as u32));

        // 绕过缓存改写块1；块1若被标为脏块，同步时会被覆盖回去
        disk.write_block(1, &[0; BLOCK_SIZE]);
        cache.sync_all();
        assert!(disk.snapshot(1).iter().all(|&b| b == 0));
        assert_eq!(disk.snapshot(2)[..8], 1u64.to_ne_bytes());
    }
}
