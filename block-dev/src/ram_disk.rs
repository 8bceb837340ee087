use alloc::vec;
use alloc::vec::Vec;

use spin::Mutex;

use crate::BlockDevice;

/// 位于内存的块设备，块初始全零
#[derive(Debug)]
pub struct RamDisk {
    block_size: usize,
    data: Mutex<Vec<u8>>,
}

impl RamDisk {
    pub fn new(block_size: usize, blocks: usize) -> Self {
        Self {
            block_size,
            data: Mutex::new(vec![0; block_size * blocks]),
        }
    }

    #[inline]
    pub fn blocks(&self) -> usize {
        self.data.lock().len() / self.block_size
    }

    /// 复制出整块的内容，便于检查设备上的实际数据
    pub fn snapshot(&self, block_id: usize) -> Vec<u8> {
        let mut buf = vec![0; self.block_size];
        self.read_block(block_id, &mut buf);
        buf
    }

    #[inline]
    fn range(&self, block_id: usize) -> core::ops::Range<usize> {
        let start = block_id * self.block_size;
        start..start + self.block_size
    }
}

impl BlockDevice for RamDisk {
    fn read_block(&self, block_id: usize, buf: &mut [u8]) {
        let data = self.data.lock();
        assert!(block_id < data.len() / self.block_size, "block out of range");
        buf.copy_from_slice(&data[self.range(block_id)]);
    }

    fn write_block(&self, block_id: usize, buf: &[u8]) {
        let mut data = self.data.lock();
        assert!(block_id < data.len() / self.block_size, "block out of range");
        let range = self.range(block_id);
        data[range].copy_from_slice(buf);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_blocks_are_zeroed() {
        let disk = RamDisk::new(512, 4);
        assert_eq!(disk.blocks(), 4);
        assert!(disk.snapshot(3).iter().all(|&b| b == 0));
    }

    #[test]
    fn write_then_read_block() {
        let disk = RamDisk::new(512, 4);
        disk.write_block(2, &[7; 512]);

        let mut buf = [0; 512];
        disk.read_block(2, &mut buf);
        assert_eq!(buf, [7; 512]);
        assert!(disk.snapshot(1).iter().all(|&b| b == 0));
    }

    #[test]
    #[should_panic(expected = "block out of range")]
    fn out_of_range_panics() {
        let disk = RamDisk::new(512, 1);
        disk.read_block(1, &mut [0; 512]);
    }
}
