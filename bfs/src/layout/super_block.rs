use crate::{BLOCK_BITS, MAGIC};

use super::{DIR_AREA_BLOCKS, INODE_AREA_BLOCKS};

/// 超级块：
/// - 提供文件系统合法性校验；
/// - 定位其它连续区域
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(C)]
pub struct SuperBlock {
    /// 魔数：用于校验文件系统合法性
    magic: u32,
    /// 文件系统占据块数
    pub total_blocks: u32,
    pub inode_area_blocks: u32,
    pub dir_area_blocks: u32,
    pub free_list_blocks: u32,
    pub data_area_blocks: u32,
}

impl SuperBlock {
    /// 按总块数规划各区域；块数不足时，靠后的区域大小为0
    pub fn new(total_blocks: u32) -> Self {
        let meta_blocks = 1 + INODE_AREA_BLOCKS + DIR_AREA_BLOCKS;
        let data_total_blocks = total_blocks.saturating_sub(meta_blocks);
        // 每个位图块管理 BLOCK_BITS 个数据块，再算上位图块自身
        let free_list_blocks = (data_total_blocks + BLOCK_BITS as u32) / (BLOCK_BITS as u32 + 1);

        Self {
            magic: MAGIC,
            total_blocks,
            inode_area_blocks: INODE_AREA_BLOCKS,
            dir_area_blocks: DIR_AREA_BLOCKS,
            free_list_blocks,
            data_area_blocks: data_total_blocks - free_list_blocks,
        }
    }

    #[inline]
    pub fn is_valid(&self) -> bool {
        self.magic == MAGIC
    }

    #[inline]
    pub fn inode_area_start(&self) -> u32 {
        1
    }

    #[inline]
    pub fn dir_area_start(&self) -> u32 {
        self.inode_area_start() + self.inode_area_blocks
    }

    #[inline]
    pub fn free_list_start(&self) -> u32 {
        self.dir_area_start() + self.dir_area_blocks
    }

    #[inline]
    pub fn data_area_start(&self) -> u32 {
        self.free_list_start() + self.free_list_blocks
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn regions_are_contiguous() {
        let sb = SuperBlock::new(1024);
        assert!(sb.is_valid());
        assert_eq!(sb.dir_area_start(), 9);
        assert_eq!(sb.free_list_start(), 13);
        assert_eq!(sb.free_list_blocks, 1);
        assert_eq!(sb.data_area_start(), 14);
        assert_eq!(sb.data_area_start() + sb.data_area_blocks, 1024);
    }

    #[test]
    fn tiny_device_has_no_data_area() {
        let sb = SuperBlock::new(10);
        assert_eq!(sb.free_list_blocks, 0);
        assert_eq!(sb.data_area_blocks, 0);
    }
}
