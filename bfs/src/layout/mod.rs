//! # 磁盘数据结构层
//!
//! bfs 的磁盘布局：
//! 超级块 | 索引节点区域 | 目录区域 | 空闲块位图 | 数据块区域

mod super_block;
pub use super_block::SuperBlock;

mod bitmap;
pub use bitmap::Bitmap;

mod inode;
pub use inode::{DiskInode, INODES_PER_BLOCK, MAX_FILE_BLOCKS};

mod dir_entry;
pub use dir_entry::{DIR_ENTRIES_PER_BLOCK, DirBlock, DirEntry, NAME_MAX_LEN};

/// inode 总数，目录项与之一一对应
pub const INODE_COUNT: usize = 64;
pub const INODE_AREA_BLOCKS: u32 = (INODE_COUNT / INODES_PER_BLOCK) as u32;
pub const DIR_AREA_BLOCKS: u32 = (INODE_COUNT / DIR_ENTRIES_PER_BLOCK) as u32;
