#![no_std]

extern crate alloc;

/* bfs 的整体架构，自上而下 */

// 文件读写层：会话表与读、写、定位引擎
mod file;
mod session;

// 协作者接口层：引擎所依赖的块I/O、块映射与 inode 操作
mod volume;

// 磁盘块管理器层
mod bfs;

// 磁盘数据结构层：表示磁盘文件系统的数据结构
mod layout;

// 块缓存层：内存上的磁盘块数据缓存
mod block_cache;

mod error;

pub use block_dev::BlockDevice;

pub use self::{
    bfs::Bfs,
    error::{Error, InitStage, Result},
    file::{FileSystem, OpenFlag, Whence},
    layout::{MAX_FILE_BLOCKS, NAME_MAX_LEN},
    session::{Fd, OpenFile, SessionTable},
    volume::{BlockIo, BlockMap, InodeStore, Volume},
};

pub const MAGIC: u32 = 0x4246_5331;
pub const BLOCK_SIZE: usize = 512;
pub const BLOCK_BITS: usize = BLOCK_SIZE * 8;

pub type DataBlock = [u8; BLOCK_SIZE];
