//! 在宿主机上以镜像文件作为 bfs 的后备存储


use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::Path;
use std::sync::{Arc, Mutex};

use bfs::{BLOCK_SIZE, Bfs, Error, FileSystem};
use block_dev::BlockDevice;

#[derive(Debug)]
pub struct BlockFile(Mutex<File>);

impl BlockFile {
    pub fn new(fd: File) -> Self {
        Self(Mutex::new(fd))
    }
}

impl BlockDevice for BlockFile {
    fn read_block(&self, block_id: usize, buf: &mut [u8]) {
        let mut file = self.0.lock().unwrap();
        file.seek(SeekFrom::Start((block_id * BLOCK_SIZE) as u64))
            .expect("seeking error");
        file.read_exact(buf).expect("not a complete block!");
    }

    fn write_block(&self, block_id: usize, buf: &[u8]) {
        let mut file = self.0.lock().unwrap();
        file.seek(SeekFrom::Start((block_id * BLOCK_SIZE) as u64))
            .expect("seeking error");
        file.write_all(buf).expect("not a complete block!");
    }
}

/// 创建（或覆盖）`total_blocks` 块大小的镜像文件，并在其上格式化
pub fn format(path: impl AsRef<Path>, total_blocks: u32) -> bfs::Result<FileSystem<Bfs>> {
    let path = path.as_ref();
    let fd = OpenOptions::new()
        .read(true)
        .write(true)
        .create(true)
        .truncate(true)
        .open(path)
        .and_then(|fd| {
            fd.set_len(total_blocks as u64 * BLOCK_SIZE as u64)?;
            Ok(fd)
        })
        .map_err(|err| {
            log::error!("cannot create {}: {err}", path.display());
            Error::DiskCreate
        })?;

    let bfs = Bfs::format(Arc::new(BlockFile::new(fd)), total_blocks)?;
    Ok(FileSystem::new(bfs))
}

/// 挂载已有的镜像文件
pub fn mount(path: impl AsRef<Path>) -> bfs::Result<FileSystem<Bfs>> {
    let path = path.as_ref();
    let fd = OpenOptions::new()
        .read(true)
        .write(true)
        .open(path)
        .map_err(|err| {
            log::error!("cannot open {}: {err}", path.display());
            Error::NoBackingStore
        })?;

    let bfs = Bfs::mount(Arc::new(BlockFile::new(fd)))?;
    Ok(FileSystem::new(bfs))
}
