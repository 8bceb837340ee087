use core::fmt;

use thiserror::Error;

pub type Result<T> = core::result::Result<T, Error>;

/// 文件系统错误
///
/// 只有 [`Error::NotFound`] 与 [`Error::InvalidName`] 是调用者应当处理的常规结果，
/// 其余均为环境或调用方式错误，通常直接向上传播。
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    #[error("file not found")]
    NotFound,
    #[error("invalid file name")]
    InvalidName,
    #[error("backing store does not exist")]
    NoBackingStore,
    #[error("failed to create backing store")]
    DiskCreate,
    #[error("no free block left")]
    DiskFull,
    #[error("negative length")]
    NegativeLength,
    #[error("buffer cannot hold the requested bytes")]
    NullBuffer,
    #[error("negative cursor")]
    BadCursor,
    #[error("bad seek base: {0}")]
    BadSeekBase(i32),
    #[error("failed to initialize {0}")]
    InitFailed(InitStage),
    #[error("super block is not valid")]
    InvalidSuperBlock,
    #[error("bad file descriptor")]
    BadDescriptor,
}

impl Error {
    #[inline]
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::NotFound | Self::InvalidName)
    }

    #[inline]
    pub fn is_fatal(&self) -> bool {
        !self.is_recoverable()
    }
}

/// 格式化的各个阶段，严格按此顺序执行
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InitStage {
    SuperBlock,
    Inodes,
    Directory,
    FreeList,
}

impl fmt::Display for InitStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::SuperBlock => "super block",
            Self::Inodes => "inode table",
            Self::Directory => "directory",
            Self::FreeList => "free list",
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_lookup_failures_are_recoverable() {
        assert!(Error::NotFound.is_recoverable());
        assert!(Error::InvalidName.is_recoverable());

        for error in [
            Error::NoBackingStore,
            Error::DiskCreate,
            Error::DiskFull,
            Error::NegativeLength,
            Error::NullBuffer,
            Error::BadCursor,
            Error::BadSeekBase(7),
            Error::InitFailed(InitStage::Directory),
            Error::InvalidSuperBlock,
            Error::BadDescriptor,
        ] {
            assert!(error.is_fatal(), "{error:?}");
        }
    }
}
