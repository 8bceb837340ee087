use crate::BLOCK_SIZE;

pub const NAME_MAX_LEN: usize = 27;
pub const DIR_ENTRIES_PER_BLOCK: usize = BLOCK_SIZE / DirEntry::SIZE;

/// 目录区域内块的结构
pub type DirBlock = [DirEntry; DIR_ENTRIES_PER_BLOCK];

/// 目录项：文件名到 inode 号的映射，名字为空表示空槽位
#[derive(Debug, Default, Clone)]
#[repr(C)]
pub struct DirEntry {
    // 最后一字节留给 \0
    name: [u8; NAME_MAX_LEN + 1],
    inode_id: u32,
}

impl DirEntry {
    /// 目录项大小恒为32字节
    pub const SIZE: usize = 32;

    /// 名字须为 1..=[`NAME_MAX_LEN`] 字节且不含 \0
    #[inline]
    pub fn is_valid_name(name: &str) -> bool {
        (1..=NAME_MAX_LEN).contains(&name.len()) && !name.as_bytes().contains(&0)
    }

    pub fn new(name: &str, inode_id: u32) -> Self {
        debug_assert!(Self::is_valid_name(name));
        let bytes = name.as_bytes();
        let mut name = [0; NAME_MAX_LEN + 1];
        name[..bytes.len()].copy_from_slice(bytes);

        Self { name, inode_id }
    }

    pub fn name(&self) -> &str {
        let len = self
            .name
            .iter()
            .position(|&c| c == 0)
            .unwrap_or(NAME_MAX_LEN);
        core::str::from_utf8(&self.name[..len]).unwrap_or_default()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.name[0] == 0
    }

    #[inline]
    pub fn inode_id(&self) -> u32 {
        self.inode_id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn name_rules() {
        assert!(DirEntry::is_valid_name("a.txt"));
        assert!(DirEntry::is_valid_name(&"x".repeat(NAME_MAX_LEN)));
        assert!(!DirEntry::is_valid_name(""));
        assert!(!DirEntry::is_valid_name(&"x".repeat(NAME_MAX_LEN + 1)));
        assert!(!DirEntry::is_valid_name("a\0b"));
    }

    #[test]
    fn entry_keeps_name() {
        let entry = DirEntry::new("hello", 3);
        assert_eq!(entry.name(), "hello");
        assert_eq!(entry.inode_id(), 3);
        assert!(!entry.is_empty());
        assert!(DirEntry::default().is_empty());
    }
}
