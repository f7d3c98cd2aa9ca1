//! Compile-time knobs translated to ordinary Rust constants plus a runtime
//! [`Config`] value, in place of the C source's `#define`-based
//! configuration (`storfs_config.h`).

/// Default field width for a header's `name` (N bytes, null-terminated).
pub const DEFAULT_MAX_FILE_NAME: usize = 32;
/// Smallest `max_file_name` the core will accept (room for at least a
/// 3-character name plus the null terminator).
pub const MIN_MAX_FILE_NAME: usize = 4;
/// Default number of write/verify attempts before the wear-retry wrapper
/// gives up on a page and asks the allocator for a fresh one.
pub const DEFAULT_WEAR_LEVEL_RETRY_NUM: u8 = 3;
/// Default bound on the relocator's recursive back-patch (comfortably above
/// any realistic directory depth given `MAX_FILE_NAME`-bounded segments).
pub const DEFAULT_MAX_RELOCATE_DEPTH: u32 = 64;

/// Mount-time configuration: page geometry plus the wear-retry and
/// relocation-depth knobs. Constructed once and carried by the
/// [`crate::fs::StorFs`] handle for the lifetime of the mount.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Config {
    pub page_size: u32,
    pub first_page_loc: u64,
    pub first_byte_loc: u32,
    pub max_file_name: usize,
    pub wear_level_retry_num: u8,
    pub max_relocate_depth: u32,
}

impl Config {
    /// A config with `page_size` set and every other knob at its default;
    /// the common case for a fresh RAM-backed or flash-backed mount.
    pub fn new(page_size: u32) -> Self {
        Self {
            page_size,
            first_page_loc: 0,
            first_byte_loc: 0,
            max_file_name: DEFAULT_MAX_FILE_NAME,
            wear_level_retry_num: DEFAULT_WEAR_LEVEL_RETRY_NUM,
            max_relocate_depth: DEFAULT_MAX_RELOCATE_DEPTH,
        }
    }

    pub fn with_first_page_loc(mut self, first_page_loc: u64) -> Self {
        self.first_page_loc = first_page_loc;
        self
    }

    pub fn with_first_byte_loc(mut self, first_byte_loc: u32) -> Self {
        self.first_byte_loc = first_byte_loc;
        self
    }

    pub fn with_max_file_name(mut self, max_file_name: usize) -> Self {
        debug_assert!(
            max_file_name >= MIN_MAX_FILE_NAME,
            "max_file_name must leave room for at least a 3-character name plus its null terminator"
        );
        self.max_file_name = max_file_name;
        self
    }

    pub fn with_wear_level_retry_num(mut self, n: u8) -> Self {
        self.wear_level_retry_num = n;
        self
    }

    pub fn with_max_relocate_depth(mut self, depth: u32) -> Self {
        self.max_relocate_depth = depth;
        self
    }
}

/// Open-mode flags, parsed once at the API boundary so the rest of the
/// crate never matches on a mode string.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenMode {
    Read,
    ReadWrite,
    Write,
    WriteRead,
    Append,
    AppendRead,
}

impl OpenMode {
    /// Maps a POSIX-like mode string onto a flag per spec.md §4.12; any
    /// unrecognized string defaults to read-only.
    pub fn from_str(mode: &str) -> Self {
        match mode {
            "r+" => OpenMode::ReadWrite,
            "w" => OpenMode::Write,
            "w+" => OpenMode::WriteRead,
            "a" => OpenMode::Append,
            "a+" => OpenMode::AppendRead,
            _ => OpenMode::Read,
        }
    }

    pub fn truncates(self) -> bool {
        matches!(self, OpenMode::Write | OpenMode::WriteRead)
    }

    pub fn appends(self) -> bool {
        matches!(self, OpenMode::Append | OpenMode::AppendRead)
    }

    pub fn writable(self) -> bool {
        matches!(
            self,
            OpenMode::ReadWrite
                | OpenMode::Write
                | OpenMode::WriteRead
                | OpenMode::Append
                | OpenMode::AppendRead
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mode_strings_map_as_specified() {
        assert_eq!(OpenMode::from_str("r"), OpenMode::Read);
        assert_eq!(OpenMode::from_str("r+"), OpenMode::ReadWrite);
        assert_eq!(OpenMode::from_str("w"), OpenMode::Write);
        assert_eq!(OpenMode::from_str("w+"), OpenMode::WriteRead);
        assert_eq!(OpenMode::from_str("a"), OpenMode::Append);
        assert_eq!(OpenMode::from_str("a+"), OpenMode::AppendRead);
        assert_eq!(OpenMode::from_str("bogus"), OpenMode::Read);
    }

    #[test]
    fn truncation_only_for_w_variants() {
        assert!(OpenMode::Write.truncates());
        assert!(OpenMode::WriteRead.truncates());
        assert!(!OpenMode::Append.truncates());
        assert!(!OpenMode::Read.truncates());
    }
}
