//! Fixed-width big-endian (de)serialization of headers, and the small
//! bit-packed `file_info` type.
//!
//! Field order for a header matches §3 of the design exactly: `file_info`,
//! `name`, `child_location`, `sibling_location`, `reserved`,
//! `fragment_location`, `file_size`, `crc`.

use crate::error::{Result, StorfsError};

pub const INFO_SIZE: usize = 1;
pub const CHILD_SIZE: usize = 8;
pub const SIBLING_SIZE: usize = 8;
pub const RESERVED_SIZE: usize = 2;
pub const FRAGMENT_SIZE: usize = 8;
pub const FILE_SIZE_SIZE: usize = 4;
pub const CRC_SIZE: usize = 2;

/// Total on-media size of a fragment header: `file_info | reserved |
/// fragment_location | crc`.
pub const FRAGMENT_HEADER_SIZE: usize = INFO_SIZE + RESERVED_SIZE + FRAGMENT_SIZE + CRC_SIZE;

/// Total on-media size of a full header given a `name` field width.
pub const fn header_total_size(max_file_name: usize) -> usize {
    INFO_SIZE
        + max_file_name
        + CHILD_SIZE
        + SIBLING_SIZE
        + RESERVED_SIZE
        + FRAGMENT_SIZE
        + FILE_SIZE_SIZE
        + CRC_SIZE
}

/// Bit positions within `file_info`: bit 7 marks "not a fragment"; bits 6-5
/// hold the fill state; bits 3-2 hold the file type.
const NOT_FRAGMENT_BIT: u8 = 0x80;
const FILL_STATE_MASK: u8 = 0x3 << 5;
const FILE_TYPE_MASK: u8 = 0x3 << 2;

/// Page fill state, encoded in bits 6-5 of `file_info`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FillState {
    Empty,
    Partial,
    Full,
}

impl FillState {
    fn bits(self) -> u8 {
        match self {
            FillState::Empty => 0x3 << 5,
            FillState::Partial => 0x2 << 5,
            FillState::Full => 0x1 << 5,
        }
    }

    fn from_bits(b: u8) -> FillState {
        match (b & FILL_STATE_MASK) >> 5 {
            0x3 => FillState::Empty,
            0x2 => FillState::Partial,
            _ => FillState::Full,
        }
    }
}

/// File type, encoded in bits 3-2 of `file_info`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileType {
    Fragment,
    Root,
    Directory,
    File,
}

impl FileType {
    fn bits(self) -> u8 {
        match self {
            FileType::File => 0x3 << 2,
            FileType::Directory => 0x2 << 2,
            FileType::Root => 0x1 << 2,
            FileType::Fragment => 0x0,
        }
    }

    fn from_bits(b: u8) -> FileType {
        match (b & FILE_TYPE_MASK) >> 2 {
            0x3 => FileType::File,
            0x2 => FileType::Directory,
            0x1 => FileType::Root,
            _ => FileType::Fragment,
        }
    }
}

/// The bit-packed `file_info` byte: never manipulated as a raw byte outside
/// this module and [`crate::header`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileInfo(u8);

impl FileInfo {
    pub fn header(fill: FillState, file_type: FileType) -> Self {
        FileInfo(NOT_FRAGMENT_BIT | fill.bits() | file_type.bits())
    }

    pub fn fragment(fill: FillState) -> Self {
        FileInfo(fill.bits())
    }

    pub fn from_byte(b: u8) -> Self {
        FileInfo(b)
    }

    pub fn to_byte(self) -> u8 {
        self.0
    }

    pub fn is_not_fragment_bit(self) -> bool {
        self.0 & NOT_FRAGMENT_BIT != 0
    }

    pub fn fill_state(self) -> FillState {
        FillState::from_bits(self.0)
    }

    pub fn file_type(self) -> FileType {
        FileType::from_bits(self.0)
    }

    /// Decode rule from §4.1: bit 7 clear *and* file-type bits zero means
    /// this page carries a fragment header, not a full one.
    pub fn is_fragment(self) -> bool {
        !self.is_not_fragment_bit() && self.file_type() == FileType::Fragment
    }

    /// An untouched, erased page reads back as all-`0xFF`.
    pub fn is_blank(self) -> bool {
        self.0 == 0xFF
    }

    pub fn with_fill_state(self, fill: FillState) -> Self {
        FileInfo((self.0 & !FILL_STATE_MASK) | fill.bits())
    }
}

/// All-ones sentinel for an uninitialised `child`/`sibling`/`fragment`
/// pointer (an erased page never touched by a header write).
pub const UNINITIALISED: u64 = u64::MAX;

/// A file/directory/root header, or — when `file_info.is_fragment()` is
/// true — a fragment header sharing the same struct with the unused fields
/// zeroed (§3.1: one struct, a narrower decode path, not a separate type).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Header {
    pub file_info: FileInfo,
    pub name: Vec<u8>,
    pub child_location: u64,
    pub sibling_location: u64,
    pub reserved: u16,
    pub fragment_location: u64,
    pub file_size: u32,
    pub crc: u16,
}

impl Header {
    /// A blank header as read from an erased, never-written page.
    pub fn blank() -> Self {
        Header {
            file_info: FileInfo::from_byte(0xFF),
            name: Vec::new(),
            child_location: UNINITIALISED,
            sibling_location: UNINITIALISED,
            reserved: 0xFFFF,
            fragment_location: UNINITIALISED,
            file_size: u32::MAX,
            crc: 0xFFFF,
        }
    }

    /// True when every field still reads as freshly-erased, i.e. the page
    /// has never been written.
    pub fn is_blank(&self) -> bool {
        self.file_info.is_blank()
            && self.child_location == UNINITIALISED
            && self.sibling_location == UNINITIALISED
            && self.fragment_location == UNINITIALISED
    }

    /// Pack the header into a `header_total_size(max_file_name)`-byte
    /// big-endian buffer. Fragment headers zero every field outside
    /// `file_info`/`reserved`/`fragment_location`/`crc` so that
    /// `decode(encode(h)) == h` holds for every reachable `h`.
    pub fn encode(&self, max_file_name: usize) -> Vec<u8> {
        let mut buf = vec![0u8; header_total_size(max_file_name)];
        let mut i = 0usize;

        buf[i] = self.file_info.to_byte();
        i += INFO_SIZE;

        if !self.file_info.is_fragment() {
            let n = self.name.len().min(max_file_name);
            buf[i..i + n].copy_from_slice(&self.name[..n]);
        }
        i += max_file_name;

        let child = if self.file_info.is_fragment() { 0 } else { self.child_location };
        buf[i..i + CHILD_SIZE].copy_from_slice(&child.to_be_bytes());
        i += CHILD_SIZE;

        let sibling = if self.file_info.is_fragment() { 0 } else { self.sibling_location };
        buf[i..i + SIBLING_SIZE].copy_from_slice(&sibling.to_be_bytes());
        i += SIBLING_SIZE;

        buf[i..i + RESERVED_SIZE].copy_from_slice(&self.reserved.to_be_bytes());
        i += RESERVED_SIZE;

        buf[i..i + FRAGMENT_SIZE].copy_from_slice(&self.fragment_location.to_be_bytes());
        i += FRAGMENT_SIZE;

        let file_size = if self.file_info.is_fragment() { 0 } else { self.file_size };
        buf[i..i + FILE_SIZE_SIZE].copy_from_slice(&file_size.to_be_bytes());
        i += FILE_SIZE_SIZE;

        buf[i..i + CRC_SIZE].copy_from_slice(&self.crc.to_be_bytes());

        buf
    }

    /// Unpack a `header_total_size(max_file_name)`-byte buffer. When the
    /// decode rule identifies a fragment page, only `file_info`,
    /// `reserved`, `fragment_location`, and `crc` are populated; every
    /// other field reads as zero.
    pub fn decode(buf: &[u8], max_file_name: usize) -> Result<Header> {
        if buf.len() < header_total_size(max_file_name) {
            return Err(StorfsError::Generic);
        }

        let mut i = 0usize;
        let file_info = FileInfo::from_byte(buf[i]);
        i += INFO_SIZE;

        let is_fragment = !file_info.is_not_fragment_bit() && file_info.file_type() == FileType::Fragment;

        let name = if is_fragment { Vec::new() } else { buf[i..i + max_file_name].to_vec() };
        i += max_file_name;

        let child_location = u64::from_be_bytes(buf[i..i + CHILD_SIZE].try_into().unwrap());
        i += CHILD_SIZE;
        let sibling_location = u64::from_be_bytes(buf[i..i + SIBLING_SIZE].try_into().unwrap());
        i += SIBLING_SIZE;
        let reserved = u16::from_be_bytes(buf[i..i + RESERVED_SIZE].try_into().unwrap());
        i += RESERVED_SIZE;
        let fragment_location = u64::from_be_bytes(buf[i..i + FRAGMENT_SIZE].try_into().unwrap());
        i += FRAGMENT_SIZE;
        let file_size = u32::from_be_bytes(buf[i..i + FILE_SIZE_SIZE].try_into().unwrap());
        i += FILE_SIZE_SIZE;
        let crc = u16::from_be_bytes(buf[i..i + CRC_SIZE].try_into().unwrap());

        Ok(Header {
            file_info,
            name,
            child_location: if is_fragment { 0 } else { child_location },
            sibling_location: if is_fragment { 0 } else { sibling_location },
            reserved,
            fragment_location,
            file_size: if is_fragment { 0 } else { file_size },
            crc,
        })
    }

    /// The name as a `&str` up to (not including) the first null byte.
    pub fn name_str(&self) -> &str {
        let end = self.name.iter().position(|&b| b == 0).unwrap_or(self.name.len());
        core::str::from_utf8(&self.name[..end]).unwrap_or("")
    }
}

/// Encodes a fragment page's header into its own tight `FRAGMENT_HEADER_SIZE`
/// buffer — unlike [`Header::encode`], which always spends a full
/// `header_total_size` on the page regardless of type. A fragment carries no
/// name, child, or sibling, so giving it the same footprint as a full header
/// would waste most of a page on zero padding; this is the format the writer
/// and reader actually lay fragment payloads against.
pub fn encode_fragment_header(fill: FillState, fragment_location: u64, crc: u16) -> Vec<u8> {
    let mut buf = vec![0u8; FRAGMENT_HEADER_SIZE];
    let mut i = 0usize;
    buf[i] = FileInfo::fragment(fill).to_byte();
    i += INFO_SIZE;
    buf[i..i + RESERVED_SIZE].copy_from_slice(&0xFFFFu16.to_be_bytes());
    i += RESERVED_SIZE;
    buf[i..i + FRAGMENT_SIZE].copy_from_slice(&fragment_location.to_be_bytes());
    i += FRAGMENT_SIZE;
    buf[i..i + CRC_SIZE].copy_from_slice(&crc.to_be_bytes());
    buf
}

/// Decoded fields of a fragment page header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FragmentHeader {
    pub fill_state: FillState,
    pub fragment_location: u64,
    pub crc: u16,
}

pub fn decode_fragment_header(buf: &[u8]) -> Result<FragmentHeader> {
    if buf.len() < FRAGMENT_HEADER_SIZE {
        return Err(StorfsError::Generic);
    }
    let mut i = 0usize;
    let file_info = FileInfo::from_byte(buf[i]);
    i += INFO_SIZE;
    i += RESERVED_SIZE;
    let fragment_location = u64::from_be_bytes(buf[i..i + FRAGMENT_SIZE].try_into().unwrap());
    i += FRAGMENT_SIZE;
    let crc = u16::from_be_bytes(buf[i..i + CRC_SIZE].try_into().unwrap());
    Ok(FragmentHeader {
        fill_state: file_info.fill_state(),
        fragment_location,
        crc,
    })
}

/// A (page, byte) location on the device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Location {
    pub page: u64,
    pub byte: u32,
}

impl Location {
    pub fn new(page: u64, byte: u32) -> Self {
        Location { page, byte }
    }

    /// Absolute byte offset implied by this location, given a page size.
    pub fn to_offset(self, page_size: u32) -> u64 {
        self.page * page_size as u64 + self.byte as u64
    }

    /// Split an absolute byte offset back into (page, byte).
    pub fn from_offset(offset: u64, page_size: u32) -> Self {
        let page_size = page_size as u64;
        Location {
            page: offset / page_size,
            byte: (offset % page_size) as u32,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_header(max_file_name: usize) -> Header {
        let mut name = b"dir".to_vec();
        name.resize(max_file_name, 0);
        Header {
            file_info: FileInfo::header(FillState::Full, FileType::Directory),
            name,
            child_location: 11264,
            sibling_location: 0,
            reserved: 0xFFFF,
            fragment_location: 0,
            file_size: 65,
            crc: 0x1234,
        }
    }

    #[test]
    fn round_trips_a_full_header() {
        let h = sample_header(32);
        let encoded = h.encode(32);
        let decoded = Header::decode(&encoded, 32).unwrap();
        assert_eq!(h, decoded);
    }

    #[test]
    fn round_trips_a_fragment_header() {
        let h = Header {
            file_info: FileInfo::fragment(FillState::Partial),
            name: Vec::new(),
            child_location: 0,
            sibling_location: 0,
            reserved: 0xFFFF,
            fragment_location: 0,
            file_size: 0,
            crc: 0xBEEF,
        };
        let encoded = h.encode(32);
        let decoded = Header::decode(&encoded, 32).unwrap();
        assert_eq!(h, decoded);
    }

    #[test]
    fn decode_rejects_undersized_buffer() {
        let buf = vec![0xFFu8; 10];
        assert!(Header::decode(&buf, 32).is_err());
    }

    #[test]
    fn blank_buffer_decodes_to_blank_header() {
        let buf = vec![0xFFu8; header_total_size(32)];
        let decoded = Header::decode(&buf, 32).unwrap();
        assert!(decoded.is_blank());
    }

    #[test]
    fn location_offset_round_trips() {
        let loc = Location::new(22, 0);
        let offset = loc.to_offset(512);
        assert_eq!(offset, 11264);
        assert_eq!(Location::from_offset(offset, 512), loc);
    }

    #[test]
    fn fragment_header_round_trips() {
        let buf = encode_fragment_header(FillState::Partial, 11264, 0xBEEF);
        assert_eq!(buf.len(), FRAGMENT_HEADER_SIZE);
        let decoded = decode_fragment_header(&buf).unwrap();
        assert_eq!(decoded.fill_state, FillState::Partial);
        assert_eq!(decoded.fragment_location, 11264);
        assert_eq!(decoded.crc, 0xBEEF);
    }

    #[test]
    fn file_info_bit_layout_matches_spec() {
        let fi = FileInfo::header(FillState::Full, FileType::Root);
        assert!(fi.is_not_fragment_bit());
        assert_eq!(fi.fill_state(), FillState::Full);
        assert_eq!(fi.file_type(), FileType::Root);
        assert!(!fi.is_fragment());

        let frag = FileInfo::fragment(FillState::Partial);
        assert!(!frag.is_not_fragment_bit());
        assert_eq!(frag.file_type(), FileType::Fragment);
        assert!(frag.is_fragment());
    }
}
