//! Reads a file's payload back out, following the `fragment_location` chain
//! one page at a time. The loop shape (refill, parse, advance) generalizes a
//! single growable log reader to a chain that follows a pointer instead of a
//! monotonic file offset.

use crate::codec::{decode_fragment_header, header_total_size, Header, Location, FRAGMENT_HEADER_SIZE, UNINITIALISED};
use crate::config::Config;
use crate::device::{BlockDevice, PageIo};
use crate::error::Result;

/// A read cursor into an open file: the page/offset of the next unread
/// byte, and how many payload bytes remain before the chain ends. Computed
/// once at open or rewind time rather than recomputed per read, per the
/// crate's resolution of the logical-vs-on-media-size question (see
/// DESIGN.md).
#[derive(Debug, Clone, Copy)]
pub struct ReadCursor {
    pub location: Location,
    pub byte_offset: u32,
    pub remaining: usize,
    /// Whether `location` is the file's main header page (wider header,
    /// named fields) as opposed to a fragment page (narrow header). Needed
    /// to know which width to decode when the chain advances off this page.
    is_main: bool,
}

/// Rebuilds the cursor for a freshly-opened (or rewound) stream: positions
/// at the first payload byte of the main header's page, and counts
/// remaining bytes by walking the fragment chain once (see
/// `write::locate_tail`'s sibling logic — here we just need the total
/// logical length, not the tail's free space).
pub fn rewind<D: BlockDevice>(io: &PageIo<D>, cfg: &Config, main_loc: Location, main_header: &Header) -> Result<ReadCursor> {
    let mut num_fragments = 0usize;
    let mut next = main_header.fragment_location;
    while next != 0 && next != UNINITIALISED {
        let loc = Location::from_offset(next, cfg.page_size);
        let frag = read_fragment_header(io, loc)?;
        next = frag.fragment_location;
        num_fragments += 1;
    }

    let overhead = header_total_size(cfg.max_file_name) + num_fragments * FRAGMENT_HEADER_SIZE;
    let remaining = (main_header.file_size as usize).saturating_sub(overhead);

    Ok(ReadCursor {
        location: main_loc,
        byte_offset: header_total_size(cfg.max_file_name) as u32,
        remaining,
        is_main: true,
    })
}

fn read_fragment_header<D: BlockDevice>(io: &PageIo<D>, loc: Location) -> Result<crate::codec::FragmentHeader> {
    let mut buf = vec![0u8; FRAGMENT_HEADER_SIZE];
    io.read(loc.page, loc.byte, &mut buf)?;
    io.sync()?;
    decode_fragment_header(&buf)
}

/// Reads up to `out.len()` bytes starting at `cursor`, following the
/// fragment chain as pages are exhausted, and returns the number of bytes
/// actually placed in `out` (fewer than requested once `remaining` runs
/// out). Advances `cursor` in place.
pub fn read<D: BlockDevice>(io: &PageIo<D>, cfg: &Config, cursor: &mut ReadCursor, out: &mut [u8]) -> Result<usize> {
    let mut written = 0usize;
    let page_size = cfg.page_size;

    while written < out.len() && cursor.remaining > 0 {
        let in_page_remaining = (page_size - cursor.byte_offset) as usize;
        let take = in_page_remaining.min(out.len() - written).min(cursor.remaining);

        if take == 0 {
            // Page exhausted without enough bytes left in this page; move
            // to the next fragment.
            advance_to_next_fragment(io, cfg, cursor)?;
            continue;
        }

        io.read(cursor.location.page, cursor.byte_offset, &mut out[written..written + take])?;
        io.sync()?;

        written += take;
        cursor.byte_offset += take as u32;
        cursor.remaining -= take;

        if cursor.remaining > 0 && cursor.byte_offset as usize >= page_size as usize {
            advance_to_next_fragment(io, cfg, cursor)?;
        }
    }

    Ok(written)
}

fn advance_to_next_fragment<D: BlockDevice>(io: &PageIo<D>, cfg: &Config, cursor: &mut ReadCursor) -> Result<()> {
    // The page we're leaving carries its own successor pointer at byte 0,
    // encoded either as a full header (the main page) or a narrow fragment
    // header — `cursor.is_main` says which, since that never changes for a
    // given page's lifetime.
    let page = cursor.location.page;
    let next_offset = if cursor.is_main {
        let mut full = vec![0u8; header_total_size(cfg.max_file_name)];
        io.read(page, 0, &mut full)?;
        io.sync()?;
        crate::codec::Header::decode(&full, cfg.max_file_name)?.fragment_location
    } else {
        let mut buf = vec![0u8; FRAGMENT_HEADER_SIZE];
        io.read(page, 0, &mut buf)?;
        io.sync()?;
        decode_fragment_header(&buf)?.fragment_location
    };

    cursor.location = Location::from_offset(next_offset, cfg.page_size);
    cursor.byte_offset = FRAGMENT_HEADER_SIZE as u32;
    cursor.is_main = false;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::{FileInfo, FileType, FillState};
    use crate::crc::DefaultCrc;
    use crate::ram::RamDevice;
    use crate::root::RootManager;
    use crate::walk::Predecessor;
    use crate::write;

    fn name_buf(s: &str, max: usize) -> Vec<u8> {
        let mut v = s.as_bytes().to_vec();
        v.resize(max, 0);
        v
    }

    fn blank_file_header(cfg: &Config, name: &str) -> Header {
        let name = name_buf(name, cfg.max_file_name);
        let end = name.iter().position(|&b| b == 0).unwrap() + 1;
        let name_crc = DefaultCrc.crc16(&name[..end]);
        Header {
            file_info: FileInfo::header(FillState::Empty, FileType::File),
            name,
            child_location: 0,
            sibling_location: 0,
            reserved: 0xFFFF,
            fragment_location: 0,
            file_size: 0,
            crc: name_crc,
        }
    }

    #[test]
    fn reads_back_a_single_page_file() {
        let io = PageIo::new(RamDevice::new(512, 32));
        let cfg = Config::new(512);
        let crc = DefaultCrc;
        let mut root = RootManager::mount(&io, &cfg, &crc, "C:").unwrap();

        let loc = Location::new(1, 0);
        let header = blank_file_header(&cfg, "a.txt");
        let (_, written) = write::write_fresh(
            &io,
            &cfg,
            &crc,
            &mut root,
            loc,
            Predecessor::Parent(root.root_location()),
            root.root_location(),
            root.root_header().clone(),
            header,
            b"hello world",
        )
        .unwrap();

        let mut cursor = rewind(&io, &cfg, loc, &written).unwrap();
        let mut out = vec![0u8; 11];
        let n = read(&io, &cfg, &mut cursor, &mut out).unwrap();
        assert_eq!(n, 11);
        assert_eq!(&out, b"hello world");
        assert_eq!(cursor.remaining, 0);
    }

    #[test]
    fn reads_back_a_file_spanning_fragments() {
        let io = PageIo::new(RamDevice::new(512, 32));
        let cfg = Config::new(512);
        let crc = DefaultCrc;
        let mut root = RootManager::mount(&io, &cfg, &crc, "C:").unwrap();

        let loc = Location::new(1, 0);
        let header = blank_file_header(&cfg, "big.bin");
        let payload: Vec<u8> = (0..1000u32).map(|i| (i % 256) as u8).collect();
        let (_, written) = write::write_fresh(
            &io,
            &cfg,
            &crc,
            &mut root,
            loc,
            Predecessor::Parent(root.root_location()),
            root.root_location(),
            root.root_header().clone(),
            header,
            &payload,
        )
        .unwrap();

        let mut cursor = rewind(&io, &cfg, loc, &written).unwrap();
        let mut out = vec![0u8; 1000];
        let n = read(&io, &cfg, &mut cursor, &mut out).unwrap();
        assert_eq!(n, 1000);
        assert_eq!(out, payload);
    }

    #[test]
    fn partial_reads_can_be_chained() {
        let io = PageIo::new(RamDevice::new(512, 32));
        let cfg = Config::new(512);
        let crc = DefaultCrc;
        let mut root = RootManager::mount(&io, &cfg, &crc, "C:").unwrap();

        let loc = Location::new(1, 0);
        let header = blank_file_header(&cfg, "a.txt");
        let (_, written) = write::write_fresh(
            &io,
            &cfg,
            &crc,
            &mut root,
            loc,
            Predecessor::Parent(root.root_location()),
            root.root_location(),
            root.root_header().clone(),
            header,
            b"abcdefghij",
        )
        .unwrap();

        let mut cursor = rewind(&io, &cfg, loc, &written).unwrap();
        let mut first = [0u8; 4];
        read(&io, &cfg, &mut cursor, &mut first).unwrap();
        assert_eq!(&first, b"abcd");

        let mut second = [0u8; 6];
        let n = read(&io, &cfg, &mut cursor, &mut second).unwrap();
        assert_eq!(n, 6);
        assert_eq!(&second, b"efghij");
    }
}
