//! Every page write that carries a CRC goes through here: write, sync,
//! re-read the CRC field, and compare. On mismatch, erase and retry in
//! place up to `cfg.wear_level_retry_num` times; if every in-place retry
//! fails, ask the allocator for a fresh page and write there once more.
//! When that relocates a *header*, the caller is responsible for patching
//! whichever predecessor pointer named the old location — [`patch_pointer`]
//! does that, recursing up to the root if the predecessor relocates too.

use log::{trace, warn};

use crate::alloc::find_next_open;
use crate::codec::{header_total_size, Header, Location, CRC_SIZE};
use crate::config::Config;
use crate::device::{BlockDevice, PageIo};
use crate::error::{Result, StorfsError};
use crate::header;
use crate::root::RootManager;
use crate::walk::Predecessor;

/// Outcome of a verified page write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verified {
    /// Landed on the first attempt, at the location the caller asked for.
    Good(Location),
    /// Landed at a different location after exhausting in-place retries.
    Relocated(Location),
}

impl Verified {
    pub fn location(self) -> Location {
        match self {
            Verified::Good(l) | Verified::Relocated(l) => l,
        }
    }
}

/// Write `buf` at `loc`, sync, and compare the CRC embedded at `crc_offset`
/// (a byte offset within `buf`) against `expected_crc`. Retries in place,
/// then relocates, per the module doc.
pub fn write_page_verified<D: BlockDevice>(
    io: &PageIo<D>,
    cfg: &Config,
    loc: Location,
    buf: &[u8],
    crc_offset: usize,
    expected_crc: u16,
) -> Result<Verified> {
    let attempts = cfg.wear_level_retry_num.max(1);
    for attempt in 0..attempts {
        io.write(loc.page, loc.byte, buf)?;
        io.sync()?;
        if verify_crc(io, loc, crc_offset, expected_crc)? {
            return Ok(if attempt == 0 {
                Verified::Good(loc)
            } else {
                Verified::Relocated(loc)
            });
        }
        warn!("CRC verify failed at page {} (attempt {attempt}), erasing and retrying", loc.page);
        io.erase(loc.page)?;
    }

    let new_loc = find_next_open(io, cfg, loc)?;
    trace!("relocating write from page {} to page {}", loc.page, new_loc.page);
    io.write(new_loc.page, new_loc.byte, buf)?;
    io.sync()?;
    if verify_crc(io, new_loc, crc_offset, expected_crc)? {
        Ok(Verified::Relocated(new_loc))
    } else {
        Err(StorfsError::WriteFailed)
    }
}

fn verify_crc<D: BlockDevice>(io: &PageIo<D>, loc: Location, crc_offset: usize, expected_crc: u16) -> Result<bool> {
    let mut crc_buf = [0u8; CRC_SIZE];
    io.read(loc.page, loc.byte + crc_offset as u32, &mut crc_buf)?;
    io.sync()?;
    Ok(u16::from_be_bytes(crc_buf) == expected_crc)
}

/// Write a brand-new header onto a page believed to be blank (the
/// allocator's candidate). Verifies against the header's own (name) CRC.
pub fn create_header_verified<D: BlockDevice>(io: &PageIo<D>, cfg: &Config, loc: Location, header: &Header) -> Result<Verified> {
    let buf = header.encode(cfg.max_file_name);
    let crc_offset = header_total_size(cfg.max_file_name) - CRC_SIZE;
    write_page_verified(io, cfg, loc, &buf, crc_offset, header.crc)
}

/// Rewrite an existing header in place, preserving whatever payload bytes
/// follow it on the page (a file's data, or a directory's unused tail).
/// Flash can only clear bits via erase, so the page is erased before the
/// combined header+payload buffer is rewritten.
pub fn rewrite_header_verified<D: BlockDevice>(io: &PageIo<D>, cfg: &Config, loc: Location, header: &Header) -> Result<Verified> {
    let header_size = header_total_size(cfg.max_file_name);
    let payload_len = io.page_size() as usize - loc.byte as usize - header_size;
    let mut payload = vec![0u8; payload_len];
    io.read(loc.page, loc.byte + header_size as u32, &mut payload)?;
    io.erase(loc.page)?;

    let mut buf = header.encode(cfg.max_file_name);
    buf.extend_from_slice(&payload);
    let crc_offset = header_size - CRC_SIZE;
    write_page_verified(io, cfg, loc, &buf, crc_offset, header.crc)
}

/// Which field of the predecessor header points at the relocated node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PointerKind {
    Child,
    Sibling,
    Fragment,
}

impl From<Predecessor> for PointerKind {
    fn from(p: Predecessor) -> Self {
        match p {
            Predecessor::Parent(_) => PointerKind::Child,
            Predecessor::Sibling(_) => PointerKind::Sibling,
            Predecessor::FragmentOwner(_) => PointerKind::Fragment,
        }
    }
}

/// Patch whichever pointer in `predecessor_header` (at `predecessor_loc`)
/// names `old_loc`, to instead name `new_loc`. If the predecessor is one
/// of the root mirrors, the cached root is mutated and both mirrors
/// rewritten directly — the recursion's base case. Otherwise the
/// predecessor's own page is rewritten through [`rewrite_header_verified`];
/// if that rewrite itself relocates, the predecessor's own predecessor is
/// found and patched in turn, bounded by `cfg.max_relocate_depth`.
pub fn patch_pointer<D: BlockDevice>(
    io: &PageIo<D>,
    cfg: &Config,
    root: &mut RootManager,
    predecessor_loc: Location,
    mut predecessor_header: Header,
    kind: PointerKind,
    new_loc: Location,
    depth: u32,
) -> Result<()> {
    if depth > cfg.max_relocate_depth {
        return Err(StorfsError::Generic);
    }

    let new_offset = new_loc.to_offset(cfg.page_size);

    if root.is_root_location(predecessor_loc) {
        return root.set_child(io, cfg, new_offset);
    }

    match kind {
        PointerKind::Child => predecessor_header.child_location = new_offset,
        PointerKind::Sibling => predecessor_header.sibling_location = new_offset,
        PointerKind::Fragment => predecessor_header.fragment_location = new_offset,
    }

    match rewrite_header_verified(io, cfg, predecessor_loc, &predecessor_header)? {
        Verified::Good(_) => Ok(()),
        Verified::Relocated(relocated_loc) => {
            let (grandparent, grandparent_loc, grandparent_header) =
                crate::walk::find_predecessor(io, cfg, root.root_location(), predecessor_loc)?;
            patch_pointer(
                io,
                cfg,
                root,
                grandparent_loc,
                grandparent_header,
                grandparent.into(),
                relocated_loc,
                depth + 1,
            )
        }
    }
}

/// Read a header's contents back via [`header::store`] so a grandparent
/// patch has its current state to mutate — used when [`patch_pointer`]'s
/// own caller doesn't already have a fresh copy in hand.
pub fn reload_header<D: BlockDevice>(io: &PageIo<D>, cfg: &Config, loc: Location) -> Result<Header> {
    header::store(io, loc, cfg.max_file_name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::{FileInfo, FileType, FillState};
    use crate::crc::{crc16, DefaultCrc};
    use crate::ram::RamDevice;

    fn name_buf(s: &str, max: usize) -> Vec<u8> {
        let mut v = s.as_bytes().to_vec();
        v.resize(max, 0);
        v
    }

    #[test]
    fn good_write_verifies_on_first_attempt() {
        let io = PageIo::new(RamDevice::new(512, 8));
        let cfg = Config::new(512);
        let name = name_buf("f", cfg.max_file_name);
        let crc = crc16::value(&name[..2]);
        let header = Header {
            file_info: FileInfo::header(FillState::Partial, FileType::File),
            name,
            child_location: 0,
            sibling_location: 0,
            reserved: 0xFFFF,
            fragment_location: 0,
            file_size: 65,
            crc,
        };
        let loc = Location::new(0, 0);
        let outcome = create_header_verified(&io, &cfg, loc, &header).unwrap();
        assert_eq!(outcome, Verified::Good(loc));
    }

    #[test]
    fn rewrite_preserves_trailing_payload() {
        let io = PageIo::new(RamDevice::new(512, 8));
        let cfg = Config::new(512);
        let name = name_buf("f", cfg.max_file_name);
        let crc = crc16::value(&name[..2]);
        let header = Header {
            file_info: FileInfo::header(FillState::Partial, FileType::File),
            name,
            child_location: 0,
            sibling_location: 0,
            reserved: 0xFFFF,
            fragment_location: 0,
            file_size: 65,
            crc,
        };
        let loc = Location::new(0, 0);
        create_header_verified(&io, &cfg, loc, &header).unwrap();

        let header_size = header_total_size(cfg.max_file_name);
        io.write(loc.page, header_size as u32, b"payload").unwrap();

        let mut updated = header.clone();
        updated.sibling_location = 4096;
        rewrite_header_verified(&io, &cfg, loc, &updated).unwrap();

        let mut payload_back = [0u8; 7];
        io.read(loc.page, header_size as u32, &mut payload_back).unwrap();
        assert_eq!(&payload_back, b"payload");

        let read_back = header::store(&io, loc, cfg.max_file_name).unwrap();
        assert_eq!(read_back.sibling_location, 4096);
    }

    #[test]
    fn default_crc_matches_between_modules() {
        // Sanity: the CrcProvider trait and the free function agree, since
        // relocate.rs's tests construct CRCs directly via crc16::value.
        let provider = DefaultCrc;
        assert_eq!(provider.crc16(b"f"), crc16::value(b"f"));
    }
}
