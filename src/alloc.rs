//! Scans forward from a candidate location for a blank (fully-erased)
//! page. Distinct from `std`'s allocator — there is no free list, just a
//! forward scan from a cursor hint.

use crate::codec::{Header, Location};
use crate::config::Config;
use crate::device::{BlockDevice, PageIo};
use crate::error::Result;

/// Advance page-by-page (always at byte 0) from `candidate`, reading each
/// header, until one reads back fully blank (every field `0xFF`). Does not
/// touch the persisted cursor — callers that want the cursor advanced call
/// [`crate::root::RootManager::advance_cursor`] with the result.
pub fn find_next_open<D: BlockDevice>(
    io: &PageIo<D>,
    cfg: &Config,
    candidate: Location,
) -> Result<Location> {
    let mut loc = Location::new(candidate.page, 0);
    loop {
        let header = crate::header::store(io, loc, cfg.max_file_name)?;
        if is_free(&header) {
            return Ok(loc);
        }
        loc = Location::new(loc.page + 1, 0);
    }
}

fn is_free(header: &Header) -> bool {
    header.is_blank()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ram::RamDevice;

    #[test]
    fn finds_the_first_blank_page_forward_of_the_candidate() {
        let io = PageIo::new(RamDevice::new(512, 8));
        let cfg = Config::new(512);

        // Mark page 2 non-blank by writing a header there.
        let header = crate::codec::Header {
            file_info: crate::codec::FileInfo::header(
                crate::codec::FillState::Full,
                crate::codec::FileType::File,
            ),
            name: vec![0u8; cfg.max_file_name],
            child_location: 0,
            sibling_location: 0,
            reserved: 0xFFFF,
            fragment_location: 0,
            file_size: 65,
            crc: 0,
        };
        crate::header::create(&io, Location::new(2, 0), &header, cfg.max_file_name).unwrap();

        let found = find_next_open(&io, &cfg, Location::new(2, 0)).unwrap();
        assert_eq!(found, Location::new(3, 0));
    }
}
