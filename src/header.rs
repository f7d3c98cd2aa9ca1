//! Read/write a header at a given [`Location`], via the page I/O shim.

use log::trace;

use crate::codec::{header_total_size, Header, Location};
use crate::device::{BlockDevice, PageIo};
use crate::error::Result;

/// Reads the `HEADER_TOTAL_SIZE`-byte buffer at `loc`, syncs, and decodes
/// it into a [`Header`]. Matches §4.4's `store` operation; the `sync` call
/// happens between the read and the decode, not after, since the device
/// only needs to quiesce the read itself before the bytes are trusted.
pub fn store<D: BlockDevice>(io: &PageIo<D>, loc: Location, max_file_name: usize) -> Result<Header> {
    let mut buf = vec![0u8; header_total_size(max_file_name)];
    io.read(loc.page, loc.byte, &mut buf)?;
    io.sync()?;
    let header = Header::decode(&buf, max_file_name)?;
    trace!(
        "header@page={} byte={}: type={:?} fill={:?} name={:?}",
        loc.page,
        loc.byte,
        header.file_info.file_type(),
        header.file_info.fill_state(),
        header.name_str(),
    );
    Ok(header)
}

/// Encodes `header` and writes it at `loc`, then syncs. Inherits
/// [`PageIo::write`]'s boundary check, which reports `write_failed` when
/// `loc.byte + HEADER_TOTAL_SIZE` would exceed the page size.
pub fn create<D: BlockDevice>(
    io: &PageIo<D>,
    loc: Location,
    header: &Header,
    max_file_name: usize,
) -> Result<()> {
    trace!(
        "header@page={} byte={}: type={:?} fill={:?} name={:?}",
        loc.page,
        loc.byte,
        header.file_info.file_type(),
        header.file_info.fill_state(),
        header.name_str(),
    );
    let buf = header.encode(max_file_name);
    io.write(loc.page, loc.byte, &buf)?;
    io.sync()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::{FileInfo, FileType, FillState};
    use crate::ram::RamDevice;

    #[test]
    fn create_then_store_round_trips() {
        let io = PageIo::new(RamDevice::new(512, 4));
        let mut name = b"f".to_vec();
        name.resize(32, 0);
        let header = Header {
            file_info: FileInfo::header(FillState::Partial, FileType::File),
            name,
            child_location: 0,
            sibling_location: 0,
            reserved: 0xFFFF,
            fragment_location: 0,
            file_size: 65,
            crc: 0xABCD,
        };
        let loc = Location::new(0, 0);
        create(&io, loc, &header, 32).unwrap();
        let read_back = store(&io, loc, 32).unwrap();
        assert_eq!(read_back, header);
    }

    #[test]
    fn create_rejects_a_location_that_overflows_the_page() {
        let io = PageIo::new(RamDevice::new(512, 1));
        let header = Header::blank();
        let loc = Location::new(0, 500);
        assert!(create(&io, loc, &header, 32).is_err());
    }
}
