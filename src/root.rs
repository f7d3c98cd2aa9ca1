//! Maintains the two mirrored root headers and the `next_open_byte`
//! cursor; implements mount/format per §4.5.

use log::{debug, info, warn};

use crate::codec::{FileInfo, FileType, FillState, Header, Location};
use crate::config::Config;
use crate::crc::CrcProvider;
use crate::device::{BlockDevice, PageIo};
use crate::error::{Result, StorfsError};
use crate::header;

/// The cached root/cursor state rebuilt by every `mount` call.
#[derive(Debug, Clone)]
pub struct RootManager {
    pub locations: [Location; 2],
    pub headers: [Header; 2],
    pub next_open_byte: u64,
}

impl RootManager {
    pub fn root_location(&self) -> Location {
        self.locations[0]
    }

    pub fn root_header(&self) -> &Header {
        &self.headers[0]
    }

    /// Mount (or format, if both root pages read blank) the partition.
    /// `partition_name` is required on the formatting path and ignored on
    /// reload (an existing, valid root keeps its persisted name).
    pub fn mount<D: BlockDevice, C: CrcProvider>(
        io: &PageIo<D>,
        cfg: &Config,
        crc: &C,
        partition_name: &str,
    ) -> Result<RootManager> {
        let header_size = crate::codec::header_total_size(cfg.max_file_name) as u32;
        if cfg.first_byte_loc + header_size > cfg.page_size {
            return Err(StorfsError::Generic);
        }

        let r0 = Location::new(cfg.first_page_loc, cfg.first_byte_loc);
        let r1 = Location::new(cfg.first_page_loc + 1, 0);

        let h0 = header::store(io, r0, cfg.max_file_name)?;
        let h1 = header::store(io, r1, cfg.max_file_name)?;

        if h0.is_blank() || h1.is_blank() {
            info!("formatting root partition {partition_name:?}");
            Self::format(io, cfg, crc, r0, r1, partition_name)
        } else {
            Self::reload(io, cfg, crc, r0, r1, h0, h1)
        }
    }

    fn format<D: BlockDevice, C: CrcProvider>(
        io: &PageIo<D>,
        cfg: &Config,
        crc: &C,
        r0: Location,
        r1: Location,
        partition_name: &str,
    ) -> Result<RootManager> {
        if partition_name.is_empty() {
            return Err(StorfsError::Generic);
        }
        let name_bytes = partition_name.as_bytes();
        // Room for the name plus its null terminator.
        if name_bytes.len() + 1 > cfg.max_file_name {
            return Err(StorfsError::Generic);
        }

        io.erase(r0.page)?;
        io.erase(r1.page)?;

        let next_open_byte = (r1.page + 1) * cfg.page_size as u64;

        let mut name = vec![0u8; cfg.max_file_name];
        name[..name_bytes.len()].copy_from_slice(name_bytes);
        let name_crc = crc.crc16(&name[..name_bytes.len() + 1]);

        let root = Header {
            file_info: FileInfo::header(FillState::Partial, FileType::Root),
            name,
            child_location: next_open_byte,
            sibling_location: 0,
            reserved: 0xFFFF,
            fragment_location: next_open_byte,
            file_size: 2 * crate::codec::header_total_size(cfg.max_file_name) as u32,
            crc: name_crc,
        };

        header::create(io, r0, &root, cfg.max_file_name)?;
        Self::verify_name_crc(io, r0, &root, cfg.max_file_name, crc)?;
        header::create(io, r1, &root, cfg.max_file_name)?;
        Self::verify_name_crc(io, r1, &root, cfg.max_file_name, crc)?;

        Ok(RootManager {
            locations: [r0, r1],
            headers: [root.clone(), root],
            next_open_byte,
        })
    }

    fn reload<D: BlockDevice, C: CrcProvider>(
        io: &PageIo<D>,
        cfg: &Config,
        crc: &C,
        r0: Location,
        r1: Location,
        h0: Header,
        h1: Header,
    ) -> Result<RootManager> {
        let crc0_ok = Self::name_crc_matches(&h0, crc);
        let crc1_ok = Self::name_crc_matches(&h1, crc);

        let (adopted, next_open_byte) = match (crc0_ok, crc1_ok) {
            (true, true) => {
                if h0 != h1 {
                    warn!("root mirrors both have a valid CRC but disagree in content");
                    return Err(StorfsError::Generic);
                }
                let next_open_byte = h1.fragment_location;
                (h0, next_open_byte)
            }
            (true, false) => {
                warn!("root mirror 1 failed CRC verification, healing from mirror 0");
                header::create(io, r1, &h0, cfg.max_file_name)?;
                (h0.clone(), h0.fragment_location)
            }
            (false, true) => {
                warn!("root mirror 0 failed CRC verification, healing from mirror 1");
                header::create(io, r0, &h1, cfg.max_file_name)?;
                (h1.clone(), h1.fragment_location)
            }
            (false, false) => {
                warn!("both root mirrors failed CRC verification");
                return Err(StorfsError::CrcError);
            }
        };

        debug!("mount reloaded root {:?}, next_open_byte={next_open_byte}", adopted.name_str());

        Ok(RootManager {
            locations: [r0, r1],
            headers: [adopted.clone(), adopted],
            next_open_byte,
        })
    }

    fn name_crc_matches<C: CrcProvider>(header: &Header, crc: &C) -> bool {
        let end = header
            .name
            .iter()
            .position(|&b| b == 0)
            .map(|p| p + 1)
            .unwrap_or(header.name.len());
        crc.crc16(&header.name[..end]) == header.crc
    }

    fn verify_name_crc<D: BlockDevice, C: CrcProvider>(
        io: &PageIo<D>,
        loc: Location,
        expected: &Header,
        max_file_name: usize,
        crc: &C,
    ) -> Result<()> {
        let read_back = header::store(io, loc, max_file_name)?;
        if Self::name_crc_matches(&read_back, crc) && read_back.crc == expected.crc {
            Ok(())
        } else {
            Err(StorfsError::CrcError)
        }
    }

    /// Advance the cursor and persist both mirrors (write-through per §5).
    pub fn advance_cursor<D: BlockDevice>(&mut self, io: &PageIo<D>, cfg: &Config, loc: Location) -> Result<()> {
        let offset = loc.to_offset(cfg.page_size);
        self.next_open_byte = offset;
        self.headers[0].fragment_location = offset;
        self.headers[1].fragment_location = offset;
        header::create(io, self.locations[0], &self.headers[0], cfg.max_file_name)?;
        header::create(io, self.locations[1], &self.headers[1], cfg.max_file_name)
    }

    /// Pull the cursor back to `loc` if it currently points past it, so
    /// freed space left behind by a remove is reused (§4.10).
    pub fn reclaim<D: BlockDevice>(&mut self, io: &PageIo<D>, cfg: &Config, loc: Location) -> Result<()> {
        let offset = loc.to_offset(cfg.page_size);
        if offset <= self.next_open_byte {
            self.advance_cursor(io, cfg, loc)?;
        }
        Ok(())
    }

    /// True when `loc` is one of the two root mirror locations — the
    /// relocator's recursion base case (§4.11).
    pub fn is_root_location(&self, loc: Location) -> bool {
        loc == self.locations[0] || loc == self.locations[1]
    }

    /// Mutate the cached root header's child pointer and rewrite both
    /// mirrors. The only place the roots themselves move pointers.
    pub fn set_child<D: BlockDevice>(&mut self, io: &PageIo<D>, cfg: &Config, new_child: u64) -> Result<()> {
        self.headers[0].child_location = new_child;
        self.headers[1].child_location = new_child;
        header::create(io, self.locations[0], &self.headers[0], cfg.max_file_name)?;
        header::create(io, self.locations[1], &self.headers[1], cfg.max_file_name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crc::DefaultCrc;
    use crate::ram::RamDevice;

    #[test]
    fn cold_mount_formats_and_reload_recovers_cursor() {
        let io = PageIo::new(RamDevice::new(512, 32));
        let cfg = Config::new(512).with_first_page_loc(20);
        let crc = DefaultCrc;

        let mounted = RootManager::mount(&io, &cfg, &crc, "C:").unwrap();
        assert_eq!(mounted.next_open_byte, 22 * 512);
        assert_eq!(mounted.root_header().name_str(), "C:");

        let reloaded = RootManager::mount(&io, &cfg, &crc, "").unwrap();
        assert_eq!(reloaded.next_open_byte, mounted.next_open_byte);
        assert_eq!(reloaded.root_header().name_str(), "C:");
    }

    #[test]
    fn format_requires_a_nonempty_name() {
        let io = PageIo::new(RamDevice::new(512, 32));
        let cfg = Config::new(512);
        let crc = DefaultCrc;
        assert!(RootManager::mount(&io, &cfg, &crc, "").is_err());
    }

    #[test]
    fn mount_rejects_overflowing_first_byte_loc() {
        let io = PageIo::new(RamDevice::new(512, 32));
        let cfg = Config::new(512).with_first_byte_loc(500);
        let crc = DefaultCrc;
        assert!(RootManager::mount(&io, &cfg, &crc, "C:").is_err());
    }

    #[test]
    fn reload_heals_a_corrupt_mirror() {
        let io = PageIo::new(RamDevice::new(512, 32));
        let cfg = Config::new(512);
        let crc = DefaultCrc;
        let mounted = RootManager::mount(&io, &cfg, &crc, "C:").unwrap();

        // Corrupt mirror 1's CRC directly.
        let mut corrupt = mounted.headers[1].clone();
        corrupt.crc ^= 0xFFFF;
        io.erase(mounted.locations[1].page).unwrap();
        header::create(&io, mounted.locations[1], &corrupt, cfg.max_file_name).unwrap();

        let reloaded = RootManager::mount(&io, &cfg, &crc, "").unwrap();
        assert_eq!(reloaded.root_header().name_str(), "C:");

        let healed = header::store(&io, mounted.locations[1], cfg.max_file_name).unwrap();
        assert_eq!(healed.crc, mounted.headers[0].crc);
    }
}
