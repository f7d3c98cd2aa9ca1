//! The public, synchronous filesystem handle. Ties the path walker,
//! allocator, writer, reader, remover, and relocator together behind the
//! eight operations named in the external interface.

use std::cell::Cell;

use crate::codec::{header_total_size, FileInfo, FileType, FillState, Header, Location};
use crate::config::{Config, OpenMode};
use crate::crc::{CrcProvider, DefaultCrc};
use crate::device::{BlockDevice, PageIo};
use crate::error::{Result, StorfsError};
use crate::read::{self, ReadCursor};
use crate::remove;
use crate::root::RootManager;
use crate::walk::{self, Predecessor};
use crate::write;

/// Optional `lock`/`unlock` hook wrapping every public operation, a
/// caller-supplied trait instead of a hardcoded `std::sync` type, so the
/// core stays usable in an allocator-only environment with no threads.
pub trait SyncGuard {
    fn lock(&self);
    fn unlock(&self);
}

/// The default no-op guard for single-threaded use.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullGuard;

impl SyncGuard for NullGuard {
    fn lock(&self) {}
    fn unlock(&self) {}
}

/// An open file handle: where it lives, its cached header, who points at
/// it, the mode it was opened with, and an independent read cursor.
#[derive(Debug, Clone)]
pub struct Stream {
    location: Location,
    header: Header,
    predecessor: Predecessor,
    predecessor_location: Location,
    predecessor_header: Header,
    mode: OpenMode,
    deleted: bool,
    cursor: ReadCursor,
}

impl Stream {
    pub fn path_header(&self) -> &Header {
        &self.header
    }

    pub fn is_deleted(&self) -> bool {
        self.deleted
    }
}

struct Target {
    location: Location,
    header: Header,
    predecessor: Predecessor,
    predecessor_location: Location,
    predecessor_header: Header,
    is_new: bool,
}

fn encode_name(name: &str, max_file_name: usize) -> Result<Vec<u8>> {
    let bytes = name.as_bytes();
    if bytes.is_empty() || bytes.len() + 1 > max_file_name {
        return Err(StorfsError::Generic);
    }
    let mut buf = vec![0u8; max_file_name];
    buf[..bytes.len()].copy_from_slice(bytes);
    Ok(buf)
}

/// A caller's flash-like device, generic over `D: BlockDevice` (mirrors the
/// teacher's `Writer<W: Write>`/`Reader<R: Read + Seek>` rather than a
/// boxed trait object), an optional CRC provider, and an optional
/// synchronization guard.
pub struct StorFs<D: BlockDevice, C: CrcProvider = DefaultCrc, G: SyncGuard = NullGuard> {
    io: PageIo<D>,
    cfg: Config,
    crc: C,
    guard: G,
    root: Option<RootManager>,
    in_call: Cell<bool>,
}

impl<D: BlockDevice> StorFs<D, DefaultCrc, NullGuard> {
    pub fn new(device: D, cfg: Config) -> Self {
        Self::with_crc_and_guard(device, cfg, DefaultCrc, NullGuard)
    }
}

impl<D: BlockDevice, C: CrcProvider, G: SyncGuard> StorFs<D, C, G> {
    pub fn with_crc_and_guard(device: D, cfg: Config, crc: C, guard: G) -> Self {
        StorFs {
            io: PageIo::new(device),
            cfg,
            crc,
            guard,
            root: None,
            in_call: Cell::new(false),
        }
    }

    fn enter(&self) {
        self.guard.lock();
        debug_assert!(!self.in_call.replace(true), "storfs: reentrant call into StorFs detected");
    }

    fn exit(&self) {
        self.in_call.set(false);
        self.guard.unlock();
    }

    pub fn mount(&mut self, partition_name: &str) -> Result<()> {
        self.enter();
        let result = self.mount_impl(partition_name);
        self.exit();
        result
    }

    pub fn mkdir(&mut self, path: &str) -> Result<()> {
        self.enter();
        let result = self.mkdir_impl(path);
        self.exit();
        result
    }

    pub fn touch(&mut self, path: &str) -> Result<()> {
        self.enter();
        let result = self.touch_impl(path);
        self.exit();
        result
    }

    pub fn open(&mut self, path: &str, mode: OpenMode) -> Result<Stream> {
        self.enter();
        let result = self.open_impl(path, mode);
        self.exit();
        result
    }

    pub fn put(&mut self, stream: &mut Stream, buf: &[u8]) -> Result<()> {
        self.enter();
        let result = self.put_impl(stream, buf);
        self.exit();
        result
    }

    pub fn get(&mut self, stream: &mut Stream, buf: &mut [u8]) -> Result<usize> {
        self.enter();
        let result = self.get_impl(stream, buf);
        self.exit();
        result
    }

    pub fn rewind(&mut self, stream: &mut Stream) -> Result<()> {
        self.enter();
        let result = self.rewind_impl(stream);
        self.exit();
        result
    }

    pub fn rm(&mut self, path: &str, stream: Option<&mut Stream>) -> Result<()> {
        self.enter();
        let result = self.rm_impl(path, stream);
        self.exit();
        result
    }

    fn mount_impl(&mut self, partition_name: &str) -> Result<()> {
        let root = RootManager::mount(&self.io, &self.cfg, &self.crc, partition_name)?;
        self.root = Some(root);
        Ok(())
    }

    /// Builds a blank header of `file_type` for `segment_name`, ready either
    /// to be persisted by the caller (the final segment) or written
    /// immediately as an auto-created intermediate directory.
    fn blank_header(&self, segment_name: &str, file_type: FileType) -> Result<Header> {
        let name = encode_name(segment_name, self.cfg.max_file_name)?;
        let end = name.iter().position(|&b| b == 0).map(|p| p + 1).unwrap_or(name.len());
        let name_crc = self.crc.crc16(&name[..end]);
        Ok(Header {
            file_info: FileInfo::header(FillState::Empty, file_type),
            name,
            child_location: 0,
            sibling_location: 0,
            reserved: 0xFFFF,
            fragment_location: 0,
            file_size: 0,
            crc: name_crc,
        })
    }

    /// Resolves `path`, auto-creating every missing intermediate directory
    /// along the way (a "mkdir -p"-style walk, matching the original's
    /// `file_handling_helper` loop, which keeps creating segments until the
    /// path is exhausted rather than stopping at the first miss). The final
    /// segment, if missing, is left unwritten: a brand-new header of
    /// `file_type` at the next open page, ready for the caller to persist
    /// via [`write::write_fresh`].
    fn resolve_or_create(&mut self, path: &str, file_type: FileType) -> Result<Target> {
        let segment_count = path.split('/').filter(|s| !s.is_empty()).count().max(1);

        for _ in 0..=segment_count {
            let (root_location, root_header) = {
                let root = self.root.as_ref().ok_or(StorfsError::Generic)?;
                (root.root_location(), root.root_header().clone())
            };
            let resolved = walk::resolve(&self.io, &self.cfg, root_location, &root_header, path)?;

            match resolved {
                walk::Resolved::Found {
                    location,
                    header,
                    predecessor,
                    predecessor_location,
                    predecessor_header,
                } => {
                    let (predecessor, predecessor_location, predecessor_header) =
                        match (predecessor, predecessor_location, predecessor_header) {
                            (Some(p), Some(l), Some(h)) => (p, l, h),
                            _ => return Err(StorfsError::Generic),
                        };
                    return Ok(Target {
                        location,
                        header,
                        predecessor,
                        predecessor_location,
                        predecessor_header,
                        is_new: false,
                    });
                }
                walk::Resolved::Missing {
                    predecessor,
                    predecessor_location,
                    predecessor_header,
                    segment_name,
                    is_last_segment,
                } => {
                    let header = self.blank_header(&segment_name, if is_last_segment { file_type } else { FileType::Directory })?;
                    let candidate = {
                        let root = self.root.as_ref().ok_or(StorfsError::Generic)?;
                        Location::new(Location::from_offset(root.next_open_byte, self.cfg.page_size).page, 0)
                    };
                    let location = crate::alloc::find_next_open(&self.io, &self.cfg, candidate)?;

                    if is_last_segment {
                        return Ok(Target {
                            location,
                            header,
                            predecessor,
                            predecessor_location,
                            predecessor_header,
                            is_new: true,
                        });
                    }

                    // An intermediate segment: write the directory now and
                    // loop back to resolve the rest of the path against it.
                    let root = self.root.as_mut().ok_or(StorfsError::Generic)?;
                    write::write_fresh(
                        &self.io,
                        &self.cfg,
                        &self.crc,
                        root,
                        location,
                        predecessor,
                        predecessor_location,
                        predecessor_header,
                        header,
                        &[],
                    )?;
                }
            }
        }

        Err(StorfsError::Generic)
    }

    fn mkdir_impl(&mut self, path: &str) -> Result<()> {
        let target = self.resolve_or_create(path, FileType::Directory)?;
        if !target.is_new {
            return if target.header.file_info.file_type() == FileType::Directory {
                Ok(())
            } else {
                Err(StorfsError::Generic)
            };
        }
        let root = self.root.as_mut().ok_or(StorfsError::Generic)?;
        write::write_fresh(
            &self.io,
            &self.cfg,
            &self.crc,
            root,
            target.location,
            target.predecessor,
            target.predecessor_location,
            target.predecessor_header,
            target.header,
            &[],
        )?;
        Ok(())
    }

    fn touch_impl(&mut self, path: &str) -> Result<()> {
        let target = self.resolve_or_create(path, FileType::File)?;
        if !target.is_new {
            return if target.header.file_info.file_type() == FileType::File {
                Ok(())
            } else {
                Err(StorfsError::Generic)
            };
        }
        let root = self.root.as_mut().ok_or(StorfsError::Generic)?;
        write::write_fresh(
            &self.io,
            &self.cfg,
            &self.crc,
            root,
            target.location,
            target.predecessor,
            target.predecessor_location,
            target.predecessor_header,
            target.header,
            &[],
        )?;
        Ok(())
    }

    fn open_impl(&mut self, path: &str, mode: OpenMode) -> Result<Stream> {
        let mut target = self.resolve_or_create(path, FileType::File)?;
        if !target.is_new && target.header.file_info.file_type() != FileType::File {
            return Err(StorfsError::Generic);
        }

        if target.is_new || mode.truncates() {
            if !target.is_new && target.header.file_size as usize > header_total_size(self.cfg.max_file_name) {
                remove::erase_chain(&self.io, &self.cfg, target.location, &target.header)?;
            }
            let root = self.root.as_mut().ok_or(StorfsError::Generic)?;
            let (loc, header) = write::write_fresh(
                &self.io,
                &self.cfg,
                &self.crc,
                root,
                target.location,
                target.predecessor,
                target.predecessor_location,
                target.predecessor_header.clone(),
                target.header,
                &[],
            )?;
            target.location = loc;
            target.header = header;
        }

        let cursor = read::rewind(&self.io, &self.cfg, target.location, &target.header)?;

        Ok(Stream {
            location: target.location,
            header: target.header,
            predecessor: target.predecessor,
            predecessor_location: target.predecessor_location,
            predecessor_header: target.predecessor_header,
            mode,
            deleted: false,
            cursor,
        })
    }

    fn put_impl(&mut self, stream: &mut Stream, buf: &[u8]) -> Result<()> {
        if stream.deleted || !stream.mode.writable() {
            return Err(StorfsError::Generic);
        }

        let root = self.root.as_mut().ok_or(StorfsError::Generic)?;
        let (loc, header) = if stream.mode.appends() {
            write::append(
                &self.io,
                &self.cfg,
                &self.crc,
                root,
                stream.location,
                stream.predecessor,
                stream.predecessor_location,
                stream.predecessor_header.clone(),
                stream.header.clone(),
                buf,
            )?
        } else {
            if stream.header.file_size as usize > header_total_size(self.cfg.max_file_name) {
                remove::erase_chain(&self.io, &self.cfg, stream.location, &stream.header)?;
            }
            write::write_fresh(
                &self.io,
                &self.cfg,
                &self.crc,
                root,
                stream.location,
                stream.predecessor,
                stream.predecessor_location,
                stream.predecessor_header.clone(),
                stream.header.clone(),
                buf,
            )?
        };

        stream.location = loc;
        stream.header = header;
        stream.cursor = read::rewind(&self.io, &self.cfg, stream.location, &stream.header)?;
        Ok(())
    }

    fn get_impl(&mut self, stream: &mut Stream, buf: &mut [u8]) -> Result<usize> {
        if stream.deleted {
            return Err(StorfsError::Generic);
        }
        read::read(&self.io, &self.cfg, &mut stream.cursor, buf)
    }

    fn rewind_impl(&mut self, stream: &mut Stream) -> Result<()> {
        if stream.deleted {
            return Err(StorfsError::Generic);
        }
        stream.cursor = read::rewind(&self.io, &self.cfg, stream.location, &stream.header)?;
        Ok(())
    }

    fn rm_impl(&mut self, path: &str, stream: Option<&mut Stream>) -> Result<()> {
        let root_ref = self.root.as_ref().ok_or(StorfsError::Generic)?;
        let resolved = walk::resolve(&self.io, &self.cfg, root_ref.root_location(), root_ref.root_header(), path)?;
        let (location, header, predecessor, predecessor_location, predecessor_header) = match resolved {
            walk::Resolved::Found {
                location,
                header,
                predecessor: Some(p),
                predecessor_location: Some(pl),
                predecessor_header: Some(ph),
            } => (location, header, p, pl, ph),
            _ => return Err(StorfsError::Generic),
        };

        // A directory must be removed with a null stream (the caller is
        // asking for a recursive delete); a file must be removed with a
        // stream argument, which is then marked deleted so later reads or
        // writes on it fail (§3's Lifecycles).
        match header.file_info.file_type() {
            FileType::Directory if stream.is_some() => return Err(StorfsError::Generic),
            FileType::File if stream.is_none() => return Err(StorfsError::Generic),
            _ => {}
        }

        let root = self.root.as_mut().ok_or(StorfsError::Generic)?;
        remove::remove(&self.io, &self.cfg, root, location, header, predecessor, predecessor_location, predecessor_header)?;

        if let Some(s) = stream {
            s.deleted = true;
        }
        Ok(())
    }
}
