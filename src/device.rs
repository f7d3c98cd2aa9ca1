//! The caller-supplied block device interface and the page-boundary shim
//! wrapped around it.
//!
//! The filesystem is generic over `D: BlockDevice` rather than boxing a
//! trait object, so a monomorphised build has no per-call pointer chasing.

use log::trace;

use crate::error::StorfsError;

/// Four synchronous operations a caller's flash/RAM driver must provide.
/// `read`/`write` take `&self` so a device can be shared behind a guard
/// (interior mutability is the device impl's concern, e.g. a `RefCell` over
/// an in-memory buffer — see [`crate::ram::RamDevice`]).
pub trait BlockDevice {
    type Error: core::fmt::Debug;

    fn page_size(&self) -> u32;
    fn page_count(&self) -> u64;

    /// Read `buf.len()` bytes starting at `(page, byte_offset)`.
    fn read(&self, page: u64, byte_offset: u32, buf: &mut [u8]) -> Result<(), Self::Error>;
    /// Write `buf` starting at `(page, byte_offset)`. Must not implicitly
    /// erase the destination.
    fn write(&self, page: u64, byte_offset: u32, buf: &[u8]) -> Result<(), Self::Error>;
    /// Reset an entire page to all `0xFF`.
    fn erase(&self, page: u64) -> Result<(), Self::Error>;
    /// Block until the device is quiescent and further operations may run.
    fn sync(&self) -> Result<(), Self::Error>;
}

/// Wraps a `D: BlockDevice`, enforcing `byte_offset + len <= page_size`
/// before delegating, and mapping the device's own error type onto
/// [`StorfsError`] so the boundary check lives once instead of being
/// re-checked by every caller.
pub struct PageIo<D> {
    device: D,
    page_size: u32,
}

impl<D: BlockDevice> PageIo<D> {
    pub fn new(device: D) -> Self {
        let page_size = device.page_size();
        PageIo { device, page_size }
    }

    pub fn page_size(&self) -> u32 {
        self.page_size
    }

    pub fn page_count(&self) -> u64 {
        self.device.page_count()
    }

    pub fn read(&self, page: u64, byte_offset: u32, buf: &mut [u8]) -> crate::error::Result<()> {
        self.check_bounds(byte_offset, buf.len(), StorfsError::ReadFailed)?;
        trace!("read page={page} byte_offset={byte_offset} len={}", buf.len());
        self.device
            .read(page, byte_offset, buf)
            .map_err(|e| {
                trace!("device read failed: {e:?}");
                StorfsError::ReadFailed
            })
    }

    pub fn write(&self, page: u64, byte_offset: u32, buf: &[u8]) -> crate::error::Result<()> {
        self.check_bounds(byte_offset, buf.len(), StorfsError::WriteFailed)?;
        trace!("write page={page} byte_offset={byte_offset} len={}", buf.len());
        self.device
            .write(page, byte_offset, buf)
            .map_err(|e| {
                trace!("device write failed: {e:?}");
                StorfsError::WriteFailed
            })
    }

    pub fn erase(&self, page: u64) -> crate::error::Result<()> {
        trace!("erase page={page}");
        self.device.erase(page).map_err(|e| {
            trace!("device erase failed: {e:?}");
            StorfsError::WriteFailed
        })
    }

    pub fn sync(&self) -> crate::error::Result<()> {
        self.device.sync().map_err(|e| {
            trace!("device sync failed: {e:?}");
            StorfsError::WriteFailed
        })
    }

    fn check_bounds(&self, byte_offset: u32, len: usize, on_violation: StorfsError) -> crate::error::Result<()> {
        if byte_offset as u64 + len as u64 > self.page_size as u64 {
            return Err(on_violation);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ram::RamDevice;

    #[test]
    fn rejects_writes_crossing_a_page_boundary() {
        let io = PageIo::new(RamDevice::new(512, 4));
        let buf = vec![0u8; 10];
        let err = io.write(0, 510, &buf).unwrap_err();
        assert_eq!(err, StorfsError::WriteFailed);
    }

    #[test]
    fn rejects_reads_crossing_a_page_boundary() {
        let io = PageIo::new(RamDevice::new(512, 4));
        let mut buf = vec![0u8; 10];
        let err = io.read(0, 510, &mut buf).unwrap_err();
        assert_eq!(err, StorfsError::ReadFailed);
    }

    #[test]
    fn in_bounds_write_then_read_round_trips() {
        let io = PageIo::new(RamDevice::new(512, 4));
        io.write(1, 0, b"hello").unwrap();
        let mut buf = [0u8; 5];
        io.read(1, 0, &mut buf).unwrap();
        assert_eq!(&buf, b"hello");
    }
}
