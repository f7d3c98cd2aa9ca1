//! An in-memory [`crate::device::BlockDevice`] for tests and the demo
//! binary: a `RefCell<Vec<u8>>` buffer with the same page-boundary
//! enforcement a real flash driver's read/write callbacks would perform.

use std::cell::RefCell;

use thiserror::Error;

/// The only error a `RamDevice` can report: an access outside the backing
/// buffer. Real device drivers have their own richer error types; this one
/// exists purely because the test harness needs *something* to return.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum RamDeviceError {
    #[error("ram device: access out of bounds")]
    OutOfBounds,
}

/// A page-addressable, byte-vector-backed device. Initialized to all
/// `0xFF`, matching a freshly-erased flash part.
pub struct RamDevice {
    page_size: u32,
    page_count: u64,
    data: RefCell<Vec<u8>>,
}

impl RamDevice {
    pub fn new(page_size: u32, page_count: u64) -> Self {
        let len = page_size as usize * page_count as usize;
        RamDevice {
            page_size,
            page_count,
            data: RefCell::new(vec![0xFFu8; len]),
        }
    }
}

impl crate::device::BlockDevice for RamDevice {
    type Error = RamDeviceError;

    fn page_size(&self) -> u32 {
        self.page_size
    }

    fn page_count(&self) -> u64 {
        self.page_count
    }

    fn read(&self, page: u64, byte_offset: u32, buf: &mut [u8]) -> Result<(), Self::Error> {
        let start = page as usize * self.page_size as usize + byte_offset as usize;
        let end = start + buf.len();
        let data = self.data.borrow();
        if end > data.len() {
            return Err(RamDeviceError::OutOfBounds);
        }
        buf.copy_from_slice(&data[start..end]);
        Ok(())
    }

    fn write(&self, page: u64, byte_offset: u32, buf: &[u8]) -> Result<(), Self::Error> {
        let start = page as usize * self.page_size as usize + byte_offset as usize;
        let end = start + buf.len();
        let mut data = self.data.borrow_mut();
        if end > data.len() {
            return Err(RamDeviceError::OutOfBounds);
        }
        data[start..end].copy_from_slice(buf);
        Ok(())
    }

    fn erase(&self, page: u64) -> Result<(), Self::Error> {
        let start = page as usize * self.page_size as usize;
        let end = start + self.page_size as usize;
        let mut data = self.data.borrow_mut();
        if end > data.len() {
            return Err(RamDeviceError::OutOfBounds);
        }
        data[start..end].fill(0xFF);
        Ok(())
    }

    fn sync(&self) -> Result<(), Self::Error> {
        Ok(())
    }
}
