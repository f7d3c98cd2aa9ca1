//! An embedded, page-addressable filesystem for raw flash-like block
//! devices: mirrored root headers, a parent/child/sibling pointer graph
//! instead of a central allocation table, CRC16-protected pages, and a
//! wear-aware write path that relocates and back-patches on verify failure.
//!
//! Entry point: [`fs::StorFs`], generic over a caller-supplied
//! [`device::BlockDevice`].

pub mod alloc;
pub mod codec;
pub mod config;
pub mod crc;
pub mod device;
pub mod error;
pub mod fs;
pub mod header;
pub mod ram;
pub mod read;
pub mod relocate;
pub mod remove;
pub mod root;
pub mod walk;
pub mod write;

pub use config::{Config, OpenMode};
pub use error::{Result, StorfsError};
pub use fs::{NullGuard, Stream, StorFs, SyncGuard};
