use thiserror::Error;

/// The six-member error taxonomy the core reports through.
///
/// Every internal helper returns `Result<T, StorfsError>`; public operations
/// on [`crate::fs::StorFs`] propagate the first non-`Ok` value and abort.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorfsError {
    /// An invariant the core relies on was violated: a path segment could
    /// not be placed, a configuration value was invalid, or a bounded
    /// recursion (relocation back-patch) ran out of depth.
    #[error("storfs: invariant violation or invalid configuration")]
    Generic,

    /// The device returned an error on read, or the requested range crossed
    /// a page boundary. Never retried at the filesystem level.
    #[error("storfs: device read failed or read crossed a page boundary")]
    ReadFailed,

    /// The device refused a write, or a header would have crossed a page
    /// boundary. Inside the wear-retry wrapper this triggers relocation;
    /// outside it, the error is surfaced as-is.
    #[error("storfs: device write failed or write crossed a page boundary")]
    WriteFailed,

    /// Reserved for future consistency checks (an fsck-style walk). Not
    /// produced anywhere in the current core, but kept in the taxonomy so
    /// callers can match on it without a breaking change later.
    #[error("storfs: memory discrepancy detected by a consistency check")]
    MemoryDiscrepancy,

    /// A computed CRC did not match the one stored on media. Inside the
    /// wear-retry wrapper this triggers relocation; outside it (e.g. during
    /// mount) it is surfaced directly.
    #[error("storfs: CRC mismatch between stored and computed value")]
    CrcError,
}

pub type Result<T> = core::result::Result<T, StorfsError>;
