//! Error types returned by the cache layer.
//!
//! Every fallible operation in this crate returns [`CacheError`], which maps
//! one-to-one onto the SAM/SCSI sense-data taxonomy the surrounding target
//! daemon must report to an initiator. The mapping lives here instead of at
//! each call site so the sense fields are derived in exactly one place.

use std::fmt;

/// SCSI sense key, matching the subset the cache layer can raise.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SenseKey {
    /// `MEDIUM ERROR`
    MediumError,
    /// `HARDWARE ERROR`
    HardwareError,
    /// `ILLEGAL REQUEST`
    IllegalRequest,
    /// `MISCOMPARE`
    Miscompare,
}

/// Additional sense code, paired with a [`SenseKey`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdditionalSenseCode {
    /// `READ ERROR`
    ReadError,
    /// `INTERNAL TARGET FAILURE`
    InternalTargetFailure,
    /// `INVALID FIELD IN CDB`
    InvalidFieldInCdb,
    /// `LOGICAL BLOCK ADDRESS OUT OF RANGE`
    LbaOutOfRange,
    /// `MISCOMPARE DURING VERIFY OPERATION`
    MiscompareDuringVerify,
}

/// The `(key, additional sense code, info)` triple a sense-data builder needs.
///
/// `info` is only meaningful for [`AdditionalSenseCode::MiscompareDuringVerify`],
/// where it carries the byte offset of the first mismatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SenseFields {
    /// The sense key.
    pub key: SenseKey,
    /// The additional sense code.
    pub asc: AdditionalSenseCode,
    /// Optional byte offset, set only for miscompare errors.
    pub info: Option<u64>,
}

/// Errors raised by the NUMA block cache.
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    /// A positional read against the backing store failed or returned fewer
    /// bytes than requested.
    #[error("backing store read failed at offset {offset}: {source}")]
    BackingRead {
        /// Byte offset of the failed read.
        offset: u64,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// A positional write against the backing store failed or wrote fewer
    /// bytes than requested.
    #[error("backing store write failed at offset {offset}: {source}")]
    BackingWrite {
        /// Byte offset of the failed write.
        offset: u64,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// Allocation of a partition's pinned buffer or slot arena failed.
    #[error("allocation failed: {0}")]
    Allocation(String),

    /// The command's CDB carried a field this cache cannot service.
    #[error("invalid field in CDB: {0}")]
    InvalidField(String),

    /// A descriptor (e.g. an UNMAP range) referenced an LBA past device end.
    #[error("lba out of range: {0}")]
    LbaOutOfRange(String),

    /// COMPARE_AND_WRITE or VERIFY found a mismatch.
    #[error("miscompare at byte offset {offset}")]
    Miscompare {
        /// Offset, relative to the command's starting LBA, of the first
        /// differing byte.
        offset: u64,
    },

    /// A configuration value failed validation.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// NUMA node discovery or thread pinning failed.
    #[error("numa pinning failed: {0}")]
    Numa(String),

    /// Every eviction candidate in a partition is dirty or mid-flush, so no
    /// slot could be admitted without violating the "never evict a dirty or
    /// in-flight slot" invariant.
    #[error("partition exhausted: all slots are dirty or in-flight")]
    CacheFull,
}

impl CacheError {
    /// Returns the sense-data fields a SCSI layer should build from this error.
    pub fn sense_fields(&self) -> SenseFields {
        match self {
            CacheError::BackingRead { .. } => SenseFields {
                key: SenseKey::MediumError,
                asc: AdditionalSenseCode::ReadError,
                info: None,
            },
            CacheError::BackingWrite { .. } => SenseFields {
                key: SenseKey::MediumError,
                asc: AdditionalSenseCode::ReadError,
                info: None,
            },
            CacheError::Allocation(_) | CacheError::Numa(_) | CacheError::CacheFull => SenseFields {
                key: SenseKey::HardwareError,
                asc: AdditionalSenseCode::InternalTargetFailure,
                info: None,
            },
            CacheError::InvalidField(_) | CacheError::Config(_) => SenseFields {
                key: SenseKey::IllegalRequest,
                asc: AdditionalSenseCode::InvalidFieldInCdb,
                info: None,
            },
            CacheError::LbaOutOfRange(_) => SenseFields {
                key: SenseKey::IllegalRequest,
                asc: AdditionalSenseCode::LbaOutOfRange,
                info: None,
            },
            CacheError::Miscompare { offset } => SenseFields {
                key: SenseKey::Miscompare,
                asc: AdditionalSenseCode::MiscompareDuringVerify,
                info: Some(*offset),
            },
        }
    }
}

impl fmt::Display for SenseKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SenseKey::MediumError => "MEDIUM_ERROR",
            SenseKey::HardwareError => "HARDWARE_ERROR",
            SenseKey::IllegalRequest => "ILLEGAL_REQUEST",
            SenseKey::Miscompare => "MISCOMPARE",
        };
        f.write_str(s)
    }
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, CacheError>;
