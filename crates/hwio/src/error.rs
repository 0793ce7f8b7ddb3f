//! Driver error types.

use core::fmt;

/// Error returned by a driver operation.
///
/// Drivers never retry on their own; only the caller knows whether a
/// retry, a different drive, or giving up is the right response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriverError {
    /// The status register never reached the awaited state.
    Timeout {
        /// Number of status samples taken before giving up.
        samples: u32,
    },
    /// The device reported a failure (ERR or DF set in its status).
    Device {
        /// Raw status register value.
        status: u8,
        /// Raw error register value.
        error: u8,
    },
    /// The request was rejected before any port was touched.
    InvalidRequest(RequestError),
    /// Nothing answered on the selected bus/drive.
    NoDevice,
}

/// Why a request was rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestError {
    /// A transfer of zero sectors.
    ZeroSectorCount,
    /// The sector range does not fit the 28-bit address space or the drive.
    LbaOutOfRange {
        lba: u32,
        count: u8,
        /// Number of addressable sectors.
        limit: u32,
    },
    /// The caller's buffer cannot hold the requested sectors.
    BufferTooSmall { needed: usize, actual: usize },
}

impl fmt::Display for DriverError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DriverError::Timeout { samples } => {
                write!(f, "device not ready after {} status samples", samples)
            }
            DriverError::Device { status, error } => {
                write!(f, "device error (status {:#04x}, error {:#04x})", status, error)
            }
            DriverError::InvalidRequest(reason) => write!(f, "invalid request: {}", reason),
            DriverError::NoDevice => f.write_str("no device present"),
        }
    }
}

impl fmt::Display for RequestError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RequestError::ZeroSectorCount => f.write_str("sector count is zero"),
            RequestError::LbaOutOfRange { lba, count, limit } => write!(
                f,
                "{} sector(s) at LBA {} exceed {} addressable sectors",
                count, lba, limit
            ),
            RequestError::BufferTooSmall { needed, actual } => {
                write!(f, "buffer holds {} bytes, {} needed", actual, needed)
            }
        }
    }
}

impl From<RequestError> for DriverError {
    fn from(reason: RequestError) -> Self {
        DriverError::InvalidRequest(reason)
    }
}

impl core::error::Error for DriverError {}
impl core::error::Error for RequestError {}
