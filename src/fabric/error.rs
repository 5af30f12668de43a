//! Provider error domain.

use std::io;

use thiserror::Error;

use super::transport::TransportStatus;

/// Provider error numbers. Values below [`errno::FI_ERRNO_OFFSET`] alias the
/// platform `errno` values; the rest are provider-specific.
pub mod errno {
    pub const FI_EAGAIN: i32 = libc::EAGAIN;
    pub const FI_EBADF: i32 = libc::EBADF;
    pub const FI_EINVAL: i32 = libc::EINVAL;
    pub const FI_EIO: i32 = libc::EIO;
    pub const FI_ENODATA: i32 = libc::ENODATA;
    pub const FI_ENODEV: i32 = libc::ENODEV;
    pub const FI_ENOMEM: i32 = libc::ENOMEM;
    pub const FI_ENOSPC: i32 = libc::ENOSPC;
    pub const FI_ENOSYS: i32 = libc::ENOSYS;
    pub const FI_ESHUTDOWN: i32 = libc::ESHUTDOWN;
    pub const FI_ETIMEDOUT: i32 = libc::ETIMEDOUT;
    pub const FI_EADDRNOTAVAIL: i32 = libc::EADDRNOTAVAIL;
    pub const FI_ENETUNREACH: i32 = libc::ENETUNREACH;

    pub const FI_ERRNO_OFFSET: i32 = 256;
    pub const FI_EOTHER: i32 = FI_ERRNO_OFFSET;
    pub const FI_ETOOSMALL: i32 = FI_ERRNO_OFFSET + 1;
    pub const FI_EAVAIL: i32 = FI_ERRNO_OFFSET + 3;
    pub const FI_ETRUNC: i32 = FI_ERRNO_OFFSET + 9;
}

use errno::*;

/// Errors returned by provider operations.
#[derive(Debug, Error)]
pub enum Error {
    /// An error completion is pending and must be drained with `read_err`.
    #[error("error completion available")]
    ErrorAvailable,

    /// The caller's buffer is smaller than the fixed entry size.
    #[error("buffer too small: {required} bytes required, {provided} provided")]
    TooSmall { required: usize, provided: usize },

    /// An argument or attribute combination was rejected.
    #[error("invalid argument: {0}")]
    InvalidArgument(&'static str),

    /// Completion storage could not be obtained.
    #[error("out of memory")]
    OutOfMemory,

    /// The operation is not supported by this object.
    #[error("operation not supported")]
    NotSupported,

    /// The requested data is not available.
    #[error("no data available")]
    NoData,

    /// A timed wait expired without a completion.
    #[error("timed out, try again")]
    Again,

    /// The object has already been closed.
    #[error("object is closed")]
    Closed,

    /// The transport reported a failure.
    #[error("transport error: {0}")]
    Transport(#[from] TransportStatus),

    /// A wait-object system call failed.
    #[error("I/O error from wait object")]
    Io(#[from] io::Error),
}

impl Error {
    /// Get the negative provider error number of this error.
    pub fn errno(&self) -> i32 {
        -match self {
            Self::ErrorAvailable => FI_EAVAIL,
            Self::TooSmall { .. } => FI_ETOOSMALL,
            Self::InvalidArgument(_) => FI_EINVAL,
            Self::OutOfMemory => FI_ENOMEM,
            Self::NotSupported => FI_ENOSYS,
            Self::NoData => FI_ENODATA,
            Self::Again => FI_EAGAIN,
            Self::Closed => FI_EBADF,
            Self::Transport(status) => status.errno(),
            Self::Io(e) => e.raw_os_error().unwrap_or(FI_EOTHER),
        }
    }
}

/// Provider result type.
pub type Result<T> = std::result::Result<T, Error>;
