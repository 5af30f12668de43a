use thiserror::Error;

use crate::fabric::error::errno::*;

/// Status code reported by the tag-matching transport.
///
/// Both per-operation completion statuses and failures of the transport's own
/// calls are expressed in this type. [`TransportStatus::errno`] translates a
/// status into the provider error domain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Error)]
#[repr(i32)]
pub enum TransportStatus {
    /// **Success:** the operation completed.
    #[error("success")]
    Ok = 0,

    /// **No progress:** the call succeeded but nothing was progressed.
    #[error("success, no progress made")]
    OkNoProgress = 1,

    /// **Parameter error:** a caller-supplied argument was rejected.
    #[error("invalid parameter")]
    ParamErr = 3,

    /// **Out of memory:** the transport could not allocate resources.
    #[error("out of memory")]
    NoMemory = 4,

    /// **Not initialized:** the transport library has not been initialized.
    #[error("library not initialized")]
    InitNotInit = 5,

    /// **Internal error:** an unexpected condition inside the transport.
    #[error("internal error")]
    InternalErr = 8,

    /// **Timeout:** an operation did not finish in the allotted time.
    #[error("operation timed out")]
    Timeout = 11,

    /// **Endpoint closed:** the endpoint was closed while the operation was outstanding.
    #[error("endpoint was closed")]
    EpWasClosed = 20,

    /// **No device:** no usable device was found.
    #[error("no device available")]
    EpNoDevice = 21,

    /// **Device failure:** the hardware reported a fatal condition.
    #[error("device failure")]
    EpDeviceFailure = 23,

    /// **No resources:** out of hardware contexts or similar resources.
    #[error("no endpoint resources available")]
    EpNoResources = 28,

    /// **Unknown peer:** the endpoint id is not known to the transport.
    #[error("unknown endpoint id")]
    EpidUnknown = 40,

    /// **Unreachable peer:** the endpoint id cannot be reached.
    #[error("endpoint id unreachable")]
    EpidUnreachable = 41,

    /// **Network error:** a network error occurred while talking to a peer.
    #[error("network error")]
    EpidNetworkError = 49,

    /// **No completions:** the completion source is empty. This is a sentinel, not a failure.
    #[error("no completions available")]
    MqNoCompletions = 60,

    /// **Truncation:** the incoming message was longer than the posted receive buffer.
    #[error("message truncated")]
    MqTruncation = 61,

    /// **Invalid reply:** an active-message reply was malformed.
    #[error("invalid active message reply")]
    AmInvalidReply = 70,
}

impl TransportStatus {
    /// Whether this status denotes success.
    #[inline]
    pub fn is_ok(self) -> bool {
        matches!(self, Self::Ok | Self::OkNoProgress)
    }

    /// Translate into the provider error domain. Returns a positive error
    /// number, `0` for success.
    pub fn errno(self) -> i32 {
        match self {
            Self::Ok | Self::OkNoProgress => 0,
            Self::ParamErr | Self::AmInvalidReply => FI_EINVAL,
            Self::NoMemory => FI_ENOMEM,
            Self::InitNotInit | Self::EpNoDevice => FI_ENODEV,
            Self::InternalErr | Self::EpDeviceFailure | Self::EpidNetworkError => FI_EIO,
            Self::Timeout => FI_ETIMEDOUT,
            Self::EpWasClosed => FI_ESHUTDOWN,
            Self::EpNoResources => FI_ENOSPC,
            Self::EpidUnknown => FI_EADDRNOTAVAIL,
            Self::EpidUnreachable => FI_ENETUNREACH,
            Self::MqNoCompletions => FI_EAGAIN,
            Self::MqTruncation => FI_ETRUNC,
        }
    }

    /// Get the raw transport code.
    #[inline]
    pub fn code(self) -> i32 {
        self as i32
    }
}

impl From<i32> for TransportStatus {
    /// Unknown codes are reported as [`TransportStatus::InternalErr`].
    fn from(code: i32) -> Self {
        match code {
            0 => Self::Ok,
            1 => Self::OkNoProgress,
            3 => Self::ParamErr,
            4 => Self::NoMemory,
            5 => Self::InitNotInit,
            8 => Self::InternalErr,
            11 => Self::Timeout,
            20 => Self::EpWasClosed,
            21 => Self::EpNoDevice,
            23 => Self::EpDeviceFailure,
            28 => Self::EpNoResources,
            40 => Self::EpidUnknown,
            41 => Self::EpidUnreachable,
            49 => Self::EpidNetworkError,
            60 => Self::MqNoCompletions,
            61 => Self::MqTruncation,
            70 => Self::AmInvalidReply,
            x => {
                log::warn!("psmx: unrecognized transport status {}", x);
                Self::InternalErr
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn raw_codes_round_trip() {
        for status in [
            TransportStatus::Ok,
            TransportStatus::MqTruncation,
            TransportStatus::EpidUnreachable,
        ] {
            assert_eq!(TransportStatus::from(status.code()), status);
        }
        assert_eq!(TransportStatus::from(9999), TransportStatus::InternalErr);
    }

    #[test]
    fn translation() {
        assert_eq!(TransportStatus::Ok.errno(), 0);
        assert_eq!(TransportStatus::MqTruncation.errno(), FI_ETRUNC);
        assert_eq!(TransportStatus::NoMemory.errno(), FI_ENOMEM);
        assert!(!TransportStatus::Timeout.is_ok());
    }
}
