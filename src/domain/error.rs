use thiserror::Error;
use uuid::Uuid;

/// Failure reported by the device through the status characteristic.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceError {
    #[error("invalid data")]
    InvalidData,

    #[error("request timed out")]
    RequestTimeout,

    #[error("data is too long")]
    DataTooLong,

    #[error("data is not supported")]
    UnsupportedData,

    #[error("unknown error (status code {0})")]
    Unknown(i8),
}

/// Status codes written by the firmware after a send.
pub mod status_code {
    pub const OK: i8 = 0;
    pub const INVALID_DATA: i8 = -1;
    pub const REQUEST_TIMEOUT: i8 = -2;
    pub const DATA_TOO_LONG: i8 = -3;
    pub const UNSUPPORTED_DATA: i8 = -4;
}

/// Map a device status code to an outcome. Unrecognized codes are
/// `DeviceError::Unknown`, never a decode failure.
pub fn decode_status(code: i8) -> Result<(), DeviceError> {
    match code {
        status_code::OK => Ok(()),
        status_code::INVALID_DATA => Err(DeviceError::InvalidData),
        status_code::REQUEST_TIMEOUT => Err(DeviceError::RequestTimeout),
        status_code::DATA_TOO_LONG => Err(DeviceError::DataTooLong),
        status_code::UNSUPPORTED_DATA => Err(DeviceError::UnsupportedData),
        other => Err(DeviceError::Unknown(other)),
    }
}

/// Error type for every driver operation.
#[derive(Error, Debug)]
pub enum IrError {
    #[error("data is too long: {samples} samples exceeds the maximum of {max}")]
    DataTooLong { samples: usize, max: usize },

    #[error("not connected")]
    NotConnected,

    #[error("device reported: {0}")]
    Device(#[from] DeviceError),

    #[error("characteristic {0} not found on device")]
    MissingCharacteristic(Uuid),

    #[error("invalid bluetooth address: {0:?}")]
    InvalidAddress(String),

    #[error("invalid device config: {0}")]
    InvalidConfig(String),

    #[error("connect cancelled")]
    Cancelled,

    #[error("timed out waiting for the device actor to reply")]
    ReplyTimeout,

    #[error("driver has been shut down")]
    DriverStopped,

    #[error(transparent)]
    Transport(#[from] anyhow::Error),
}

impl IrError {
    /// True for the client-side and device-side "too long" variants alike.
    pub fn is_data_too_long(&self) -> bool {
        matches!(
            self,
            Self::DataTooLong { .. } | Self::Device(DeviceError::DataTooLong)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_status_table() {
        assert_eq!(decode_status(0), Ok(()));
        assert_eq!(decode_status(-1), Err(DeviceError::InvalidData));
        assert_eq!(decode_status(-2), Err(DeviceError::RequestTimeout));
        assert_eq!(decode_status(-3), Err(DeviceError::DataTooLong));
        assert_eq!(decode_status(-4), Err(DeviceError::UnsupportedData));
        assert_eq!(decode_status(-5), Err(DeviceError::Unknown(-5)));
        assert_eq!(decode_status(1), Err(DeviceError::Unknown(1)));
        assert_eq!(decode_status(i8::MIN), Err(DeviceError::Unknown(i8::MIN)));
    }

    #[test]
    fn test_error_display() {
        let err = IrError::DataTooLong {
            samples: 601,
            max: 600,
        };
        assert_eq!(
            err.to_string(),
            "data is too long: 601 samples exceeds the maximum of 600"
        );

        let err = IrError::from(DeviceError::RequestTimeout);
        assert_eq!(err.to_string(), "device reported: request timed out");

        let err = IrError::from(anyhow::anyhow!("write failed"));
        assert_eq!(err.to_string(), "write failed");
    }

    #[test]
    fn test_data_too_long_both_sides() {
        assert!(IrError::DataTooLong { samples: 1, max: 0 }.is_data_too_long());
        assert!(IrError::Device(DeviceError::DataTooLong).is_data_too_long());
        assert!(!IrError::NotConnected.is_data_too_long());
    }
}
