use crate::domain::error::IrError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// 48-bit Bluetooth device address, stored in the low bits of a `u64`
/// the same way WinRT reports `BluetoothAddress`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BleAddress(u64);

impl BleAddress {
    pub const fn from_u64(raw: u64) -> Self {
        Self(raw & 0xFFFF_FFFF_FFFF)
    }

    pub const fn as_u64(&self) -> u64 {
        self.0
    }
}

impl FromStr for BleAddress {
    type Err = IrError;

    /// Accepts `AA:BB:CC:DD:EE:FF` (or `-` separated), case-insensitive.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = s.trim().split([':', '-']).collect();
        if parts.len() != 6 {
            return Err(IrError::InvalidAddress(s.to_string()));
        }

        let mut raw = 0u64;
        for part in parts {
            if part.len() != 2 {
                return Err(IrError::InvalidAddress(s.to_string()));
            }
            let byte = u8::from_str_radix(part, 16)
                .map_err(|_| IrError::InvalidAddress(s.to_string()))?;
            raw = (raw << 8) | byte as u64;
        }
        Ok(Self(raw))
    }
}

impl fmt::Display for BleAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let b = self.0.to_be_bytes();
        write!(
            f,
            "{:02X}:{:02X}:{:02X}:{:02X}:{:02X}:{:02X}",
            b[2], b[3], b[4], b[5], b[6], b[7]
        )
    }
}

/// Link state as driven by the connection supervisor.
///
/// ```text
/// Unbound ──► Connecting ──► Bound ──► ReconnectPending ──► Connecting ──► ...
///    any state ──► Shutdown
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Unbound,
    Connecting,
    Bound,
    ReconnectPending,
    Shutdown,
}

impl ConnectionState {
    /// Whether `self -> next` is one of the defined transitions.
    pub fn can_transition_to(self, next: ConnectionState) -> bool {
        use ConnectionState::*;
        matches!(
            (self, next),
            (Unbound, Connecting)
                | (Connecting, Bound)
                | (Connecting, Unbound)
                | (Bound, ReconnectPending)
                | (ReconnectPending, Connecting)
                | (Connecting, ReconnectPending)
                | (_, Shutdown)
        ) && self != Shutdown
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Unbound => "unbound",
            Self::Connecting => "connecting",
            Self::Bound => "bound",
            Self::ReconnectPending => "reconnect pending",
            Self::Shutdown => "shutdown",
        };
        f.write_str(s)
    }
}

/// Connection status change reported by a transport link.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkEvent {
    Connected,
    Disconnected,
}

/// Information reported to the plugin host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceInfo {
    pub firmware_version: String,
    pub driver_version: String,
}
