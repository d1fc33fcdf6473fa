//! Sticky status register
//!
//! One slot shared by both sides. The first fault recorded wins; later faults
//! are dropped until the register is cleared.

use std::fmt;
use std::sync::atomic::{AtomicU32, Ordering};

use crate::decode::DecodeError;

/// Fault codes held by the status register
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum StatusCode {
    Ok = 0,
    SyncWordNotFound = 1,
    TruncatedFrame = 2,
    BitReservoirUnderflow = 3,
    FreeBitrateSyncMissing = 4,
    DecodeError = 5,
    ReadError = 6,
    ChannelFault = 7,
}

impl StatusCode {
    fn from_raw(raw: u32) -> Self {
        match raw {
            1 => StatusCode::SyncWordNotFound,
            2 => StatusCode::TruncatedFrame,
            3 => StatusCode::BitReservoirUnderflow,
            4 => StatusCode::FreeBitrateSyncMissing,
            5 => StatusCode::DecodeError,
            6 => StatusCode::ReadError,
            7 => StatusCode::ChannelFault,
            _ => StatusCode::Ok,
        }
    }

    pub fn is_ok(self) -> bool {
        self == StatusCode::Ok
    }
}

impl From<&DecodeError> for StatusCode {
    fn from(err: &DecodeError) -> Self {
        match err {
            DecodeError::SyncWordNotFound { .. } => StatusCode::SyncWordNotFound,
            DecodeError::TruncatedFrame { .. } => StatusCode::TruncatedFrame,
            DecodeError::BitReservoirUnderflow { .. } => StatusCode::BitReservoirUnderflow,
            DecodeError::FreeBitrateSyncMissing => StatusCode::FreeBitrateSyncMissing,
            DecodeError::Decoder(_) => StatusCode::DecodeError,
        }
    }
}

impl fmt::Display for StatusCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            StatusCode::Ok => "ok",
            StatusCode::SyncWordNotFound => "sync word not found",
            StatusCode::TruncatedFrame => "truncated frame",
            StatusCode::BitReservoirUnderflow => "bit reservoir underflow",
            StatusCode::FreeBitrateSyncMissing => "free-format sync missing",
            StatusCode::DecodeError => "decode error",
            StatusCode::ReadError => "read error",
            StatusCode::ChannelFault => "channel fault",
        };
        f.write_str(text)
    }
}

#[derive(Debug, Default)]
pub struct StatusRegister {
    code: AtomicU32,
}

impl StatusRegister {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `code` unless a fault is already held. Returns whether it was stored.
    pub fn record(&self, code: StatusCode) -> bool {
        if code.is_ok() {
            return false;
        }
        self.code
            .compare_exchange(
                StatusCode::Ok as u32,
                code as u32,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_ok()
    }

    pub fn get(&self) -> StatusCode {
        StatusCode::from_raw(self.code.load(Ordering::Acquire))
    }

    /// Clear the register, returning what it held
    pub fn clear(&self) -> StatusCode {
        StatusCode::from_raw(self.code.swap(StatusCode::Ok as u32, Ordering::AcqRel))
    }
}
