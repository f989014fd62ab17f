use serde::{Deserialize, Serialize};
use std::fmt;

/// Result codes returned across the consensus host boundary.
///
/// Values 0-3 are the only codes a transaction can receive (CheckTx and
/// FinalizeBlock). 4 and 5 are reserved for the query path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u32)]
pub enum ResponseCode {
    Ok = 0,
    EncodingError = 1,
    InvalidTxFormat = 2,
    Banned = 3,
    NotFound = 4,
    StoreUnavailable = 5,
}

impl ResponseCode {
    pub fn value(self) -> u32 {
        self as u32
    }

    pub fn is_ok(self) -> bool {
        matches!(self, ResponseCode::Ok)
    }
}

impl From<ResponseCode> for u32 {
    fn from(code: ResponseCode) -> Self {
        code.value()
    }
}

impl fmt::Display for ResponseCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ResponseCode::Ok => "OK",
            ResponseCode::EncodingError => "ENCODING_ERROR",
            ResponseCode::InvalidTxFormat => "INVALID_TX_FORMAT",
            ResponseCode::Banned => "BANNED",
            ResponseCode::NotFound => "NOT_FOUND",
            ResponseCode::StoreUnavailable => "STORE_UNAVAILABLE",
        };
        write!(f, "{}({})", name, self.value())
    }
}
