use crate::codes::ResponseCode;
use crate::transaction::CodecError;
use thiserror::Error;

/// Failure taxonomy shared by admission, proposal handling and commit.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ForumError {
    #[error("Invalid transaction format: {0}")]
    InvalidFormat(String),

    #[error("Sender {0} is banned")]
    Banned(String),

    #[error("Encoding error: {0}")]
    EncodingError(String),

    #[error("Store unavailable: {0}")]
    StoreUnavailable(String),

    #[error("Consensus invariant violated: {0}")]
    ConsensusInvariantViolated(String),
}

impl ForumError {
    /// Code reported for a transaction (CheckTx / FinalizeBlock).
    ///
    /// Transaction codes stop at 3, so a store failure is reported as an
    /// encoding error there.
    pub fn tx_code(&self) -> ResponseCode {
        match self {
            ForumError::InvalidFormat(_) | ForumError::ConsensusInvariantViolated(_) => {
                ResponseCode::InvalidTxFormat
            }
            ForumError::Banned(_) => ResponseCode::Banned,
            ForumError::EncodingError(_) | ForumError::StoreUnavailable(_) => {
                ResponseCode::EncodingError
            }
        }
    }
}

impl From<CodecError> for ForumError {
    fn from(err: CodecError) -> Self {
        match err {
            CodecError::Encode(msg) => ForumError::EncodingError(msg),
            other => ForumError::InvalidFormat(other.to_string()),
        }
    }
}
