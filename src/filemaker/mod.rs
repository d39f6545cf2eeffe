//! Client for the FileMaker Data API and the record mapping used by the sync job.

pub mod client;
pub mod mapping;
pub mod types;

use thiserror::Error;

pub use client::FileMakerClient;
pub use types::{DataInfo, Message, Record};

/// FileMaker message code for "No records match the request".
pub const NO_RECORDS_MATCH: &str = "401";

#[derive(Debug, Error)]
pub enum FileMakerError {
    #[error("invalid FileMaker configuration: {0}")]
    InvalidConfig(String),

    #[error("FileMaker request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("FileMaker rejected the session after re-login")]
    Unauthorized,

    #[error("FileMaker API error {code} (HTTP {status}): {message}")]
    Api {
        status: u16,
        code: String,
        message: String,
    },

    #[error("unexpected FileMaker response: {0}")]
    Decode(String),
}

impl FileMakerError {
    pub fn is_no_records(&self) -> bool {
        matches!(self, FileMakerError::Api { code, .. } if code == NO_RECORDS_MATCH)
    }
}
