//! Validated query text plus row limit.

use crate::error::{MatrixError, Result};

/// A query ready for submission. Built only from verified text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryRequest {
    text: String,
    row_limit: u64,
}

impl QueryRequest {
    /// Verifies `bytes` and builds a request. `row_limit == 0` means no limit.
    pub fn from_bytes(bytes: impl AsRef<[u8]>, row_limit: u64) -> Result<Self> {
        let text = verify_query_text(bytes.as_ref())?;
        Ok(Self {
            text: text.to_string(),
            row_limit,
        })
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn row_limit(&self) -> u64 {
        self.row_limit
    }
}

/// Checks that query bytes are valid UTF-8 without NUL bytes.
pub fn verify_query_text(bytes: &[u8]) -> Result<&str> {
    let text = std::str::from_utf8(bytes).map_err(|e| {
        let offset = e.valid_up_to();
        MatrixError::encoding(format!(
            "invalid byte sequence for encoding \"UTF8\": 0x{:02x} at offset {}",
            bytes[offset], offset
        ))
    })?;

    if let Some(offset) = text.find('\0') {
        return Err(MatrixError::encoding(format!(
            "invalid byte sequence for encoding \"UTF8\": 0x00 at offset {offset}"
        )));
    }

    Ok(text)
}
