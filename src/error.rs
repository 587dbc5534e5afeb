use thiserror::Error;

/// Per-record failure. The page is skipped, the stream keeps going.
#[derive(Debug, Error)]
pub enum RecordError {
    #[error("{field} is {len} characters long (limit {limit})")]
    FieldTooLong {
        field: &'static str,
        len: usize,
        limit: usize,
    },
    #[error("failed to decode entity JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("unexpected entity shape: {0}")]
    Shape(&'static str),
    #[error("wikitext parse error: {0}")]
    Wikitext(String),
}

/// Result of building one record from a raw page.
#[derive(Debug)]
pub enum Built<R> {
    Record(R),
    /// Not enough data to form a record; nothing worth logging
    Dropped,
    /// Malformed input; logged with the page key
    Rejected(RecordError),
}

impl<R> Built<R> {
    pub fn record(self) -> Option<R> {
        match self {
            Built::Record(r) => Some(r),
            _ => None,
        }
    }

    pub fn is_dropped(&self) -> bool {
        matches!(self, Built::Dropped)
    }

    pub fn is_rejected(&self) -> bool {
        matches!(self, Built::Rejected(_))
    }
}

impl<R> From<Result<Option<R>, RecordError>> for Built<R> {
    fn from(result: Result<Option<R>, RecordError>) -> Self {
        match result {
            Ok(Some(r)) => Built::Record(r),
            Ok(None) => Built::Dropped,
            Err(e) => Built::Rejected(e),
        }
    }
}

/// Fails with [`RecordError::FieldTooLong`] when `value` exceeds `limit` characters.
pub fn check_length(field: &'static str, value: &str, limit: usize) -> Result<(), RecordError> {
    let len = value.chars().count();
    if len > limit {
        return Err(RecordError::FieldTooLong { field, len, limit });
    }
    Ok(())
}
