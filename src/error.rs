use thiserror::Error;

/// Errors from decoding a single sentence.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum DecodeError {
    /// A decoder was configured with values it cannot search with.
    #[error("Invalid decoder configuration: {reason}")]
    InvalidConfig { reason: String },

    /// No sequence of known phrases covers the whole sentence.
    #[error("No translation covers all {length} source tokens")]
    NoCompleteTranslation { length: usize },
}
