//! Error types for MIME ingestion

use thiserror::Error;

#[derive(Error, Debug)]
pub enum MimeError {
    #[error("failed to read message content: {0}")]
    Io(#[from] std::io::Error),

    #[error("malformed header block: {0}")]
    Headers(#[from] mailparse::MailParseError),

    #[error("message has no Content-Type header")]
    MissingContentType,

    #[error("invalid Content-Type {0:?}")]
    InvalidContentType(String),

    #[error("malformed multipart body: {0}")]
    MalformedMultipart(String),

    #[error("failed to decode encoded-word {word:?}: {reason}")]
    EncodedWord { word: String, reason: String },

    #[error("base64 decoding failed: {0}")]
    Base64(#[from] base64::DecodeError),

    #[error("quoted-printable decoding failed: {0}")]
    QuotedPrintable(#[from] quoted_printable::QuotedPrintableError),

    #[error("part {index} ({content_type}): {source}")]
    Part {
        index: usize,
        content_type: String,
        #[source]
        source: Box<MimeError>,
    },

    #[error("email was already parsed; reset it before parsing again")]
    AlreadyParsed,
}

impl MimeError {
    /// Attach the position and declared type of the failing multipart part
    pub(crate) fn in_part(self, index: usize, content_type: &str) -> Self {
        MimeError::Part {
            index,
            content_type: content_type.to_owned(),
            source: Box::new(self),
        }
    }
}
