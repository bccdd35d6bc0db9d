//! Error types for preview materialization

use crate::mime::MimeError;

use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PreviewError {
    #[error("failed to parse email: {0}")]
    Parse(#[from] MimeError),

    #[error("no email bodies found")]
    NoBodies,

    #[error("no file extension known for content type {0:?}")]
    UnknownExtension(String),

    #[error("no template registered for content type {0:?}")]
    MissingTemplate(String),

    #[error("template for {content_type} uses unknown placeholder {name:?}")]
    UnknownPlaceholder { content_type: String, name: String },

    #[error("failed to write {}: {source}", path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}
