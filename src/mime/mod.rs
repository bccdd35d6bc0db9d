//! MIME ingestion: raw DATA payload to a structured [`Email`]

pub mod email;
pub mod error;
pub mod header;
pub mod multipart;
pub mod transfer;

pub use email::{Attachment, Body, Email, Envelope, TEXT_HTML, TEXT_PLAIN};
pub use error::MimeError;
pub use transfer::{TransferEncoding, decode_text, read_part_content};
