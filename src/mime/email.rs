//! Captured email aggregate and its parser

use crate::mime::error::MimeError;
use crate::mime::header::{decode_headers, header_text};
use crate::mime::multipart::{self, MultipartReader, boundary_of};
use crate::mime::transfer::read_part_content;

use mailparse::{MailHeaderMap, parse_content_type, parse_headers};
use std::path::PathBuf;

pub const TEXT_PLAIN: &str = "text/plain";
pub const TEXT_HTML: &str = "text/html";

/// SMTP envelope of a message, as given by MAIL FROM and RCPT TO
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Envelope {
    pub sender: String,
    pub recipients: Vec<String>,
}

/// One alternative rendering of the message text
#[derive(Debug, Clone, PartialEq)]
pub struct Body {
    /// MIME type, e.g. `text/html`
    pub content_type: String,
    /// Fully transfer-decoded text
    pub content: String,
}

impl Body {
    pub fn new(content_type: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            content_type: content_type.into(),
            content: content.into(),
        }
    }
}

/// A non-text part of the message
#[derive(Debug, Clone, PartialEq)]
pub struct Attachment {
    /// Decoded filename
    pub name: String,
    /// Where the data was written, once materialized
    pub path: Option<PathBuf>,
    pub content_type: String,
    /// Decoded payload
    pub data: Vec<u8>,
}

impl Attachment {
    pub fn new(name: impl Into<String>, content_type: impl Into<String>, data: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            path: None,
            content_type: content_type.into(),
            data,
        }
    }
}

/// An email captured by the server.
///
/// The envelope and raw body are filled while the SMTP transaction runs;
/// [`Email::parse`] then fills the headers, bodies and attachments once.
#[derive(Debug, Clone, Default)]
pub struct Email {
    pub envelope: Envelope,
    /// Decoded subject
    pub subject: String,
    /// From header, verbatim
    pub from: String,
    pub to: Vec<String>,
    pub cc: Vec<String>,
    pub bcc: Vec<String>,
    /// The DATA payload exactly as received (after dot-unstuffing)
    pub raw_body: Vec<u8>,
    pub bodies: Vec<Body>,
    pub attachments: Vec<Attachment>,
    parsed: bool,
}

impl Email {
    /// Create an empty email
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an email holding an envelope and an unparsed DATA payload
    pub fn from_raw(envelope: Envelope, raw_body: impl Into<Vec<u8>>) -> Self {
        Self {
            envelope,
            raw_body: raw_body.into(),
            ..Self::default()
        }
    }

    /// Return to the empty state so the aggregate can hold another message
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    /// Whether [`Email::parse`] has run since the last reset
    pub fn is_parsed(&self) -> bool {
        self.parsed
    }

    /// Parse the raw body into headers, bodies and attachments.
    ///
    /// On failure the bodies and attachments hold whatever was collected
    /// before the error and must not be used.
    pub fn parse(&mut self) -> Result<(), MimeError> {
        if self.parsed {
            return Err(MimeError::AlreadyParsed);
        }
        self.parsed = true;

        let (headers, body_offset) = parse_headers(&self.raw_body)?;

        let decoded = decode_headers(&headers)?;
        self.from = decoded.from;
        self.to = decoded.to;
        self.cc = decoded.cc;
        self.bcc = decoded.bcc;
        self.subject = decoded.subject;

        let content_type = headers
            .get_first_header("Content-Type")
            .map(header_text)
            .filter(|value| !value.is_empty())
            .ok_or(MimeError::MissingContentType)?;

        let ctype = parse_content_type(&content_type);
        if !is_media_type(&ctype.mimetype) {
            return Err(MimeError::InvalidContentType(content_type));
        }

        let body = &self.raw_body[body_offset.min(self.raw_body.len())..];

        if ctype.mimetype.starts_with("multipart/") {
            let mut reader = MultipartReader::new(body, boundary_of(&ctype)?)?;
            multipart::walk(&mut reader, &mut self.bodies, &mut self.attachments)?;
        } else {
            let encoding = headers
                .get_first_header("Content-Transfer-Encoding")
                .map(header_text);
            let content = read_part_content(body, encoding.as_deref(), Some(&ctype.charset))?;
            self.bodies.push(Body::new(ctype.mimetype, content));
        }

        Ok(())
    }

    /// Check if this email was sent to a specific envelope recipient
    pub fn has_recipient(&self, recipient: &str) -> bool {
        self.envelope.recipients.iter().any(|addr| addr == recipient)
    }

    /// Check if this email was sent from a specific envelope sender
    pub fn is_from_sender(&self, sender: &str) -> bool {
        self.envelope.sender == sender
    }

    /// Get the size of the raw message in bytes
    pub fn data_size(&self) -> usize {
        self.raw_body.len()
    }

    /// Check if the raw message contains a specific text
    pub fn contains_text(&self, text: &str) -> bool {
        String::from_utf8_lossy(&self.raw_body).contains(text)
    }

    /// First body with the given content type
    pub fn body(&self, content_type: &str) -> Option<&Body> {
        self.bodies.iter().find(|b| b.content_type == content_type)
    }
}

fn is_media_type(mimetype: &str) -> bool {
    match mimetype.split_once('/') {
        Some((kind, subtype)) => {
            !kind.is_empty()
                && !subtype.is_empty()
                && !subtype.contains('/')
                && !mimetype.contains(char::is_whitespace)
        }
        None => false,
    }
}
