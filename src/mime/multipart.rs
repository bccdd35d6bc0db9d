//! Multipart body walking

use crate::mime::email::{Attachment, Body, TEXT_HTML, TEXT_PLAIN};
use crate::mime::error::MimeError;
use crate::mime::header::{header_text, part_filename};
use crate::mime::transfer::{TransferEncoding, read_part_content};

use log::debug;
use mailparse::{MailHeader, MailHeaderMap, ParsedContentType, parse_content_type};

/// A single part of a multipart body
#[derive(Debug)]
pub struct Part<'a> {
    /// Headers of the part
    pub headers: Vec<MailHeader<'a>>,
    /// Still transfer-encoded content of the part
    pub body: &'a [u8],
}

impl Part<'_> {
    /// Unfolded value of the first header with this name
    pub fn header(&self, key: &str) -> Option<String> {
        self.headers.get_first_header(key).map(header_text)
    }
}

/// Iterates the parts of a multipart body delimited by one boundary
#[derive(Debug)]
pub struct MultipartReader<'a> {
    body: &'a [u8],
    delimiter: Vec<u8>,
    /// Offset of the delimiter line that precedes the next part
    pos: usize,
    finished: bool,
}

impl<'a> MultipartReader<'a> {
    /// Bind a reader to `boundary`, skipping the preamble
    pub fn new(body: &'a [u8], boundary: &str) -> Result<Self, MimeError> {
        if boundary.is_empty() {
            return Err(MimeError::MalformedMultipart("empty boundary".to_string()));
        }

        let delimiter = format!("--{boundary}").into_bytes();
        let pos = find_delimiter(body, &delimiter, 0).ok_or_else(|| {
            MimeError::MalformedMultipart(format!("boundary {boundary:?} not found"))
        })?;

        Ok(Self {
            body,
            delimiter,
            pos,
            finished: false,
        })
    }

    /// Fetch the next part, or `None` once the closing delimiter is reached
    pub fn next_part(&mut self) -> Result<Option<Part<'a>>, MimeError> {
        if self.finished {
            return Ok(None);
        }

        let after_delimiter = self.pos + self.delimiter.len();
        if self.body[after_delimiter..].starts_with(b"--") {
            self.finished = true;
            return Ok(None);
        }

        // Transport padding may follow the delimiter up to the line break
        let start = self.body[after_delimiter..]
            .iter()
            .position(|&b| b == b'\n')
            .map(|i| after_delimiter + i + 1)
            .ok_or_else(|| {
                MimeError::MalformedMultipart("boundary line is not terminated".to_string())
            })?;

        let next = find_delimiter(self.body, &self.delimiter, start).ok_or_else(|| {
            MimeError::MalformedMultipart("closing boundary not found".to_string())
        })?;

        // The line break before a delimiter belongs to the delimiter
        let mut end = next;
        if end > start && self.body[end - 1] == b'\n' {
            end -= 1;
            if end > start && self.body[end - 1] == b'\r' {
                end -= 1;
            }
        }
        self.pos = next;

        let raw = &self.body[start..end];
        let (headers, offset) = mailparse::parse_headers(raw)?;
        Ok(Some(Part {
            headers,
            body: &raw[offset.min(raw.len())..],
        }))
    }
}

/// The `boundary` parameter of a multipart content type
pub(crate) fn boundary_of(ctype: &ParsedContentType) -> Result<&str, MimeError> {
    ctype
        .params
        .get("boundary")
        .map(String::as_str)
        .ok_or_else(|| MimeError::MalformedMultipart("missing boundary parameter".to_string()))
}

/// Walk every part, appending bodies and attachments in encounter order.
///
/// Parts without a content type are skipped. Nested multiparts are walked
/// with their own boundary. The first failing part aborts the walk.
pub fn walk(
    reader: &mut MultipartReader<'_>,
    bodies: &mut Vec<Body>,
    attachments: &mut Vec<Attachment>,
) -> Result<(), MimeError> {
    let mut index = 0;
    while let Some(part) = reader.next_part()? {
        let content_type = part.header("Content-Type").unwrap_or_default();
        if content_type.is_empty() {
            debug!("Skipping part {index} without Content-Type");
        } else {
            visit_part(&part, &content_type, bodies, attachments)
                .map_err(|e| e.in_part(index, &content_type))?;
        }
        index += 1;
    }

    Ok(())
}

fn visit_part(
    part: &Part<'_>,
    content_type: &str,
    bodies: &mut Vec<Body>,
    attachments: &mut Vec<Attachment>,
) -> Result<(), MimeError> {
    let encoding = part.header("Content-Transfer-Encoding");
    let lowered = content_type.to_ascii_lowercase();
    let ctype = parse_content_type(content_type);

    for text_type in [TEXT_HTML, TEXT_PLAIN] {
        if lowered.contains(text_type) {
            let content =
                read_part_content(part.body, encoding.as_deref(), Some(&ctype.charset))?;
            bodies.push(Body::new(text_type, content));
            return Ok(());
        }
    }

    if ctype.mimetype.starts_with("multipart/") {
        let mut nested = MultipartReader::new(part.body, boundary_of(&ctype)?)?;
        return walk(&mut nested, bodies, attachments);
    }

    let name = part_filename(&part.headers, &ctype)?;
    let data = TransferEncoding::from_header(encoding.as_deref()).decode(part.body)?;
    attachments.push(Attachment::new(name, ctype.mimetype, data));

    Ok(())
}

/// Offset of the next `delimiter` that starts a line and is not a prefix of a
/// longer token
fn find_delimiter(body: &[u8], delimiter: &[u8], from: usize) -> Option<usize> {
    if from > body.len() {
        return None;
    }

    body[from..]
        .windows(delimiter.len())
        .enumerate()
        .map(|(i, window)| (from + i, window))
        .find(|&(at, window)| {
            window == delimiter
                && (at == 0 || body[at - 1] == b'\n')
                && ends_token(&body[at + delimiter.len()..])
        })
        .map(|(at, _)| at)
}

/// A delimiter line may only carry `--` and linear whitespace after the
/// boundary
fn ends_token(rest: &[u8]) -> bool {
    let rest = rest.strip_prefix(b"--").unwrap_or(rest);
    rest.iter()
        .find(|&&b| b != b' ' && b != b'\t')
        .is_none_or(|&b| b == b'\r' || b == b'\n')
}
