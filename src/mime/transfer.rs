//! Content-Transfer-Encoding decoding

use crate::mime::error::MimeError;

use base64::{Engine as _, engine::general_purpose};
use charset::Charset;
use log::{debug, warn};
use quoted_printable::ParseMode;
use std::io::Read;

/// Transfer encodings a part may declare
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferEncoding {
    /// 7bit, 8bit, binary, absent or anything unrecognized
    Identity,
    Base64,
    QuotedPrintable,
}

impl TransferEncoding {
    /// Classify a `Content-Transfer-Encoding` header value by substring match
    pub fn from_header(value: Option<&str>) -> Self {
        match value {
            Some(v) if v.contains("base64") => Self::Base64,
            Some(v) if v.contains("quoted-printable") => Self::QuotedPrintable,
            _ => Self::Identity,
        }
    }

    /// Reverse the encoding over a fully buffered part
    pub fn decode(self, raw: &[u8]) -> Result<Vec<u8>, MimeError> {
        match self {
            Self::Identity => Ok(raw.to_vec()),
            Self::Base64 => decode_base64(raw),
            Self::QuotedPrintable => Ok(quoted_printable::decode(raw, ParseMode::Robust)?),
        }
    }
}

/// Decode standard base64, ignoring the line breaks mail encoders insert
pub(crate) fn decode_base64(raw: &[u8]) -> Result<Vec<u8>, MimeError> {
    let compact: Vec<u8> = raw
        .iter()
        .copied()
        .filter(|b| !b.is_ascii_whitespace())
        .collect();

    Ok(general_purpose::STANDARD.decode(compact)?)
}

/// Read a text part, reverse its transfer encoding and convert it from
/// `charset` to UTF-8.
///
/// Read failures propagate. A body whose declared encoding cannot be reversed
/// is logged and yields an empty string so the rest of the message can still
/// be previewed.
pub fn read_part_content<R: Read>(
    mut part: R,
    encoding: Option<&str>,
    charset: Option<&str>,
) -> Result<String, MimeError> {
    let mut raw = Vec::new();
    part.read_to_end(&mut raw)?;

    let encoding = TransferEncoding::from_header(encoding);
    match encoding.decode(&raw) {
        Ok(decoded) => Ok(decode_text(&decoded, charset)),
        Err(e) => {
            warn!("Discarding undecodable {encoding:?} body: {e}");
            Ok(String::new())
        }
    }
}

/// Convert text in a declared charset to UTF-8.
///
/// Absent, ASCII and UTF-8 labels are read as lossy UTF-8, and so are
/// labels the `charset` crate does not know.
pub fn decode_text(bytes: &[u8], charset: Option<&str>) -> String {
    let label = charset.map(str::trim).unwrap_or_default().to_ascii_lowercase();
    match label.as_str() {
        "" | "utf-8" | "utf8" | "us-ascii" | "ascii" => String::from_utf8_lossy(bytes).into_owned(),
        _ => match Charset::for_label(label.as_bytes()) {
            Some(cs) => cs.decode(bytes).0.into_owned(),
            None => {
                debug!("Reading body in unknown charset {label:?} as UTF-8");
                String::from_utf8_lossy(bytes).into_owned()
            }
        },
    }
}
