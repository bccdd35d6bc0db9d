//! Header and filename decoding (RFC 2047 encoded-words)

use crate::mime::error::MimeError;

use base64::Engine as _;
use base64::alphabet;
use base64::engine::{DecodePaddingMode, GeneralPurpose, GeneralPurposeConfig};
use log::debug;
use mailparse::{MailHeader, MailHeaderMap, ParsedContentType, parse_content_disposition};

/// Name given to attachments that declare no filename
pub const DEFAULT_ATTACHMENT_NAME: &str = "attachment";

/// Encoders disagree on padding inside encoded-words, so accept both forms
const WORD_ENGINE: GeneralPurpose = GeneralPurpose::new(
    &alphabet::STANDARD,
    GeneralPurposeConfig::new().with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

/// Header fields the preview needs, already decoded
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DecodedHeaders {
    pub from: String,
    pub to: Vec<String>,
    pub cc: Vec<String>,
    pub bcc: Vec<String>,
    pub subject: String,
}

/// Extract From, To, Cc, Bcc and Subject from a parsed header block
pub fn decode_headers(headers: &[MailHeader<'_>]) -> Result<DecodedHeaders, MimeError> {
    let get = |key: &str| {
        headers
            .get_first_header(key)
            .map(header_text)
            .unwrap_or_default()
    };

    Ok(DecodedHeaders {
        from: get("From"),
        to: split_addresses(&get("To")),
        cc: split_addresses(&get("Cc")),
        bcc: split_addresses(&get("Bcc")),
        subject: decode_words(&get("Subject"))?,
    })
}

/// Unfolded header value without any encoded-word decoding
pub(crate) fn header_text(header: &MailHeader<'_>) -> String {
    String::from_utf8_lossy(header.get_value_raw())
        .replace("\r\n", "")
        .replace('\n', "")
        .trim()
        .to_owned()
}

/// Split an address header on commas, trimming each entry.
///
/// An empty header yields a single empty entry rather than no entries.
pub fn split_addresses(value: &str) -> Vec<String> {
    value.split(',').map(|addr| addr.trim().to_owned()).collect()
}

/// Decode the base64 encoded-words in a header value.
///
/// Text outside encoded-words is kept as is, and whitespace separating two
/// adjacent encoded-words is dropped. Words using the `Q` encoding or a
/// charset we cannot convert are left verbatim. A `B` word whose payload is
/// not valid base64 (or not valid in its charset) is an error.
pub fn decode_words(value: &str) -> Result<String, MimeError> {
    let mut out = String::with_capacity(value.len());
    let mut rest = value;
    let mut after_word = false;

    while let Some(start) = rest.find("=?") {
        let Some(word) = EncodedWord::locate(&rest[start..]) else {
            out.push_str(&rest[..start + 2]);
            rest = &rest[start + 2..];
            after_word = false;
            continue;
        };

        let between = &rest[..start];
        let decoded = word.decode()?;
        if !(after_word && decoded.is_some() && between.trim().is_empty()) {
            out.push_str(between);
        }

        match decoded {
            Some(text) => {
                out.push_str(&text);
                after_word = true;
            }
            None => {
                out.push_str(word.raw);
                after_word = false;
            }
        }
        rest = &rest[start + word.raw.len()..];
    }

    out.push_str(rest);
    Ok(out)
}

/// Decode an attachment filename parameter
pub fn decode_filename(value: &str) -> Result<String, MimeError> {
    decode_words(value.trim())
}

/// Recover the filename of an attachment part.
///
/// Prefers the `filename` parameter of `Content-Disposition`, then the
/// `name` parameter of `Content-Type`.
pub fn part_filename(
    headers: &[MailHeader<'_>],
    ctype: &ParsedContentType,
) -> Result<String, MimeError> {
    let from_disposition = headers
        .get_first_header("Content-Disposition")
        .map(|h| parse_content_disposition(&header_text(h)))
        .and_then(|d| d.params.get("filename").cloned());

    match from_disposition.or_else(|| ctype.params.get("name").cloned()) {
        Some(raw) if !raw.trim().is_empty() => decode_filename(&raw),
        _ => Ok(DEFAULT_ATTACHMENT_NAME.to_owned()),
    }
}

/// One `=?charset?encoding?payload?=` occurrence, located by its delimiters
#[derive(Debug)]
struct EncodedWord<'a> {
    raw: &'a str,
    charset: &'a str,
    encoding: &'a str,
    payload: &'a str,
}

impl<'a> EncodedWord<'a> {
    /// Parse an encoded-word at the start of `s`, which begins with `=?`
    fn locate(s: &'a str) -> Option<Self> {
        let inner = s.strip_prefix("=?")?;

        let charset_end = inner.find('?')?;
        let charset = &inner[..charset_end];

        let after_charset = &inner[charset_end + 1..];
        let encoding_end = after_charset.find('?')?;
        let encoding = &after_charset[..encoding_end];

        let after_encoding = &after_charset[encoding_end + 1..];
        let payload_end = after_encoding.find("?=")?;
        let payload = &after_encoding[..payload_end];

        if charset.is_empty()
            || encoding.len() != 1
            || charset.contains(char::is_whitespace)
            || payload.contains(char::is_whitespace)
        {
            return None;
        }

        let len = 2 + charset_end + 1 + encoding_end + 1 + payload_end + 2;
        Some(Self {
            raw: &s[..len],
            charset,
            encoding,
            payload,
        })
    }

    /// Decoded text, or `None` when the word should stay verbatim
    fn decode(&self) -> Result<Option<String>, MimeError> {
        if !self.encoding.eq_ignore_ascii_case("b") {
            debug!("Leaving {:?} encoded-word verbatim", self.encoding);
            return Ok(None);
        }

        let bytes = WORD_ENGINE
            .decode(self.payload)
            .map_err(|e| self.error(e.to_string()))?;

        // RFC 2231 allows a language suffix after the charset
        let charset = self
            .charset
            .split('*')
            .next()
            .unwrap_or(self.charset)
            .to_ascii_lowercase();

        match charset.as_str() {
            "utf-8" | "utf8" | "us-ascii" => String::from_utf8(bytes)
                .map(Some)
                .map_err(|e| self.error(e.to_string())),
            "iso-8859-1" | "latin1" | "latin-1" => {
                Ok(Some(bytes.into_iter().map(char::from).collect()))
            }
            other => {
                debug!("Leaving encoded-word in unsupported charset {other:?} verbatim");
                Ok(None)
            }
        }
    }

    fn error(&self, reason: String) -> MimeError {
        MimeError::EncodedWord {
            word: self.raw.to_owned(),
            reason,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use base64::engine::general_purpose;
    use mailparse::parse_headers;

    fn encode_subject(text: &str) -> String {
        format!("=?UTF-8?B?{}?=", general_purpose::STANDARD.encode(text))
    }

    #[test]
    fn test_plain_value_is_verbatim() {
        assert_eq!(decode_words("Weekly report").unwrap(), "Weekly report");
        assert_eq!(decode_words("").unwrap(), "");
    }

    #[test]
    fn test_decode_single_word() {
        assert_eq!(decode_words("=?UTF-8?B?cmVwb3J0?=").unwrap(), "report");
        assert_eq!(decode_words("=?utf-8?b?5Lu25ZCN?=").unwrap(), "件名");
    }

    #[test]
    fn test_encode_decode_roundtrip() {
        for subject in ["Hello", "Grüße aus Köln", "日本語の件名", "a?b=c"] {
            assert_eq!(decode_words(&encode_subject(subject)).unwrap(), subject);
        }
    }

    #[test]
    fn test_adjacent_words_are_joined() {
        let value = "=?UTF-8?B?SGVsbG8s?= =?UTF-8?B?IHdvcmxk?=";
        assert_eq!(decode_words(value).unwrap(), "Hello, world");
    }

    #[test]
    fn test_surrounding_text_is_kept() {
        let value = "Re: =?UTF-8?B?cmVwb3J0?= (draft)";
        assert_eq!(decode_words(value).unwrap(), "Re: report (draft)");
    }

    #[test]
    fn test_q_words_stay_verbatim() {
        let value = "=?UTF-8?Q?caf=C3=A9?=";
        assert_eq!(decode_words(value).unwrap(), value);
    }

    #[test]
    fn test_unsupported_charset_stays_verbatim() {
        let value = "=?koi8-r?B?8NLJ18XU?=";
        assert_eq!(decode_words(value).unwrap(), value);
    }

    #[test]
    fn test_latin1_word() {
        assert_eq!(decode_words("=?ISO-8859-1?B?Y2Fm6Q==?=").unwrap(), "café");
    }

    #[test]
    fn test_incomplete_marker_is_verbatim() {
        assert_eq!(decode_words("costs =? unknown").unwrap(), "costs =? unknown");
        assert_eq!(decode_words("=?UTF-8?B?cmVwb3J0").unwrap(), "=?UTF-8?B?cmVwb3J0");
    }

    #[test]
    fn test_corrupt_payload_is_error() {
        let err = decode_words("=?UTF-8?B?@@@@?=").unwrap_err();
        assert!(matches!(err, MimeError::EncodedWord { .. }));

        // Valid base64, invalid UTF-8
        let err = decode_words("=?UTF-8?B?/w==?=").unwrap_err();
        assert!(matches!(err, MimeError::EncodedWord { .. }));
    }

    #[test]
    fn test_filename_of_any_length() {
        let long = "quarterly-financial-statement-final-v2.pdf";
        let encoded = encode_subject(long);
        assert_eq!(decode_filename(&encoded).unwrap(), long);
        assert_eq!(decode_filename("plain.txt").unwrap(), "plain.txt");
    }

    #[test]
    fn test_split_addresses() {
        assert_eq!(
            split_addresses("a@example.com, b@example.com"),
            vec!["a@example.com", "b@example.com"]
        );
        assert_eq!(
            split_addresses("a@example.com,\tb@example.com ,c@example.com"),
            vec!["a@example.com", "b@example.com", "c@example.com"]
        );
        assert_eq!(split_addresses(""), vec![""]);
    }

    #[test]
    fn test_decode_headers() {
        let raw = b"From: Alice <alice@example.com>\r\n\
To: bob@example.com,\r\n carol@example.com\r\n\
Subject: =?UTF-8?B?SGVsbG8=?=\r\n\r\n";
        let (headers, _) = parse_headers(raw).unwrap();

        let decoded = decode_headers(&headers).unwrap();
        assert_eq!(decoded.from, "Alice <alice@example.com>");
        assert_eq!(decoded.to, vec!["bob@example.com", "carol@example.com"]);
        assert_eq!(decoded.cc, vec![""]);
        assert_eq!(decoded.bcc, vec![""]);
        assert_eq!(decoded.subject, "Hello");
    }

    #[test]
    fn test_part_filename_sources() {
        let raw = b"Content-Type: application/pdf; name=\"fallback.pdf\"\r\n\
Content-Disposition: attachment; filename=\"=?UTF-8?B?cmVwb3J0?=\"\r\n\r\n";
        let (headers, _) = parse_headers(raw).unwrap();
        let ctype = mailparse::parse_content_type("application/pdf; name=\"fallback.pdf\"");
        assert_eq!(part_filename(&headers, &ctype).unwrap(), "report");

        let raw = b"Content-Type: application/pdf; name=\"fallback.pdf\"\r\n\r\n";
        let (headers, _) = parse_headers(raw).unwrap();
        assert_eq!(part_filename(&headers, &ctype).unwrap(), "fallback.pdf");

        let ctype = mailparse::parse_content_type("application/pdf");
        assert_eq!(
            part_filename(&headers, &ctype).unwrap(),
            DEFAULT_ATTACHMENT_NAME
        );
    }
}
