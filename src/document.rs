//! Charset handling for definition files and fetched documents

use crate::error::{ScrapeError, ScrapeResult};

/// Charsets tried in order when decoding bytes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Charset {
    Utf8,
    Latin1,
    Ascii,
}

impl Charset {
    pub const FALLBACK_ORDER: [Charset; 3] = [Charset::Utf8, Charset::Latin1, Charset::Ascii];

    pub fn name(self) -> &'static str {
        match self {
            Charset::Utf8 => "UTF-8",
            Charset::Latin1 => "ISO-8859-1",
            Charset::Ascii => "US-ASCII",
        }
    }

    /// Decode bytes, or `None` if they are not valid in this charset
    pub fn decode(self, bytes: &[u8]) -> Option<String> {
        match self {
            Charset::Utf8 => {
                let bytes = bytes.strip_prefix(b"\xEF\xBB\xBF").unwrap_or(bytes);
                std::str::from_utf8(bytes).ok().map(str::to_string)
            }
            // C1 control bytes never appear in real Latin-1 text; treat them as a mismatch
            Charset::Latin1 => {
                if bytes.iter().any(|b| (0x80..0xA0).contains(b)) {
                    None
                } else {
                    Some(bytes.iter().map(|&b| char::from(b)).collect())
                }
            }
            Charset::Ascii => {
                if bytes.is_ascii() {
                    Some(bytes.iter().map(|&b| char::from(b)).collect())
                } else {
                    None
                }
            }
        }
    }
}

/// Decode a fetched document, trying each supported charset in turn
pub fn decode_document(bytes: &[u8]) -> ScrapeResult<String> {
    Charset::FALLBACK_ORDER
        .iter()
        .find_map(|charset| charset.decode(bytes))
        .ok_or_else(|| {
            let tried: Vec<&str> = Charset::FALLBACK_ORDER.iter().map(|c| c.name()).collect();
            ScrapeError::Encoding(format!(
                "{} bytes match none of {}",
                bytes.len(),
                tried.join(", ")
            ))
        })
}

/// Shorten a buffer for debug logging
pub fn truncate_for_log(text: &str) -> String {
    const LIMIT: usize = 200;
    match text.char_indices().nth(LIMIT) {
        Some((cut, _)) => format!("TRUNCATED({}): {}...", LIMIT, &text[..cut]),
        None => text.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn utf8_first() {
        assert_eq!(decode_document("Amélie".as_bytes()).unwrap(), "Amélie");
    }

    #[test]
    fn utf8_bom_stripped() {
        assert_eq!(decode_document(b"\xEF\xBB\xBF<a/>").unwrap(), "<a/>");
    }

    #[test]
    fn latin1_fallback() {
        // "Amélie" in ISO-8859-1
        assert_eq!(decode_document(b"Am\xE9lie").unwrap(), "Amélie");
    }

    #[test]
    fn undecodable_bytes_are_an_error() {
        let err = decode_document(b"\x81\xFE").unwrap_err();
        assert!(matches!(err, ScrapeError::Encoding(_)));
        assert!(err.to_string().contains("US-ASCII"));
    }

    #[test]
    fn truncation() {
        let long = "x".repeat(250);
        let short = truncate_for_log(&long);
        assert!(short.starts_with("TRUNCATED(200): "));
        assert_eq!(short.len(), "TRUNCATED(200): ".len() + 200 + 3);
        assert_eq!(truncate_for_log("short"), "short");
    }
}
