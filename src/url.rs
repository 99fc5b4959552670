//! `<url>` elements produced by scraper functions

use crate::error::{ScrapeError, ScrapeResult};
use crate::settings::parse_flag;
use quick_xml::Reader;
use quick_xml::events::{BytesStart, Event};
use serde::Serialize;

/// An address a scraper wants fetched, with its request options
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ScraperUrl {
    pub url: String,
    /// Function to run over the fetched page, if any
    pub function: Option<String>,
    /// Send the query string as a POST body
    pub post: bool,
    /// Referer to present
    pub spoof: Option<String>,
    /// Cache key the page should be stored under
    pub cache: Option<String>,
    pub gzip: bool,
}

impl ScraperUrl {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Self::default()
        }
    }

    /// Parse the first `<url>` element in `text`
    ///
    /// Text without any markup is taken as a bare address.
    pub fn parse(text: &str) -> ScrapeResult<Self> {
        let trimmed = text.trim();
        if !trimmed.contains('<') {
            if trimmed.is_empty() {
                return Err(ScrapeError::Parse("empty url".to_string()));
            }
            return Ok(Self::new(trimmed));
        }

        let mut reader = Reader::from_str(trimmed);
        let mut current: Option<ScraperUrl> = None;

        loop {
            match reader.read_event()? {
                Event::Start(e) if current.is_none() && e.name().as_ref() == b"url" => {
                    current = Some(Self::from_attributes(&e)?);
                }
                Event::Empty(e) if current.is_none() && e.name().as_ref() == b"url" => {
                    return Err(ScrapeError::Parse("url element has no address".to_string()));
                }
                Event::Text(t) => {
                    if let Some(url) = current.as_mut() {
                        let text = t.unescape()?;
                        url.url.push_str(&text);
                    }
                }
                Event::CData(c) => {
                    if let Some(url) = current.as_mut() {
                        url.url.push_str(&String::from_utf8_lossy(&c));
                    }
                }
                Event::End(e) if e.name().as_ref() == b"url" => {
                    if let Some(mut url) = current.take() {
                        url.url = url.url.trim().to_string();
                        return Ok(url);
                    }
                }
                Event::Eof => break,
                _ => {}
            }
        }

        Err(ScrapeError::Parse(format!(
            "no <url> element in {}",
            crate::document::truncate_for_log(trimmed)
        )))
    }

    pub(crate) fn from_attributes(e: &BytesStart) -> ScrapeResult<Self> {
        let mut url = Self::default();
        for attr in e.attributes() {
            let attr = attr.map_err(|e| ScrapeError::Parse(e.to_string()))?;
            let value = attr.unescape_value()?.into_owned();
            match attr.key.as_ref() {
                b"function" if !value.trim().is_empty() => url.function = Some(value),
                b"post" => url.post = parse_flag(&value).unwrap_or(false),
                b"spoof" => url.spoof = Some(value),
                b"cache" => url.cache = Some(value),
                b"gzip" => url.gzip = parse_flag(&value).unwrap_or(false),
                _ => {}
            }
        }
        Ok(url)
    }

    /// Split into the address and the body to post, if this is a POST request
    pub fn request_parts(&self) -> (&str, Option<&str>) {
        if self.post
            && let Some((address, query)) = self.url.split_once('?')
        {
            return (address, Some(query));
        }
        (&self.url, None)
    }
}
