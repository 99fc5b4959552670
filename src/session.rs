//! The conventional search/details flow over a pluggable document source

use crate::document::decode_document;
use crate::error::{ScrapeError, ScrapeResult};
use crate::processor::Processor;
use crate::url::ScraperUrl;
use quick_xml::Reader;
use quick_xml::events::Event;
use serde::Serialize;

pub const CREATE_SEARCH_URL: &str = "CreateSearchUrl";
pub const GET_SEARCH_RESULTS: &str = "GetSearchResults";
pub const GET_DETAILS: &str = "GetDetails";

/// Fetches (and possibly caches) documents on behalf of a scraper
///
/// Implementations key their cache by `(provider_id, url)`.
pub trait DocumentSource {
    fn fetch(&self, provider_id: &str, url: &ScraperUrl) -> ScrapeResult<Vec<u8>>;
}

impl<T: DocumentSource + ?Sized> DocumentSource for &T {
    fn fetch(&self, provider_id: &str, url: &ScraperUrl) -> ScrapeResult<Vec<u8>> {
        (**self).fetch(provider_id, url)
    }
}

/// One `<entity>` of a `GetSearchResults` document
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SearchResult {
    pub title: String,
    pub year: Option<String>,
    pub id: Option<String>,
    pub url: Option<ScraperUrl>,
}

pub struct ScrapeSession<'a, S: DocumentSource> {
    processor: Processor<'a>,
    source: S,
}

impl<'a, S: DocumentSource> ScrapeSession<'a, S> {
    pub fn new(processor: Processor<'a>, source: S) -> Self {
        Self { processor, source }
    }

    pub fn processor(&self) -> &Processor<'a> {
        &self.processor
    }

    fn provider_id(&self) -> &str {
        &self.processor.definition().id
    }

    /// Run `CreateSearchUrl` with the title in `$$1` and the year in `$$2`
    pub fn create_search_url(&self, title: &str, year: Option<&str>) -> ScrapeResult<ScraperUrl> {
        let output = self.processor.try_execute_function(
            CREATE_SEARCH_URL,
            &["", title, year.unwrap_or("")],
        )?;
        log::debug!("{} produced {}", CREATE_SEARCH_URL, output);
        ScraperUrl::parse(&output)
    }

    /// Fetch a results page and parse what `GetSearchResults` makes of it
    pub fn search(&self, url: &ScraperUrl) -> ScrapeResult<Vec<SearchResult>> {
        let document = self.fetch_document(url)?;
        let function = url.function.as_deref().unwrap_or(GET_SEARCH_RESULTS);
        let output = self
            .processor
            .try_execute_function(function, &["", document.as_str(), url.url.as_str()])?;
        parse_results(&output)
    }

    /// Fetch a details page and return the `<details>` document built from it
    pub fn details(&self, url: &ScraperUrl, id: &str) -> ScrapeResult<String> {
        let document = self.fetch_document(url)?;
        let function = url.function.as_deref().unwrap_or(GET_DETAILS);
        self.processor
            .try_execute_function(function, &["", document.as_str(), id, url.url.as_str()])
    }

    fn fetch_document(&self, url: &ScraperUrl) -> ScrapeResult<String> {
        log::info!("Fetching {} for {}", url.url, self.provider_id());
        let bytes = self.source.fetch(self.provider_id(), url)?;
        decode_document(&bytes)
    }
}

/// Read the `<entity>` list of a search results document
pub fn parse_results(xml: &str) -> ScrapeResult<Vec<SearchResult>> {
    let mut reader = Reader::from_str(xml);
    let mut results = Vec::new();
    let mut current: Option<SearchResult> = None;
    let mut field: Option<Vec<u8>> = None;

    loop {
        match reader.read_event()? {
            Event::Start(e) => match e.name().as_ref() {
                b"entity" => current = Some(SearchResult::default()),
                b"url" if current.is_some() => {
                    if let Some(entity) = current.as_mut() {
                        entity.url = Some(ScraperUrl::from_attributes(&e)?);
                    }
                    field = Some(b"url".to_vec());
                }
                name if current.is_some() => field = Some(name.to_vec()),
                _ => {}
            },
            Event::Text(t) => {
                if let (Some(entity), Some(name)) = (current.as_mut(), field.as_deref()) {
                    let text = t.unescape()?;
                    append_field(entity, name, &text);
                }
            }
            Event::CData(c) => {
                if let (Some(entity), Some(name)) = (current.as_mut(), field.as_deref()) {
                    append_field(entity, name, &String::from_utf8_lossy(&c));
                }
            }
            Event::End(e) => {
                if e.name().as_ref() == b"entity" {
                    if let Some(entity) = current.take() {
                        results.push(finish(entity));
                    }
                } else {
                    field = None;
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }

    if current.is_some() {
        return Err(ScrapeError::Parse("unterminated <entity> in search results".to_string()));
    }
    Ok(results)
}

fn append_field(entity: &mut SearchResult, name: &[u8], text: &str) {
    match name {
        b"title" => entity.title.push_str(text),
        b"year" => entity.year.get_or_insert_with(String::new).push_str(text),
        b"id" => entity.id.get_or_insert_with(String::new).push_str(text),
        b"url" => {
            if let Some(url) = entity.url.as_mut() {
                url.url.push_str(text);
            }
        }
        _ => {}
    }
}

fn finish(mut entity: SearchResult) -> SearchResult {
    entity.title = entity.title.trim().to_string();
    entity.year = entity.year.map(|y| y.trim().to_string()).filter(|y| !y.is_empty());
    entity.id = entity.id.map(|i| i.trim().to_string()).filter(|i| !i.is_empty());
    entity.url = entity.url.and_then(|mut url| {
        url.url = url.url.trim().to_string();
        (!url.url.is_empty()).then_some(url)
    });
    entity
}
