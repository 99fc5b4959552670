//! Addon manifest (`addon.xml`) reader

use crate::definition::ScraperDefinition;
use crate::error::{ScrapeError, ScrapeResult};
use crate::parser::{CommonLibrary, parse_definition};
use quick_xml::Reader;
use quick_xml::events::{BytesStart, Event};
use serde::Serialize;

/// Extension point prefix identifying metadata scrapers
const SCRAPER_EXTENSION: &str = "xbmc.metadata.scraper.";

/// Addons every scraper requires that carry no functions
const FRAMEWORK_IMPORTS: [&str; 2] = ["xbmc.metadata", "xbmc.addon"];

/// What a scraper addon provides metadata for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentKind {
    Movies,
    TvShows,
    MusicVideos,
    Albums,
    Artists,
    Other,
}

impl ContentKind {
    fn from_extension_point(point: &str) -> Self {
        match point.strip_prefix(SCRAPER_EXTENSION).unwrap_or("") {
            "movies" => ContentKind::Movies,
            "tvshows" => ContentKind::TvShows,
            "musicvideos" => ContentKind::MusicVideos,
            "albums" => ContentKind::Albums,
            "artists" => ContentKind::Artists,
            _ => ContentKind::Other,
        }
    }
}

/// The parts of `addon.xml` needed to load a scraper
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AddonManifest {
    pub id: String,
    pub name: String,
    pub version: String,
    /// Scraper library file, relative to the addon folder
    pub library: Option<String>,
    pub kind: Option<ContentKind>,
    /// Ids of required addons that may contribute shared functions
    pub imports: Vec<String>,
}

impl AddonManifest {
    pub fn parse(xml: &str) -> ScrapeResult<Self> {
        let mut reader = Reader::from_str(xml);
        let mut manifest = AddonManifest {
            id: String::new(),
            name: String::new(),
            version: String::new(),
            library: None,
            kind: None,
            imports: Vec::new(),
        };
        let mut path: Vec<String> = Vec::new();

        loop {
            match reader.read_event()? {
                Event::Start(e) => {
                    manifest.visit(&e, &path)?;
                    path.push(String::from_utf8_lossy(e.name().as_ref()).into_owned());
                }
                Event::Empty(e) => manifest.visit(&e, &path)?,
                Event::End(_) => {
                    path.pop();
                }
                Event::Eof => break,
                _ => {}
            }
        }

        if manifest.id.is_empty() {
            return Err(ScrapeError::Manifest("addon element has no id".to_string()));
        }
        Ok(manifest)
    }

    fn visit(&mut self, e: &BytesStart, path: &[String]) -> ScrapeResult<()> {
        let name = e.name();
        match (name.as_ref(), path.last().map(String::as_str)) {
            (b"addon", None) => {
                self.id = attribute(e, "id")?.unwrap_or_default();
                self.name = attribute(e, "name")?.unwrap_or_default();
                self.version = attribute(e, "version")?.unwrap_or_default();
            }
            (b"import", Some("requires")) => {
                if let Some(addon) = attribute(e, "addon")?
                    && !FRAMEWORK_IMPORTS.contains(&addon.as_str())
                {
                    self.imports.push(addon);
                }
            }
            (b"extension", Some("addon")) => {
                let point = attribute(e, "point")?.unwrap_or_default();
                if point.starts_with(SCRAPER_EXTENSION) {
                    self.kind = Some(ContentKind::from_extension_point(&point));
                    self.library = attribute(e, "library")?;
                }
            }
            _ => {}
        }
        Ok(())
    }

    /// Whether this addon scrapes a media type, as opposed to a shared library
    pub fn is_scraper(&self) -> bool {
        self.library.is_some() && matches!(self.kind, Some(kind) if kind != ContentKind::Other)
    }

    /// Parse this addon's library, merging the shared libraries it imports
    pub fn load_definition(
        &self,
        library: &[u8],
        commons: &[CommonLibrary],
    ) -> ScrapeResult<ScraperDefinition> {
        parse_definition(&self.id, library, &self.imports, commons)
    }
}

fn attribute(e: &BytesStart, key: &str) -> ScrapeResult<Option<String>> {
    for attr in e.attributes() {
        let attr = attr.map_err(|e| ScrapeError::Manifest(e.to_string()))?;
        if attr.key.as_ref() == key.as_bytes() {
            return Ok(Some(attr.unescape_value()?.into_owned()));
        }
    }
    Ok(None)
}
