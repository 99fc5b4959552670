//! Scraper definition parser
//!
//! Reads an addon's scraper XML into a [`ScraperDefinition`]:
//!
//! ```xml
//! <scraper>
//!   <GetTitle dest="3" clearbuffers="no">
//!     <RegExp input="$$1" output="\1" dest="3+" conditional="!skip">
//!       <RegExp .../>
//!       <expression noclean="1" repeat="yes" clear="no">&lt;title&gt;(.*?)&lt;/title&gt;</expression>
//!     </RegExp>
//!   </GetTitle>
//! </scraper>
//! ```
//!
//! Each child of the root element is a function named after its tag. Shared
//! `<scraperfunctions>` libraries declared as imports are merged in after the
//! addon's own functions.

use crate::definition::{DEFAULT_INPUT, Expression, Function, RegexNode, ScraperDefinition};
use crate::document::Charset;
use crate::error::{ScrapeError, ScrapeResult};
use crate::repair;
use crate::settings::parse_flag;
use quick_xml::Reader;
use quick_xml::events::{BytesStart, Event};
use std::collections::HashMap;

/// Root element of shared function libraries
const COMMON_ROOT: &str = "scraperfunctions";

/// A shared function library, as found next to the addon
#[derive(Debug, Clone)]
pub struct CommonLibrary {
    pub path: String,
    pub xml: Vec<u8>,
}

impl CommonLibrary {
    pub fn new(path: impl Into<String>, xml: impl Into<Vec<u8>>) -> Self {
        Self {
            path: path.into(),
            xml: xml.into(),
        }
    }

    fn is_imported_by(&self, imports: &[String]) -> bool {
        imports
            .iter()
            .any(|import| !import.is_empty() && self.path.contains(import.as_str()))
    }
}

/// Parse an addon library plus the shared libraries it imports
pub fn parse_definition(
    id: &str,
    library: &[u8],
    imports: &[String],
    commons: &[CommonLibrary],
) -> ScrapeResult<ScraperDefinition> {
    log::debug!("Preparing scraper {}", id);
    let parsed = parse_bytes(library)?;

    let mut definition = ScraperDefinition::new(id);
    for function in parsed.functions {
        definition.insert(function);
    }

    for common in commons.iter().filter(|c| c.is_imported_by(imports)) {
        log::debug!("Parsing imports from {}", common.path);
        match parse_bytes(&common.xml) {
            Ok(parsed) if parsed.root == COMMON_ROOT => {
                for function in parsed.functions {
                    definition.insert(function);
                }
            }
            Ok(parsed) => {
                log::debug!("Skipping {}: root element is <{}>", common.path, parsed.root);
            }
            Err(e) => log::error!("Problem parsing scraper functions in {}: {}", common.path, e),
        }
    }

    log::debug!("Scraper {} loaded with {} functions", id, definition.len());
    Ok(definition)
}

/// Parse already-decoded definition text without imports
pub fn parse_str(id: &str, xml: &str) -> ScrapeResult<ScraperDefinition> {
    parse_definition(id, xml.as_bytes(), &[], &[])
}

/// Functions read from one document
#[derive(Debug)]
struct ParsedDocument {
    root: String,
    functions: Vec<Function>,
}

/// Try each charset in turn; within one, retry once with HTML entities decoded
fn parse_bytes(bytes: &[u8]) -> ScrapeResult<ParsedDocument> {
    let mut last_error = ScrapeError::Parse("no supported charset could decode the input".to_string());

    for charset in Charset::FALLBACK_ORDER {
        let Some(text) = charset.decode(bytes) else {
            continue;
        };
        let text = repair::repair_xml(&text);

        match parse_functions(&text) {
            Ok(parsed) => return Ok(parsed),
            Err(e) => {
                log::warn!("Error parsing as {} ({}) - trying entity fallback", charset.name(), e);
                last_error = e;
            }
        }

        let decoded = repair::decode_html_entities(&text);
        if decoded != text {
            match parse_functions(&decoded) {
                Ok(parsed) => return Ok(parsed),
                Err(e) => last_error = e,
            }
        }
    }

    Err(last_error)
}

/// Element currently open while reading
enum Frame {
    Root,
    Function(Function),
    Node(RegexNode),
    Expression(Expression),
    /// Unknown element; everything inside is skipped
    Ignored,
}

fn parse_functions(xml: &str) -> ScrapeResult<ParsedDocument> {
    let mut reader = Reader::from_str(xml);
    let mut root: Option<String> = None;
    let mut stack: Vec<Frame> = Vec::new();
    let mut functions = Vec::new();

    loop {
        match reader.read_event()? {
            Event::Start(e) => {
                let frame = open_element(&e, &stack, &mut root)?;
                stack.push(frame);
            }
            Event::Empty(e) => {
                let frame = open_element(&e, &stack, &mut root)?;
                close_element(frame, &mut stack, &mut functions);
            }
            Event::End(_) => {
                let frame = stack
                    .pop()
                    .ok_or_else(|| ScrapeError::Parse("unbalanced end tag".to_string()))?;
                close_element(frame, &mut stack, &mut functions);
            }
            Event::Text(t) => {
                if let Some(Frame::Expression(expression)) = stack.last_mut() {
                    expression.pattern.push_str(&t.unescape()?);
                }
            }
            Event::CData(c) => {
                if let Some(Frame::Expression(expression)) = stack.last_mut() {
                    expression.pattern.push_str(&String::from_utf8_lossy(&c));
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }

    if !stack.is_empty() {
        return Err(ScrapeError::Parse(format!(
            "document ends with {} unclosed elements",
            stack.len()
        )));
    }
    let root = root.ok_or_else(|| ScrapeError::Parse("no root element".to_string()))?;

    Ok(ParsedDocument { root, functions })
}

fn open_element(
    e: &BytesStart,
    stack: &[Frame],
    root: &mut Option<String>,
) -> ScrapeResult<Frame> {
    let name = String::from_utf8_lossy(e.name().as_ref()).into_owned();

    let Some(parent) = stack.last() else {
        if root.is_some() {
            return Err(ScrapeError::Parse(format!("second root element <{}>", name)));
        }
        *root = Some(name);
        return Ok(Frame::Root);
    };

    let frame = match (parent, name.as_str()) {
        (Frame::Root, _) => {
            let attrs = attributes(e)?;
            let (dest, append) = parse_dest(attrs.get("dest").map(String::as_str));
            Frame::Function(Function {
                name: name.clone(),
                clear_buffers_on_entry: parse_bool(attrs.get("clearbuffers"), true),
                dest_register: dest,
                append_output: append,
                nodes: Vec::new(),
            })
        }
        (Frame::Function(_) | Frame::Node(_), "RegExp") => {
            let attrs = attributes(e)?;
            let (dest, append) = parse_dest(attrs.get("dest").map(String::as_str));
            let input = attrs.get("input").map(String::as_str).unwrap_or("");
            Frame::Node(RegexNode {
                input_ref: if input.is_empty() {
                    DEFAULT_INPUT.to_string()
                } else {
                    input.to_string()
                },
                output_template: attrs.get("output").cloned().unwrap_or_default(),
                dest_register: dest,
                append_output: append,
                conditional_key: attrs.get("conditional").filter(|c| !c.is_empty()).cloned(),
                children: Vec::new(),
                expression: None,
            })
        }
        (Frame::Node(_), "expression") => {
            let attrs = attributes(e)?;
            Frame::Expression(Expression {
                pattern: String::new(),
                clear_on_no_match: parse_bool(attrs.get("clear"), false),
                repeat: parse_bool(attrs.get("repeat"), false),
                no_clean_groups: parse_no_clean(attrs.get("noclean").map(String::as_str)),
            })
        }
        (Frame::Function(f), "expression") => {
            log::warn!("Unparseable expression directly under function {}; ignoring it", f.name);
            Frame::Ignored
        }
        _ => Frame::Ignored,
    };
    Ok(frame)
}

fn close_element(frame: Frame, stack: &mut [Frame], functions: &mut Vec<Function>) {
    match (frame, stack.last_mut()) {
        (Frame::Function(function), _) => functions.push(function),
        (Frame::Node(node), Some(Frame::Function(parent))) => parent.nodes.push(node),
        (Frame::Node(node), Some(Frame::Node(parent))) => parent.children.push(node),
        (Frame::Expression(expression), Some(Frame::Node(parent))) => {
            if parent.expression.is_some() {
                log::debug!("RegExp has more than one expression; keeping the last");
            }
            parent.expression = Some(expression);
        }
        _ => {}
    }
}

fn attributes(e: &BytesStart) -> ScrapeResult<HashMap<String, String>> {
    let mut attrs = HashMap::new();
    for attr in e.attributes() {
        let attr = attr.map_err(|e| ScrapeError::Parse(e.to_string()))?;
        let key = String::from_utf8_lossy(attr.key.as_ref()).into_owned();
        let value = attr.unescape_value()?.into_owned();
        attrs.insert(key, value);
    }
    Ok(attrs)
}

/// Read `N` or `N+`; a trailing `+` means append
fn parse_dest(value: Option<&str>) -> (usize, bool) {
    let value = value.unwrap_or("").trim();
    let (number, append) = match value.strip_suffix('+') {
        Some(number) => (number.trim(), true),
        None => (value, false),
    };
    if number.is_empty() {
        return (0, append);
    }
    match number.parse() {
        Ok(dest) => (dest, append),
        Err(_) => {
            log::warn!("Invalid dest '{}'; using register 0", value);
            (0, append)
        }
    }
}

fn parse_bool(value: Option<&String>, default: bool) -> bool {
    match value.map(|v| v.trim()) {
        None | Some("") => default,
        Some(v) => parse_flag(v).unwrap_or(false),
    }
}

fn parse_no_clean(value: Option<&str>) -> std::collections::BTreeSet<usize> {
    value
        .unwrap_or("")
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .filter_map(|s| match s.parse() {
            Ok(group) => Some(group),
            Err(_) => {
                log::warn!("Ignoring invalid noclean group '{}'", s);
                None
            }
        })
        .collect()
}
