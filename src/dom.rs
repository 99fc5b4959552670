//! HTML fragment helpers wrapping scraper (html5ever)
//!
//! Capture groups and rendered values are small, often broken, fragments of
//! markup. Parsing them with html5ever gives entity decoding and tag
//! stripping that tolerates whatever the page happened to contain.

use ego_tree::iter::Edge;
use scraper::{ElementRef, Html, Node, Selector};
use std::borrow::Cow;
use std::sync::LazyLock;

static CALL_SELECTOR: LazyLock<Selector> = LazyLock::new(|| {
    Selector::parse("[function]:not(chain)")
        .unwrap_or_else(|e| panic!("Failed to build call selector: {}", e))
});

/// A parsed markup fragment
#[derive(Debug, Clone)]
pub struct Fragment {
    html: Html,
}

/// An element asking for a scraper function to run on its content
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallSite {
    /// Element name carrying the `function` attribute, e.g. `url`
    pub tag: String,
    pub function: String,
    /// Text content of the element
    pub payload: String,
}

impl Fragment {
    pub fn parse(source: &str) -> Self {
        Self {
            html: Html::parse_fragment(source),
        }
    }

    /// Concatenated text nodes, markup removed and entities decoded
    pub fn text(&self) -> String {
        let mut out = String::new();
        for edge in self.html.tree.root().traverse() {
            if let Edge::Open(node) = edge
                && let Node::Text(text) = node.value()
            {
                out.push_str(text);
            }
        }
        out
    }

    /// First element other than `<chain>` carrying a `function` attribute
    pub fn call_site(&self) -> Option<CallSite> {
        self.html.select(&CALL_SELECTOR).next().and_then(call_site_from_element)
    }
}

fn call_site_from_element(el: ElementRef) -> Option<CallSite> {
    let function = el.value().attr("function")?.trim();
    if function.is_empty() {
        return None;
    }
    Some(CallSite {
        tag: el.value().name().to_string(),
        function: function.to_string(),
        payload: el.text().collect(),
    })
}

/// Strip markup and decode entities from a captured group
pub fn clean_html(group: &str) -> Cow<'_, str> {
    if !group.contains('<') {
        return if group.contains('&') {
            html_escape::decode_html_entities(group)
        } else {
            Cow::Borrowed(group)
        };
    }
    Cow::Owned(Fragment::parse(group).text())
}
