//! Repairs for known-bad XML found in scraper addons and scraped pages
//!
//! - `<?xml ... ?>` declarations carrying attributes other than
//!   version/encoding/standalone
//! - raw `<` / `>` inside attribute values
//! - `document.write("<sc" + "ript ...")` style obfuscated script tags
//! - HTML named entities that XML does not declare

use regex::{Captures, Regex};
use std::borrow::Cow;
use std::sync::LazyLock;

static XML_DECLARATION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"<\?xml(\s[^?]*)?\?>").unwrap_or_else(|e| panic!("declaration regex: {}", e))
});

static DECLARATION_ATTR: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"([A-Za-z_:][-\w.:]*)\s*=\s*("[^"]*"|'[^']*')"#)
        .unwrap_or_else(|e| panic!("attribute regex: {}", e))
});

static SPLIT_SCRIPT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)<(/?)sc(["']\s*\+\s*["'])ript"#)
        .unwrap_or_else(|e| panic!("script regex: {}", e))
});

static NAMED_ENTITY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"&([A-Za-z][A-Za-z0-9]*);").unwrap_or_else(|e| panic!("entity regex: {}", e))
});

const DECLARATION_KEYS: [&str; 3] = ["version", "encoding", "standalone"];
const XML_ENTITIES: [&str; 5] = ["lt", "gt", "amp", "quot", "apos"];

/// Apply every structural repair the parser relies on
pub fn repair_xml(text: &str) -> String {
    let text = fix_declaration(text);
    let text = neutralize_split_scripts(&text);
    escape_attribute_brackets(&text).into_owned()
}

/// Repairs applied when a register is read
///
/// Register contents are arbitrary documents, so only the header and script
/// repairs apply; escaping attribute brackets would rewrite scraped markup.
pub fn repair_buffer(text: &str) -> Cow<'_, str> {
    if !text.contains("<?xml") && !text.contains("+") {
        return Cow::Borrowed(text);
    }
    match fix_declaration(text) {
        Cow::Borrowed(b) => neutralize_split_scripts(b),
        Cow::Owned(o) => Cow::Owned(neutralize_split_scripts(&o).into_owned()),
    }
}

/// Strip unrecognized attributes from the XML declaration
pub fn fix_declaration(text: &str) -> Cow<'_, str> {
    XML_DECLARATION.replace_all(text, |caps: &Captures| {
        let attrs = caps.get(1).map(|m| m.as_str()).unwrap_or("");
        let kept: Vec<&str> = DECLARATION_ATTR
            .captures_iter(attrs)
            .filter(|c| DECLARATION_KEYS.contains(&c[1].to_ascii_lowercase().as_str()))
            .filter_map(|c| c.get(0).map(|m| m.as_str()))
            .collect();
        if kept.is_empty() {
            "<?xml version=\"1.0\"?>".to_string()
        } else {
            format!("<?xml {}?>", kept.join(" "))
        }
    })
}

/// Turn `"<sc" + "ript"` into `"&lt;sc" + "ript"` so it no longer opens a tag
pub fn neutralize_split_scripts(text: &str) -> Cow<'_, str> {
    SPLIT_SCRIPT.replace_all(text, "&lt;${1}sc${2}ript")
}

/// Escape `<` and `>` appearing inside quoted attribute values
///
/// Walks the markup with a small state machine so text content, comments,
/// CDATA sections and processing instructions are left untouched.
pub fn escape_attribute_brackets(text: &str) -> Cow<'_, str> {
    #[derive(Clone, Copy, PartialEq)]
    enum State {
        Text,
        Tag,
        Value(char),
    }

    let mut out = String::with_capacity(text.len());
    let mut state = State::Text;
    let mut changed = false;
    let mut rest = text;

    while let Some(c) = rest.chars().next() {
        if state == State::Text && c == '<' {
            // Skip constructs whose content must stay verbatim
            let verbatim = [("<!--", "-->"), ("<![CDATA[", "]]>"), ("<?", "?>"), ("<!", ">")]
                .into_iter()
                .find(|(open, _)| rest.starts_with(open));
            if let Some((open, close)) = verbatim {
                let end = rest[open.len()..]
                    .find(close)
                    .map(|i| open.len() + i + close.len())
                    .unwrap_or(rest.len());
                out.push_str(&rest[..end]);
                rest = &rest[end..];
                continue;
            }
            state = State::Tag;
            out.push(c);
        } else {
            match (state, c) {
                (State::Tag, '"' | '\'') => {
                    state = State::Value(c);
                    out.push(c);
                }
                (State::Tag, '>') => {
                    state = State::Text;
                    out.push(c);
                }
                (State::Value(q), _) if c == q => {
                    state = State::Tag;
                    out.push(c);
                }
                (State::Value(_), '<') => {
                    changed = true;
                    out.push_str("&lt;");
                }
                (State::Value(_), '>') => {
                    changed = true;
                    out.push_str("&gt;");
                }
                _ => out.push(c),
            }
        }
        rest = &rest[c.len_utf8()..];
    }

    if changed {
        Cow::Owned(out)
    } else {
        Cow::Borrowed(text)
    }
}

/// Replace HTML named entities XML does not know with their characters
///
/// Only used as a fallback when a definition fails to parse; the five XML
/// entities are preserved so markup escaping survives.
pub fn decode_html_entities(text: &str) -> Cow<'_, str> {
    NAMED_ENTITY.replace_all(text, |caps: &Captures| {
        let whole = &caps[0];
        if XML_ENTITIES.contains(&&caps[1]) {
            return whole.to_string();
        }
        let decoded = html_escape::decode_html_entities(whole);
        if decoded == whole {
            whole.to_string()
        } else {
            // Re-escape in case the entity stood for a markup character
            html_escape::encode_text(&decoded).into_owned()
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn declaration_keeps_known_attributes() {
        let fixed = fix_declaration(
            r#"<?xml version="1.0" encoding="UTF-8" standalone="yes" generator="x"?><a/>"#,
        );
        assert_eq!(
            fixed,
            r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?><a/>"#
        );
    }

    #[test]
    fn declaration_without_known_attributes() {
        assert_eq!(fix_declaration("<?xml foo='1'?><a/>"), "<?xml version=\"1.0\"?><a/>");
    }

    #[test]
    fn brackets_escaped_only_inside_values() {
        let xml = r#"<RegExp output="<title>\1</title>" dest="3"><expression>a&lt;b</expression></RegExp>"#;
        assert_eq!(
            escape_attribute_brackets(xml),
            r#"<RegExp output="&lt;title&gt;\1&lt;/title&gt;" dest="3"><expression>a&lt;b</expression></RegExp>"#
        );
    }

    #[test]
    fn quotes_in_text_do_not_open_values() {
        let xml = r#"<e>href="x"</e><f a='<'/>"#;
        assert_eq!(escape_attribute_brackets(xml), r#"<e>href="x"</e><f a='&lt;'/>"#);
    }

    #[test]
    fn comments_and_cdata_untouched() {
        let xml = r#"<!-- a="<" --><e><![CDATA[ x="<>" ]]></e>"#;
        assert!(matches!(escape_attribute_brackets(xml), Cow::Borrowed(_)));
    }

    #[test]
    fn split_script_neutralized() {
        let html = r#"document.write("<sc" + "ript src='a.js'></sc" + "ript>");"#;
        assert_eq!(
            neutralize_split_scripts(html),
            r#"document.write("&lt;sc" + "ript src='a.js'>&lt;/sc" + "ript>");"#
        );
    }

    #[test]
    fn html_entities_decoded_but_xml_entities_kept() {
        assert_eq!(decode_html_entities("&Iacute;ndice &amp; &lt;b&gt;"), "Índice &amp; &lt;b&gt;");
        assert_eq!(decode_html_entities("&bogus;"), "&bogus;");
    }

    #[test]
    fn buffer_repair_is_cheap_for_plain_text() {
        assert!(matches!(repair_buffer("<title>Alien</title>"), Cow::Borrowed(_)));
    }
}
