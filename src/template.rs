//! Output template rendering
//!
//! Templates carry three kinds of tokens, substituted in this order:
//! 1. `\N` - capture group N of the current match
//! 2. `$$N` - content of register N
//! 3. `$INFO[key]` - value of a setting
//!
//! Every stage scans the whole template as left by the previous stage, but
//! text inserted by any stage is never scanned again. A capture group that
//! happens to contain `$$1` therefore comes out verbatim.

use regex::{Captures, Regex};
use std::sync::LazyLock;

static BACKREFERENCE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\\([0-9])").unwrap_or_else(|e| panic!("backreference regex: {}", e))
});

static REGISTER_REFERENCE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\$\$([0-9]+)").unwrap_or_else(|e| panic!("register regex: {}", e))
});

static PROPERTY_REFERENCE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\$INFO\[([^\]]+)\]").unwrap_or_else(|e| panic!("property regex: {}", e))
});

/// Supplies register and setting values while rendering
pub trait Resolve {
    /// Register content, already processed by the buffer-read rule
    fn register(&self, index: usize) -> String;

    /// Setting value, empty when unset
    fn property(&self, key: &str) -> String;
}

/// A run of template text, either still open for substitution or final
struct Piece {
    text: String,
    resolved: bool,
}

impl Piece {
    fn open(text: &str) -> Self {
        Self {
            text: text.to_string(),
            resolved: false,
        }
    }

    fn resolved(text: String) -> Self {
        Self {
            text,
            resolved: true,
        }
    }
}

fn expand<F>(pieces: Vec<Piece>, re: &Regex, mut replace: F) -> Vec<Piece>
where
    F: FnMut(&Captures) -> String,
{
    let mut out = Vec::with_capacity(pieces.len());
    for piece in pieces {
        if piece.resolved || !re.is_match(&piece.text) {
            out.push(piece);
            continue;
        }
        let mut last = 0;
        for caps in re.captures_iter(&piece.text) {
            let Some(whole) = caps.get(0) else { continue };
            if whole.start() > last {
                out.push(Piece::open(&piece.text[last..whole.start()]));
            }
            out.push(Piece::resolved(replace(&caps)));
            last = whole.end();
        }
        if last < piece.text.len() {
            out.push(Piece::open(&piece.text[last..]));
        }
    }
    out
}

fn join(pieces: Vec<Piece>) -> String {
    pieces.into_iter().map(|p| p.text).collect()
}

fn register_index(caps: &Captures) -> Option<usize> {
    caps.get(1).and_then(|m| m.as_str().parse().ok())
}

/// Render an output template against a match's group array
pub fn render<G: AsRef<str>>(template: &str, groups: &[G], ctx: &dyn Resolve) -> String {
    let pieces = vec![Piece::open(template)];
    let pieces = expand(pieces, &BACKREFERENCE, |caps| {
        caps[1]
            .parse::<usize>()
            .ok()
            .and_then(|i| groups.get(i))
            .map(|g| g.as_ref().to_string())
            .unwrap_or_default()
    });
    let pieces = expand(pieces, &REGISTER_REFERENCE, |caps| {
        register_index(caps)
            .map(|i| ctx.register(i))
            .unwrap_or_default()
    });
    let pieces = expand(pieces, &PROPERTY_REFERENCE, |caps| ctx.property(&caps[1]));
    join(pieces)
}

/// Replace only `$$N` tokens; used on expression patterns
pub fn substitute_registers(text: &str, ctx: &dyn Resolve) -> String {
    if !text.contains("$$") {
        return text.to_string();
    }
    join(expand(vec![Piece::open(text)], &REGISTER_REFERENCE, |caps| {
        register_index(caps)
            .map(|i| ctx.register(i))
            .unwrap_or_default()
    }))
}

/// Replace only `$INFO[key]` tokens; used on register reads
pub fn substitute_properties<F>(text: &str, mut lookup: F) -> String
where
    F: FnMut(&str) -> String,
{
    if !text.contains("$INFO[") {
        return text.to_string();
    }
    join(expand(vec![Piece::open(text)], &PROPERTY_REFERENCE, |caps| {
        lookup(&caps[1])
    }))
}

/// Register indices referenced by `$$N` tokens, in order of appearance
pub fn register_references(text: &str) -> Vec<usize> {
    REGISTER_REFERENCE
        .captures_iter(text)
        .filter_map(|caps| register_index(&caps))
        .collect()
}
