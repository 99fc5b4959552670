//! Scraper definition model
//!
//! A scraper definition is the parsed form of an addon's XML:
//! - `Function`s keyed by name, each an ordered list of `RegexNode`s
//! - `RegexNode`s forming a tree, each with at most one `Expression`
//!
//! Everything here is immutable once the parser has built it. The processor
//! only ever borrows these types, so one definition can serve any number of
//! concurrent sessions.

use serde::Serialize;
use std::collections::{BTreeSet, HashMap};

/// Register that node input defaults to when the `input` attribute is absent
pub const DEFAULT_INPUT: &str = "$$1";

/// A single regular-expression rule
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Expression {
    pub pattern: String,
    /// Overwrite the destination with `""` when nothing matches
    pub clear_on_no_match: bool,
    /// Keep matching after the first hit and append every further match
    pub repeat: bool,
    /// Capture groups passed through without HTML cleaning
    pub no_clean_groups: BTreeSet<usize>,
}

impl Expression {
    pub fn new(pattern: impl Into<String>) -> Self {
        Self {
            pattern: pattern.into(),
            ..Self::default()
        }
    }

    pub fn repeat(mut self, repeat: bool) -> Self {
        self.repeat = repeat;
        self
    }

    pub fn clear(mut self, clear: bool) -> Self {
        self.clear_on_no_match = clear;
        self
    }

    pub fn no_clean(mut self, groups: impl IntoIterator<Item = usize>) -> Self {
        self.no_clean_groups.extend(groups);
        self
    }

    /// An empty pattern means the node renders its input verbatim
    pub fn is_blank(&self) -> bool {
        self.pattern.trim().is_empty()
    }

    pub fn is_no_clean(&self, group: usize) -> bool {
        self.no_clean_groups.contains(&group)
    }
}

/// One `<RegExp>` rule in a function's tree
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RegexNode {
    pub input_ref: String,
    pub output_template: String,
    pub dest_register: usize,
    pub append_output: bool,
    pub conditional_key: Option<String>,
    pub children: Vec<RegexNode>,
    pub expression: Option<Expression>,
}

impl Default for RegexNode {
    fn default() -> Self {
        Self {
            input_ref: DEFAULT_INPUT.to_string(),
            output_template: String::new(),
            dest_register: 0,
            append_output: false,
            conditional_key: None,
            children: Vec::new(),
            expression: None,
        }
    }
}

impl RegexNode {
    pub fn new(
        input_ref: impl Into<String>,
        output_template: impl Into<String>,
        dest_register: usize,
    ) -> Self {
        Self {
            input_ref: input_ref.into(),
            output_template: output_template.into(),
            dest_register,
            ..Self::default()
        }
    }

    pub fn append(mut self, append: bool) -> Self {
        self.append_output = append;
        self
    }

    pub fn conditional(mut self, key: impl Into<String>) -> Self {
        self.conditional_key = Some(key.into());
        self
    }

    pub fn expression(mut self, expression: Expression) -> Self {
        self.expression = Some(expression);
        self
    }

    pub fn child(mut self, node: RegexNode) -> Self {
        self.children.push(node);
        self
    }
}

/// A named scraper function
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Function {
    pub name: String,
    pub clear_buffers_on_entry: bool,
    pub dest_register: usize,
    pub append_output: bool,
    pub nodes: Vec<RegexNode>,
}

impl Function {
    pub fn new(name: impl Into<String>, dest_register: usize) -> Self {
        Self {
            name: name.into(),
            clear_buffers_on_entry: true,
            dest_register,
            append_output: false,
            nodes: Vec::new(),
        }
    }

    pub fn clear_buffers(mut self, clear: bool) -> Self {
        self.clear_buffers_on_entry = clear;
        self
    }

    pub fn node(mut self, node: RegexNode) -> Self {
        self.nodes.push(node);
        self
    }
}

/// The immutable set of functions of one addon
#[derive(Debug, Clone, Default, Serialize)]
pub struct ScraperDefinition {
    pub id: String,
    functions: HashMap<String, Function>,
}

impl ScraperDefinition {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            functions: HashMap::new(),
        }
    }

    /// Add a function unless one with the same name exists
    ///
    /// Returns `false` when the name was already taken; the first definition
    /// always wins.
    pub fn insert(&mut self, function: Function) -> bool {
        if self.functions.contains_key(&function.name) {
            log::debug!(
                "Ignoring duplicate function {} in scraper {}",
                function.name,
                self.id
            );
            return false;
        }
        self.functions.insert(function.name.clone(), function);
        true
    }

    pub fn with(mut self, function: Function) -> Self {
        self.insert(function);
        self
    }

    pub fn function(&self, name: &str) -> Option<&Function> {
        self.functions.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.functions.contains_key(name)
    }

    /// Function names in sorted order
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.functions.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    pub fn len(&self) -> usize {
        self.functions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.functions.is_empty()
    }
}
