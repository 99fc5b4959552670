//! Scraper execution engine
//!
//! A [`Processor`] runs functions of a shared [`ScraperDefinition`]. Every
//! top-level call gets its own [`Registers`]; nothing in the definition is
//! ever mutated, so many processors may run over one definition at once.
//!
//! # Evaluation
//!
//! Nodes run depth-first in declaration order. A node first runs its
//! children (which may fill registers it reads), then matches its expression
//! against its input and renders the output template into its destination.
//!
//! # Dynamic calls
//!
//! Before a rendered value lands in a register it is scanned for calls:
//! - an element with a `function="X"` attribute, e.g. `<url function="X">…</url>`
//! - `<chain function="X">payload</chain>`
//!
//! Function `X` then runs with the payload in register 1 and its result
//! replaces the value. A call that cannot be resolved turns into an inline
//! `<error>` marker instead of failing the scrape.

use crate::definition::{Expression, Function, RegexNode, ScraperDefinition};
use crate::document::truncate_for_log;
use crate::dom::{self, Fragment};
use crate::error::{CallError, ScrapeError, ScrapeResult};
use crate::pattern;
use crate::registers::{REGISTER_COUNT, Registers};
use crate::repair;
use crate::settings::Settings;
use crate::template::{self, Resolve};
use regex::{Captures, Regex};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, LazyLock};
use std::time::{Duration, Instant};

/// Cheap pre-check before parsing a value for `function="…"` elements
static CALL_HINT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)<[a-z][\w.:-]*\s[^>]*\bfunction\s*=")
        .unwrap_or_else(|e| panic!("call hint regex: {}", e))
});

static CHAIN_CALL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?s)<chain function="([^"]*)">(.*)</chain>"#)
        .unwrap_or_else(|e| panic!("chain regex: {}", e))
});

/// Shared flag for stopping a running scrape from another thread
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// Limits applied to one processor; everything is unlimited by default
#[derive(Debug, Clone, Default)]
pub struct ExecutionOptions {
    pub deadline: Option<Instant>,
    pub cancel: Option<CancelToken>,
    /// Maximum nesting of dynamic calls
    pub max_call_depth: Option<usize>,
}

impl ExecutionOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }

    pub fn with_timeout(self, timeout: Duration) -> Self {
        self.with_deadline(Instant::now() + timeout)
    }

    pub fn with_cancel(mut self, token: CancelToken) -> Self {
        self.cancel = Some(token);
        self
    }

    pub fn with_max_call_depth(mut self, depth: usize) -> Self {
        self.max_call_depth = Some(depth);
        self
    }
}

/// Runs scraper functions against a definition and a settings store
pub struct Processor<'a> {
    definition: &'a ScraperDefinition,
    settings: &'a dyn Settings,
    options: ExecutionOptions,
}

impl<'a> Processor<'a> {
    pub fn new(definition: &'a ScraperDefinition, settings: &'a dyn Settings) -> Self {
        log::debug!("Processor created for scraper {}", definition.id);
        Self {
            definition,
            settings,
            options: ExecutionOptions::default(),
        }
    }

    pub fn with_options(mut self, options: ExecutionOptions) -> Self {
        self.options = options;
        self
    }

    pub fn definition(&self) -> &'a ScraperDefinition {
        self.definition
    }

    /// Run a function and return its destination register
    ///
    /// Unknown functions yield `""`. If a deadline or cancellation stops the
    /// run, that is logged and `""` is returned as well; use
    /// [`Processor::try_execute_function`] to observe it.
    pub fn execute_function<S: AsRef<str>>(&self, name: &str, inputs: &[S]) -> String {
        self.try_execute_function(name, inputs).unwrap_or_else(|e| {
            log::warn!("Function {} in scraper {} stopped: {}", name, self.definition.id, e);
            String::new()
        })
    }

    /// Run a function with a fresh register file
    pub fn try_execute_function<S: AsRef<str>>(
        &self,
        name: &str,
        inputs: &[S],
    ) -> ScrapeResult<String> {
        let mut registers = Registers::new();
        self.execute_in(&mut registers, name, inputs)
    }

    /// Run a function over a caller-owned register file
    ///
    /// The registers are left as the function finished with them.
    pub fn execute_in<S: AsRef<str>>(
        &self,
        registers: &mut Registers,
        name: &str,
        inputs: &[S],
    ) -> ScrapeResult<String> {
        let definition = self.definition;
        let Some(function) = definition.function(name) else {
            log::debug!("** Could not locate function {} in scraper {}", name, definition.id);
            return Ok(String::new());
        };
        Execution {
            processor: self,
            registers,
            depth: 0,
        }
        .run(function, inputs)
    }
}

/// One function invocation: the processor plus the register file in use
struct Execution<'e, 'a> {
    processor: &'e Processor<'a>,
    registers: &'e mut Registers,
    depth: usize,
}

impl Execution<'_, '_> {
    fn run<S: AsRef<str>>(&mut self, function: &Function, inputs: &[S]) -> ScrapeResult<String> {
        log::debug!(
            "** BEGIN Function: {}; Dest: {}; ClearBuffers: {}",
            function.name,
            function.dest_register,
            function.clear_buffers_on_entry
        );

        if function.clear_buffers_on_entry {
            self.registers.clear();
        }
        self.registers.load(inputs);

        self.execute_nodes(&function.nodes)?;

        log::debug!("** END Function: {}; Dest: {}", function.name, function.dest_register);
        Ok(self.read_register(function.dest_register))
    }

    fn execute_nodes(&mut self, nodes: &[RegexNode]) -> ScrapeResult<()> {
        for (i, node) in nodes.iter().enumerate() {
            self.checkpoint()?;
            log::debug!(
                "Executing {}/{} - {}",
                i + 1,
                nodes.len(),
                node.expression.as_ref().map(|e| e.pattern.as_str()).unwrap_or("")
            );
            self.execute_node(node)?;
        }
        Ok(())
    }

    fn execute_node(&mut self, node: &RegexNode) -> ScrapeResult<()> {
        if let Some(key) = &node.conditional_key
            && !self.condition_holds(key)
        {
            log::debug!("Condition not met: {}", key);
            return Ok(());
        }

        if !node.children.is_empty() {
            self.execute_nodes(&node.children)?;
        }
        self.execute_expression(node)
    }

    /// Missing or unreadable flags count as true before a leading `!` inverts them
    fn condition_holds(&self, key: &str) -> bool {
        let (name, negate) = match key.strip_prefix('!') {
            Some(name) => (name, true),
            None => (key, false),
        };
        let value = self.processor.settings.flag(name).unwrap_or(true);
        log::debug!("Processing conditional: {}; {}", key, value);
        value != negate
    }

    fn execute_expression(&mut self, node: &RegexNode) -> ScrapeResult<()> {
        let input = self.resolve_input(&node.input_ref);

        let expression = match &node.expression {
            Some(expression) if !expression.is_blank() => expression,
            _ => {
                log::debug!("Expression was empty; rendering output with the input as group 1");
                let output = template::render(&node.output_template, &["", input.as_str()], &*self);
                return self.write(node.dest_register, output, node.append_output);
            }
        };

        let pattern = template::substitute_registers(&expression.pattern, &*self);
        let re = pattern::compile(&pattern);
        if log::log_enabled!(log::Level::Debug) {
            log::debug!("Expression: {}; Input: {}", pattern, truncate_for_log(&input));
        }

        let mut matches = re.captures_iter(&input);
        let Some(first) = matches.next() else {
            log::debug!("No match for {}", pattern);
            if expression.clear_on_no_match {
                log::debug!("Clearing destination register {}", node.dest_register);
                return self.write(node.dest_register, String::new(), false);
            }
            return Ok(());
        };

        let output = self.render_match(node, expression, &first);
        self.write(node.dest_register, output, node.append_output)?;

        if expression.repeat {
            for caps in matches {
                self.checkpoint()?;
                let output = self.render_match(node, expression, &caps);
                self.write(node.dest_register, output, true)?;
            }
        }
        Ok(())
    }

    fn render_match(&self, node: &RegexNode, expression: &Expression, caps: &Captures) -> String {
        let groups = group_array(caps, expression);
        template::render(&node.output_template, &groups, self)
    }

    /// Resolve a node's `input` attribute
    ///
    /// `$$N` tokens select registers, concatenated in order; anything else
    /// is taken as literal text.
    fn resolve_input(&self, input_ref: &str) -> String {
        let references = template::register_references(input_ref);
        if references.is_empty() {
            log::debug!("Using literal input: {}", truncate_for_log(input_ref));
            return template::substitute_properties(input_ref, |key| self.property(key));
        }
        references
            .into_iter()
            .map(|index| self.read_register(index))
            .collect()
    }

    /// Buffer-read rule: repair known header/script defects, then resolve `$INFO[...]`
    fn read_register(&self, index: usize) -> String {
        let repaired = repair::repair_buffer(self.registers.get(index));
        template::substitute_properties(&repaired, |key| self.property(key))
    }

    fn write(&mut self, dest: usize, text: String, append: bool) -> ScrapeResult<()> {
        let text = self.dispatch(text)?;

        if dest >= REGISTER_COUNT {
            log::warn!("Dropping write to register {}: only 0..{} exist", dest, REGISTER_COUNT - 1);
            return Ok(());
        }
        if log::log_enabled!(log::Level::Debug) {
            log::debug!(
                "Set register: {}; Append: {}; Text: {}",
                dest,
                append,
                truncate_for_log(&text)
            );
        }
        if append {
            self.registers.append(dest, &text);
        } else {
            self.registers.set(dest, text);
        }
        Ok(())
    }

    /// Replace a value that asks for another function with that function's result
    fn dispatch(&mut self, mut text: String) -> ScrapeResult<String> {
        if CALL_HINT.is_match(&text)
            && let Some(site) = Fragment::parse(&text).call_site()
        {
            log::debug!("Processing sub function {} from <{}>", site.function, site.tag);
            text = match self.invoke(&site.function, &site.payload)? {
                Ok(result) => result,
                Err(e) => error_marker(&text, &e),
            };
        }

        let chain = CHAIN_CALL
            .captures(&text)
            .map(|caps| (caps[1].to_string(), caps[2].to_string()));
        if let Some((function, payload)) = chain {
            log::debug!("Processing chained function {}", function);
            text = match self.invoke(&function, &payload)? {
                Ok(result) => format!("<{0}>{1}</{0}>", function, result),
                Err(e) => error_marker(&text, &e),
            };
        }

        Ok(text)
    }

    /// Run a function requested by scraped data
    ///
    /// The outer result carries interruptions, which abort the whole scrape;
    /// the inner one carries call failures, which become error markers.
    fn invoke(&mut self, name: &str, payload: &str) -> ScrapeResult<Result<String, CallError>> {
        if name.trim().is_empty() {
            return Ok(Err(CallError::MalformedMarker("empty function name".to_string())));
        }
        let definition = self.processor.definition;
        let Some(function) = definition.function(name) else {
            return Ok(Err(CallError::UnknownFunction(name.to_string())));
        };
        if let Some(max) = self.processor.options.max_call_depth
            && self.depth >= max
        {
            return Ok(Err(CallError::DepthExceeded(max)));
        }

        // A non-clearing callee sees the caller's registers, but writes to a copy
        let mut registers = if function.clear_buffers_on_entry {
            Registers::new()
        } else {
            self.registers.clone()
        };
        Execution {
            processor: self.processor,
            registers: &mut registers,
            depth: self.depth + 1,
        }
        .run(function, &["", payload])
        .map(Ok)
    }

    fn property(&self, key: &str) -> String {
        self.processor.settings.value(key).unwrap_or_default()
    }

    fn checkpoint(&self) -> ScrapeResult<()> {
        let options = &self.processor.options;
        if options.cancel.as_ref().is_some_and(CancelToken::is_cancelled) {
            return Err(ScrapeError::Cancelled);
        }
        if options.deadline.is_some_and(|deadline| Instant::now() >= deadline) {
            return Err(ScrapeError::DeadlineExceeded);
        }
        Ok(())
    }
}

impl Resolve for Execution<'_, '_> {
    fn register(&self, index: usize) -> String {
        self.read_register(index)
    }

    fn property(&self, key: &str) -> String {
        Execution::property(self, key)
    }
}

/// Groups `0..=n` of a match, HTML-cleaned unless exempted
fn group_array(caps: &Captures, expression: &Expression) -> Vec<String> {
    (0..caps.len())
        .map(|i| {
            let raw = caps.get(i).map(|m| m.as_str()).unwrap_or("");
            if expression.is_no_clean(i) {
                raw.to_string()
            } else {
                dom::clean_html(raw).into_owned()
            }
        })
        .collect()
}

/// Inline marker for a failed call; the failing text is escaped so that no
/// later write can dispatch it again
fn error_marker(text: &str, error: &CallError) -> String {
    log::error!("Failed to process function: {}: {}", truncate_for_log(text), error);
    format!(
        "\n<error>{}\n<msg>{}</msg></error>\n",
        html_escape::encode_text(text),
        error
    )
}
