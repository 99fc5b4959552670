//! scrapekit - interpreter for regex-driven media center scrapers
//!
//! Scraper addons describe, in XML, how to turn downloaded web pages into
//! structured metadata: trees of regular expressions writing into numbered
//! string registers, output templates, and calls between named functions.
//! This crate parses those definitions and executes them.
//!
//! # Overview
//!
//! - [`parse_definition`] / [`parse_str`] read a scraper library into an
//!   immutable [`ScraperDefinition`]
//! - [`Processor`] runs one of its functions over a set of input registers
//! - [`ScrapeSession`] drives the usual search and details flow against a
//!   [`DocumentSource`]
//!
//! # Basic Example
//!
//! ```
//! use scrapekit::{Processor, ScraperSettings, parse_str};
//!
//! let xml = r#"<scraper>
//!   <GetTitle dest="3">
//!     <RegExp input="$$1" output="\1" dest="3">
//!       <expression>&lt;title&gt;(.*?)&lt;/title&gt;</expression>
//!     </RegExp>
//!   </GetTitle>
//! </scraper>"#;
//! let definition = parse_str("metadata.example", xml)?;
//! let settings = ScraperSettings::new();
//! let processor = Processor::new(&definition, &settings);
//! let title = processor.execute_function("GetTitle", &["", "<title>Alien</title>"]);
//! assert_eq!(title, "Alien");
//! # Ok::<(), scrapekit::ScrapeError>(())
//! ```

pub mod addon;
pub mod definition;
pub mod document;
pub mod dom;
pub mod error;
pub mod parser;
pub mod pattern;
pub mod processor;
pub mod registers;
pub mod repair;
pub mod session;
pub mod settings;
pub mod template;
pub mod url;

pub use addon::{AddonManifest, ContentKind};
pub use definition::{Expression, Function, RegexNode, ScraperDefinition};
pub use document::decode_document;
pub use error::{CallError, ScrapeError, ScrapeResult};
pub use parser::{CommonLibrary, parse_definition, parse_str};
pub use processor::{CancelToken, ExecutionOptions, Processor};
pub use registers::{REGISTER_COUNT, Registers};
pub use session::{DocumentSource, ScrapeSession, SearchResult};
pub use settings::{ScraperSettings, Settings};
pub use url::ScraperUrl;

/// Run one function with default options
///
/// # Example
///
/// ```
/// use scrapekit::{Expression, Function, RegexNode, ScraperDefinition, ScraperSettings, execute};
///
/// let definition = ScraperDefinition::new("metadata.example").with(
///     Function::new("GetYear", 2).node(
///         RegexNode::new("$$1", "\\1", 2).expression(Expression::new(r"\((\d{4})\)")),
///     ),
/// );
/// let year = execute(&definition, &ScraperSettings::new(), "GetYear", &["", "Alien (1979)"]);
/// assert_eq!(year, "1979");
/// ```
pub fn execute<S: AsRef<str>>(
    definition: &ScraperDefinition,
    settings: &dyn Settings,
    function: &str,
    inputs: &[S],
) -> String {
    Processor::new(definition, settings).execute_function(function, inputs)
}

#[cfg(test)]
mod tests {
    use crate::{
        Expression, ExecutionOptions, Function, Processor, RegexNode, Registers,
        ScraperDefinition, ScraperSettings, execute, parse_str,
    };

    fn passthrough(output: &str, dest: usize) -> RegexNode {
        RegexNode::new("$$1", output, dest)
    }

    fn run(def: &ScraperDefinition, name: &str, inputs: &[&str]) -> String {
        execute(def, &ScraperSettings::new(), name, inputs)
    }

    #[test]
    fn scenario_a_get_title() {
        let def = parse_str(
            "metadata.test",
            r#"<scraper><GetTitle dest="1"><RegExp input="$$1" output="\1" dest="1"><expression>&lt;title&gt;(.*?)&lt;/title&gt;</expression></RegExp></GetTitle></scraper>"#,
        )
        .unwrap();
        assert_eq!(run(&def, "GetTitle", &["", "<title>Alien</title>"]), "Alien");
    }

    #[test]
    fn chain_call_wraps_rewritten_title() {
        let def = ScraperDefinition::new("metadata.test")
            .with(Function::new("GetTitle", 3).node(passthrough(
                "<chain function=\"CleanTitle\">Alien: Director's Cut</chain>",
                3,
            )))
            .with(Function::new("CleanTitle", 1).node(
                RegexNode::new("$$1", "\\1 [\\2]", 1).expression(Expression::new("(.*?): (.*)")),
            ));
        assert_eq!(
            run(&def, "GetTitle", &[""]),
            "<CleanTitle>Alien [Director's Cut]</CleanTitle>"
        );
    }

    #[test]
    fn scenario_c_property_reference() {
        let def = ScraperDefinition::new("metadata.test")
            .with(Function::new("GetStudio", 2).node(passthrough("$INFO[studio]", 2)));

        let acme = ScraperSettings::new().with("studio", "Acme");
        assert_eq!(execute(&def, &acme, "GetStudio", &[""]), "Acme");
        assert_eq!(run(&def, "GetStudio", &[""]), "");
    }

    #[test]
    fn unknown_function_returns_empty() {
        let def = ScraperDefinition::new("metadata.test");
        assert_eq!(run(&def, "NoSuchFunction", &["", "input"]), "");
    }

    #[test]
    fn clearing_function_starts_from_empty_registers() {
        let def = ScraperDefinition::new("metadata.test")
            .with(Function::new("Clearing", 2).node(passthrough("[$$9]", 2)))
            .with(Function::new("Keeping", 2).clear_buffers(false).node(passthrough("[$$9]", 2)));
        let settings = ScraperSettings::new();
        let processor = Processor::new(&def, &settings);

        let mut registers = Registers::new();
        registers.set(9, "stale".to_string());
        assert_eq!(processor.execute_in(&mut registers, "Clearing", &[""]).unwrap(), "[]");
        assert_eq!(registers.get(9), "");

        registers.set(9, "stale".to_string());
        assert_eq!(processor.execute_in(&mut registers, "Keeping", &[""]).unwrap(), "[stale]");
    }

    #[test]
    fn non_clearing_call_reads_but_does_not_write_caller_registers() {
        let def = ScraperDefinition::new("metadata.test")
            .with(
                Function::new("Outer", 3)
                    .node(passthrough("stale", 7))
                    .node(passthrough("<chain function=\"Fresh\">x</chain>", 3))
                    .node(passthrough("<chain function=\"Shared\">x</chain>", 3).append(true))
                    .node(passthrough("|$$1|$$7|$$2", 3).append(true)),
            )
            .with(Function::new("Fresh", 2).node(passthrough("[$$7]", 2)))
            .with(
                Function::new("Shared", 2)
                    .clear_buffers(false)
                    .node(passthrough("[$$7]", 2))
                    .node(passthrough("child", 7)),
            );
        assert_eq!(
            run(&def, "Outer", &["", "doc"]),
            "<Fresh>[]</Fresh><Shared>[stale]</Shared>|doc|stale|"
        );
    }

    #[test]
    fn group_zero_is_cleaned_unless_exempt() {
        let def = ScraperDefinition::new("metadata.test")
            .with(Function::new("Clean", 2).node(
                RegexNode::new("$$1", "\\0", 2).expression(Expression::new("<b>(.*?)</b>")),
            ))
            .with(Function::new("Raw", 2).node(
                RegexNode::new("$$1", "\\0", 2)
                    .expression(Expression::new("<b>(.*?)</b>").no_clean([0])),
            ));
        let input = ["", "x <b>Alien &amp; co</b> y"];
        assert_eq!(run(&def, "Clean", &input), "Alien & co");
        assert_eq!(run(&def, "Raw", &input), "<b>Alien &amp; co</b>");
    }

    #[test]
    fn repeat_appends_every_match() {
        let def = ScraperDefinition::new("metadata.test").with(
            Function::new("GetGenres", 4).node(
                RegexNode::new("$$1", "<genre>\\1</genre>", 4)
                    .expression(Expression::new("<li>(.*?)</li>").repeat(true)),
            ),
        );
        assert_eq!(
            run(&def, "GetGenres", &["", "<li>Horror</li><li>Sci-Fi</li><li>Thriller</li>"]),
            "<genre>Horror</genre><genre>Sci-Fi</genre><genre>Thriller</genre>"
        );
    }

    #[test]
    fn repeat_first_match_honours_append_flag() {
        let genres = |append: bool| {
            Function::new(if append { "Append" } else { "Overwrite" }, 4)
                .clear_buffers(false)
                .node(
                    RegexNode::new("$$1", "<genre>\\1</genre>", 4)
                        .append(append)
                        .expression(Expression::new("<li>(.*?)</li>").repeat(true)),
                )
        };
        let def = ScraperDefinition::new("metadata.test")
            .with(genres(false))
            .with(genres(true));
        let settings = ScraperSettings::new();
        let processor = Processor::new(&def, &settings);
        let page = ["", "<li>Horror</li><li>Sci-Fi</li>"];

        let mut registers = Registers::new();
        registers.set(4, "<genre>Old</genre>".to_string());
        let out = processor.execute_in(&mut registers, "Overwrite", &page).unwrap();
        assert_eq!(out, "<genre>Horror</genre><genre>Sci-Fi</genre>");

        registers.set(4, "<genre>Old</genre>".to_string());
        let out = processor.execute_in(&mut registers, "Append", &page).unwrap();
        assert_eq!(out, "<genre>Old</genre><genre>Horror</genre><genre>Sci-Fi</genre>");
    }

    #[test]
    fn no_match_leaves_destination_alone() {
        let keep = Function::new("Keep", 4).clear_buffers(false).node(
            RegexNode::new("$$1", "\\1", 4).expression(Expression::new("<year>(\\d+)</year>")),
        );
        let clear = Function::new("Clear", 4).clear_buffers(false).node(
            RegexNode::new("$$1", "\\1", 4)
                .expression(Expression::new("<year>(\\d+)</year>").clear(true)),
        );
        let def = ScraperDefinition::new("metadata.test").with(keep).with(clear);
        let settings = ScraperSettings::new();
        let processor = Processor::new(&def, &settings);

        let mut registers = Registers::new();
        registers.set(4, "previous <b>value</b>".to_string());
        processor.execute_in(&mut registers, "Keep", &["", "no year here"]).unwrap();
        assert_eq!(registers.get(4), "previous <b>value</b>");

        processor.execute_in(&mut registers, "Clear", &["", "no year here"]).unwrap();
        assert_eq!(registers.get(4), "");
    }

    #[test]
    fn negated_unset_flag_skips() {
        let def = ScraperDefinition::new("metadata.test").with(
            Function::new("GetExtras", 2)
                .node(passthrough("base", 2))
                .node(passthrough("+neg", 2).append(true).conditional("!trailers"))
                .node(passthrough("+pos", 2).append(true).conditional("trailers")),
        );
        assert_eq!(run(&def, "GetExtras", &[""]), "base+pos");

        let off = ScraperSettings::new().with("trailers", "false");
        assert_eq!(execute(&def, &off, "GetExtras", &[""]), "base+neg");
    }

    #[test]
    fn single_group_round_trip() {
        let def = ScraperDefinition::new("metadata.test").with(Function::new("Get", 2).node(
            RegexNode::new("$$1", "\\1", 2).expression(Expression::new("<p>(.*)</p>")),
        ));
        assert_eq!(
            run(&def, "Get", &["", "<p>Ridley <i>Scott</i> &quot;1979&quot;</p>"]),
            "Ridley Scott \"1979\""
        );
    }

    #[test]
    fn children_run_before_parent() {
        let def = ScraperDefinition::new("metadata.test").with(
            Function::new("GetDetails", 3).node(
                RegexNode::new("$$5", "<details>\\1</details>", 3)
                    .child(
                        RegexNode::new("$$1", "<title>\\1</title>", 5)
                            .expression(Expression::new("<h1>(.*?)</h1>")),
                    )
                    .child(
                        RegexNode::new("$$1", "<year>\\1</year>", 5)
                            .append(true)
                            .expression(Expression::new("<span>(\\d{4})</span>")),
                    ),
            ),
        );
        assert_eq!(
            run(&def, "GetDetails", &["", "<h1>Alien</h1><span>1979</span>"]),
            "<details><title>Alien</title><year>1979</year></details>"
        );
    }

    #[test]
    fn register_references_in_patterns_and_inputs() {
        let def = ScraperDefinition::new("metadata.test").with(
            Function::new("FindById", 3)
                .node(
                    RegexNode::new("$$1", "\\1", 3)
                        .expression(Expression::new("id=\"$$2\">([^<]*)<")),
                )
                .node(RegexNode::new("$$2$$3", "[\\1]", 4))
                .node(RegexNode::new("$$4", "\\1", 3)),
        );
        assert_eq!(
            run(
                &def,
                "FindById",
                &["", "<a id=\"1\">Aliens</a><a id=\"7\">Alien</a>", "7"]
            ),
            "[7Alien]"
        );
    }

    #[test]
    fn literal_input_resolves_properties() {
        let def = ScraperDefinition::new("metadata.test").with(
            Function::new("Lang", 2)
                .node(RegexNode::new("lang=$INFO[language]", "<\\1>", 2)),
        );
        let settings = ScraperSettings::new().with("language", "de");
        assert_eq!(execute(&def, &settings, "Lang", &[""]), "<lang=de>");
    }

    #[test]
    fn unknown_chain_target_becomes_error_marker() {
        let def = ScraperDefinition::new("metadata.test").with(
            Function::new("Broken", 2)
                .node(passthrough("<chain function=\"Missing\">x</chain>", 2))
                .node(passthrough("after", 3)),
        );
        assert_eq!(
            run(&def, "Broken", &[""]),
            "\n<error>&lt;chain function=\"Missing\"&gt;x&lt;/chain&gt;\n<msg>Invalid Function Name: Missing</msg></error>\n"
        );
    }

    #[test]
    fn url_call_replaces_value() {
        let def = ScraperDefinition::new("metadata.test")
            .with(Function::new("GetDetails", 3).node(passthrough(
                "<url function=\"GetFanart\">http://img.example.com/a.jpg</url>",
                3,
            )))
            .with(Function::new("GetFanart", 2).node(passthrough("<fanart><thumb>$$1</thumb></fanart>", 2)));
        assert_eq!(
            run(&def, "GetDetails", &[""]),
            "<fanart><thumb>http://img.example.com/a.jpg</thumb></fanart>"
        );
    }

    #[test]
    fn recursion_stops_at_depth_limit() {
        let def = ScraperDefinition::new("metadata.test").with(
            Function::new("Loop", 2).node(passthrough("<chain function=\"Loop\">$$1</chain>", 2)),
        );
        let settings = ScraperSettings::new();
        let processor = Processor::new(&def, &settings)
            .with_options(ExecutionOptions::new().with_max_call_depth(3));
        let out = processor.execute_function("Loop", &["", "seed"]);
        assert_eq!(out.matches("<Loop>").count(), 3);
        assert!(out.contains("<msg>Call depth limit of 3 exceeded</msg>"));
    }

    #[test]
    fn out_of_range_destination_is_dropped() {
        let def = ScraperDefinition::new("metadata.test").with(
            Function::new("Wide", 1)
                .clear_buffers(false)
                .node(passthrough("lost", 25))
                .node(passthrough("kept", 1)),
        );
        assert_eq!(run(&def, "Wide", &[""]), "kept");
    }

    #[test]
    fn definition_is_shared_across_threads() {
        let def = ScraperDefinition::new("metadata.test").with(
            Function::new("GetTitle", 1).node(
                RegexNode::new("$$1", "\\1", 1).expression(Expression::new("<title>(.*?)</title>")),
            ),
        );
        let settings = ScraperSettings::new();
        std::thread::scope(|scope| {
            let handles: Vec<_> = (0..4)
                .map(|i| {
                    let def = &def;
                    let settings = &settings;
                    scope.spawn(move || {
                        let input = format!("<title>Movie {}</title>", i);
                        Processor::new(def, settings).execute_function("GetTitle", &["", input.as_str()])
                    })
                })
                .collect();
            for (i, handle) in handles.into_iter().enumerate() {
                assert_eq!(handle.join().unwrap(), format!("Movie {}", i));
            }
        });
    }
}
