use anyhow::{Context, Result};
use clap::Parser;
use scrapekit::{
    CommonLibrary, ExecutionOptions, Processor, ScraperSettings, decode_document,
    parse_definition,
};
use similar::{ChangeTag, TextDiff};
use std::path::Path;
use std::time::Duration;

// Maximum sizes for security
const MAX_LIBRARY_SIZE: u64 = 16_777_216; // 16MB
const MAX_DOCUMENT_SIZE: u64 = 100_000_000; // 100MB
const MAX_SETTINGS_SIZE: u64 = 1_048_576; // 1MB

/// scrapekit - Run a function of a scraper addon library
#[derive(Parser, Debug)]
#[command(name = "scrapekit")]
#[command(version)]
struct Args {
    /// Path to the scraper library XML
    library: String,

    /// Function to run, e.g. GetDetails
    function: Option<String>,

    /// Register inputs starting at $$1; `@path` reads the register from a file
    inputs: Vec<String>,

    /// Shared function library to merge (repeatable)
    #[arg(long = "import", value_name = "FILE")]
    import: Vec<String>,

    /// Comma-separated addon ids the library imports; defaults to every --import
    #[arg(long, value_delimiter = ',')]
    imports: Vec<String>,

    /// JSON object of scraper settings
    #[arg(long, value_name = "FILE")]
    settings: Option<String>,

    #[arg(long, value_name = "MS")]
    timeout_ms: Option<u64>,

    #[arg(long)]
    max_call_depth: Option<usize>,

    /// Compare the output with a file and print a diff on mismatch
    #[arg(long, value_name = "FILE")]
    expect: Option<String>,

    /// Print the parsed definition as JSON instead of running it
    #[arg(long)]
    dump: bool,

    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

fn main() -> Result<()> {
    let args = Args::parse();

    let level = match args.verbose {
        0 => log::LevelFilter::Warn,
        1 => log::LevelFilter::Info,
        2 => log::LevelFilter::Debug,
        _ => log::LevelFilter::Trace,
    };
    env_logger::Builder::new().filter_level(level).parse_default_env().init();

    let library = read_bytes(&args.library, MAX_LIBRARY_SIZE)?;
    let commons = args
        .import
        .iter()
        .map(|path| Ok(CommonLibrary::new(path.as_str(), read_bytes(path, MAX_LIBRARY_SIZE)?)))
        .collect::<Result<Vec<_>>>()?;
    let imports = if args.imports.is_empty() {
        args.import.clone()
    } else {
        args.imports.clone()
    };

    let id = Path::new(&args.library)
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| args.library.clone());
    let definition = parse_definition(&id, &library, &imports, &commons)
        .with_context(|| format!("Failed to load scraper library '{}'", args.library))?;

    if args.dump {
        println!("{}", serde_json::to_string_pretty(&definition)?);
        return Ok(());
    }

    let function = args
        .function
        .as_deref()
        .context("No function given; available functions are listed by --dump")?;

    let settings = match &args.settings {
        Some(path) => load_settings(path)?,
        None => ScraperSettings::new(),
    };

    let mut options = ExecutionOptions::new();
    if let Some(ms) = args.timeout_ms {
        options = options.with_timeout(Duration::from_millis(ms));
    }
    if let Some(depth) = args.max_call_depth {
        options = options.with_max_call_depth(depth);
    }

    let mut inputs = vec![String::new()];
    for input in &args.inputs {
        inputs.push(read_input(input)?);
    }

    let processor = Processor::new(&definition, &settings).with_options(options);
    let output = processor.try_execute_function(function, inputs.as_slice())?;

    match &args.expect {
        Some(path) => {
            let expected = decode_document(&read_bytes(path, MAX_DOCUMENT_SIZE)?)?;
            if expected.trim_end() != output.trim_end() {
                print_diff(&expected, &output);
                anyhow::bail!("Output of {} differs from '{}'", function, path);
            }
            log::info!("Output matches {}", path);
        }
        None => println!("{}", output),
    }

    Ok(())
}

fn read_input(input: &str) -> Result<String> {
    match input.strip_prefix('@') {
        Some(path) => Ok(decode_document(&read_bytes(path, MAX_DOCUMENT_SIZE)?)?),
        None => Ok(input.to_string()),
    }
}

fn read_bytes(path: &str, max: u64) -> Result<Vec<u8>> {
    let size = std::fs::metadata(path)
        .map_err(|e| anyhow::anyhow!("Failed to read file '{}': {}", path, e))?
        .len();
    if size > max {
        return Err(anyhow::anyhow!(
            "File '{}' exceeds maximum size of {} bytes",
            path,
            max
        ));
    }
    std::fs::read(path).map_err(|e| anyhow::anyhow!("Failed to read file '{}': {}", path, e))
}

fn load_settings(path: &str) -> Result<ScraperSettings> {
    let bytes = read_bytes(path, MAX_SETTINGS_SIZE)?;
    serde_json::from_slice(&bytes)
        .map_err(|e| anyhow::anyhow!("Invalid settings JSON in '{}': {}", path, e))
}

fn print_diff(expected: &str, actual: &str) {
    let diff = TextDiff::from_lines(expected, actual);
    for change in diff.iter_all_changes() {
        let sign = match change.tag() {
            ChangeTag::Delete => "-",
            ChangeTag::Insert => "+",
            ChangeTag::Equal => " ",
        };
        eprint!("{}{}", sign, change);
        if change.missing_newline() {
            eprintln!();
        }
    }
}
