use std::collections::HashMap;
use std::fs::File;
use std::io::{self, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser as ClapParser, Subcommand, ValueEnum};
use cti_core::{CachedEntityRecord, Parser as CtiParser, Registry};
use serde::Deserialize;
use tracing::level_filters::LevelFilter;

/// Project-local defaults read from an optional `cti.toml` in the current
/// directory. CLI flags always take precedence when given explicitly.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
struct CliConfig {
    verbose: Option<bool>,
    format: Option<OutputFormat>,
}

fn load_cli_config() -> Result<CliConfig> {
    let path = Path::new("cti.toml");
    if !path.exists() {
        return Ok(CliConfig::default());
    }
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    toml::from_str(&text).with_context(|| format!("Failed to parse {}", path.display()))
}

#[derive(ClapParser)]
#[command(name = "cti")]
#[command(about = "Parse, match, interpolate and resolve Cross-domain Typed Identifiers")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging (sets log level to debug)
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Parse a CTI and print its canonical rendering
    Parse {
        /// The identifier, reference, query or attribute-selector expression
        input: String,

        /// Which grammar subset to parse under
        #[arg(long, value_enum, default_value_t = ParseModeArg::Full)]
        mode: ParseModeArg,

        /// Falls back to `cti.toml`'s `format`, then `pretty`.
        #[arg(long, value_enum)]
        format: Option<OutputFormat>,
    },

    /// Test whether a pattern CTI matches a concrete CTI
    Match {
        /// The (possibly wildcarded) pattern expression
        pattern: String,

        /// The fully concrete expression being tested
        concrete: String,

        /// Skip the query-attribute submap check
        #[arg(long)]
        ignore_query: bool,
    },

    /// Substitute `${name}` dynamic parameters in an expression
    Interpolate {
        /// The expression containing `${name}` holes
        input: String,

        /// A `name=value` pair; may be repeated
        #[arg(long = "set", value_parser = parse_key_val)]
        set: Vec<(String, String)>,
    },

    /// Load cached-entity records and print a type's merged schema
    MergeSchema {
        /// Path to a JSON array of cached-entity records
        records: PathBuf,

        /// The type whose ancestor chain to merge
        cti: String,

        /// Falls back to `cti.toml`'s `format`, then `pretty`.
        #[arg(long, value_enum)]
        format: Option<OutputFormat>,
    },

    /// Load cached-entity records and check an access-control decision
    CheckAccess {
        /// Path to a JSON array of cached-entity records
        records: PathBuf,

        /// The entity being accessed
        target: String,

        /// The entity attempting access
        accessor: String,
    },
}

#[derive(Copy, Clone, PartialEq, Eq, ValueEnum)]
enum ParseModeArg {
    /// Wildcards, query and attribute selector all allowed
    Full,
    /// No wildcards, query or selector; version fully qualified
    Identifier,
    /// Wildcards and an optional version; no query or selector
    Reference,
    /// Full version and query allowed; no selector
    Query,
}

#[derive(Copy, Clone, PartialEq, Eq, ValueEnum, Deserialize)]
#[serde(rename_all = "kebab-case")]
enum OutputFormat {
    Pretty,
    Compact,
}

fn parse_key_val(s: &str) -> Result<(String, String), String> {
    let (name, value) = s
        .split_once('=')
        .ok_or_else(|| format!("expected 'name=value', got '{s}'"))?;
    Ok((name.to_string(), value.to_string()))
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = load_cli_config()?;

    let verbose = cli.verbose || config.verbose.unwrap_or(false);
    let log_level = if verbose {
        LevelFilter::DEBUG
    } else {
        LevelFilter::WARN
    };
    tracing_subscriber::fmt()
        .with_max_level(log_level)
        .with_writer(std::io::stderr)
        .init();

    let default_format = config.format.unwrap_or(OutputFormat::Pretty);

    match cli.command {
        Commands::Parse { input, mode, format } => {
            let parser = CtiParser::permissive();
            let expr = match mode {
                ParseModeArg::Full => parser.parse(&input),
                ParseModeArg::Identifier => parser.parse_identifier(&input),
                ParseModeArg::Reference => parser.parse_reference(&input),
                ParseModeArg::Query => parser.parse_query(&input),
            }
            .map_err(|e| anyhow::Error::from(e).context("Parse failed"))?;

            write_json(
                &serde_json::json!({ "canonical": expr.to_string() }),
                format.unwrap_or(default_format),
            )?;
        }
        Commands::Match {
            pattern,
            concrete,
            ignore_query,
        } => {
            let parser = CtiParser::permissive();
            let pattern_expr = parser
                .parse_reference(&pattern)
                .map_err(|e| anyhow::Error::from(e).context("Parsing pattern failed"))?;
            let concrete_expr = parser
                .parse_identifier(&concrete)
                .map_err(|e| anyhow::Error::from(e).context("Parsing concrete CTI failed"))?;

            let matched = pattern_expr
                .matches(&concrete_expr, ignore_query)
                .map_err(|e| anyhow::Error::from(e).context("Matching failed"))?;

            println!("{matched}");
            if !matched {
                std::process::exit(1);
            }
        }
        Commands::Interpolate { input, set } => {
            let values: HashMap<String, String> = set.into_iter().collect();
            let parser = CtiParser::permissive().config_with(values.keys().cloned());
            let expr = parser
                .parse_reference(&input)
                .map_err(|e| anyhow::Error::from(e).context("Parsing expression failed"))?;
            let interpolated = expr
                .interpolate(&values, &parser)
                .map_err(|e| anyhow::Error::from(e).context("Interpolation failed"))?;
            println!("{interpolated}");
        }
        Commands::MergeSchema { records, cti, format } => {
            let registry = load_registry(&records)?;
            let merged = cti_core::get_merged_schema(&cti, &registry)
                .map_err(|e| anyhow::Error::from(e).context("Merging schema failed"))?;
            write_json(&merged.schema, format.unwrap_or(default_format))?;
            if !merged.report.ancestors_visited.is_empty() {
                eprintln!("Ancestors visited: {}", merged.report.ancestors_visited.join(" -> "));
            }
        }
        Commands::CheckAccess {
            records,
            target,
            accessor,
        } => {
            let registry = load_registry(&records)?;
            let target_entity = registry
                .get(&target)
                .with_context(|| format!("Unknown entity: {target}"))?;
            let accessor_entity = registry
                .get(&accessor)
                .with_context(|| format!("Unknown entity: {accessor}"))?;

            match target_entity.is_accessible_by(accessor_entity) {
                Ok(()) => println!("allowed"),
                Err(e) => {
                    println!("denied: {e}");
                    std::process::exit(1);
                }
            }
        }
    }

    Ok(())
}

fn load_registry(path: &PathBuf) -> Result<Registry> {
    let file = File::open(path).with_context(|| format!("Failed to open records file: {}", path.display()))?;
    let reader = BufReader::new(file);
    let records: Vec<CachedEntityRecord> = serde_json::from_reader(reader)
        .with_context(|| format!("Failed to parse cached-entity records from: {}", path.display()))?;

    let mut registry = Registry::new();
    registry
        .load_cached_entities(records)
        .map_err(|e| anyhow::Error::from(e).context("Loading cached entities failed"))?;
    Ok(registry)
}

fn write_json<T: serde::Serialize>(val: &T, format: OutputFormat) -> Result<()> {
    let mut writer: Box<dyn Write> = Box::new(BufWriter::new(io::stdout()));
    match format {
        OutputFormat::Pretty => {
            serde_json::to_writer_pretty(&mut writer, val).context("Failed to write JSON")?;
        }
        OutputFormat::Compact => {
            serde_json::to_writer(&mut writer, val).context("Failed to write JSON")?;
        }
    }
    writeln!(writer).context("Failed to write trailing newline")?;
    Ok(())
}
