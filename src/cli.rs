//! CLI: check documents against a schema, or describe a schema.
use std::path::{Path, PathBuf};

use anyhow::{bail, Context as _, Result};
use clap::{Args, Parser, Subcommand};
use json_fit::{Config, Context, Fitter, Formatter, Json5Formatter, Schema};
use rayon::prelude::*;
use serde_json::Value;

// ————————————————————————————————————————————————————————————————————————————
// TYPES
// ————————————————————————————————————————————————————————————————————————————

/// fit JSON/NDJSON documents against the named types of a schema document and report every mismatch
#[derive(Parser, Debug)]
#[command(name = "json-fit", version)]
pub struct CommandLineInterface {
    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// fit every input document and print an annotated report for each failure
    Check(CheckOut),
    /// print the signature of every type in a schema
    Describe(DescribeOut),
}

#[derive(Args, Debug, Clone)]
struct InputSettings {
    /// treat input as newline-delimited JSON (NDJSON)
    #[arg(long, default_value_t = false)]
    ndjson: bool,

    /// JSON Pointer to select a subnode in each document (e.g. /data/items/0/payload)
    #[arg(long)]
    json_pointer: Option<String>,

    /// JQ pre-process filter for each document; every output is checked
    #[arg(long)]
    jq_expr: Option<String>,

    /// One or more inputs. May be literal paths or quoted glob patterns
    #[arg(long, short, num_args = 1.., required = true)]
    input: Vec<String>,
}

#[derive(Args, Debug, Clone)]
struct SchemaSettings {
    /// schema document declaring the types
    #[arg(long, short)]
    schema: PathBuf,

    /// type to fit against (the schema's `root` if omitted)
    #[arg(long = "type")]
    type_name: Option<String>,
}

#[derive(clap::Parser, Debug)]
struct CheckOut {
    #[command(flatten)]
    schema_settings: SchemaSettings,

    #[command(flatten)]
    input_settings: InputSettings,

    /// JSON object whose entries are injected into context fields
    #[arg(long)]
    context: Option<PathBuf>,

    /// report input keys that no record field reads
    #[arg(long, default_value_t = false)]
    strict: bool,

    /// disable coloured reports
    #[arg(long, default_value_t = false)]
    no_color: bool,

    /// cut reported strings longer than this, 0 disables
    #[arg(long, default_value_t = 40)]
    truncate_strings_at: usize,

    /// write the normalized documents here as NDJSON
    #[arg(short, long)]
    out: Option<PathBuf>,
}

#[derive(clap::Parser, Debug)]
struct DescribeOut {
    #[command(flatten)]
    schema_settings: SchemaSettings,
}

/// One loaded document and where it came from.
struct Document {
    origin: String,
    value: Value,
}

// ————————————————————————————————————————————————————————————————————————————
// IMPLEMENTATION
// ————————————————————————————————————————————————————————————————————————————

impl InputSettings {
    fn load_process(&self, mut apply: impl FnMut(Document)) -> Result<()> {
        let source_paths = resolve_file_path_patterns(&self.input)
            .context("failed to resolve input file paths")?;
        for source_path in source_paths {
            let source_path_str = source_path.to_string_lossy().to_string();
            let source = std::fs::read_to_string(&source_path)
                .with_context(|| format!("failed to read source file ({source_path_str})"))?;
            let documents: Vec<(String, Value)> = if self.ndjson {
                source
                    .lines()
                    .enumerate()
                    .filter(|(_, line)| !line.trim().is_empty())
                    .map(|(index, line)| {
                        let origin = format!("{source_path_str}:{}", index + 1);
                        serde_json::from_str::<Value>(line)
                            .with_context(|| format!("failed to parse JSON line ({origin})"))
                            .map(|value| (origin, value))
                    })
                    .collect::<Result<_>>()?
            } else {
                let value = serde_json::from_str::<Value>(&source)
                    .with_context(|| format!("failed to parse JSON source file ({source_path_str})"))?;
                vec![(source_path_str.clone(), value)]
            };
            for (origin, value) in documents {
                for (index, value) in self.select(value, &origin)?.into_iter().enumerate() {
                    let origin = if self.jq_expr.is_some() {
                        format!("{origin}#{index}")
                    } else {
                        origin.clone()
                    };
                    apply(Document { origin, value });
                }
            }
        }
        Ok(())
    }

    /// Applies `--json-pointer` then `--jq-expr`.
    fn select(&self, value: Value, origin: &str) -> Result<Vec<Value>> {
        let value = match self.json_pointer.as_deref() {
            None => value,
            Some(pointer) => match value.pointer(pointer) {
                Some(selected) => selected.clone(),
                None => bail!("JSON pointer {pointer:?} selects nothing in {origin}"),
            },
        };
        match self.jq_expr.as_ref() {
            None => Ok(vec![value]),
            Some(jq_expr) => crate::jq_exec::run_jaq(jq_expr, &value).with_context(|| {
                format!("failed to apply jq expression to source file ({origin})")
            }),
        }
    }
}

impl SchemaSettings {
    fn load(&self) -> Result<Schema> {
        let source = std::fs::read_to_string(&self.schema)
            .with_context(|| format!("failed to read schema ({})", self.schema.display()))?;
        source
            .parse::<Schema>()
            .with_context(|| format!("invalid schema ({})", self.schema.display()))
    }
}

impl CommandLineInterface {
    pub fn load() -> Self {
        Self::parse()
    }

    /// `Ok(false)` when some document does not fit.
    pub fn run(&self) -> Result<bool> {
        match &self.cmd {
            Command::Check(target) => target.run(),
            Command::Describe(target) => {
                let schema = target.schema_settings.load()?;
                match target.schema_settings.type_name.as_deref() {
                    Some(name) => {
                        let ty = schema.resolve(Some(name))?;
                        println!("{name}: {ty}");
                    }
                    None => {
                        for (name, ty) in schema.types() {
                            println!("{name}: {ty}");
                        }
                    }
                }
                Ok(true)
            }
        }
    }
}

impl CheckOut {
    fn run(&self) -> Result<bool> {
        let schema = self.schema_settings.load()?;
        let ty = schema.resolve(self.schema_settings.type_name.as_deref())?;
        let context = match self.context.as_ref() {
            None => Context::default(),
            Some(path) => load_context(path)?,
        };
        let fitter = Fitter::new().with_config(Config {
            no_unwanted_keys: self.strict,
        });
        let formatter = Json5Formatter {
            colors: !self.no_color,
            truncate_strings_at: self.truncate_strings_at,
            ..Json5Formatter::default()
        };

        let mut documents = Vec::new();
        self.input_settings.load_process(|document| documents.push(document))?;
        tracing::info!(count = documents.len(), type_name = ty.name(), "checking documents");

        let outcomes: Vec<Result<Value, String>> = documents
            .par_iter()
            .map(|document| {
                let trace = fitter.trace_json(ty, &document.value, &context);
                match trace.value() {
                    Some(fitted) => Ok(fitted.clone()),
                    None => Err(formatter.format(trace.node())),
                }
            })
            .collect();

        let mut fitted = Vec::with_capacity(outcomes.len());
        let mut failures = 0;
        for (document, outcome) in documents.iter().zip(outcomes) {
            match outcome {
                Ok(value) => fitted.push(value),
                Err(report) => {
                    failures += 1;
                    eprintln!("✗ {} does not fit `{}`:\n{report}\n", document.origin, ty.name());
                }
            }
        }
        eprintln!(
            "{} of {} document(s) fit `{}`",
            documents.len() - failures,
            documents.len(),
            ty.name()
        );

        if let Some(out) = self.out.as_ref() {
            write_ndjson(out, &fitted)?;
        }
        Ok(failures == 0)
    }
}

// ————————————————————————————————————————————————————————————————————————————
// INTERNAL HELPERS
// ————————————————————————————————————————————————————————————————————————————

fn load_context(path: &Path) -> Result<Context> {
    let source = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read context ({})", path.display()))?;
    json_fit::path_de::from_str_with_path::<Context>(&source)
        .with_context(|| format!("invalid context ({}), expected a JSON object", path.display()))
}

fn write_ndjson(out: &Path, values: &[Value]) -> Result<()> {
    let mut text = String::new();
    for value in values {
        text.push_str(&serde_json::to_string(value)?);
        text.push('\n');
    }
    if let Some(parent) = out.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }
    std::fs::write(out, text).with_context(|| format!("failed to write {}", out.display()))
}

fn resolve_file_path_patterns<I>(patterns: I) -> Result<Vec<PathBuf>>
where
    I: IntoIterator,
    I::Item: AsRef<str>,
{
    fn has_glob_chars(s: &str) -> bool {
        // Minimal glob detection for the `glob` crate syntax.
        s.bytes().any(|b| matches!(b, b'*' | b'?' | b'[' | b'{'))
    }

    let mut out = Vec::<PathBuf>::new();

    for raw in patterns {
        let pattern = raw.as_ref();

        if has_glob_chars(pattern) {
            let mut matched_any = false;
            for entry in glob::glob(pattern)? {
                out.push(entry?);
                matched_any = true;
            }
            if !matched_any {
                // An explicit glob that matched nothing is an error.
                bail!("glob pattern matched no files: {pattern}");
            }
        } else {
            out.push(PathBuf::from(pattern));
        }
    }

    Ok(out)
}
