//! cfspecs CLI
//!
//! Entry point for the `cfspecs` command-line tool.

use clap::{Parser, Subcommand, ValueEnum};
use cfspecs::{CfError, CfSpecs, Category, DataArray, Dataset, FormatOptions};
use serde_json::{json, Value};
use std::io::Read;
use std::path::{Path, PathBuf};
use std::process;
use tracing_subscriber::EnvFilter;

/// Exit code when nothing matched
const EXIT_NO_MATCH: i32 = 2;

#[derive(Parser)]
#[command(name = "cfspecs")]
#[command(about = "Match and normalize labeled arrays against CF specs", version)]
struct Cli {
    /// Extra specs file (TOML or JSON), may be repeated; later files win
    #[arg(long, short = 'c', global = true)]
    config: Vec<PathBuf>,

    /// Do not load the built-in specs
    #[arg(long, global = true)]
    no_default: bool,

    /// Do not load the user specs file
    #[arg(long, global = true)]
    no_user: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, ValueEnum)]
enum CategoryArg {
    DataVars,
    Coords,
}

impl From<CategoryArg> for Category {
    fn from(arg: CategoryArg) -> Self {
        match arg {
            CategoryArg::DataVars => Category::DataVars,
            CategoryArg::Coords => Category::Coords,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Print the resolved specs
    Show {
        /// Restrict to one category
        #[arg(long, value_enum)]
        category: Option<CategoryArg>,

        /// Print a single record
        #[arg(long)]
        id: Option<String>,
    },

    /// Identify the arrays of a JSON document ("-" reads stdin)
    Match {
        file: PathBuf,

        /// Only match in this category
        #[arg(long, value_enum)]
        category: Option<CategoryArg>,
    },

    /// Rewrite a JSON document with canonical names and attributes
    Format {
        file: PathBuf,

        /// Leave coordinates untouched
        #[arg(long)]
        no_coords: bool,

        /// Only add missing attributes, never rename
        #[arg(long)]
        fill: bool,
    },

    /// Print the canonical name of an id
    Name {
        id: String,

        /// Grid location suffix
        #[arg(long)]
        loc: Option<String>,
    },
}

/// Input document: a dataset when it has `data_vars`, else an array
enum Document {
    Dataset(Dataset),
    Array(DataArray),
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let specs = match load_specs(&cli) {
        Ok(specs) => specs,
        Err(e) => {
            eprintln!("Error loading specs: {}", e);
            process::exit(1);
        }
    };

    let result = match cli.command {
        Commands::Show { category, id } => run_show(&specs, category, id.as_deref()),
        Commands::Match { file, category } => run_match(&specs, &file, category),
        Commands::Format {
            file,
            no_coords,
            fill,
        } => run_format(&specs, &file, no_coords, fill),
        Commands::Name { id, loc } => run_name(&specs, &id, loc.as_deref()),
    };

    match result {
        Ok(code) => process::exit(code),
        Err(e) => {
            eprintln!("Error: {}", e);
            process::exit(1);
        }
    }
}

fn load_specs(cli: &Cli) -> Result<CfSpecs, CfError> {
    CfSpecs::builder()
        .default_specs(!cli.no_default)
        .user_specs(!cli.no_user)
        .sources(cli.config.iter().cloned())
        .build()
}

fn print_json(value: &Value) -> Result<(), CfError> {
    let text = serde_json::to_string_pretty(value)
        .map_err(|e| CfError::Config(format!("cannot serialize output: {e}")))?;
    println!("{}", text);
    Ok(())
}

fn run_show(specs: &CfSpecs, category: Option<CategoryArg>, id: Option<&str>) -> Result<i32, CfError> {
    let value = match (category, id) {
        (Some(category), Some(id)) => record_value(specs, Some(category.into()), id)?,
        (None, Some(id)) => record_value(specs, None, id)?,
        (Some(category), None) => specs.category(category.into()).to_value(),
        (None, None) => specs.to_mapping(),
    };
    print_json(&value)?;
    Ok(0)
}

fn record_value(specs: &CfSpecs, category: Option<Category>, id: &str) -> Result<Value, CfError> {
    let record = match category {
        Some(category) => specs.category(category).record(id)?,
        None => specs
            .get(id)
            .ok_or_else(|| CfError::UnknownSpec {
                kind: "id",
                name: id.to_string(),
            })?,
    };
    let fields = serde_json::to_value(record)
        .map_err(|e| CfError::Config(format!("cannot serialize record {id}: {e}")))?;
    let mut out = serde_json::Map::new();
    out.insert(id.to_string(), fields);
    Ok(Value::Object(out))
}

fn read_document(path: &Path) -> Result<Document, CfError> {
    let text = if path.as_os_str() == "-" {
        let mut text = String::new();
        std::io::stdin()
            .read_to_string(&mut text)
            .map_err(|source| CfError::Io {
                path: path.to_path_buf(),
                source,
            })?;
        text
    } else {
        std::fs::read_to_string(path).map_err(|source| CfError::Io {
            path: path.to_path_buf(),
            source,
        })?
    };

    let value: Value = serde_json::from_str(&text)
        .map_err(|e| CfError::Config(format!("{}: invalid JSON: {e}", path.display())))?;
    let is_dataset = value.get("data_vars").is_some();
    let invalid = |e: serde_json::Error| CfError::Config(format!("{}: {e}", path.display()));

    let document = if is_dataset {
        let ds: Dataset = serde_json::from_value(value).map_err(invalid)?;
        let ds = ds.normalized();
        ds.validate()?;
        Document::Dataset(ds)
    } else {
        let array: DataArray = serde_json::from_value(value).map_err(invalid)?;
        let array = array.normalized();
        array.validate()?;
        Document::Array(array)
    };
    Ok(document)
}

fn match_entry(
    specs: &CfSpecs,
    array: &DataArray,
    category: Option<CategoryArg>,
) -> Result<Value, CfError> {
    let found = match category {
        Some(category) => {
            let category: Category = category.into();
            specs
                .match_array(array, category, None)?
                .map(|record| (category, record))
        }
        None => specs.match_any(array),
    };
    Ok(match found {
        Some((category, record)) => json!({
            "name": array.name(),
            "category": category.as_str(),
            "id": record.id,
        }),
        None => json!({ "name": array.name(), "id": null }),
    })
}

fn run_match(specs: &CfSpecs, path: &Path, category: Option<CategoryArg>) -> Result<i32, CfError> {
    let entries = match read_document(path)? {
        Document::Array(array) => vec![match_entry(specs, &array, category)?],
        Document::Dataset(ds) => {
            let mut entries = Vec::new();
            for array in ds.data_vars.values() {
                let category = category.unwrap_or(CategoryArg::DataVars);
                entries.push(match_entry(specs, array, Some(category))?);
            }
            for array in ds.coords.values() {
                let category = category.unwrap_or(CategoryArg::Coords);
                entries.push(match_entry(specs, array, Some(category))?);
            }
            entries
        }
    };

    let matched = entries.iter().any(|entry| !entry["id"].is_null());
    print_json(&Value::Array(entries))?;
    Ok(if matched { 0 } else { EXIT_NO_MATCH })
}

fn run_format(specs: &CfSpecs, path: &Path, no_coords: bool, fill: bool) -> Result<i32, CfError> {
    let options = if fill {
        FormatOptions::fill()
    } else {
        FormatOptions::default()
    }
    .with_format_coords(!no_coords);

    let value = match read_document(path)? {
        Document::Array(array) => {
            let formatted = specs.auto_format_with(&array, &options)?;
            serde_json::to_value(formatted)
        }
        Document::Dataset(ds) => {
            let formatted = specs.auto_format_with(&ds, &options)?;
            serde_json::to_value(formatted)
        }
    }
    .map_err(|e| CfError::Config(format!("cannot serialize output: {e}")))?;

    print_json(&value)?;
    Ok(0)
}

fn run_name(specs: &CfSpecs, id: &str, loc: Option<&str>) -> Result<i32, CfError> {
    println!("{}", specs.get_name_at(id, loc)?);
    Ok(0)
}
