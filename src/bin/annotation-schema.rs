//! Annotation Schema CLI
//!
//! Command-line interface for validating annotation writes against a library.

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use annotation_schema::{
    as_items, load_json, load_library, parse_stored_item, validate_color, validate_sort_index,
    Engine, FieldRegistry, ItemKey, ItemStore, Library, MemoryStore, Position, ValidateOptions,
    ValidationError, DEFAULT_MAX_POSITION_LENGTH,
};

#[derive(Parser)]
#[command(name = "annotation-schema")]
#[command(about = "Validate annotation items and version-guarded updates")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::Args)]
struct LibraryArgs {
    /// JSON file of stored items (attachments, annotations) to validate against
    #[arg(long)]
    library: Option<PathBuf>,

    /// Write into group library N instead of a user library
    #[arg(long, conflicts_with = "user")]
    group: Option<u64>,

    /// User library id
    #[arg(long, default_value_t = 1)]
    user: u64,

    /// Strict mode: reject unknown properties (default: false)
    #[arg(long, default_value_t = false, action = clap::ArgAction::Set)]
    strict: bool,

    /// Maximum annotationPosition length in bytes
    #[arg(long, default_value_t = DEFAULT_MAX_POSITION_LENGTH)]
    max_position_length: usize,
}

impl LibraryArgs {
    fn target(&self) -> Library {
        match self.group {
            Some(id) => Library::Group(id),
            None => Library::User(self.user),
        }
    }

    fn options(&self) -> ValidateOptions {
        ValidateOptions::new()
            .strict(self.strict)
            .max_position_length(self.max_position_length)
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Write a batch of items and report per-item results
    Validate {
        /// Payload file: one item or an array of items
        payload: PathBuf,

        #[command(flatten)]
        library: LibraryArgs,

        /// Output results as JSON (for automation)
        #[arg(long)]
        json: bool,
    },

    /// Apply a patch to a stored annotation at a given version
    Patch {
        /// Stored annotation record (with key and version)
        record: PathBuf,

        /// Patch to apply
        patch: PathBuf,

        /// Version the patch was made against
        #[arg(long)]
        version: u64,

        #[command(flatten)]
        library: LibraryArgs,

        /// Output results as JSON (for automation)
        #[arg(long)]
        json: bool,
    },

    /// Check individual field values
    Check {
        /// Sort index (PPPPP|OOOOOO|TTTTT)
        #[arg(long)]
        sort_index: Option<String>,

        /// Hex color (#RRGGBB)
        #[arg(long)]
        color: Option<String>,

        /// Position payload (JSON string)
        #[arg(long)]
        position: Option<String>,
    },
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Validate {
            payload,
            library,
            json,
        } => run_validate(&payload, &library, json),

        Commands::Patch {
            record,
            patch,
            version,
            library,
            json,
        } => run_patch(&record, &patch, version, &library, json),

        Commands::Check {
            sort_index,
            color,
            position,
        } => run_check(sort_index, color, position),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(code) => ExitCode::from(code),
    }
}

/// Build an engine over an in-memory store seeded from `--library`.
fn open_engine(args: &LibraryArgs, json_output: bool) -> Result<Engine<MemoryStore>, u8> {
    let registry = FieldRegistry::default();
    let options = args.options();
    let store = MemoryStore::new();

    if let Some(path) = &args.library {
        let records = load_library(path, &registry, &options).map_err(|e| {
            report_error(json_output, &format!("loading library: {}", e));
            e.exit_code() as u8
        })?;
        for record in records {
            store.insert(args.target(), record).map_err(|e| {
                report_error(json_output, &format!("loading library: {}", e));
                2u8
            })?;
        }
    }

    Ok(Engine::new(store)
        .with_registry(registry)
        .with_options(options))
}

fn run_validate(payload_path: &Path, args: &LibraryArgs, json_output: bool) -> Result<(), u8> {
    let payload = load_json(payload_path).map_err(|e| {
        report_error(json_output, &format!("loading payload: {}", e));
        e.exit_code() as u8
    })?;
    let engine = open_engine(args, json_output)?;

    let response = engine.write_batch(args.target(), &as_items(payload));

    if json_output {
        let output = serde_json::to_string(&response).map_err(|e| {
            eprintln!("Error serializing output: {}", e);
            2u8
        })?;
        println!("{}", output);
    } else {
        for (index, key) in &response.success {
            println!("[{}] {}: ok", index, key);
        }
        if !response.failed.is_empty() {
            eprintln!("Validation failed:");
            for (index, failure) in &response.failed {
                eprintln!("  [{}] {} ({})", index, failure.message, failure.code);
            }
        }
    }

    if response.is_ok() {
        Ok(())
    } else {
        Err(1)
    }
}

fn run_patch(
    record_path: &Path,
    patch_path: &Path,
    version: u64,
    args: &LibraryArgs,
    json_output: bool,
) -> Result<(), u8> {
    let engine = open_engine(args, json_output)?;
    let library = args.target();

    let record = load_json(record_path)
        .and_then(|value| parse_stored_item(&value, engine.registry(), engine.options()))
        .map_err(|e| {
            report_error(json_output, &format!("loading record: {}", e));
            e.exit_code() as u8
        })?;
    let key: ItemKey = record.key.clone();
    engine.store().insert(library, record).map_err(|e| {
        report_error(json_output, &format!("loading record: {}", e));
        2u8
    })?;

    let patch = load_json(patch_path).map_err(|e| {
        report_error(json_output, &format!("loading patch: {}", e));
        e.exit_code() as u8
    })?;

    match engine.update(library, &key, version, &patch) {
        Ok(updated) => {
            if json_output {
                println!("{}", updated.to_json());
            } else {
                println!("{}: updated to version {}", updated.key, updated.version);
            }
            Ok(())
        }
        Err(e) => {
            if json_output {
                let output = serde_json::json!({
                    "valid": false,
                    "code": e.status_code(),
                    "error": e.to_string(),
                });
                println!("{}", output);
            } else {
                eprintln!("Error: {}", e);
            }
            Err(e.exit_code() as u8)
        }
    }
}

fn run_check(
    sort_index: Option<String>,
    color: Option<String>,
    position: Option<String>,
) -> Result<(), u8> {
    if sort_index.is_none() && color.is_none() && position.is_none() {
        eprintln!("Error: nothing to check; pass --sort-index, --color or --position");
        return Err(2);
    }

    let mut errors: Vec<ValidationError> = Vec::new();
    if let Some(value) = &sort_index {
        errors.extend(validate_sort_index(value).err());
    }
    if let Some(value) = &color {
        errors.extend(validate_color(value).err());
    }
    if let Some(value) = &position {
        errors.extend(Position::parse(value, DEFAULT_MAX_POSITION_LENGTH).err());
    }

    if errors.is_empty() {
        println!("Valid");
        Ok(())
    } else {
        eprintln!("Validation failed:");
        for error in errors {
            eprintln!("  {}", error);
        }
        Err(1)
    }
}

/// Output an error message in plain text or JSON format.
fn report_error(json_output: bool, msg: &str) {
    if json_output {
        println!("{}", serde_json::json!({ "valid": false, "error": msg }));
    } else {
        eprintln!("Error: {}", msg);
    }
}
