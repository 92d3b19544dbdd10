//! rowcalc - evaluate spreadsheet formulas from the command line

mod config;
mod default_functions;

use anyhow::{Context, bail};
use rowcalc_core::Workbook;
use rowcalc_core::storage::csv_string;
use rowcalc_engine::engine::{CellPosition, ParseResult, Reference, format_value};
use std::env;
use std::path::PathBuf;
use tracing::debug;
use tracing_subscriber::EnvFilter;

const DEFAULT_SHEET: &str = "Sheet1";

fn print_usage() {
    eprintln!("Usage: rowcalc [OPTIONS] [FILE]");
    eprintln!();
    eprintln!("Arguments:");
    eprintln!("  [FILE]                    Workbook to load (.csv, or .cells workbook format)");
    eprintln!();
    eprintln!("Options:");
    eprintln!("  -c, --command <FORMULA>   Evaluate a formula and print its value (can be repeated)");
    eprintln!("  -d, --deps <FORMULA>      Print the cells and ranges a formula reads (can be repeated)");
    eprintln!("  -s, --sheet <NAME>        Sheet for CSV files and formulas (default: Sheet1)");
    eprintln!("      --at <CELL>           Cell formulas are evaluated in (default: A1)");
    eprintln!("      --set <CELL=INPUT>    Set a cell before evaluating (can be repeated)");
    eprintln!("  -f, --functions <FILE>    Load custom Rhai functions (can be repeated)");
    eprintln!("      --no-default-functions  Skip default.rhai from the config dir");
    eprintln!("  -o, --output <FILE>       Write the workbook (.csv writes evaluated values)");
    eprintln!("      --json                Print results as JSON");
    eprintln!("      --config <FILE>       Read settings from this file instead of config.toml");
    eprintln!("  -h, --help                Print help");
}

#[derive(Debug, Default)]
struct Args {
    file: Option<PathBuf>,
    commands: Vec<String>,
    deps: Vec<String>,
    sheet: Option<String>,
    at: Option<String>,
    sets: Vec<String>,
    functions: Vec<PathBuf>,
    no_default_functions: bool,
    output: Option<PathBuf>,
    json: bool,
    config: Option<PathBuf>,
}

fn take_value(args: &[String], i: &mut usize, name: &str) -> anyhow::Result<String> {
    *i += 1;
    match args.get(*i) {
        Some(v) => Ok(v.clone()),
        None => bail!("{} requires a value", name),
    }
}

/// Parse command line arguments. `None` means help was requested.
fn parse_args(args: &[String]) -> anyhow::Result<Option<Args>> {
    let mut parsed = Args::default();
    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "-h" | "--help" => return Ok(None),
            "-c" | "--command" => parsed.commands.push(take_value(args, &mut i, "--command")?),
            "-d" | "--deps" => parsed.deps.push(take_value(args, &mut i, "--deps")?),
            "-s" | "--sheet" => parsed.sheet = Some(take_value(args, &mut i, "--sheet")?),
            "--at" => parsed.at = Some(take_value(args, &mut i, "--at")?),
            "--set" => parsed.sets.push(take_value(args, &mut i, "--set")?),
            "-f" | "--functions" => {
                let path = take_value(args, &mut i, "--functions")?;
                parsed.functions.push(PathBuf::from(path));
            }
            "--no-default-functions" => parsed.no_default_functions = true,
            "-o" | "--output" => {
                parsed.output = Some(PathBuf::from(take_value(args, &mut i, "--output")?));
            }
            "--json" => parsed.json = true,
            "--config" => {
                parsed.config = Some(PathBuf::from(take_value(args, &mut i, "--config")?));
            }
            arg if arg.starts_with('-') => bail!("Unknown option: {}", arg),
            arg => {
                if parsed.file.is_some() {
                    bail!("Unexpected argument: {}", arg);
                }
                parsed.file = Some(PathBuf::from(arg));
            }
        }
        i += 1;
    }
    Ok(Some(parsed))
}

fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn cell_position(text: &str, sheet: &str) -> anyhow::Result<CellPosition> {
    match Reference::parse(text.trim(), sheet)? {
        Reference::Cell(position) => Ok(position),
        Reference::Range(_) => bail!("Expected a single cell, got a range: {}", text),
    }
}

fn display(result: &ParseResult) -> String {
    match (&result.error, &result.result) {
        (Some(code), _) => code.to_string(),
        (None, Some(value)) => format_value(value),
        (None, None) => String::new(),
    }
}

/// Run the CLI, returning the process exit code.
fn run(args: Args) -> anyhow::Result<i32> {
    let (config, warnings) = config::load_config(args.config.as_deref());
    for warning in warnings {
        eprintln!("Warning: {}", warning);
    }
    let sheet = args
        .sheet
        .clone()
        .or_else(|| config.sheet.clone())
        .unwrap_or_else(|| DEFAULT_SHEET.to_string());
    debug!(%sheet, "starting");

    let mut workbook = Workbook::new(config.evaluator_options());

    let mut functions = config.functions.clone();
    functions.extend(args.functions.iter().cloned());
    default_functions::prepend_default_functions_if_present(
        &mut functions,
        args.no_default_functions,
    );
    if !functions.is_empty() {
        workbook
            .load_functions_files(&functions)
            .context("Failed to load custom functions")?;
    }

    if let Some(path) = &args.file {
        workbook
            .load_file(path, &sheet)
            .with_context(|| format!("Failed to load {}", path.display()))?;
    }

    for assignment in &args.sets {
        let Some((cell, input)) = assignment.split_once('=') else {
            bail!("--set expects CELL=INPUT, got: {}", assignment);
        };
        let position = cell_position(cell, &sheet)?;
        workbook
            .set_cell_from_input(position, input)
            .with_context(|| format!("Failed to set {}", cell.trim()))?;
    }

    let at = cell_position(args.at.as_deref().unwrap_or("A1"), &sheet)?;

    for formula in &args.deps {
        let refs = workbook.dependencies(formula, &at);
        if args.json {
            let refs: Vec<String> = refs.iter().map(ToString::to_string).collect();
            println!("{}", serde_json::to_string(&refs)?);
        } else {
            for r in refs {
                println!("{}", r);
            }
        }
    }

    let mut exit_code = 0;
    for formula in &args.commands {
        let result = workbook.evaluate(formula, &at);
        if args.json {
            println!("{}", serde_json::to_string(&result)?);
        } else {
            println!("{}", display(&result));
        }
        if let Some(message) = &result.error_message {
            if !args.json {
                eprintln!("{}: {}", formula.trim(), message);
            }
            exit_code = 1;
        }
    }

    if let Some(path) = &args.output {
        workbook
            .save_as(path, &sheet)
            .with_context(|| format!("Failed to write {}", path.display()))?;
        eprintln!("Written to {}", path.display());
    }

    let did_something = !args.commands.is_empty() || !args.deps.is_empty() || args.output.is_some();
    if !did_something {
        if args.file.is_none() && args.sets.is_empty() {
            print_usage();
            return Ok(0);
        }
        if args.json {
            println!("{}", serde_json::to_string_pretty(&workbook.store().snapshot())?);
        } else {
            print!("{}", csv_string(&workbook, &sheet));
        }
    }

    Ok(exit_code)
}

fn main() {
    let args: Vec<String> = env::args().collect();
    let args = match parse_args(&args) {
        Ok(Some(args)) => args,
        Ok(None) => {
            print_usage();
            return;
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            print_usage();
            std::process::exit(1);
        }
    };

    init_logging();
    match run(args) {
        Ok(code) => std::process::exit(code),
        Err(e) => {
            eprintln!("Error: {:#}", e);
            std::process::exit(1);
        }
    }
}
