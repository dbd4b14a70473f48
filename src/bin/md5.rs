//! Command-line interface for md5model
//! This binary parses `.md5mesh` / `.md5anim` files, validates them, and prints them back in
//! canonical form or as one of the inspection formats.
//!
//! Usage:
//!   md5 `<path>` [--format `<format>`] [--config `<file>`] [--kind mesh|anim] [--permissive]
//!   md5 --list-formats                                     - List all output formats
//!
//! Set `RUST_LOG=debug` to see parse and cache diagnostics on stderr.

use clap::{Arg, ArgAction, Command};
use md5model::md5::config::{Loader, Md5Config};
use md5model::md5::processor::{
    available_formats, process_source, read_source, resolve_kind, DocumentKind, OutputFormat,
    ProcessingError,
};
use std::path::Path;
use tracing_subscriber::EnvFilter;

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let matches = Command::new("md5")
        .version(env!("CARGO_PKG_VERSION"))
        .about("A tool for validating, normalizing and inspecting MD5 mesh and animation files")
        .arg_required_else_help(true)
        .arg(
            Arg::new("path")
                .help("Path to the .md5mesh or .md5anim file")
                .required_unless_present("list-formats")
                .index(1),
        )
        .arg(
            Arg::new("format")
                .long("format")
                .short('f')
                .help("Output format (default: output.format from the configuration)"),
        )
        .arg(
            Arg::new("config")
                .long("config")
                .short('c')
                .help("TOML file layered over the built-in defaults"),
        )
        .arg(
            Arg::new("kind")
                .long("kind")
                .help("Document kind when it cannot be told from the extension")
                .value_parser(["mesh", "anim"]),
        )
        .arg(
            Arg::new("permissive")
                .long("permissive")
                .help("Skip reference and frame layout checks")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("list-formats")
                .long("list-formats")
                .help("List available output formats")
                .action(ArgAction::SetTrue),
        )
        .get_matches();

    if matches.get_flag("list-formats") {
        handle_list_formats_command();
        return;
    }

    let config = load_config(
        matches.get_one::<String>("config").map(String::as_str),
        matches.get_flag("permissive"),
    )
    .unwrap_or_else(|e| exit_with(&e));

    let Some(path) = matches.get_one::<String>("path") else {
        eprintln!("A path is required unless listing formats");
        std::process::exit(1);
    };
    let format = matches.get_one::<String>("format").map(String::as_str);
    let kind = matches.get_one::<String>("kind").map(String::as_str);

    match handle_process_command(path, format, kind, &config) {
        Ok(output) => print!("{}", output),
        Err(e) => exit_with(&e),
    }
}

fn load_config(path: Option<&str>, permissive: bool) -> Result<Md5Config, ProcessingError> {
    let mut loader = Loader::new();
    if let Some(path) = path {
        loader = loader.with_file(path);
    }
    loader = loader.with_environment();
    if permissive {
        loader = loader.permissive()?;
    }
    Ok(loader.build()?)
}

/// Handle the default command: parse, validate and render one file
fn handle_process_command(
    path: &str,
    format: Option<&str>,
    kind: Option<&str>,
    config: &Md5Config,
) -> Result<String, ProcessingError> {
    let format = match format {
        Some(name) => OutputFormat::from_name(name)?,
        None => config.output.format,
    };
    let path = Path::new(path);
    let source = read_source(path)?;
    let kind = match kind {
        Some(name) => DocumentKind::from_name(name)?,
        None => resolve_kind(path, &source)?,
    };
    tracing::info!(path = %path.display(), %kind, %format, "processing");
    process_source(&source, kind, format, config)
}

/// Handle the list-formats command
fn handle_list_formats_command() {
    println!("Available output formats:\n");
    for (format, kinds) in available_formats() {
        let kinds: Vec<String> = kinds.iter().map(|k| k.to_string()).collect();
        println!("  {} ({})", format, kinds.join(", "));
    }
}

fn exit_with(error: &ProcessingError) -> ! {
    eprintln!("Error: {}", error);
    std::process::exit(1);
}
