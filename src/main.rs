use std::path::PathBuf;

use anyhow::Context;
use clap::{CommandFactory, Parser as ClapParser, ValueEnum, error::ErrorKind};
use pywatc::{
    CodegenOptions, Session,
    backend::wasm::Listing,
    frontend::{SourceFile, SourceFileOrigin},
};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Clone, Copy, Default, ValueEnum)]
enum Emit {
    /// A complete module with imports, functions and the entry point
    #[default]
    Module,
    /// Only the entry point instructions of each unit
    Body,
}

/// Files are compiled in order as units of one session, so later files see
/// the globals and functions of earlier ones.
#[derive(Debug, ClapParser)]
#[command(version, about, long_about = None)]
pub struct Args {
    source_files: Vec<PathBuf>,

    /// Raise log verbosity (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[arg(long, value_enum, default_value_t)]
    emit: Emit,

    /// Do not annotate global addresses with variable names
    #[arg(long)]
    no_annotate: bool,
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let default_level = match args.verbose {
        0 => "warn",
        1 => "pywatc=debug",
        _ => "pywatc=trace",
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    if args.source_files.is_empty() {
        Args::command()
            .error(ErrorKind::MissingRequiredArgument, "Missing source files!")
            .exit();
    }

    for source_file in &args.source_files {
        if !source_file.exists() {
            Args::command()
                .error(
                    ErrorKind::InvalidValue,
                    format!("Source file '{}' does not exist!", source_file.display()),
                )
                .exit()
        }

        if !source_file.is_file() {
            Args::command()
                .error(
                    ErrorKind::InvalidValue,
                    format!("Input path '{}' is not a file!", source_file.display()),
                )
                .exit()
        }
    }

    /* Read in source files */

    let source_files = args
        .source_files
        .into_iter()
        .map(|path| {
            let contents = std::fs::read_to_string(&path)
                .with_context(|| format!("failed to read '{}'", path.display()))?;

            Ok(SourceFile {
                contents,
                origin: SourceFileOrigin::File(path),
            })
        })
        .collect::<anyhow::Result<Vec<_>>>()?;

    let mut session = Session::new(CodegenOptions {
        annotate_globals: !args.no_annotate,
    });

    for source_file in &source_files {
        let program = match session.compile(source_file) {
            Ok(program) => program,
            Err(error) => {
                eprintln!("{}", error.render(source_file));
                std::process::exit(1);
            }
        };

        match args.emit {
            Emit::Module => print!("{}", session.assemble(&program)),
            Emit::Body => print!(
                "{}",
                Listing {
                    instructions: &program.body,
                    depth: 0,
                }
            ),
        }
    }

    Ok(())
}
