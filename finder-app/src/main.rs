//! `writer <file> <string>`: create (or truncate) `<file>` and write
//! `<string>` into it.

use std::fs::OpenOptions;
use std::io::Write;
use std::os::unix::fs::OpenOptionsExt;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::error::ErrorKind;
use clap::Parser;

const FILE_MODE: u32 = 0o664;

/// Write a string to a file, replacing its contents.
#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Cli {
    /// File to create or truncate.
    file: PathBuf,

    /// Text to write.
    content: String,
}

fn write_file(path: &Path, content: &str) -> Result<()> {
    let mut file = OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .mode(FILE_MODE)
        .open(path)
        .with_context(|| format!("could not create file named {}", path.display()))?;

    file.write_all(content.as_bytes())
        .with_context(|| format!("could not write to {}", path.display()))?;
    Ok(())
}

fn main() -> ExitCode {
    // Initialise env_logger; set RUST_LOG to control verbosity.
    env_logger::init();

    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) if matches!(e.kind(), ErrorKind::DisplayHelp | ErrorKind::DisplayVersion) => e.exit(),
        Err(e) => {
            log::error!("invalid arguments: {}", e.kind());
            e.exit()
        }
    };

    match write_file(&cli.file, &cli.content) {
        Ok(()) => {
            log::debug!("Writing {} to {}", cli.content, cli.file.display());
            ExitCode::SUCCESS
        }
        Err(e) => {
            log::error!("{e:#}");
            ExitCode::FAILURE
        }
    }
}
