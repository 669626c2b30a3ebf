//! Renders the `stackdeploy` man page into the build output directory.

use std::env;
use std::error::Error;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use clap::CommandFactory;
use clap_mangen::Man;

#[path = "src/cli/mod.rs"]
mod cli;

const MAN_PAGE: &str = "stackdeploy.1";

fn main() -> Result<(), Box<dyn Error>> {
    let mut stdout = io::stdout();
    for watched in ["build.rs", "src/cli/mod.rs"] {
        writeln!(stdout, "cargo:rerun-if-changed={watched}")?;
    }

    let out_dir = env::var_os("OUT_DIR")
        .map(PathBuf::from)
        .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, "OUT_DIR was not set"))?;
    write_man_page(&out_dir)
}

fn write_man_page(out_dir: &Path) -> Result<(), Box<dyn Error>> {
    let mut rendered = Vec::new();
    Man::new(cli::Cli::command()).render(&mut rendered)?;
    fs::write(out_dir.join(MAN_PAGE), rendered)?;
    Ok(())
}
