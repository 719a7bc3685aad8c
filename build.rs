//! Build script for generating the `cloudtrain` man pages.
//!
//! Renders `cloudtrain.1` plus one page per subcommand
//! (`cloudtrain-train.1`, `cloudtrain-status.1`) into the build output
//! directory for packaging.

use std::env;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use clap::CommandFactory;
use clap_mangen::Man;

#[path = "src/cli/mod.rs"]
#[expect(dead_code, reason = "the build script only renders the parser")]
mod cli;

fn render_page(
    command: clap::Command,
    title: &str,
    out_dir: &Path,
) -> Result<(), Box<dyn std::error::Error>> {
    let mut buffer = Vec::new();
    Man::new(command).title(title).render(&mut buffer)?;
    fs::write(out_dir.join(format!("{title}.1")), buffer)?;
    Ok(())
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let mut stdout = std::io::stdout();
    writeln!(stdout, "cargo:rerun-if-changed=build.rs")?;
    writeln!(stdout, "cargo:rerun-if-changed=src/cli/mod.rs")?;

    let out_dir =
        PathBuf::from(env::var_os("OUT_DIR").ok_or_else(|| {
            std::io::Error::new(std::io::ErrorKind::NotFound, "OUT_DIR was not set")
        })?);

    let root = cli::Cli::command();
    for subcommand in root.get_subcommands() {
        let title = format!("{}-{}", root.get_name(), subcommand.get_name());
        render_page(subcommand.clone(), &title, &out_dir)?;
    }
    let title = root.get_name().to_owned();
    render_page(root, &title, &out_dir)?;

    Ok(())
}
