mod abundance;
mod assemble;
mod cli;
mod config;
mod error;
mod extract;
mod fraglen;
mod fragment;
mod index;
mod output;
mod process;
mod profile;
mod quality;

#[macro_use]
extern crate log;
#[macro_use]
extern crate anyhow;

use anyhow::Context;

fn main() -> anyhow::Result<()> {
    let cfg = cli::handle_cli().with_context(|| "Error processing command line arguments")?;
    process::simulate(&cfg).with_context(|| "Error simulating reads")?;
    Ok(())
}
