//! # symode
//!
//! Command-line entry point; see [`symode::config::Args`] for the options.

use anyhow::Result;
use clap::Parser;
use symode::config::Args;

fn main() -> Result<()> {
    symode::app::run(Args::parse())
}
