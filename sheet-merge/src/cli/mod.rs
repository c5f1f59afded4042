//! Command-line interface

pub mod commands;

use clap::{Parser, Subcommand};

use commands::clone::CloneArgs;
use commands::merge::MergeArgs;

#[derive(Parser)]
#[command(name = "sheet-merge")]
#[command(about = "Merge observation data into spreadsheet templates")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Clone the template in a shared workbook, fill it in and upload it
    Merge(MergeArgs),
    /// Clone and fill a template in a local .xlsx file
    Clone(CloneArgs),
}
