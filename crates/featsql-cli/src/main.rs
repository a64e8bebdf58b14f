//! featsql Command-Line Tool
//!
//! Inspects a provider configuration: derived relation trees, compiled
//! query SQL and the statements of a staged feature write.

mod executor;
mod formatter;

use clap::{Parser, Subcommand};
use formatter::OutputFormat;
use std::path::PathBuf;

/// featsql Command-Line Tool
#[derive(Parser, Debug)]
#[command(name = "featsql")]
#[command(version, about = "Relational mapping compiler for feature serving")]
pub struct Args {
    /// Provider configuration file (JSON)
    #[arg(short = 'c', long)]
    pub config: PathBuf,

    /// Output format
    #[arg(long, default_value = "table", value_enum)]
    pub format: OutputFormat,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Print the relation tree of a feature type
    Tree {
        /// Feature type name
        feature_type: String,
    },

    /// Print the meta and value queries of a read
    Query {
        /// Feature type name
        feature_type: String,

        /// Maximum number of features (0 selects the configured default)
        #[arg(long, default_value_t = 0)]
        limit: usize,

        #[arg(long, default_value_t = 0)]
        offset: usize,

        /// Sort key on a root column, `column` or `column:desc`; repeatable
        #[arg(long = "sort")]
        sort: Vec<String>,

        /// JSON filter file
        #[arg(long)]
        filter: Option<PathBuf>,

        /// Look up a single feature by id
        #[arg(long, conflicts_with_all = ["filter", "sort"])]
        id: Option<String>,
    },

    /// Print the statements of a feature write with synthetic ids
    Mutate {
        /// Feature type name
        feature_type: String,

        /// JSON value operations file
        #[arg(long)]
        values: Option<PathBuf>,

        /// Replace the feature with this id
        #[arg(long, conflicts_with = "delete")]
        update: Option<String>,

        /// Delete the feature with this id
        #[arg(long)]
        delete: Option<String>,
    },
}

fn main() {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("featsql=info")),
        )
        .init();

    let args = Args::parse();

    match executor::execute(&args) {
        Ok(output) => println!("{}", output),
        Err(e) => {
            let formatter = formatter::create_formatter(args.format);
            eprintln!("{}", formatter.format_error(&e.to_string()));
            std::process::exit(1);
        }
    }
}
