//! Command-line arguments

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

/// Verify, inspect and publish image datasets
#[derive(Parser, Debug)]
#[command(name = "image-dataset", version, about, long_about = None)]
pub struct Cli {
    /// Settings file (JSON); defaults are used for missing keys
    #[arg(long, global = true)]
    pub settings: Option<PathBuf>,

    /// Also write a timestamped log file into this directory
    #[arg(long, global = true)]
    pub log_dir: Option<PathBuf>,

    /// Debug logging with source locations
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

/// Where the dataset comes from and how it is read
#[derive(Args, Debug, Clone)]
pub struct SourceArgs {
    /// Image folder, zip archive or URL, or an archive descriptor ending in `.json`
    pub source: String,

    /// Configuration to build (archive descriptors only)
    #[arg(long)]
    pub config_name: Option<String>,

    /// Skip dangling metadata rows and images without metadata instead of failing
    #[arg(long)]
    pub lenient: bool,

    /// Force (`true`) or keep (`false`) directory labels
    #[arg(long)]
    pub drop_labels: Option<bool>,

    /// Ignore metadata.jsonl files
    #[arg(long)]
    pub drop_metadata: bool,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Generate every split and check each record against the schema
    Verify {
        #[command(flatten)]
        source: SourceArgs,

        /// Write dataset_infos.json next to the data
        #[arg(long)]
        save_infos: bool,

        /// Decode every image
        #[arg(long)]
        decode: bool,
    },

    /// Print the schema and the first records of a split
    Inspect {
        #[command(flatten)]
        source: SourceArgs,

        /// Split to show; the first planned split by default
        #[arg(long)]
        split: Option<String>,

        #[arg(long, default_value_t = 5)]
        limit: usize,
    },

    /// Export to `<out>/<namespace>/<name>` in the folder layout
    Publish {
        #[command(flatten)]
        source: SourceArgs,

        /// `namespace/name`
        destination: String,

        #[arg(long, default_value = ".")]
        out: PathBuf,

        /// Replace an existing export
        #[arg(long)]
        overwrite: bool,

        /// Re-split `train` into train/test with this test fraction
        #[arg(long)]
        test_fraction: Option<f64>,

        #[arg(long, default_value_t = 42)]
        seed: u64,
    },
}
