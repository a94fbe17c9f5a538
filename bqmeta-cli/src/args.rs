use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(name = "bqmeta", version, about, arg_required_else_help = true)]
pub struct AppArgs {
    /// Directory holding `base.*` and `{environment}.*` configuration files
    #[arg(long, global = true)]
    pub config_dir: Option<PathBuf>,

    /// Defer per-dataset listings until a dataset is named exactly
    #[arg(long, global = true)]
    pub lazy: bool,

    /// Bypass the metadata cache
    #[arg(long, global = true)]
    pub no_cache: bool,

    /// Run the listing this many times, reporting how long each run took
    #[arg(long, global = true, default_value = "1")]
    pub repeat: u32,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// List projects exposed as catalogs
    Catalogs,
    /// List datasets
    Schemas(SchemaFilter),
    /// List tables, views and other table-like resources
    Tables {
        #[clap(flatten)]
        filter: SchemaFilter,

        /// Table name pattern
        #[arg(long)]
        table: Option<String>,

        /// Table types to keep, e.g. TABLE or VIEW
        #[arg(long = "type")]
        table_types: Vec<String>,
    },
    /// List columns
    Columns {
        #[clap(flatten)]
        filter: SchemaFilter,

        /// Table name pattern
        #[arg(long)]
        table: Option<String>,

        /// Column name pattern
        #[arg(long)]
        column: Option<String>,
    },
}

/// Catalog and dataset filters. Patterns use `%` and `_` wildcards.
#[derive(Debug, Args)]
pub struct SchemaFilter {
    /// Catalog (project) pattern
    #[arg(long)]
    pub catalog: Option<String>,

    /// Schema (dataset) pattern
    #[arg(long)]
    pub schema: Option<String>,
}
