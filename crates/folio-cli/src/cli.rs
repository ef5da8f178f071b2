use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Parser)]
#[command(
    name = "folio",
    about = "Folio: content-addressed deduplicating resource store",
    version
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Store directory
    #[arg(long, global = true, default_value = ".folio")]
    pub root: PathBuf,

    /// Configuration file (defaults to <root>/config.toml when present)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[arg(long, global = true, default_value = "text")]
    pub format: OutputFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
pub enum Command {
    /// Store a file as a resource of an owner
    Store(StoreArgs),
    /// Write a resource's bytes to a file or stdout
    Get(GetArgs),
    /// Check whether a file's content is already stored
    Exists(FileArgs),
    /// Check whether an owner holds a resource
    Has(ResourceArgs),
    /// List an owner's resources
    Ls(OwnerArgs),
    /// Remove one resource of an owner
    Rm(ResourceArgs),
    /// Remove every resource of an owner
    RmOwner(OwnerArgs),
    /// Repair reference counts and reclaim orphaned content
    Cleanup,
    /// Audit stored content against its hashes
    Verify,
    /// Show deduplication statistics
    Stats,
    /// Print the content hash of a file
    Hash(FileArgs),
}

#[derive(Args)]
pub struct StoreArgs {
    pub owner: String,
    /// Resource path within the owner, e.g. OEBPS/Images/cover.jpg
    pub path: String,
    /// File to read the content from
    pub file: PathBuf,
    /// MIME type (guessed from the resource path when omitted)
    #[arg(long)]
    pub mime: Option<String>,
}

#[derive(Args)]
pub struct GetArgs {
    pub owner: String,
    pub path: String,
    /// Output file (stdout when omitted)
    #[arg(short, long)]
    pub output: Option<PathBuf>,
}

#[derive(Args)]
pub struct ResourceArgs {
    pub owner: String,
    pub path: String,
}

#[derive(Args)]
pub struct OwnerArgs {
    pub owner: String,
}

#[derive(Args)]
pub struct FileArgs {
    pub file: PathBuf,
}
