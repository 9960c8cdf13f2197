use std::net::SocketAddr;
use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Parser)]
#[command(
    name = "divel",
    about = "divel: tamper-evident fingerprint ledger for digital evidence",
    version
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// TOML configuration file
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Ledger log path, overriding the configuration
    #[arg(long, global = true)]
    pub ledger: Option<PathBuf>,

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
    /// Fingerprint a file and ledger it under a case
    Append(AppendArgs),
    /// Show the ledgered record of an evidence item
    Show(ShowArgs),
    /// List a case's chain of custody
    Chain(CaseArgs),
    /// Validate a case's hash chain
    Validate(CaseArgs),
    /// Validate every case in the ledger
    Audit,
    /// Verify a file against its ledgered fingerprint
    Verify(VerifyArgs),
    /// Print a file's fingerprint without ledgering it
    Hash(HashArgs),
    /// Start the HTTP server
    Serve(ServeArgs),
}

#[derive(Args)]
pub struct AppendArgs {
    #[arg(long = "case")]
    pub case_id: String,
    #[arg(long = "evidence")]
    pub evidence_id: String,
    #[arg(long)]
    pub file: PathBuf,
    /// document, audio, video, image, or other; classified from the
    /// file extension when omitted
    #[arg(long = "type")]
    pub file_type: Option<String>,
    /// Role of the uploader, e.g. police, forensics, judge
    #[arg(long, default_value = "unknown")]
    pub role: String,
}

#[derive(Args)]
pub struct ShowArgs {
    pub evidence_id: String,
}

#[derive(Args)]
pub struct CaseArgs {
    pub case_id: String,
}

#[derive(Args)]
pub struct VerifyArgs {
    pub evidence_id: String,
    #[arg(long)]
    pub file: PathBuf,
}

#[derive(Args)]
pub struct HashArgs {
    pub path: PathBuf,
}

#[derive(Args)]
pub struct ServeArgs {
    /// Listen address, overriding the configuration
    #[arg(long)]
    pub bind: Option<SocketAddr>,
}
