use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use std::sync::Arc;

use anyhow::{bail, Context};
use colored::Colorize;
use divel_crypto::Fingerprinter;
use divel_ledger::{open_ledger, ChainOfCustody, LedgerStore, ValidationResult};
use divel_server::DivelServer;
use divel_types::{
    CaseId, EvidenceId, EvidenceSubmission, FileType, Fingerprint, FingerprintRecord,
    UploaderRole,
};
use divel_verify::{VerificationEngine, VerificationStatus, VerificationVerdict};
use serde::Serialize;

use crate::cli::*;
use crate::config::DivelConfig;

pub fn run_command(cli: Cli) -> anyhow::Result<()> {
    let config = DivelConfig::resolve(&cli)?;
    let runtime = tokio::runtime::Runtime::new().context("starting async runtime")?;
    runtime.block_on(dispatch(cli, config))
}

async fn dispatch(cli: Cli, config: DivelConfig) -> anyhow::Result<()> {
    let out = Output(cli.format);
    let fingerprinter = config.ledger.fingerprinter();

    if let Command::Hash(args) = &cli.command {
        return cmd_hash(out, fingerprinter, &args.path);
    }

    let ledger = open_ledger(&config.ledger)
        .with_context(|| format!("opening ledger {}", config.ledger.log_path.display()))?;

    match cli.command {
        Command::Append(args) => cmd_append(out, &ledger, fingerprinter, args).await,
        Command::Show(args) => cmd_show(out, &ledger, &args.evidence_id).await,
        Command::Chain(args) => cmd_chain(out, &ledger, &args.case_id).await,
        Command::Validate(args) => cmd_validate(out, ledger, &args.case_id).await,
        Command::Audit => cmd_audit(out, ledger).await,
        Command::Verify(args) => cmd_verify(out, ledger, fingerprinter, args).await,
        Command::Serve(args) => {
            let mut server_config = config.server;
            if let Some(bind) = args.bind {
                server_config.bind_addr = bind;
            }
            println!(
                "divel server on {} (ledger: {}, backend: {})",
                server_config.bind_addr.to_string().bold(),
                config.ledger.log_path.display(),
                ledger.backend_name().cyan()
            );
            DivelServer::new(server_config, ledger, fingerprinter)
                .serve()
                .await?;
            Ok(())
        }
        Command::Hash(_) => Ok(()),
    }
}

#[derive(Clone, Copy)]
struct Output(OutputFormat);

impl Output {
    /// Print `value` as JSON, or run `text` for human output.
    fn emit<T: Serialize>(&self, value: &T, text: impl FnOnce(&T)) -> anyhow::Result<()> {
        match self.0 {
            OutputFormat::Json => println!("{}", serde_json::to_string_pretty(value)?),
            OutputFormat::Text => text(value),
        }
        Ok(())
    }
}

fn hash_file(fingerprinter: Fingerprinter, path: &Path) -> anyhow::Result<Fingerprint> {
    let file = File::open(path).with_context(|| format!("opening {}", path.display()))?;
    fingerprinter
        .fingerprint_reader(BufReader::new(file))
        .with_context(|| format!("reading {}", path.display()))
}

fn cmd_hash(out: Output, fingerprinter: Fingerprinter, path: &Path) -> anyhow::Result<()> {
    let hash = hash_file(fingerprinter, path)?;
    let value = serde_json::json!({
        "path": path.display().to_string(),
        "algorithm": fingerprinter.algorithm(),
        "hash": hash,
    });
    out.emit(&value, |_| {
        println!("{}  {}", hash.to_string().yellow(), path.display());
    })
}

async fn cmd_append(
    out: Output,
    ledger: &Arc<dyn LedgerStore>,
    fingerprinter: Fingerprinter,
    args: AppendArgs,
) -> anyhow::Result<()> {
    let case_id = CaseId::new(args.case_id)?;
    let evidence_id = EvidenceId::new(args.evidence_id)?;
    let file_type = match &args.file_type {
        Some(t) => t.parse().unwrap_or(FileType::Other),
        None => FileType::from_path(&args.file),
    };
    let hash = hash_file(fingerprinter, &args.file)?;

    let receipt = ledger
        .append(EvidenceSubmission::new(
            case_id,
            evidence_id,
            hash,
            file_type,
            UploaderRole::from(args.role),
        ))
        .await?;

    out.emit(&receipt, |r| {
        println!("{} Evidence ledgered", "✓".green().bold());
        println!("  Case: {} #{}", r.case_id.to_string().bold(), r.sequence);
        println!("  Evidence: {}", r.evidence_id.to_string().bold());
        println!("  Record: {}", r.record_id.to_string().dimmed());
        println!("  Hash: {}", r.hash.to_string().yellow());
        println!("  Previous: {}", r.previous_hash.short_hex().dimmed());
        if r.provenance.is_chain() {
            println!("  Anchor: {}", r.provenance.to_string().green());
        } else {
            println!("  Anchor: {}", r.provenance.to_string().yellow());
        }
    })
}

fn print_record(r: &FingerprintRecord) {
    println!(
        "{} {}  {}",
        format!("#{}", r.sequence).yellow().bold(),
        r.evidence_id.to_string().bold(),
        r.hash.short_hex().dimmed()
    );
    println!("  Case: {}", r.case_id);
    println!("  Type: {}  Uploaded by: {}", r.file_type, r.uploader_role.to_string().cyan());
    println!("  Timestamp: {}", r.timestamp.to_rfc3339());
    println!("  Hash: {}", r.hash);
    println!("  Previous: {}", r.previous_hash);
    println!("  Provenance: {}", r.provenance);
}

async fn cmd_show(
    out: Output,
    ledger: &Arc<dyn LedgerStore>,
    evidence_id: &str,
) -> anyhow::Result<()> {
    let record = ledger.get(&EvidenceId::new(evidence_id)?).await?;
    out.emit(&record, print_record)
}

async fn cmd_chain(out: Output, ledger: &Arc<dyn LedgerStore>, case_id: &str) -> anyhow::Result<()> {
    let case_id = CaseId::new(case_id)?;
    let records = ledger.chain(&case_id).await?;
    out.emit(&records, |records| {
        if records.is_empty() {
            println!("Case {} has no records.", case_id.to_string().bold());
        }
        for r in records {
            println!(
                "{} {}  {}  {}  {}",
                format!("#{}", r.sequence).yellow(),
                r.hash.short_hex().dimmed(),
                r.evidence_id.to_string().bold(),
                r.file_type,
                r.uploader_role.to_string().cyan()
            );
        }
    })
}

fn print_validation(result: &ValidationResult) {
    match result.broken_at_sequence {
        None => println!(
            "{} {}: {} records, chain {}",
            "✓".green().bold(),
            result.case_id.to_string().bold(),
            result.record_count,
            "intact".green()
        ),
        Some(at) => println!(
            "{} {}: {} records, chain {} at sequence {}",
            "✗".red().bold(),
            result.case_id.to_string().bold(),
            result.record_count,
            "BROKEN".red().bold(),
            at.to_string().red()
        ),
    }
}

async fn cmd_validate(
    out: Output,
    ledger: Arc<dyn LedgerStore>,
    case_id: &str,
) -> anyhow::Result<()> {
    let case_id = CaseId::new(case_id)?;
    let result = ChainOfCustody::new(ledger).validate(&case_id).await?;
    out.emit(&result, print_validation)?;
    if !result.valid {
        bail!("chain of custody for case {case_id} is broken");
    }
    Ok(())
}

async fn cmd_audit(out: Output, ledger: Arc<dyn LedgerStore>) -> anyhow::Result<()> {
    let results = ChainOfCustody::new(ledger).validate_all().await?;
    out.emit(&results, |results| {
        if results.is_empty() {
            println!("Ledger is empty.");
        }
        for result in results {
            print_validation(result);
        }
    })?;
    let broken = results.iter().filter(|r| !r.valid).count();
    if broken > 0 {
        bail!("{broken} of {} cases have a broken chain of custody", results.len());
    }
    Ok(())
}

fn print_verdict(v: &VerificationVerdict) {
    match &v.status {
        VerificationStatus::Verified => {
            println!("{} {}", "✓".green().bold(), "VERIFIED".green().bold())
        }
        VerificationStatus::Tampered(reason) => {
            println!("{} {}", "✗".red().bold(), "TAMPERED".red().bold());
            println!("  Reason: {}", reason.to_string().red());
        }
        VerificationStatus::NotFound => {
            println!("{} {}", "?".yellow().bold(), "NOT FOUND".yellow().bold())
        }
    }
    println!("  Evidence: {}", v.evidence_id.to_string().bold());
    println!("  Computed: {}", v.computed_hash);
    if let Some(r) = &v.record {
        println!("  Stored:   {}", r.stored_hash);
        println!("  Case: {} #{}", r.case_id, r.sequence);
        println!("  Uploaded by: {} at {}", r.uploader_role.to_string().cyan(), r.timestamp.to_rfc3339());
        println!("  Provenance: {}", r.provenance);
    }
}

async fn cmd_verify(
    out: Output,
    ledger: Arc<dyn LedgerStore>,
    fingerprinter: Fingerprinter,
    args: VerifyArgs,
) -> anyhow::Result<()> {
    let evidence_id = EvidenceId::new(args.evidence_id)?;
    let computed = hash_file(fingerprinter, &args.file)?;
    let verdict = VerificationEngine::new(ledger, fingerprinter)
        .verify(&evidence_id, computed)
        .await?;
    out.emit(&verdict, print_verdict)?;
    if !verdict.is_verified() {
        bail!("evidence {evidence_id} did not verify: {}", verdict.status);
    }
    Ok(())
}
