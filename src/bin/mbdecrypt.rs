//! mbdecrypt - decrypt files from an encrypted mobile-device backup
//!
//! Usage:
//!   mbdecrypt hashes <BACKUP>
//!   mbdecrypt decrypt <BACKUP> <OUT> [--passcode P] [--file ID[:SIZE]]... [--category NAME]...

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use mobilebackup_rs::aliases::PasscodeString;
use mobilebackup_rs::consts::{DEFAULT_WORKERS, MANIFEST_DB};
use mobilebackup_rs::{decrypt_batch, BackupPath, BatchConfig, FileJob, Session};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

/// Decrypt encrypted mobile-device backups
#[derive(Parser)]
#[command(name = "mbdecrypt")]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print passcode hash lines for offline cracking tools
    Hashes {
        /// Backup directory (contains Manifest.plist)
        #[arg(value_name = "BACKUP")]
        backup: PathBuf,
    },

    /// Decrypt Manifest.db and selected files into OUT
    Decrypt {
        /// Backup directory (contains Manifest.plist)
        #[arg(value_name = "BACKUP")]
        backup: PathBuf,

        /// Output directory
        #[arg(value_name = "OUT")]
        out: PathBuf,

        /// Backup passcode (prompted when omitted)
        #[arg(long, env = "MBDECRYPT_PASSCODE", hide_env_values = true)]
        passcode: Option<String>,

        /// File id to decrypt, optionally with its plaintext size
        #[arg(long = "file", value_name = "ID[:SIZE]", value_parser = parse_file_spec)]
        files: Vec<(String, Option<u64>)>,

        /// Well-known database to decrypt (contacts, messages, voicemails, calls, safari)
        #[arg(long = "category", value_name = "NAME")]
        categories: Vec<BackupPath>,

        /// Decrypt every file of DOMAIN whose path contains FRAGMENT
        #[arg(long = "match", value_name = "DOMAIN:FRAGMENT", value_parser = parse_match_spec)]
        matches: Vec<(String, String)>,

        /// Concurrent decrypt workers
        #[arg(long, default_value_t = DEFAULT_WORKERS)]
        workers: usize,

        /// Deadline for the whole batch, in seconds
        #[arg(long, value_name = "SECS", default_value_t = 30)]
        timeout: u64,
    },
}

fn parse_file_spec(s: &str) -> Result<(String, Option<u64>), String> {
    match s.split_once(':') {
        Some((id, size)) => {
            let size = size
                .parse::<u64>()
                .map_err(|e| format!("invalid size '{size}': {e}"))?;
            Ok((id.to_string(), Some(size)))
        }
        None => Ok((s.to_string(), None)),
    }
}

fn parse_match_spec(s: &str) -> Result<(String, String), String> {
    s.split_once(':')
        .filter(|(domain, fragment)| !domain.is_empty() && !fragment.is_empty())
        .map(|(domain, fragment)| (domain.to_string(), fragment.to_string()))
        .ok_or_else(|| format!("expected DOMAIN:FRAGMENT, got '{s}'"))
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    match run(Cli::parse()) {
        Ok(code) => code,
        Err(err) => {
            eprintln!("Error: {err:#}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<ExitCode> {
    match cli.command {
        Commands::Hashes { backup } => {
            let (session, manifest) = Session::open_backup(&backup)?;
            if !manifest.is_encrypted {
                bail!("{} is not an encrypted backup", backup.display());
            }
            for line in session.extract_hashes()? {
                println!("{line}");
            }
            Ok(ExitCode::SUCCESS)
        }
        Commands::Decrypt {
            backup,
            out,
            passcode,
            files,
            categories,
            matches,
            workers,
            timeout,
        } => {
            let (mut session, manifest) = Session::open_backup(&backup)?;
            if manifest.is_encrypted {
                let passcode = match passcode {
                    Some(p) => PasscodeString::new(p),
                    None => PasscodeString::new(
                        rpassword::prompt_password("Backup passcode: ")
                            .context("reading passcode")?,
                    ),
                };
                if !session.unlock(&passcode)? {
                    bail!("wrong passcode");
                }
                let stale = session.failed_classes();
                if !stale.is_empty() {
                    println!(
                        "warning: protection classes {stale:?} stayed locked; \
                         their files will fail"
                    );
                }
            }

            let decryptor = session.decryptor()?;
            let local = decryptor
                .open_local_backup(&manifest, &backup, &out)
                .with_context(|| format!("opening {MANIFEST_DB}"))?;

            let mut jobs: Vec<FileJob> = files
                .into_iter()
                .map(|(id, size)| {
                    let destination = out.join(&id);
                    FileJob::new(id, size, destination)
                })
                .collect();
            for (domain, fragment) in &matches {
                for entry in local.manifest().find_files(domain, fragment)? {
                    let destination = out.join(&entry.file_id);
                    jobs.push(FileJob::new(entry.file_id, None, destination));
                }
            }

            let categories = if jobs.is_empty() && categories.is_empty() {
                BackupPath::ALL.to_vec()
            } else {
                categories
            };
            jobs.extend(
                categories
                    .into_iter()
                    .filter(|c| *c != BackupPath::Manifest)
                    .map(|c| FileJob::new(c.file_id(), None, c.decrypted_path(&out))),
            );

            let config = BatchConfig::builder()
                .with_workers(workers)
                .with_timeout(Duration::from_secs(timeout))
                .build();
            let report = decrypt_batch(&session, Arc::new(local), jobs, &config)?;

            for outcome in &report.outcomes {
                match &outcome.result {
                    Ok(bytes) => println!(
                        "ok      {} -> {} ({bytes} bytes)",
                        outcome.job.file_id,
                        outcome.job.destination.display()
                    ),
                    Err(err) => println!("FAILED  {}: {err}", outcome.job.file_id),
                }
            }

            Ok(if report.all_succeeded() {
                ExitCode::SUCCESS
            } else {
                ExitCode::FAILURE
            })
        }
    }
}
