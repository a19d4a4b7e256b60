use std::panic::{self, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use clap::{Parser, Subcommand};

use bareos_s3::config::{Settings, DEFAULT_CONFIG_PATH};
use bareos_s3::crypto::KeyManager;
use bareos_s3::error::{StorageError, StorageResult};
use bareos_s3::job::{BackupJob, JobContext, RestoreJobsJob, RestoreVolumesJob};
use bareos_s3::store::DirectoryStore;

/// Usage or argument problem
const EXIT_BAD_ARGS: u8 = 1;
/// Missing or unreadable configuration
const EXIT_CONFIG: u8 = 2;
/// The job ran and failed; safe to retry after fixing the reported cause
const EXIT_JOB_FAILED: u8 = 66;
/// Something outside the error taxonomy went wrong
const EXIT_UNEXPECTED: u8 = 99;

#[derive(Parser)]
#[command(
    name = "bareos-s3",
    version,
    about = "Move Bareos file-backup volumes into S3-compatible cloud storage, \
             or copy them from the cloud back to local disk."
)]
struct Cli {
    /// Path to the settings file
    #[arg(long, env = "BAREOS_S3_CONFIG", default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    /// Print debug detail when a job fails
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Encrypt volumes and upload them, deleting the local copies on success
    Backup {
        /// The scratch path specified in the Bareos sd config
        scratch_dir: PathBuf,
        /// Numeric job ID followed by volume names (pipe-delimited lists work too)
        args: Vec<String>,
    },

    /// Download and decrypt explicit jobId-VOLNAME pairs
    RestoreVolumes {
        /// The scratch path specified in the Bareos sd config
        scratch_dir: PathBuf,
        /// One or more jobId-VOLNAME pairs, e.g. 234-TESTVOL-0001
        args: Vec<String>,
    },

    /// Download and decrypt every volume uploaded for the given jobs
    RestoreJobs {
        /// The scratch path specified in the Bareos sd config
        scratch_dir: PathBuf,
        /// One or more numeric job IDs
        args: Vec<String>,
    },
}

fn main() -> ExitCode {
    eprintln!(
        "S3 storage for Bareos backups v{}",
        env!("CARGO_PKG_VERSION")
    );
    eprintln!();

    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(err) => {
            let _ = err.print();
            return match err.kind() {
                clap::error::ErrorKind::DisplayHelp | clap::error::ErrorKind::DisplayVersion => {
                    ExitCode::SUCCESS
                }
                _ => ExitCode::from(EXIT_BAD_ARGS),
            };
        }
    };
    let verbose = cli.verbose;

    // A panic anywhere below is outside the error taxonomy; Bareos run
    // scripts distinguish that from an ordinary job failure by exit code.
    match panic::catch_unwind(AssertUnwindSafe(|| run(cli))) {
        Ok(Ok(())) => {
            println!("Job execution completed normally.");
            ExitCode::SUCCESS
        }
        Ok(Err(err)) => report_failure(verbose, err),
        Err(_) => {
            eprintln!();
            eprintln!("Job execution FAILED with an unexpected error.");
            ExitCode::from(EXIT_UNEXPECTED)
        }
    }
}

fn run(cli: Cli) -> StorageResult<()> {
    match &cli.command {
        Commands::Backup { scratch_dir, args } => {
            check_scratch_dir(scratch_dir)?;
            let job = BackupJob::from_args(args)?;
            job.run(&build_context(&cli, scratch_dir)?)
        }
        Commands::RestoreVolumes { scratch_dir, args } => {
            check_scratch_dir(scratch_dir)?;
            let job = RestoreVolumesJob::from_args(args)?;
            job.run(&build_context(&cli, scratch_dir)?)
        }
        Commands::RestoreJobs { scratch_dir, args } => {
            check_scratch_dir(scratch_dir)?;
            let job = RestoreJobsJob::from_args(args)?;
            job.run(&build_context(&cli, scratch_dir)?)
        }
    }
}

fn check_scratch_dir(scratch_dir: &Path) -> StorageResult<()> {
    if !scratch_dir.is_dir() {
        return Err(StorageError::BadArgs(format!(
            "Scratch directory does not exist: {}",
            scratch_dir.display()
        )));
    }
    Ok(())
}

/// Resolve settings and assemble everything the job needs
///
/// Runs after argument parsing so that a typo'd job ID never triggers a
/// passphrase prompt.
fn build_context(cli: &Cli, scratch_dir: &Path) -> StorageResult<JobContext> {
    let settings = Settings::load(&cli.config)?;
    let bucket = settings.bucket(&cli.config)?;
    let store_root = settings.store_root(&cli.config)?;
    let passphrase = settings.passphrase(&cli.config)?;

    Ok(JobContext {
        store: Arc::new(DirectoryStore::new(store_root)),
        bucket,
        keys: KeyManager::new(passphrase.as_str()),
        scratch_dir: scratch_dir.to_path_buf(),
        restore_tier: settings.restore_tier()?,
        restore_retention_days: settings.restore_retention_days()?,
    })
}

fn report_failure(verbose: bool, err: StorageError) -> ExitCode {
    match &err {
        StorageError::BadArgs(message) => {
            eprintln!("{}", message);
            eprintln!();
            eprintln!("Run 'bareos-s3 --help' for usage information.");
            ExitCode::from(EXIT_BAD_ARGS)
        }
        StorageError::Config(_) => {
            eprintln!("{}", err);
            ExitCode::from(EXIT_CONFIG)
        }
        _ => {
            eprintln!();
            eprintln!("Job execution FAILED with the following error:");
            eprintln!("{}", err);
            if verbose {
                eprintln!();
                eprintln!("{:?}", err);
            }
            ExitCode::from(EXIT_JOB_FAILED)
        }
    }
}
