use std::{path::PathBuf, process::ExitCode};

use clap::{Parser, Subcommand};
use stout::{
    command::{deploy::deploy, rollback::rollback},
    config::{self, DeployConfig, DeploySection, GlobalSection, RollbackConfig, RollbackSection},
    storage::DirectoryStorage,
    upload::Uploader,
};
use tracing::level_filters::LevelFilter;

/// Deploys static sites to a bucket, keeping every version around for
/// instant rollback.
#[derive(Debug, Clone, Parser)]
struct Args {
    #[command(subcommand)]
    command: Commands,
    #[arg(long, default_value_t = false, global = true)]
    verbose: bool,
    /// Config file [default: ./config.yaml]
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// Environment of the config file to use [default: default]
    #[arg(long, global = true)]
    env: Option<String>,
    #[command(flatten)]
    global: GlobalSection,
}

#[derive(Debug, Clone, Subcommand)]
enum Commands {
    /// Upload the site and make its HTML live
    Deploy(DeploySection),
    /// Point the live HTML back at an earlier version
    Rollback(RollbackSection),
}

async fn run(args: Args) -> stout::Result<()> {
    let profile = config::load_profile(args.config.as_deref(), args.env.as_deref())?;
    let global = args.global.merge(profile.global);
    let bucket = global.require_bucket()?;

    match args.command {
        Commands::Deploy(flags) => {
            let config = DeployConfig::try_from(flags.merge(profile.deploy))?;

            let storage = DirectoryStorage::new(bucket).await?;
            let uploader = Uploader::new(storage).with_workers(config.workers);

            let report = deploy(&uploader, &config).await?;
            println!("{report}");
        }
        Commands::Rollback(flags) => {
            let config = RollbackConfig::try_from(flags.merge(profile.rollback))?;

            let storage = DirectoryStorage::new(bucket).await?;
            let report = rollback(&storage, &config).await?;

            if report.found {
                println!("{} file(s) rolled back to version {}", report.reverted, report.version);
            } else {
                println!("version {} not found", report.version);
            }
        }
    }

    Ok(())
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    let log_level = if args.verbose {
        LevelFilter::TRACE
    } else {
        LevelFilter::INFO
    };

    tracing_subscriber::fmt()
        .with_max_level(log_level)
        .with_writer(std::io::stderr)
        .init();

    match run(args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("stout error: {err}");
            ExitCode::FAILURE
        }
    }
}
