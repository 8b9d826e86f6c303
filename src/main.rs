use std::process::ExitCode;

use clap::Parser;
use log::{error, info, warn};

use modkeeper::{
    cli::args::{CliArgs, Command},
    config::ModkeeperConfig,
    install::{InstallOptions, InstallOutcome, RemoveOutcome, UpdateOutcome},
    Modkeeper,
};

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    if let Err(e) = run() {
        error!("{:#}", e);
        return ExitCode::FAILURE;
    }
    ExitCode::SUCCESS
}

fn run() -> anyhow::Result<()> {
    let cli_args: CliArgs = CliArgs::parse();
    let config = ModkeeperConfig::load()?;

    let mut builder = Modkeeper::builder().root(&cli_args.dir);
    if let Some(cache_directory) = cli_args.cache_directory.or(config.cache_dir) {
        builder = builder.cache_directory(cache_directory);
    }
    if let Some(remote_url) = cli_args.remote.or(config.remote_url) {
        builder = builder.remote_url(remote_url);
    }
    if let Some(branch) = cli_args.branch.or(config.branch) {
        builder = builder.branch(branch);
    }
    if let Some(api_url) = cli_args.api_url.or(config.api_url) {
        builder = builder.api_url(api_url);
    }
    if let Some(api_token) = config.api_token {
        builder = builder.api_token(api_token);
    }
    let modkeeper = builder.try_build()?;
    let component_type = cli_args.component_type;

    match cli_args.cmd {
        Command::List { installed: true } => {
            for record in modkeeper.installed(component_type)? {
                println!(
                    "{}\t{}\t{}",
                    record.component_path().display(),
                    record.revision,
                    record.remote_url
                );
            }
        }
        Command::List { installed: false } => {
            for name in modkeeper.available(component_type)? {
                println!("{name}");
            }
        }
        Command::Install { name, sha, force } => {
            let options = InstallOptions {
                revision: sha,
                force,
            };
            if let InstallOutcome::AlreadyInstalled(record) =
                modkeeper.install(component_type, &name, &options)?
            {
                warn!(
                    "{} is already installed at {}",
                    record.component_path().display(),
                    record.revision
                );
            }
        }
        Command::Update { name, sha } => {
            match modkeeper.update(component_type, &name, sha.as_deref())? {
                UpdateOutcome::Updated { previous, record } => info!(
                    "Updated {} from {} to {}",
                    name, previous, record.revision
                ),
                UpdateOutcome::UpToDate(record) => {
                    info!("{} is up to date at {}", name, record.revision)
                }
            }
        }
        Command::Remove { name } => {
            if let RemoveOutcome::NotInstalled { .. } = modkeeper.remove(component_type, &name)? {
                warn!("{} '{}' is not installed", component_type.noun(), name);
            }
        }
        Command::Check => {
            let report = modkeeper.check()?;
            for key in &report.added {
                info!("Added {}", key);
            }
            for key in &report.removed {
                info!("Removed {}", key);
            }
        }
        Command::ClearCache => modkeeper.clear_cache()?,
    }
    Ok(())
}
