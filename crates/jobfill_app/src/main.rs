mod cli;
mod config;
mod platform;

use anyhow::Context;
use clap::Parser;
use jobfill_logging::{fill_warn, ExecContext};

use crate::cli::{Cli, Command};
use crate::config::AppConfig;
use crate::platform::commands::{self, FillArgs};

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let (mut config, config_error) = match AppConfig::load(&cli.config) {
        Ok(config) => (config, None),
        Err(err) => (AppConfig::default(), Some(err)),
    };
    if let Some(url) = cli.backend_url {
        config.backend_url = url;
    }
    if let Some(dir) = cli.state_dir {
        config.state_dir = dir;
    }

    platform::logging::initialize(config.log_destination);
    jobfill_logging::set_context(ExecContext::Foreground);
    if let Some(err) = config_error {
        fill_warn!("{}; using defaults", err);
    }

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .on_thread_start(|| jobfill_logging::set_context(ExecContext::Foreground))
        .build()
        .context("starting runtime")?;

    runtime.block_on(async {
        match cli.command {
            Command::Score { resume, jd_url } => commands::score(&config, &resume, jd_url).await,
            Command::Resume => commands::resume(&config).await,
            Command::Fill {
                page,
                page_url,
                resume,
                resume_file,
                jd,
                report,
                force,
            } => {
                let args = FillArgs {
                    page,
                    page_url,
                    resume,
                    resume_file,
                    jd,
                    report,
                    force,
                };
                commands::fill(&config, args).await
            }
            Command::Cancel { request_id } => commands::cancel(&config, &request_id).await,
        }
    })
}
