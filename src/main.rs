use std::io::{self, BufRead, Write};
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Context;
use sniprobe::config::app_config::{AppConfig, load_config};
use sniprobe::config::request_file::RequestFile;
use sniprobe::http_probe::prelude::*;
use sniprobe::output::report::Report;
use sniprobe::output::results_dir::prepare_results_dir;

#[tokio::main]
async fn main() -> ExitCode {
    let dotenv = dotenvy::dotenv();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    if let Err(err) = dotenv {
        if !err.not_found() {
            log::warn!("Ignoring unreadable .env file: {err}");
        }
    }

    let app = load_config();
    let code = match run(&app).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            log::error!("{err:#}");
            ExitCode::FAILURE
        }
    };

    if app.pause_on_exit {
        wait_for_enter();
    }
    code
}

async fn run(app: &AppConfig) -> anyhow::Result<()> {
    prepare_results_dir(&app.results_dir).context("prepare results directory")?;

    let RequestFile { mut config, targets } = RequestFile::load(&app.config_file)
        .with_context(|| format!("load request file {}", app.config_file.display()))?;
    config.results_dir = app.results_dir.clone();

    let ctx = Arc::new(ProbeContext::new(config).context("build TLS configuration")?);
    let config = ctx.config();

    let mut report = Report::new(io::stdout(), config, &targets);
    let started = chrono::Local::now().format("%Y-%m-%d %H:%M:%S");
    report.banner(&config.base_url, targets.len(), started)?;

    let artifacts = config.captures_anything().then(|| config.results_dir.clone());
    dispatch_with(Arc::clone(&ctx), targets, |outcome| {
        if let Err(err) = report.outcome(&outcome) {
            log::error!("Failed to print outcome for {}: {err}", outcome.display_address());
        }
    })
    .await;

    report.finish(artifacts.as_deref())?;
    Ok(())
}

fn wait_for_enter() {
    print!("Press Enter to close");
    let _ = io::stdout().flush();
    let mut line = String::new();
    let _ = io::stdin().lock().read_line(&mut line);
}
