//! Command-line entry point.
//!
//! ```text
//! captcha-solver image <path>
//! captcha-solver challenge <site-key> <site-url>
//! ```
//!
//! Configuration comes from `CAPTCHA_SOLVER_*` environment variables, or from
//! the JSON file named by `CAPTCHA_SOLVER_CONFIG`.

use std::path::PathBuf;

use anyhow::{bail, Context};
use captcha_solver::{CancellationToken, ClientConfig, Solver};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

enum Command {
    Image(PathBuf),
    Challenge { site_key: String, site_url: String },
}

fn parse_args() -> anyhow::Result<Command> {
    let args: Vec<String> = std::env::args().skip(1).collect();
    match args.as_slice() {
        [cmd, path] if cmd == "image" => Ok(Command::Image(PathBuf::from(path))),
        [cmd, site_key, site_url] if cmd == "challenge" => Ok(Command::Challenge {
            site_key: site_key.clone(),
            site_url: site_url.clone(),
        }),
        _ => bail!(
            "usage:\n  captcha-solver image <path>\n  captcha-solver challenge <site-key> <site-url>"
        ),
    }
}

fn load_config() -> anyhow::Result<ClientConfig> {
    match std::env::var("CAPTCHA_SOLVER_CONFIG") {
        Ok(path) if !path.is_empty() => {
            ClientConfig::load(&PathBuf::from(path)).context("Failed to load config file")
        }
        _ => ClientConfig::from_env().context("Failed to read configuration from environment"),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let command = parse_args()?;
    let config = load_config()?;
    tracing::info!("Using solving service at {}", config.base_url);
    let solver = Solver::new(config)?;

    let cancel = CancellationToken::new();
    let on_ctrl_c = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupted, cancelling solve");
            on_ctrl_c.cancel();
        }
    });

    let answer = match command {
        Command::Image(path) => {
            let image = tokio::fs::read(&path)
                .await
                .with_context(|| format!("Failed to read {}", path.display()))?;
            solver.solve_image_with_cancel(&image, &cancel).await?
        }
        Command::Challenge { site_key, site_url } => {
            solver
                .solve_challenge_with_cancel(&site_key, &site_url, &cancel)
                .await?
        }
    };

    println!("{}", answer);
    Ok(())
}
