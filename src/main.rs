use anyhow::{Context, Result};
use clap::{CommandFactory, Parser};
use mindtrack::app::{run_check, run_generate, run_server};
use mindtrack::cli::{Cli, Commands, ConfigAction};
use mindtrack::config::Config;
use mindtrack::pipeline::GenerationRequest;
use owo_colors::OwoColorize;
use std::path::Path;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.quiet, cli.verbose);

    match cli.command {
        None => {
            let config = load_config(cli.config.as_deref())?;
            run_server(config).await?;
        }
        Some(Commands::Serve {
            host,
            port,
            retention,
            sweep_interval,
        }) => {
            let mut config = load_config(cli.config.as_deref())?;
            if let Some(host) = host {
                config.server.host = host;
            }
            if let Some(port) = port {
                config.server.port = port;
            }
            if let Some(retention) = retention {
                config.sessions.retention = retention;
            }
            if let Some(interval) = sweep_interval {
                config.sessions.sweep_interval = interval;
            }
            config.validate()?;
            run_server(config).await?;
        }
        Some(Commands::Generate {
            disease,
            symptom,
            instructions,
            output,
        }) => {
            let config = load_config(cli.config.as_deref())?;
            let request = GenerationRequest::new(&disease, &symptom, &instructions);
            match run_generate(&config, request, output.as_deref(), cli.quiet).await {
                Ok(location) => {
                    println!("{}", location);
                    if let Some(output) = output
                        && !cli.quiet
                    {
                        eprintln!("{} {}", "Saved to".green(), output.display());
                    }
                }
                Err(e) => {
                    eprintln!("{}", format!("Generation failed: {}", e).red());
                    std::process::exit(1);
                }
            }
        }
        Some(Commands::Check) => {
            let config = load_config(cli.config.as_deref())?;
            if !run_check(&config).await {
                std::process::exit(1);
            }
        }
        Some(Commands::Config { action }) => {
            handle_config_command(action, cli.config.as_deref())?;
        }
        Some(Commands::Completions { shell }) => {
            clap_complete::generate(
                shell,
                &mut Cli::command(),
                "mindtrack",
                &mut std::io::stdout(),
            );
        }
    }

    Ok(())
}

/// Initialise logging once. `RUST_LOG` wins over the verbosity flags.
fn init_tracing(quiet: bool, verbose: u8) {
    let level = match (quiet, verbose) {
        (true, _) => "warn",
        (false, 0) => "info",
        (false, 1) => "debug",
        (false, _) => "trace",
    };
    let default_filter = format!("mindtrack={level},tower_http=warn");

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

/// Load configuration from file or use defaults.
///
/// Priority order:
/// 1. Custom config path from CLI (--config), which must exist
/// 2. Default config path (~/.config/mindtrack/config.toml), if present
/// 3. Built-in defaults
///
/// Environment overrides are applied on top in every case.
fn load_config(custom_path: Option<&Path>) -> Result<Config> {
    let config = if let Some(path) = custom_path {
        Config::load(path).with_context(|| format!("loading {}", path.display()))?
    } else {
        let default_path = Config::default_path();
        Config::load_or_default(&default_path)
            .with_context(|| format!("loading {}", default_path.display()))?
    };

    let config = config.with_env_overrides();
    config.validate()?;
    Ok(config)
}

/// Handle configuration commands.
fn handle_config_command(action: ConfigAction, custom_path: Option<&Path>) -> Result<()> {
    match action {
        ConfigAction::Show => {
            let config = load_config(custom_path)?;
            print!("{}", config.to_toml()?);
        }
        ConfigAction::Path => {
            let path = custom_path
                .map(Path::to_path_buf)
                .unwrap_or_else(Config::default_path);
            println!("{}", path.display());
        }
    }
    Ok(())
}
