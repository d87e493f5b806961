//! Veritas server binary entry point.

use clap::Parser;
use colored::Colorize;

use veritas_server::{
    cli::{Cli, Commands},
    commands,
    config::{default_config_path, ServerConfig},
    error::{ServerError, ServerResult},
    logging::init_tracing,
};

fn main() {
    let cli = Cli::parse();

    let rt = tokio::runtime::Runtime::new().expect("Failed to create tokio runtime");
    rt.block_on(async_main(cli));
}

async fn async_main(cli: Cli) {
    // The server always logs; one-shot commands only when asked.
    let serving = matches!(cli.command, None | Some(Commands::Serve { .. }));
    if serving || cli.verbose || std::env::var("RUST_LOG").is_ok() {
        init_tracing(cli.verbose, cli.log_json);
    }

    if let Err(e) = run(cli).await {
        print_error(&e);
        std::process::exit(e.exit_code());
    }
}

/// Print a user-friendly error message with exit code and recovery hint.
fn print_error(e: &ServerError) {
    eprintln!(
        "{} [{}]: {}",
        "Error".red().bold(),
        e.exit_code().to_string().yellow(),
        e
    );
    if let Some(suggestion) = e.suggestion() {
        eprintln!("{}: {}", "Hint".cyan(), suggestion);
    }
}

async fn run(cli: Cli) -> ServerResult<()> {
    let config_path = cli.config.unwrap_or_else(default_config_path);

    let output = match cli.command.unwrap_or(Commands::Serve { bind: None }) {
        Commands::Serve { bind } => {
            let config = ServerConfig::load(&config_path)?;
            return commands::serve(config, bind).await;
        }
        Commands::Init { force } => commands::init(&config_path, force)?,
        Commands::CheckConfig => {
            let config = ServerConfig::load(&config_path)?;
            commands::check_config(&config_path, &config)?
        }
        Commands::Quote {
            input,
            mode,
            model,
            json,
        } => {
            let config = ServerConfig::load(&config_path)?;
            commands::quote(&config, &input, mode.into(), model.as_deref(), json)?
        }
    };

    println!("{}", output);
    Ok(())
}
