//! paysync CLI binary entry point.

use clap::Parser;
use colored::Colorize;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use paysync_cli::{
    cli::{Cli, Commands, CursorCommand, PaymentCommand},
    commands,
    config::{default_config_path, CliConfig},
    error::{CliError, CliResult},
    output::OutputFormat,
};

fn main() {
    let cli = Cli::parse();

    let rt = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            let e = CliError::from(e);
            print_error(&e);
            std::process::exit(e.exit_code());
        }
    };
    rt.block_on(async_main(cli));
}

async fn async_main(cli: Cli) {
    // Initialize logging based on --verbose flag or RUST_LOG env var
    let has_rust_log = std::env::var("RUST_LOG").is_ok();
    if cli.verbose || has_rust_log {
        let filter = if cli.verbose {
            EnvFilter::from_default_env().add_directive("paysync=debug".parse().unwrap())
        } else {
            EnvFilter::from_default_env()
        };
        tracing_subscriber::registry()
            .with(fmt::layer().with_writer(std::io::stderr))
            .with(filter)
            .init();
    }

    if let Err(e) = run(cli).await {
        print_error(&e);
        std::process::exit(e.exit_code());
    }
}

/// Print a user-friendly error message with error code and recovery hint.
fn print_error(e: &CliError) {
    let code = e.error_code();

    eprintln!(
        "{} [{}]: {}",
        "Error".red().bold(),
        code.to_string().yellow(),
        e
    );

    if let Some(suggestion) = code.suggestion() {
        eprintln!("{}: {}", "Hint".cyan(), suggestion);
    }
}

async fn run(cli: Cli) -> CliResult<()> {
    let config_path = cli.config.unwrap_or_else(default_config_path);
    let config = CliConfig::load(&config_path)?;
    let format: OutputFormat = cli.format.into();

    let output = match cli.command {
        // Setup
        Commands::Init { force } => commands::init(config, &config_path, format, force)?,

        // Runner
        Commands::Run { once, stream } => commands::run(config, format, once, stream).await?,

        Commands::Sweep => commands::sweep(config, format)?,

        Commands::Cursor(command) => match command {
            CursorCommand::Show { stream } => {
                commands::cursor_show(config, format, stream.as_deref())?
            }
            CursorCommand::List => commands::cursor_list(config, format)?,
            CursorCommand::Pause { stream } => {
                commands::cursor_pause(config, format, stream.as_deref())?
            }
            CursorCommand::Resume { stream } => {
                commands::cursor_resume(config, format, stream.as_deref())?
            }
        },

        // Payments
        Commands::Nonce { address } => commands::nonce(config, format, &address)?,

        Commands::Payment(command) => match command {
            PaymentCommand::Create {
                address,
                amount,
                nonce,
            } => commands::payment::create(config, format, &address, amount, nonce)?,
            PaymentCommand::Show { address, id } => {
                commands::payment::show(config, format, &address, id.as_deref())?
            }
            PaymentCommand::Sign { address, id, tx } => {
                commands::payment::sign(config, format, &address, &id, tx.as_deref())?
            }
            PaymentCommand::Verify { address, id, tx } => {
                commands::payment::verify(config, format, &address, &id, &tx).await?
            }
        },

        // Balances
        Commands::Balance { address } => commands::balance(config, format, &address)?,

        Commands::History {
            address,
            page,
            page_size,
        } => commands::history(config, format, &address, page, page_size)?,

        Commands::Charge {
            address,
            input,
            output,
        } => commands::charge(config, format, &address, input, output)?,

        Commands::Audit => commands::audit(config, format)?,
    };

    println!("{}", output);

    Ok(())
}
