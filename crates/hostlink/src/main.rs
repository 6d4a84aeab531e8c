mod cli;
mod commands;
mod error;
mod output;

use clap::{Parser, ValueEnum};
use tracing_subscriber::EnvFilter;

use hostlink_config::{Config, ConfigError, LogSection};

use crate::cli::{Cli, Command, OutputFormat};
use crate::commands::{Context, config_cmd};
use crate::error::CliError;

fn main() {
    // Parse CLI arguments
    let cli = Cli::parse();

    // Load config up front so logging can honor `[log]`; a broken file only
    // fails the commands that need it.
    let loaded = hostlink_config::load_config_from(&config_cmd::resolve_path(&cli.global));
    let log = loaded.as_ref().map(|c| c.log.clone()).unwrap_or_default();
    init_tracing(cli.global.verbose, &log);

    // Dispatch and handle errors with proper exit codes
    if let Err(err) = run(cli, loaded) {
        let code = err.exit_code();
        eprintln!("{:?}", miette::Report::new(err));
        std::process::exit(code);
    }
}

fn init_tracing(verbosity: u8, log: &LogSection) {
    let filter = match verbosity {
        0 => log.filter.as_deref().unwrap_or("warn"),
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .with_target(false);

    if log.json {
        builder.json().init();
    } else {
        builder.init();
    }
}

/// `--output`, else `defaults.output` from the config file, else table.
fn output_format(
    flag: Option<OutputFormat>,
    cfg: Option<&Config>,
) -> Result<OutputFormat, CliError> {
    if let Some(format) = flag {
        return Ok(format);
    }
    let Some(name) = cfg.map(|c| c.defaults.output.as_str()) else {
        return Ok(OutputFormat::Table);
    };
    OutputFormat::from_str(name, true).map_err(|reason| CliError::Validation {
        field: "defaults.output".into(),
        reason,
    })
}

fn run(cli: Cli, loaded: Result<Config, ConfigError>) -> Result<(), CliError> {
    let format = output_format(cli.global.output, loaded.as_ref().ok())?;

    match cli.command {
        // Config commands work even when the config file is broken
        Command::Config(args) => config_cmd::handle(args, &cli.global, loaded, format),

        // Shell completions generation
        Command::Completions(args) => {
            use clap::CommandFactory;
            use clap_complete::generate;

            let mut cmd = Cli::command();
            generate(args.shell, &mut cmd, "hostlink", &mut std::io::stdout());
            Ok(())
        }

        // Replays need a valid configuration
        cmd => {
            let ctx = Context {
                config: loaded?,
                format,
                quiet: cli.global.quiet,
                color: output::should_color(cli.global.color),
            };

            tracing::debug!(command = ?cmd, "dispatching command");
            commands::dispatch(cmd, &ctx)
        }
    }
}
