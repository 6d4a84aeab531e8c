//! Config subcommand handlers.

use std::path::PathBuf;

use hostlink_config::{self as config, Config, ConfigError};

use crate::cli::{ConfigArgs, ConfigCommand, GlobalOpts, OutputFormat};
use crate::error::CliError;
use crate::output;

/// The file `--config` points at, or the platform default.
pub fn resolve_path(global: &GlobalOpts) -> PathBuf {
    global.config.clone().unwrap_or_else(config::config_path)
}

pub fn handle(
    args: ConfigArgs,
    global: &GlobalOpts,
    loaded: Result<Config, ConfigError>,
    format: OutputFormat,
) -> Result<(), CliError> {
    match args.command {
        ConfigCommand::Show => {
            let cfg = loaded?;
            let toml_str = toml::to_string_pretty(&cfg)?;
            let out = output::render_single(format, &cfg, |_| toml_str.clone(), |_| {
                resolve_path(global).display().to_string()
            })?;
            output::print_output(&out, global.quiet);
            Ok(())
        }

        ConfigCommand::Path => {
            output::print_output(&resolve_path(global).display().to_string(), global.quiet);
            Ok(())
        }

        ConfigCommand::Init { force } => {
            let path = resolve_path(global);
            if path.exists() && !force {
                return Err(CliError::ConfigExists {
                    path: path.display().to_string(),
                });
            }
            config::save_config_to(&Config::default(), &path)?;
            tracing::info!(path = %path.display(), "wrote default configuration");
            output::print_output(
                &format!("Wrote default configuration to {}", path.display()),
                global.quiet,
            );
            Ok(())
        }
    }
}
