// SPDX-FileCopyrightText: 2026 Herald Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Herald - bulk message delivery coordinator.
//!
//! This is the binary entry point.

#[cfg(not(target_env = "msvc"))]
use tikv_jemallocator::Jemalloc;

#[cfg(not(target_env = "msvc"))]
#[global_allocator]
static GLOBAL: Jemalloc = Jemalloc;

mod serve;
mod shutdown;
mod status;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use herald_config::{ConfigError, HeraldConfig};

/// Herald - bulk message delivery coordinator.
#[derive(Parser, Debug)]
#[command(name = "herald", version, about, long_about = None)]
struct Cli {
    /// Explicit configuration file (env overrides still apply).
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

/// Available subcommands.
#[derive(Subcommand, Debug)]
enum Commands {
    /// Start the HTTP API and realtime event stream.
    Serve,
    /// Query a running instance's health endpoint.
    Status {
        /// Output structured JSON.
        #[arg(long)]
        json: bool,
        /// Disable colors.
        #[arg(long)]
        plain: bool,
    },
    /// Manage Herald configuration.
    Config {
        #[command(subcommand)]
        action: ConfigCommands,
    },
}

#[derive(Subcommand, Debug)]
enum ConfigCommands {
    /// Load and validate the configuration, then print a summary.
    Check,
}

fn load(path: Option<&PathBuf>) -> Result<HeraldConfig, Vec<ConfigError>> {
    match path {
        Some(path) => herald_config::load_and_validate_path(path),
        None => herald_config::load_and_validate(),
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let config = match load(cli.config.as_ref()) {
        Ok(config) => config,
        Err(errors) => {
            herald_config::render_errors(&errors);
            std::process::exit(1);
        }
    };

    let result = match cli.command {
        Some(Commands::Serve) => serve::run_serve(config).await,
        Some(Commands::Status { json, plain }) => status::run_status(&config, json, plain).await,
        Some(Commands::Config {
            action: ConfigCommands::Check,
        }) => {
            print_config_summary(&config);
            Ok(())
        }
        None => {
            println!("herald: use --help for available commands");
            Ok(())
        }
    };

    if let Err(e) = result {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}

fn print_config_summary(config: &HeraldConfig) {
    println!("configuration is valid");
    println!("  listen:   {}:{}", config.server.host, config.server.port);
    println!(
        "  auth:     {}",
        if config.server.bearer_token.is_some() {
            "bearer token"
        } else {
            "disabled (loopback only)"
        }
    );
    println!("  database: {}", config.storage.database_path);
    println!("  webhooks: {} target(s)", config.webhook.targets.len());
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn binary_loads_config_defaults() {
        let config = herald_config::load_and_validate_str("")
            .expect("default config should be valid");
        assert_eq!(config.service.name, "herald");
        assert_eq!(config.server.port, 3000);
    }

    #[test]
    fn cli_parses_config_check() {
        let cli = Cli::try_parse_from(["herald", "--config", "/tmp/h.toml", "config", "check"])
            .unwrap();
        assert_eq!(cli.config, Some(PathBuf::from("/tmp/h.toml")));
        assert!(matches!(
            cli.command,
            Some(Commands::Config {
                action: ConfigCommands::Check
            })
        ));
    }

    #[test]
    fn cli_parses_status_flags() {
        let cli = Cli::try_parse_from(["herald", "status", "--json"]).unwrap();
        assert!(matches!(
            cli.command,
            Some(Commands::Status {
                json: true,
                plain: false
            })
        ));
    }
}
