//! Config validation CLI tool
//!
//! Validates an idlewarden configuration file and reports any errors.

use idlewarden_config::Backoff;
use idlewarden_util::default_config_path;
use std::path::PathBuf;
use std::process::ExitCode;

fn main() -> ExitCode {
    let args: Vec<String> = std::env::args().collect();

    let config_path = match args.get(1) {
        Some(path) => PathBuf::from(path),
        None => {
            let default_path = default_config_path();
            eprintln!("Usage: validate-config [config-file]");
            eprintln!();
            eprintln!("Validates an idlewarden configuration file.");
            eprintln!();
            eprintln!("If no path is provided, uses: {}", default_path.display());
            eprintln!();
            eprintln!("Example:");
            eprintln!("  validate-config {}", default_path.display());
            eprintln!("  validate-config config.example.toml");
            return ExitCode::from(2);
        }
    };

    // Check file exists
    if !config_path.exists() {
        eprintln!("Error: Configuration file not found: {}", config_path.display());
        return ExitCode::from(1);
    }

    // Try to load and validate
    match idlewarden_config::load_config(&config_path) {
        Ok(settings) => {
            println!("✓ Configuration is valid");
            println!();
            println!("Summary:");
            println!("  Config version: {}", idlewarden_config::CURRENT_CONFIG_VERSION);
            println!(
                "  Server: {}:{} (virtual server port {})",
                settings.server.host, settings.server.query_port, settings.server.server_port
            );
            println!("  Nickname: {}", settings.identity.nickname);
            println!(
                "  Idle threshold: {}s, sweep every {}s",
                settings.idle.threshold.as_secs(),
                settings.idle.sweep_interval.as_secs()
            );
            println!("  Holding channel: {}", settings.idle.holding_channel);
            println!(
                "  Protection: {} for {} minutes",
                settings.protection.command,
                settings.protection.duration.as_secs() / 60
            );

            let attempts = match settings.reconnect.max_attempts {
                Some(n) => n.to_string(),
                None => "unbounded".to_string(),
            };
            let backoff = match settings.reconnect.backoff {
                Backoff::Fixed => "fixed",
                Backoff::Exponential => "exponential",
            };
            println!(
                "  Reconnect: {} attempts, {}ms {} delay",
                attempts,
                settings.reconnect.delay.as_millis(),
                backoff
            );
            println!("  Database: {}", settings.storage.database.display());

            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("✗ Configuration validation failed");
            eprintln!();
            match &e {
                idlewarden_config::ConfigError::ReadError(io_err) => {
                    eprintln!("Failed to read file: {}", io_err);
                }
                idlewarden_config::ConfigError::ParseError(parse_err) => {
                    eprintln!("TOML parse error:");
                    eprintln!("  {}", parse_err);
                }
                idlewarden_config::ConfigError::ValidationFailed { errors } => {
                    eprintln!("Validation errors ({}):", errors.len());
                    for err in errors {
                        eprintln!("  - {}", err);
                    }
                }
                idlewarden_config::ConfigError::UnsupportedVersion(ver) => {
                    eprintln!(
                        "Unsupported config version: {} (expected {})",
                        ver,
                        idlewarden_config::CURRENT_CONFIG_VERSION
                    );
                }
            }
            ExitCode::from(1)
        }
    }
}
