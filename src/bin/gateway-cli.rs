use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use rand::RngCore;
use serde_json::Value;

use calendar_gateway::config::loader::{load_config, ConfigError};

const MAX_KEYS: u8 = 10;

#[derive(Parser)]
#[command(name = "gateway-cli")]
#[command(about = "Management CLI for the calendar gateway", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate random API keys for VALID_API_KEYS
    Keygen {
        /// Number of keys to generate (1-10)
        #[arg(short, long, default_value_t = 1, value_parser = clap::value_parser!(u8).range(1..=MAX_KEYS as i64))]
        count: u8,
    },
    /// Load and validate a config file
    CheckConfig { path: PathBuf },
    /// Query a running gateway's health endpoint
    Health {
        #[arg(short, long, default_value = "http://localhost:3000")]
        url: String,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Keygen { count } => {
            keygen(count);
            Ok(())
        }
        Commands::CheckConfig { path } => check_config(&path),
        Commands::Health { url } => health(&url).await,
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
    }
}

fn generate_key() -> String {
    let mut bytes = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}

fn keygen(count: u8) {
    let keys: Vec<String> = (0..count).map(|_| generate_key()).collect();

    println!("Generated {} API key(s):\n", keys.len());
    for (i, key) in keys.iter().enumerate() {
        println!("  {}. {}", i + 1, key);
    }
    println!("\nAdd them to the gateway environment:\n");
    println!("  VALID_API_KEYS={}\n", keys.join(","));
    println!("Clients send a key in the X-API-Key header or as");
    println!("'Authorization: Bearer <key>'. Keep keys out of version control");
    println!("and rotate them by editing the list; the config file reloads live.");
}

fn check_config(path: &Path) -> Result<(), Box<dyn std::error::Error>> {
    match load_config(path) {
        Ok(config) => {
            println!("{} is valid", path.display());
            println!("  bind address:   {}", config.listener.bind_address);
            println!("  environment:    {:?}", config.environment);
            println!("  api keys:       {}", config.auth.api_keys.len());
            println!(
                "  key rate limit: {} per {}s",
                config.key_rate_limit.max_requests, config.key_rate_limit.window_secs
            );
            Ok(())
        }
        Err(ConfigError::Validation(errors)) => {
            eprintln!("{} is invalid:", path.display());
            for error in &errors {
                eprintln!("  - {error}");
            }
            Err(format!("{} validation error(s)", errors.len()).into())
        }
        Err(e) => Err(e.into()),
    }
}

async fn health(url: &str) -> Result<(), Box<dyn std::error::Error>> {
    let res = reqwest::get(format!("{}/health", url.trim_end_matches('/'))).await?;
    let status = res.status();
    if !status.is_success() {
        return Err(format!("gateway returned status {status}").into());
    }

    let json: Value = res.json().await?;
    println!("{}", serde_json::to_string_pretty(&json)?);
    Ok(())
}
