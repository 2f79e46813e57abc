use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use serde_json::json;
use tokio_util::sync::CancellationToken;

use spresso_sdk::config::{load_config, ClientConfig};
use spresso_sdk::observability::logging::init_logging;
use spresso_sdk::{MemoryCache, PriceOptimizationClient, PriceRequest, RequestMetadata};

#[derive(Parser)]
#[command(name = "spresso-cli")]
#[command(about = "Query the Spresso price optimization API", long_about = None)]
struct Cli {
    /// TOML configuration file. Defaults are used when omitted.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override the configured client id.
    #[arg(long, env = "SPRESSO_CLIENT_ID")]
    client_id: Option<String>,

    /// Override the configured client secret.
    #[arg(long, env = "SPRESSO_CLIENT_SECRET", hide_env_values = true)]
    client_secret: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Price a single item
    Price {
        #[arg(long)]
        device_id: String,
        #[arg(long)]
        item_id: String,
        #[arg(long)]
        default_price: f64,
        #[arg(long)]
        user_id: Option<String>,
        #[arg(long)]
        user_agent: Option<String>,
        #[arg(long)]
        override_to_default: bool,
        /// End user's IP, forwarded as x-real-ip
        #[arg(long)]
        original_ip: Option<String>,
    },
    /// Price several items for one device (ITEM=DEFAULT_PRICE pairs)
    Prices {
        #[arg(long)]
        device_id: String,
        #[arg(long)]
        user_agent: Option<String>,
        #[arg(required = true, value_parser = parse_item)]
        items: Vec<(String, f64)>,
    },
    /// Fetch an access token
    Token,
    /// List active user-agent overrides
    Overrides,
}

fn parse_item(raw: &str) -> Result<(String, f64), String> {
    let (item, price) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected ITEM=PRICE, got '{}'", raw))?;
    let price = price
        .parse::<f64>()
        .map_err(|e| format!("invalid price '{}': {}", price, e))?;
    Ok((item.to_string(), price))
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => load_config(path)?,
        None => ClientConfig::default(),
    };
    if let Some(id) = cli.client_id {
        config.auth.client_id = id;
    }
    if let Some(secret) = cli.client_secret {
        config.auth.client_secret = secret;
    }

    init_logging(&config.observability)?;

    let cache = Arc::new(MemoryCache::new());
    let client = PriceOptimizationClient::from_config(&config, cache)?;

    // Ctrl-C cancels in-flight calls instead of killing the process mid-request.
    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            on_signal.cancel();
        }
    });

    let output = match cli.command {
        Commands::Price {
            device_id,
            item_id,
            default_price,
            user_id,
            user_agent,
            override_to_default,
            original_ip,
        } => {
            let mut request =
                PriceRequest::new(device_id, item_id, default_price).override_to_default_price(override_to_default);
            if let Some(user_id) = user_id {
                request = request.with_user_id(user_id);
            }
            if let Some(user_agent) = user_agent {
                request = request.with_user_agent(user_agent);
            }
            let metadata = RequestMetadata {
                original_ip,
                cookie: None,
            };

            let resolved = client.get_price(&request, Some(&metadata), &cancel).await?;
            json!({
                "success": resolved.is_success(),
                "error": resolved.error,
                "result": resolved.value,
            })
        }
        Commands::Prices {
            device_id,
            user_agent,
            items,
        } => {
            let requests: Vec<PriceRequest> = items
                .into_iter()
                .map(|(item, price)| PriceRequest::new(device_id.clone(), item, price))
                .collect();

            let resolved = client
                .get_prices(&requests, user_agent.as_deref(), None, &cancel)
                .await?;
            json!({
                "success": resolved.is_success(),
                "error": resolved.error,
                "results": resolved.value,
            })
        }
        Commands::Token => {
            let token = client.token_provider().get_token(&cancel).await?;
            json!({
                "expiresAt": token.expires_at,
                "scope": token.scope,
                "tokenType": token.token_type,
            })
        }
        Commands::Overrides => {
            let overrides = client.get_user_agent_overrides(&cancel).await?;
            json!({ "active": overrides.names().collect::<Vec<_>>() })
        }
    };

    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}
