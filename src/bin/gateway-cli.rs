use clap::{Parser, Subcommand};
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use reqwest::Method;
use serde_json::Value;

#[derive(Parser)]
#[command(name = "gateway-cli")]
#[command(about = "Management CLI for the dispatch gateway", long_about = None)]
struct Cli {
    #[arg(short, long, default_value = "http://localhost:8081")]
    url: String,

    #[arg(short, long, env = "GATEWAY_ADMIN_KEY", default_value = "change-me-admin-key")]
    key: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Check gateway status
    Status,
    /// List circuit breakers, or show one backend's breaker
    Breakers {
        /// Backend URL, e.g. http://users:8080
        backend: Option<String>,
    },
    /// Force a backend's circuit breaker closed
    ResetBreaker { backend: String },
    /// Reset rate limit buckets for one key, or all keys
    ResetRateLimit {
        key: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let client = reqwest::Client::new();

    let mut headers = HeaderMap::new();
    headers.insert(
        AUTHORIZATION,
        HeaderValue::from_str(&format!("Bearer {}", cli.key))?,
    );

    let base = cli.url.trim_end_matches('/');
    let (method, path) = match cli.command {
        Commands::Status => (Method::GET, "/admin/status".to_string()),
        Commands::Breakers { backend: None } => (Method::GET, "/admin/circuit-breakers".to_string()),
        Commands::Breakers { backend: Some(backend) } => {
            (Method::GET, format!("/admin/circuit-breakers/{}", encode(&backend)))
        }
        Commands::ResetBreaker { backend } => {
            (Method::DELETE, format!("/admin/circuit-breakers/{}", encode(&backend)))
        }
        Commands::ResetRateLimit { key: None } => (Method::DELETE, "/admin/rate-limits".to_string()),
        Commands::ResetRateLimit { key: Some(key) } => {
            (Method::DELETE, format!("/admin/rate-limits/{}", encode(&key)))
        }
    };

    let res = client
        .request(method, format!("{base}{path}"))
        .headers(headers)
        .send()
        .await?;
    print_response(res).await
}

/// Percent-encode a single path segment.
fn encode(segment: &str) -> String {
    url::form_urlencoded::byte_serialize(segment.as_bytes()).collect()
}

async fn print_response(res: reqwest::Response) -> Result<(), Box<dyn std::error::Error>> {
    let status = res.status();
    if !status.is_success() {
        eprintln!("Error: Admin API returned status {}", status);
        if let Ok(text) = res.text().await {
            eprintln!("Response: {}", text);
        }
        return Ok(());
    }

    let json: Value = res.json().await?;
    println!("{}", serde_json::to_string_pretty(&json)?);
    Ok(())
}
