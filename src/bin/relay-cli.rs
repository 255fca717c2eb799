use clap::{Parser, Subcommand};
use futures_util::StreamExt;
use serde_json::{json, Map, Value};
use tokio::io::AsyncWriteExt;

#[derive(Parser)]
#[command(name = "relay-cli")]
#[command(about = "Send requests through a stream-relay instance", long_about = None)]
struct Cli {
    /// Base URL of the relay.
    #[arg(short, long, default_value = "http://localhost:8080")]
    endpoint: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Relay a request and stream the response to stdout
    Send {
        /// Target URL
        url: String,

        /// Upstream method
        #[arg(short = 'X', long, default_value = "POST")]
        method: String,

        /// Header as 'Name: value' (repeatable)
        #[arg(short = 'H', long = "header")]
        headers: Vec<String>,

        /// Request body
        #[arg(short, long)]
        data: Option<String>,

        /// Send the body as a JSON value instead of a raw string
        #[arg(long)]
        json: bool,
    },
    /// Check relay health
    Health,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let client = reqwest::Client::new();
    let base = cli.endpoint.trim_end_matches('/');

    match cli.command {
        Commands::Send {
            url,
            method,
            headers,
            data,
            json,
        } => {
            let mut header_map = Map::new();
            for header in headers {
                let (name, value) = header
                    .split_once(':')
                    .ok_or_else(|| format!("header '{header}' is not 'Name: value'"))?;
                header_map.insert(name.trim().to_string(), Value::String(value.trim().to_string()));
            }

            let body = match data {
                Some(raw) if json => serde_json::from_str(&raw)?,
                Some(raw) => Value::String(raw),
                None => Value::Null,
            };

            let descriptor = json!({
                "url": url,
                "method": method,
                "headers": header_map,
                "body": body,
            });

            let res = client
                .post(format!("{base}/proxy"))
                .json(&descriptor)
                .send()
                .await?;

            let status = res.status();
            if !status.is_success() {
                eprintln!("Relay returned status {}", status);
            }

            let mut stdout = tokio::io::stdout();
            let mut body = res.bytes_stream();
            while let Some(chunk) = body.next().await {
                stdout.write_all(&chunk?).await?;
                stdout.flush().await?;
            }
        }
        Commands::Health => {
            let res = client.get(format!("{base}/health")).send().await?;
            let json: Value = res.json().await?;
            println!("{}", serde_json::to_string_pretty(&json)?);
        }
    }

    Ok(())
}
