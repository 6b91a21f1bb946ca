use clap::{Parser, Subcommand};
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use serde_json::{json, Value};

#[derive(Parser)]
#[command(name = "balancer-cli")]
#[command(about = "Client CLI for the cloud balancer", long_about = None)]
struct Cli {
    #[arg(short, long, default_value = "http://localhost:8080")]
    url: String,

    /// API key returned by `create`.
    #[arg(short, long, env = "BALANCER_API_KEY", default_value = "")]
    key: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Register a new user and print its API key
    Create { name: String },
    /// Show token settings and current balance
    Profile,
    /// Change bucket capacity and refill rate
    Change { capacity: i64, rate_per_sec: i64 },
    /// Send a balanced request
    Request {
        #[arg(default_value = "/")]
        path: String,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let client = reqwest::Client::new();

    let mut headers = HeaderMap::new();
    if !cli.key.is_empty() {
        headers.insert(AUTHORIZATION, HeaderValue::from_str(&cli.key)?);
    }

    match cli.command {
        Commands::Create { name } => {
            let res = client
                .post(format!("{}/user/create", cli.url))
                .json(&json!({ "name": name }))
                .send()
                .await?;
            print_json(res).await?;
        }
        Commands::Profile => {
            let res = client
                .get(format!("{}/user/tokens/profile", cli.url))
                .headers(headers)
                .send()
                .await?;
            print_json(res).await?;
        }
        Commands::Change {
            capacity,
            rate_per_sec,
        } => {
            let res = client
                .post(format!("{}/user/tokens/change", cli.url))
                .headers(headers)
                .json(&json!({ "capacity": capacity, "rate_per_sec": rate_per_sec }))
                .send()
                .await?;
            print_json(res).await?;
        }
        Commands::Request { path } => {
            let res = client
                .get(format!("{}{}", cli.url, path))
                .headers(headers)
                .send()
                .await?;
            let status = res.status();
            let text = res.text().await?;
            if status.is_success() {
                println!("{}", text);
            } else {
                eprintln!("Error: balancer returned status {}", status);
                eprintln!("Response: {}", text.trim_end());
            }
        }
    }

    Ok(())
}

async fn print_json(res: reqwest::Response) -> Result<(), Box<dyn std::error::Error>> {
    let status = res.status();
    if !status.is_success() {
        eprintln!("Error: balancer returned status {}", status);
        if let Ok(text) = res.text().await {
            eprintln!("Response: {}", text.trim_end());
        }
        return Ok(());
    }

    let json: Value = res.json().await?;
    println!("{}", serde_json::to_string_pretty(&json)?);
    Ok(())
}
