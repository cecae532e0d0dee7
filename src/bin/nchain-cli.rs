use clap::{Parser, Subcommand};
use serde_json::Value;

#[derive(Parser)]
#[command(name = "nchain-cli")]
#[command(about = "Management CLI for nchain", long_about = None)]
struct Cli {
    #[arg(short, long, default_value = "http://localhost:8080")]
    url: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Service status and running daemons
    Status,
    /// Status of one network
    NetworkStatus {
        id: String,
        /// Read the latest header from the chain instead of the cache
        #[arg(long)]
        force: bool,
    },
    /// Start the status daemon for a network
    Require { id: String },
    /// Stop the status daemon for a network
    Evict { id: String },
    /// Show one transaction
    Tx { id: String },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let client = reqwest::Client::new();
    let base = cli.url.trim_end_matches('/');

    let res = match cli.command {
        Commands::Status => client.get(format!("{}/status", base)).send().await?,
        Commands::NetworkStatus { id, force } => {
            client
                .get(format!("{}/networks/{}/status", base, id))
                .query(&[("force", force)])
                .send()
                .await?
        }
        Commands::Require { id } => {
            client
                .post(format!("{}/networks/{}/daemon", base, id))
                .send()
                .await?
        }
        Commands::Evict { id } => {
            client
                .delete(format!("{}/networks/{}/daemon", base, id))
                .send()
                .await?
        }
        Commands::Tx { id } => client.get(format!("{}/transactions/{}", base, id)).send().await?,
    };

    print_response(res).await
}

async fn print_response(res: reqwest::Response) -> Result<(), Box<dyn std::error::Error>> {
    let status = res.status();
    let text = res.text().await?;

    if !status.is_success() {
        eprintln!("Error: nchain returned status {}", status);
        if !text.is_empty() {
            eprintln!("Response: {}", text);
        }
        std::process::exit(1);
    }

    if text.is_empty() {
        println!("{}", status);
        return Ok(());
    }

    match serde_json::from_str::<Value>(&text) {
        Ok(json) => println!("{}", serde_json::to_string_pretty(&json)?),
        Err(_) => println!("{}", text),
    }
    Ok(())
}
