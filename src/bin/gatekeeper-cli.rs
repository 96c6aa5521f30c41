use clap::{Parser, Subcommand};
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use serde_json::{json, Value};

#[derive(Parser)]
#[command(name = "gatekeeper-cli")]
#[command(about = "Client CLI for the gatekeeper API", long_about = None)]
struct Cli {
    #[arg(short, long, default_value = "http://localhost:8080", env = "GATEKEEPER_URL")]
    url: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Obtain an access and refresh token
    Login { username: String, password: String },
    /// Create an account
    Register { username: String, password: String },
    /// Exchange a refresh token for a new pair
    Refresh { refresh_token: String },
    /// List your contacts
    Contacts {
        #[arg(short, long, env = "GATEKEEPER_TOKEN")]
        token: String,
    },
    /// Search your contacts
    Search {
        query: String,
        #[arg(short, long, env = "GATEKEEPER_TOKEN")]
        token: String,
    },
    /// Show health, breaker states and bucket count
    Health,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let client = reqwest::Client::new();
    let base = cli.url.trim_end_matches('/');

    let res = match cli.command {
        Commands::Login { username, password } => {
            client
                .post(format!("{}/api/auth/login", base))
                .json(&json!({ "username": username, "password": password }))
                .send()
                .await?
        }
        Commands::Register { username, password } => {
            client
                .post(format!("{}/api/auth/register", base))
                .json(&json!({ "username": username, "password": password }))
                .send()
                .await?
        }
        Commands::Refresh { refresh_token } => {
            client
                .post(format!("{}/api/auth/refresh", base))
                .json(&json!({ "refreshToken": refresh_token }))
                .send()
                .await?
        }
        Commands::Contacts { token } => {
            client
                .get(format!("{}/api/contacts", base))
                .headers(bearer(&token)?)
                .send()
                .await?
        }
        Commands::Search { query, token } => {
            client
                .get(format!("{}/api/contacts/search", base))
                .query(&[("query", query)])
                .headers(bearer(&token)?)
                .send()
                .await?
        }
        Commands::Health => client.get(format!("{}/actuator/health", base)).send().await?,
    };

    print_response(res).await
}

fn bearer(token: &str) -> Result<HeaderMap, Box<dyn std::error::Error>> {
    let mut headers = HeaderMap::new();
    headers.insert(AUTHORIZATION, HeaderValue::from_str(&format!("Bearer {}", token))?);
    Ok(headers)
}

async fn print_response(res: reqwest::Response) -> Result<(), Box<dyn std::error::Error>> {
    let status = res.status();
    let text = res.text().await?;

    if !status.is_success() {
        eprintln!("Error: gatekeeper returned status {}", status);
    }
    match serde_json::from_str::<Value>(&text) {
        Ok(json) => println!("{}", serde_json::to_string_pretty(&json)?),
        Err(_) => println!("{}", text),
    }
    Ok(())
}
