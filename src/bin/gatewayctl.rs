//! Operator CLI for the `/cue` and `/status` control surface (§6).
//!
//! Exit codes: 0 success, 1 auth error, 2 not found, 3 backend unavailable.

use clap::{Parser, Subcommand};
use serde::{Deserialize, Serialize};
use tracing::error;

#[derive(Parser, Debug)]
#[command(author, version, about = "Operate a cuegate gateway's ad breaks", long_about = None)]
struct Cli {
    /// Base URL of the gateway, e.g. https://gateway.example.com
    #[arg(long, env = "CUEGATE_BASE_URL")]
    base_url: String,

    /// Bearer token for the control plane
    #[arg(long, env = "CUEGATE_TOKEN")]
    token: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Start an ad break on a channel
    Start {
        channel: String,
        #[arg(long)]
        duration: Option<f32>,
        #[arg(long)]
        pod_id: Option<String>,
        #[arg(long)]
        pod_url: Option<String>,
    },
    /// Stop the active ad break on a channel
    Stop { channel: String },
    /// Print the Coordinator's current state for a channel
    Status { channel: String },
}

#[derive(Serialize)]
struct CueRequest<'a> {
    channel: &'a str,
    #[serde(rename = "type")]
    cue_type: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    duration: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pod_id: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pod_url: Option<&'a str>,
}

#[derive(Deserialize)]
struct CueResponse {
    ok: bool,
    #[serde(default)]
    state: Option<serde_json::Value>,
    #[serde(default)]
    error: Option<String>,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt::init();
    let cli = Cli::parse();

    let client = reqwest::Client::new();
    let exit_code = match cli.command {
        Command::Start {
            channel,
            duration,
            pod_id,
            pod_url,
        } => {
            run_cue(
                &client,
                &cli.base_url,
                cli.token.as_deref(),
                CueRequest {
                    channel: &channel,
                    cue_type: "start",
                    duration,
                    pod_id: pod_id.as_deref(),
                    pod_url: pod_url.as_deref(),
                },
            )
            .await
        }
        Command::Stop { channel } => {
            run_cue(
                &client,
                &cli.base_url,
                cli.token.as_deref(),
                CueRequest {
                    channel: &channel,
                    cue_type: "stop",
                    duration: None,
                    pod_id: None,
                    pod_url: None,
                },
            )
            .await
        }
        Command::Status { channel } => run_status(&client, &cli.base_url, cli.token.as_deref(), &channel).await,
    };

    std::process::exit(exit_code);
}

async fn run_cue(client: &reqwest::Client, base_url: &str, token: Option<&str>, body: CueRequest<'_>) -> i32 {
    let mut req = client.post(format!("{base_url}/cue")).json(&body);
    if let Some(token) = token {
        req = req.bearer_auth(token);
    }

    let response = match req.send().await {
        Ok(r) => r,
        Err(e) => {
            error!("request failed: {e}");
            return 3;
        }
    };

    match response.status() {
        reqwest::StatusCode::UNAUTHORIZED => {
            error!("unauthorized");
            return 1;
        }
        reqwest::StatusCode::NOT_FOUND => {
            error!("channel not found");
            return 2;
        }
        status if status.is_server_error() => {
            error!("backend unavailable: {status}");
            return 3;
        }
        _ => {}
    }

    match response.json::<CueResponse>().await {
        Ok(parsed) if parsed.ok => {
            println!("{}", serde_json::to_string_pretty(&parsed.state).unwrap_or_default());
            0
        }
        Ok(parsed) => {
            error!("gateway rejected request: {}", parsed.error.unwrap_or_default());
            1
        }
        Err(e) => {
            error!("malformed response: {e}");
            3
        }
    }
}

async fn run_status(client: &reqwest::Client, base_url: &str, token: Option<&str>, channel: &str) -> i32 {
    let mut req = client.get(format!("{base_url}/status/{channel}"));
    if let Some(token) = token {
        req = req.bearer_auth(token);
    }

    let response = match req.send().await {
        Ok(r) => r,
        Err(e) => {
            error!("request failed: {e}");
            return 3;
        }
    };

    match response.status() {
        reqwest::StatusCode::UNAUTHORIZED => {
            error!("unauthorized");
            return 1;
        }
        reqwest::StatusCode::NOT_FOUND => {
            error!("channel not found");
            return 2;
        }
        status if status.is_server_error() => {
            error!("backend unavailable: {status}");
            return 3;
        }
        _ => {}
    }

    match response.text().await {
        Ok(body) => {
            println!("{body}");
            0
        }
        Err(e) => {
            error!("malformed response: {e}");
            3
        }
    }
}
