use clap::{Parser, Subcommand};
use serde_json::{json, Value};

#[derive(Parser)]
#[command(name = "telemetry-cli")]
#[command(about = "Query and control a running telemetry hub", long_about = None)]
struct Cli {
    #[arg(short, long, default_value = "http://localhost:3000")]
    url: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Hub liveness and version
    Health,
    /// Recent logs, newest first
    Logs {
        #[arg(short, long, default_value_t = 50)]
        limit: usize,
        /// Only this level (debug, info, warn, error)
        #[arg(long)]
        level: Option<String>,
    },
    /// Append a log record
    Log {
        level: String,
        message: String,
        #[arg(short, long)]
        context: Option<String>,
    },
    /// Empty the in-memory log buffer
    ClearLogs,
    /// Recent service calls
    Metrics {
        #[arg(short, long, default_value_t = 50)]
        limit: usize,
        #[arg(short, long)]
        service: Option<String>,
    },
    /// Services with their smoothed statistics
    Services,
    /// Flip a service's active flag
    Toggle { name: String },
    /// Headline KPIs
    Hero,
    /// Turn simulated statistics on or off
    Simulate {
        #[arg(action = clap::ArgAction::Set)]
        enabled: bool,
    },
    /// Channel connection status
    Channels,
    /// Diagnostics report for one channel ("default" for the unnamed one)
    Diagnose { channel: String },
    /// Manually reconnect a channel
    Reconnect { channel: String },
    /// Remote status supervisor report
    Supervisor,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let client = reqwest::Client::new();
    let base = cli.url.trim_end_matches('/');

    let request = match cli.command {
        Commands::Health => client.get(format!("{}/health", base)),
        Commands::Logs { limit, level } => {
            let mut query = vec![("limit", limit.to_string())];
            if let Some(level) = level {
                query.push(("level", level));
            }
            client.get(format!("{}/api/logs", base)).query(&query)
        }
        Commands::Log {
            level,
            message,
            context,
        } => client
            .post(format!("{}/api/logs", base))
            .json(&json!({ "level": level, "message": message, "context": context })),
        Commands::ClearLogs => client.delete(format!("{}/api/logs", base)),
        Commands::Metrics { limit, service } => {
            let mut query = vec![("limit", limit.to_string())];
            if let Some(service) = service {
                query.push(("service", service));
            }
            client.get(format!("{}/api/metrics", base)).query(&query)
        }
        Commands::Services => client.get(format!("{}/api/services", base)),
        Commands::Toggle { name } => client.post(format!("{}/api/services/{}/toggle", base, name)),
        Commands::Hero => client.get(format!("{}/api/hero", base)),
        Commands::Simulate { enabled } => client
            .post(format!("{}/api/simulation", base))
            .json(&json!({ "enabled": enabled })),
        Commands::Channels => client.get(format!("{}/api/channels", base)),
        Commands::Diagnose { channel } => {
            let res = client
                .get(format!("{}/api/channels/{}/diagnostics", base, channel))
                .send()
                .await?;
            return print_text(res).await;
        }
        Commands::Reconnect { channel } => {
            client.post(format!("{}/api/channels/{}/reconnect", base, channel))
        }
        Commands::Supervisor => client.get(format!("{}/api/supervisor", base)),
    };

    print_response(request.send().await?).await
}

async fn print_response(res: reqwest::Response) -> Result<(), Box<dyn std::error::Error>> {
    let status = res.status();
    if !status.is_success() {
        eprintln!("Error: hub returned status {}", status);
        if let Ok(text) = res.text().await {
            eprintln!("Response: {}", text);
        }
        return Ok(());
    }
    if status == reqwest::StatusCode::NO_CONTENT {
        println!("OK");
        return Ok(());
    }

    let json: Value = res.json().await?;
    println!("{}", serde_json::to_string_pretty(&json)?);
    Ok(())
}

async fn print_text(res: reqwest::Response) -> Result<(), Box<dyn std::error::Error>> {
    let status = res.status();
    let text = res.text().await?;
    if status.is_success() {
        print!("{}", text);
    } else {
        eprintln!("Error: hub returned status {}", status);
        eprintln!("Response: {}", text);
    }
    Ok(())
}
