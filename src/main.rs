use clap::{Parser, Subcommand};
use compliance_bridge::app::App;
use compliance_bridge::config::AppConfig;
use compliance_bridge::constants::service;
use compliance_bridge::errors::ToolError;
use compliance_bridge::http;
use compliance_bridge::mcp::server::McpServer;
use tokio::net::TcpListener;

#[derive(Debug, Parser)]
#[command(name = "compliance-bridge", version, about = "Agent bridge for the compliance REST API")]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run the HTTP surface (default).
    Serve {
        #[arg(long)]
        host: Option<String>,
        #[arg(long)]
        port: Option<u16>,
    },
    /// Serve the tool manifest over stdio JSON-RPC.
    Mcp,
}

async fn serve(app: App, host: Option<String>, port: Option<u16>) -> Result<(), ToolError> {
    let agent = app.chat_agent()?;
    let host = host.unwrap_or_else(|| app.config.host.clone());
    let port = port.unwrap_or(app.config.port);
    let listener = TcpListener::bind((host.as_str(), port))
        .await
        .map_err(|err| ToolError::internal(format!("Failed to bind {}:{}: {}", host, port, err)))?;

    let logger = app.logger.clone();
    let shutdown = async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            logger.info("Shutdown signal received", None);
        }
    };
    let served = http::serve(listener, app.http_state(agent), shutdown).await;
    app.shutdown().await;
    served.map_err(|err| ToolError::internal(format!("HTTP server failed: {}", err)))
}

async fn run(cli: Cli) -> Result<(), ToolError> {
    let config = AppConfig::from_env()?;
    let app = App::initialize(config).await?;
    match cli.command.unwrap_or(Command::Serve {
        host: None,
        port: None,
    }) {
        Command::Serve { host, port } => serve(app, host, port).await,
        Command::Mcp => {
            let server = McpServer::new(app.logger.clone(), app.tool_executor.clone());
            let result = server.run_stdio().await;
            app.shutdown().await;
            result.map_err(|err| ToolError::internal(format!("MCP transport failed: {}", err)))
        }
    }
}

#[tokio::main]
async fn main() {
    if let Err(err) = run(Cli::parse()).await {
        eprintln!("{}: {}", service::NAME, err);
        if let Some(hint) = &err.hint {
            eprintln!("hint: {}", hint);
        }
        std::process::exit(1);
    }
}
