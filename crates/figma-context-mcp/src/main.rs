//! figma-context MCP server entry point.

use std::sync::Arc;

use anyhow::Context;
use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::Shell;

use figma_context::{FigmaAuth, FigmaService};
use figma_context_mcp::config::{self, DEFAULT_SHUTDOWN_TIMEOUT};
use figma_context_mcp::session::SessionRegistry;
use figma_context_mcp::tools::ToolRegistry;
use figma_context_mcp::transport::StdioTransport;

#[derive(Parser)]
#[command(
    name = "figma-context-mcp",
    about = "MCP server exposing Figma layout data, node screenshots, and image downloads",
    version
)]
struct Cli {
    /// Figma personal access token. Also reads FIGMA_API_KEY.
    #[arg(long, global = true)]
    figma_api_key: Option<String>,

    /// Figma OAuth bearer token. Also reads FIGMA_OAUTH_TOKEN; wins over the API key.
    #[arg(long, global = true)]
    figma_oauth_token: Option<String>,

    /// Root directory for download_figma_images (default: working directory).
    #[arg(long, global = true)]
    download_dir: Option<String>,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start MCP server over stdio (default).
    Serve,

    /// Start MCP server over HTTP (streamable HTTP on /mcp, SSE on /sse).
    #[cfg(feature = "http")]
    ServeHttp {
        /// Listen host. Also reads HOST.
        #[arg(long)]
        host: Option<String>,

        /// Listen port. Also reads PORT.
        #[arg(long)]
        port: Option<u16>,
    },

    /// Print server capabilities as JSON.
    Info,

    /// Generate shell completion scripts.
    ///
    /// Examples:
    ///   figma-context-mcp completions bash > ~/.local/share/bash-completion/completions/figma-context-mcp
    ///   figma-context-mcp completions zsh > ~/.zfunc/_figma-context-mcp
    Completions {
        /// Shell type (bash, zsh, fish, powershell, elvish).
        shell: Shell,
    },
}

impl Cli {
    fn tools(&self) -> anyhow::Result<ToolRegistry> {
        let auth = config::resolve_auth(
            self.figma_api_key.as_deref(),
            self.figma_oauth_token.as_deref(),
        )
        .context("Either FIGMA_API_KEY or FIGMA_OAUTH_TOKEN is required")?;
        tracing::info!(
            "Figma auth: {}",
            if auth.use_oauth { "OAuth token" } else { "API key" }
        );

        let root = config::resolve_download_root(self.download_dir.as_deref());
        Ok(ToolRegistry::figma(Arc::new(FigmaService::new(auth)), root))
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let mut cli = Cli::parse();

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&cli.log_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    match cli.command.take().unwrap_or(Commands::Serve) {
        Commands::Serve => {
            let registry = Arc::new(SessionRegistry::new(cli.tools()?));
            let transport = StdioTransport::new(registry, DEFAULT_SHUTDOWN_TIMEOUT)?;
            transport.run().await?;
        }

        #[cfg(feature = "http")]
        Commands::ServeHttp { host, port } => {
            use figma_context_mcp::config::ServerConfig;
            use figma_context_mcp::LifecycleManager;

            let registry = Arc::new(SessionRegistry::new(cli.tools()?));
            let server_config = ServerConfig::resolve(host.as_deref(), port);
            let manager = LifecycleManager::new(registry, server_config.clone());

            let addr = manager
                .start(&server_config.host, server_config.port)
                .await
                .with_context(|| {
                    format!("Failed to bind {}:{}", server_config.host, server_config.port)
                })?;
            tracing::info!("figma-context MCP server on http://{addr}");
            tracing::info!("  streamable HTTP: http://{addr}/mcp");
            tracing::info!("  SSE:             http://{addr}/sse");

            tokio::signal::ctrl_c().await?;
            tracing::info!("Interrupt received, shutting down");
            manager.stop().await;
        }

        Commands::Info => {
            let capabilities = figma_context_mcp::types::InitializeResult::default_result();
            // Tool definitions do not touch the network, so no credentials are needed.
            let tools = ToolRegistry::figma(
                Arc::new(FigmaService::new(FigmaAuth::default())),
                config::resolve_download_root(cli.download_dir.as_deref()),
            )
            .list_tools();
            let info = serde_json::json!({
                "server": capabilities.server_info,
                "protocol_version": capabilities.protocol_version,
                "supported_protocol_versions": figma_context_mcp::types::SUPPORTED_PROTOCOL_VERSIONS,
                "capabilities": capabilities.capabilities,
                "transports": ["stdio", "sse", "streamable-http"],
                "tools": tools.iter().map(|t| &t.name).collect::<Vec<_>>(),
                "tool_count": tools.len(),
            });
            println!("{}", serde_json::to_string_pretty(&info)?);
        }

        Commands::Completions { shell } => {
            let mut cmd = Cli::command();
            clap_complete::generate(
                shell,
                &mut cmd,
                "figma-context-mcp",
                &mut std::io::stdout(),
            );
        }
    }

    Ok(())
}
