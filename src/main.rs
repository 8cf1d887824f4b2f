use inbox_agent::server;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Install rustls crypto provider before any TLS usage
    rustls::crypto::ring::default_provider()
        .install_default()
        .expect("Failed to install rustls crypto provider");

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let port: u16 = std::env::var("INBOX_AGENT_PORT")
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(8080);

    eprintln!("📬 Inbox Agent v{}", env!("CARGO_PKG_VERSION"));
    eprintln!("   Run API: http://0.0.0.0:{}/api/agent/run", port);
    eprintln!("   Health:  http://0.0.0.0:{}/health\n", port);

    let app = server::router();
    let listener = tokio::net::TcpListener::bind(("0.0.0.0", port)).await?;
    tracing::info!(port, "Agent API listening");
    axum::serve(listener, app).await?;

    Ok(())
}
