use std::sync::Arc;

use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use roster_mailer::config::RosterConfig;
use roster_mailer::notify::{Notifier, SmtpMailer};
use roster_mailer::roster::RosterLoader;
use roster_mailer::store::MemoryBatchStore;
use roster_mailer::web::{AppState, roster_routes, session_layer};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Install rustls crypto provider before any TLS usage
    rustls::crypto::ring::default_provider()
        .install_default()
        .map_err(|_| anyhow::anyhow!("Failed to install rustls crypto provider"))?;

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                tracing_subscriber::EnvFilter::new("roster_mailer=info,tower_http=info")
            }),
        )
        .with_target(false)
        .init();

    let config = RosterConfig::from_env()?;

    eprintln!("📋 Roster Mailer v{}", env!("CARGO_PKG_VERSION"));
    eprintln!("   Listening: http://{}", config.bind_addr);
    eprintln!("   SMTP relay: {}:{} (STARTTLS)", config.smtp.host, config.smtp.port);
    eprintln!(
        "   Upload limit: {} MB, max {} columns, extensions: {}",
        config.upload.max_file_size / (1024 * 1024),
        config.upload.max_columns,
        config
            .upload
            .allowed_extensions
            .iter()
            .cloned()
            .collect::<Vec<_>>()
            .join(", ")
    );
    eprintln!(
        "   Dispatch: {} workers, {} bodies\n",
        config.dispatch.workers, config.dispatch.body_format
    );

    if !config.smtp.has_credentials() {
        tracing::warn!(
            "EMAIL_HOST_USER / EMAIL_HOST_PASSWORD not set; every send will fail authentication"
        );
    }

    // ── Sessions ────────────────────────────────────────────────────────
    let store = MemoryBatchStore::new(config.session_ttl);
    let sessions = session_layer(config.session_ttl);

    // ── Loader + notifier ───────────────────────────────────────────────
    let loader = RosterLoader::new(config.upload.clone());
    let transport = Arc::new(SmtpMailer::new(config.smtp.clone()));
    let notifier = Notifier::new(&config.dispatch, transport);

    let state = AppState::new(store, loader, notifier);
    let app = roster_routes(state, sessions).layer(
        ServiceBuilder::new()
            .layer(TraceLayer::new_for_http())
            .layer(CorsLayer::permissive()),
    );

    let listener = tokio::net::TcpListener::bind(config.bind_addr).await?;
    tracing::info!(addr = %config.bind_addr, "Roster server started");
    axum::serve(listener, app).await?;

    Ok(())
}
