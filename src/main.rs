use std::sync::Arc;
use std::time::Duration;

use dotenvy::dotenv;
use tracing::{info, Level};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use enrollment_bot::bot::{Bot, Settings};
use enrollment_bot::catalog::CatalogProvider;
use enrollment_bot::config::{Config, LedgerConfig};
use enrollment_bot::error::ConfigError;
use enrollment_bot::gateway::SubmissionGateway;
use enrollment_bot::i18n::Localizer;
use enrollment_bot::ledger::{DatabaseLedger, Ledger, SheetsLedger};
use enrollment_bot::rate_limit::RateLimiter;
use enrollment_bot::retry::RetryPolicy;
use enrollment_bot::session::MemorySessionStore;
use enrollment_bot::transport::telegram::TelegramClient;
use enrollment_bot::transport::webhook::{self, AppState};
use enrollment_bot::Result;

const PRUNE_INTERVAL: Duration = Duration::from_secs(60);

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables from .env file if present
    dotenv().ok();

    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::from_default_env().add_directive(Level::INFO.into()))
        .init();

    let config = Config::from_env()?;

    let catalog = CatalogProvider::from_path(&config.catalog_path)?;
    info!(
        path = %config.catalog_path.display(),
        courses = catalog.snapshot().len(),
        "Catalog loaded"
    );

    let i18n = match &config.locales_dir {
        Some(dir) => Localizer::from_dir(dir, config.default_locale)?,
        None => Localizer::bundled(config.default_locale)?,
    };

    let ledger = connect_ledger(&config).await?;
    let gateway = SubmissionGateway::new(ledger, RetryPolicy::default());
    // Refuse to serve traffic without a writable ledger.
    gateway.initialize().await?;

    let telegram = TelegramClient::new(config.telegram.token.clone())?;
    if let Some(url) = &config.telegram.webhook_url {
        telegram
            .set_webhook(url, config.telegram.webhook_secret.as_deref())
            .await?;
    }

    let stale_after = chrono::Duration::from_std(config.stale_after).map_err(|e| {
        ConfigError::InvalidValue {
            key: "STALE_INTERACTION_MINUTES".to_string(),
            message: e.to_string(),
        }
    })?;
    let bot = Arc::new(Bot::new(
        Arc::new(catalog),
        Arc::new(MemorySessionStore::new()),
        Arc::new(gateway),
        Arc::new(telegram),
        Arc::new(i18n),
        RateLimiter::new(config.rate_limit_per_minute, Duration::from_secs(60)),
        Settings {
            stale_after,
            support_url: config.telegram.support_url.clone(),
            banned_users: config.banned_users.clone(),
        },
    ));

    let pruner = {
        let bot = Arc::clone(&bot);
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(PRUNE_INTERVAL);
            loop {
                interval.tick().await;
                bot.prune();
            }
        })
    };

    let app = webhook::router(AppState {
        bot,
        secret: config.telegram.webhook_secret.as_deref().map(Arc::from),
    });

    let listener = tokio::net::TcpListener::bind(config.bind_addr).await?;
    info!("Server starting on http://{}", config.bind_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    pruner.abort();
    info!("Server stopped");
    Ok(())
}

async fn connect_ledger(config: &Config) -> Result<Arc<dyn Ledger>> {
    match &config.ledger {
        LedgerConfig::Sheets {
            spreadsheet_id,
            tab,
            account,
        } => {
            info!(%spreadsheet_id, %tab, "Using Google Sheets ledger");
            let ledger = SheetsLedger::new(
                spreadsheet_id.clone(),
                tab.clone(),
                account.clone(),
                config.timezone,
            )?;
            Ok(Arc::new(ledger))
        }
        LedgerConfig::Database { url } => {
            info!("Connecting to ledger database");
            let ledger = DatabaseLedger::connect(url).await?;
            info!("Connected to ledger database");
            Ok(Arc::new(ledger))
        }
    }
}

/// Resolves on Ctrl-C or SIGTERM. In-flight requests are allowed to finish.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl-C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    info!("Shutdown signal received, draining in-flight requests");
}
