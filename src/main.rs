// ============================================================================
// LOTTOBOOK SERVER
// ============================================================================
//
// Engine:  RoundScheduler + TicketPricer + LedgerGuard + SettlementEngine
// Storage: ReDB (ACID, MVCC, single writer)
// Auth:    resolved upstream, actor forwarded in x-actor-* headers
//
// Run:  cargo run
// Test: curl http://localhost:8080/health

use std::process::ExitCode;

use tokio::signal;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use lottobook::api::{build_router, AppState, VERSION};
use lottobook::{Config, LottoEngine, Store};

// ============================================================================
// GRACEFUL SHUTDOWN
// ============================================================================

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to install Ctrl+C handler");
        }
    };
    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
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
    warn!("🛑 Shutdown signal received");
}

// ============================================================================
// MAIN
// ============================================================================

#[tokio::main]
async fn main() -> ExitCode {
    // 1. Logging
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info,lottobook=debug")))
        .with(tracing_subscriber::fmt::layer().with_target(true).with_level(true))
        .init();

    // 2. Configuration
    let config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            error!(error = %e, "Invalid configuration");
            return ExitCode::FAILURE;
        }
    };

    info!("╔══════════════════════════════════════════════════════╗");
    info!("║              LOTTOBOOK {:<30}║", VERSION);
    info!("╚══════════════════════════════════════════════════════╝");
    info!(
        data_path = %config.data_path,
        utc_offset = %config.utc_offset,
        day_cutoff = %config.day_cutoff,
        "Configuration loaded"
    );

    // 3. Storage (ReDB)
    let store = match Store::open(&config.data_path) {
        Ok(store) => store,
        Err(e) => {
            error!(error = %e, "Failed to open database");
            return ExitCode::FAILURE;
        }
    };

    // 4. Engine + router
    let state = AppState::new(LottoEngine::new(store, &config));
    let app = build_router(state);

    info!("");
    info!("🎰 TICKETS:");
    info!("   POST  /tickets                  Submit ticket");
    info!("   PATCH /tickets/{{id}}/cancel      Cancel ticket");
    info!("   GET   /tickets/history          Own tickets");
    info!("🏆 RESULTS:");
    info!("   POST  /results/issue            Issue / correct a round");
    info!("   GET   /results                  Result history");
    info!("⚠️  RISK:");
    info!("   POST  /risks  /risks/batch      Close or half-pay numbers");
    info!("   DELETE /risks/{{id}} /risks/clear");
    info!("   GET   /risks/daily/all          Today's directives, every lottery");
    info!("");

    let listener = match tokio::net::TcpListener::bind(config.bind_addr).await {
        Ok(listener) => listener,
        Err(e) => {
            error!(addr = %config.bind_addr, error = %e, "Failed to bind");
            return ExitCode::FAILURE;
        }
    };
    info!(addr = %config.bind_addr, "🚀 Listening");

    if let Err(e) = axum::serve(listener, app).with_graceful_shutdown(shutdown_signal()).await {
        error!(error = %e, "Server error");
        return ExitCode::FAILURE;
    }

    info!("✅ Server shutdown complete");
    ExitCode::SUCCESS
}
