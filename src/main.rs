use std::process;
use std::sync::Arc;

use tokio::net::TcpListener;
use tracing_subscriber::{
    fmt::{writer::BoxMakeWriter, Layer},
    layer::SubscriberExt,
    EnvFilter, Registry,
};

use bounty_ledger::config::Config;
use bounty_ledger::db::PgStore;
use bounty_ledger::ledger::SimulatedSettlement;
use bounty_ledger::{routes, AppState, Settings};

#[tokio::main]
async fn main() {
    let config = match Config::from_env() {
        Ok(config) => config,
        Err(err) => {
            eprintln!("Invalid configuration: {err}");
            process::exit(1);
        }
    };

    // json lines to the log file, plain text to stdout
    let file_appender = tracing_appender::rolling::never(".", &config.log_file);
    let (file_writer, _file_guard) = tracing_appender::non_blocking(file_appender);
    let (stdout_writer, _stdout_guard) = tracing_appender::non_blocking(std::io::stdout());

    let file_layer = Layer::new().json().with_writer(BoxMakeWriter::new(move || file_writer.clone()));
    let stdout_layer = Layer::new().with_writer(BoxMakeWriter::new(move || stdout_writer.clone()));

    let subscriber = Registry::default()
        .with(EnvFilter::from_default_env())
        .with(file_layer)
        .with(stdout_layer);

    if let Err(err) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Unable to set global subscriber: {err}");
        process::exit(1);
    }

    let store = match PgStore::connect(&config.database_url, config.max_connection_pooling).await {
        Ok(store) => {
            tracing::info!("Connected to database");
            store
        }
        Err(err) => {
            tracing::error!("Failed to connect to database: {}", err);
            process::exit(1);
        }
    };
    store.run_migrations().await;

    let listener = match TcpListener::bind(("0.0.0.0", config.port)).await {
        Ok(listener) => {
            tracing::info!("Listening on port: {}", config.port);
            listener
        }
        Err(err) => {
            tracing::error!("Failed to bind to port: {}", err);
            process::exit(1);
        }
    };

    tracing::info!(
        "reputation policy {:?}, currency {}, fee rate {}",
        config.reputation_policy,
        config.default_currency,
        config.fees.rate
    );
    let state = AppState::new(Arc::new(store), Arc::new(SimulatedSettlement), Settings::from(&config));
    let router = routes::build_router(state);
    tracing::info!("Routes constructed successfully");

    let http_service = axum::serve(listener, router);
    if let Err(err) = http_service.await {
        tracing::error!("Failed to start server: {}", err);
        process::exit(1);
    }
}
