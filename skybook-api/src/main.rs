use std::net::SocketAddr;
use std::sync::Arc;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use skybook_api::{app, AppState};
use skybook_core::journal::Journal;
use skybook_core::repository::{OrderRecords, SeatInventory};
use skybook_engine::{BookingEngine, EngineConfig, LogNotifier, SimulatedGateway};
use skybook_store::{Config, DbClient, PgJournal, PgOrderStore, PgSeatStore};

#[tokio::main]
async fn main() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "skybook_api=debug,skybook_engine=debug,tower_http=debug".into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::load().expect("Failed to load config");
    tracing::info!("Starting Skybook API on port {}", config.server_port);

    let db = DbClient::new(&config.database_dsn)
        .await
        .expect("Failed to connect to database");
    db.migrate().await.expect("Failed to run migrations");

    let reservation_timeout = config.reservation_window();
    let seats: Arc<dyn SeatInventory> =
        Arc::new(PgSeatStore::new(db.pool.clone(), reservation_timeout));
    let orders: Arc<dyn OrderRecords> = Arc::new(PgOrderStore::new(db.pool.clone()));
    let journal: Arc<dyn Journal> = Arc::new(PgJournal::new(db.pool.clone()));

    let engine = Arc::new(BookingEngine::new(
        journal,
        seats.clone(),
        orders.clone(),
        Arc::new(SimulatedGateway::new()),
        Arc::new(LogNotifier),
        EngineConfig::from_settings(
            reservation_timeout,
            config.payment_window(),
            config.max_payment_retries,
        ),
    ));

    match engine.recover_running().await {
        Ok(0) => {}
        Ok(resumed) => tracing::info!("Resumed {} in-flight booking orchestrations", resumed),
        Err(err) => tracing::error!("Failed to recover orchestrations: {}", err),
    }

    let app = app(AppState {
        engine,
        seats,
        orders,
        reservation_timeout,
    });

    let addr = SocketAddr::from(([0, 0, 0, 0], config.server_port));
    tracing::info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await.unwrap();
    axum::serve(listener, app).await.unwrap();
}
