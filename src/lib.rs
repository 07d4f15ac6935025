pub mod alerts;
pub mod broadcast;
pub mod config;
pub mod movement;
pub mod server;
pub mod telemetry;
pub mod tracker;
pub mod utils;

use std::sync::Arc;

use alerts::{notifier, Notifier};
use config::Config;
use tokio_util::sync::CancellationToken;
use tracker::TrackerController;

pub use server::build_router;

/// Shared by every request handler and WebSocket session.
#[derive(Clone)]
pub struct AppState {
    pub(crate) tracker: TrackerController,
    pub(crate) config: Arc<Config>,
    pub(crate) shutdown: CancellationToken,
}

impl AppState {
    pub fn new(config: Config, notifier: Arc<dyn Notifier>) -> Self {
        Self {
            tracker: TrackerController::new(&config, notifier),
            config: Arc::new(config),
            shutdown: CancellationToken::new(),
        }
    }

    pub fn tracker(&self) -> &TrackerController {
        &self.tracker
    }
}

pub async fn run() -> anyhow::Result<()> {
    // Reads RUST_LOG, defaults to info
    utils::logging::init();

    log::info!("GPS tracker starting up...");

    let config = Config::from_env()?;
    let notifier = notifier::from_config(&config);
    log::info!(
        "movement window {} reports, alert cooldown {}s, notifier '{}'",
        config.window_size,
        config.alert_cooldown_secs,
        notifier.name()
    );
    if config.maps_api_key.is_none() {
        log::warn!("MAPS_API is not set; clients will get no map key");
    }

    server::serve(config, notifier).await
}
