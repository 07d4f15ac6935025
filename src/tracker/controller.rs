use std::{sync::Arc, time::Duration};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::{sync::Mutex, task::JoinHandle};

use crate::{
    alerts::{dispatch, DeliveryOutcome, MovementAlert, Notifier},
    broadcast::{BroadcastHub, Subscriber},
    config::Config,
    movement::{AlertRateLimiter, MovementDetector, MovementDiagnostics},
    telemetry::{LatestStateStore, TelemetryReport, TelemetrySnapshot},
};

const ENABLE_LOGS: bool = true;

use crate::{log_debug, log_info};

/// Window and gate move together; both are only touched under this one lock.
struct PipelineState {
    detector: MovementDetector,
    limiter: AlertRateLimiter,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MovementStatus {
    #[serde(flatten)]
    pub window: MovementDiagnostics,
    pub last_alert_at: Option<DateTime<Utc>>,
}

#[derive(Debug)]
pub struct IngestOutcome {
    pub snapshot: Arc<TelemetrySnapshot>,
    pub triggered: bool,
    /// Set when the gate let an alert through; resolves once delivery settles.
    pub alert: Option<JoinHandle<DeliveryOutcome>>,
    pub observers: usize,
}

/// Runs every inbound report through store, detector, rate limiter, notifier
/// and broadcast, one report at a time.
#[derive(Clone)]
pub struct TrackerController {
    store: Arc<LatestStateStore>,
    pipeline: Arc<Mutex<PipelineState>>,
    hub: BroadcastHub,
    notifier: Arc<dyn Notifier>,
    notify_timeout: Duration,
}

impl TrackerController {
    pub fn new(config: &Config, notifier: Arc<dyn Notifier>) -> Self {
        let store = Arc::new(LatestStateStore::new());
        let hub = BroadcastHub::new(Arc::clone(&store));

        Self {
            store,
            pipeline: Arc::new(Mutex::new(PipelineState {
                detector: MovementDetector::new(config.window_size),
                limiter: AlertRateLimiter::new(config.alert_cooldown()),
            })),
            hub,
            notifier,
            notify_timeout: config.notify_timeout(),
        }
    }

    pub async fn ingest(&self, report: TelemetryReport) -> IngestOutcome {
        self.ingest_at(report, Utc::now()).await
    }

    pub async fn ingest_at(&self, report: TelemetryReport, now: DateTime<Utc>) -> IngestOutcome {
        // Held through publish so observers see snapshots in arrival order.
        let mut pipeline = self.pipeline.lock().await;

        let snapshot = self.store.update(report, now);
        log_debug!("received report: {}", snapshot.raw_payload());

        let mut triggered = false;
        let mut alert = None;

        if let Some(is_moving) = snapshot.movement_flag() {
            triggered = pipeline.detector.observe(is_moving);

            if triggered {
                if pipeline.limiter.try_fire(now) {
                    log_info!("continuous movement detected, sending alert");
                    alert = Some(dispatch(
                        Arc::clone(&self.notifier),
                        MovementAlert::from_snapshot(&snapshot),
                        self.notify_timeout,
                    ));
                } else {
                    log_info!("continuous movement detected, alert cooldown active");
                }
            }
        }

        let observers = self.hub.publish(Arc::clone(&snapshot));
        drop(pipeline);

        IngestOutcome {
            snapshot,
            triggered,
            alert,
            observers,
        }
    }

    pub fn current(&self) -> Arc<TelemetrySnapshot> {
        self.store.current()
    }

    pub async fn movement_status(&self) -> MovementStatus {
        let pipeline = self.pipeline.lock().await;
        MovementStatus {
            window: pipeline.detector.diagnostics(),
            last_alert_at: pipeline.limiter.last_fired_at(),
        }
    }

    pub fn subscribe(&self) -> Subscriber {
        self.hub.subscribe()
    }

    pub fn hub(&self) -> &BroadcastHub {
        &self.hub
    }
}
