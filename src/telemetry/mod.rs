pub mod snapshot;
pub mod store;

pub use snapshot::{TelemetryReport, TelemetrySnapshot};
pub use store::LatestStateStore;
