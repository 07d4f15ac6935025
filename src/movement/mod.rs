pub mod detector;
pub mod limiter;

pub use detector::{MovementDetector, MovementDiagnostics};
pub use limiter::AlertRateLimiter;
