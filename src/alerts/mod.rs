pub mod alert;
pub mod notifier;

pub use alert::MovementAlert;
pub use notifier::{dispatch, DeliveryFuture, DeliveryOutcome, LogNotifier, Notifier, SendmailNotifier};
