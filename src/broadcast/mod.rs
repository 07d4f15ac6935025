pub mod hub;

pub use hub::{BroadcastHub, Subscriber, SubscriberId};
