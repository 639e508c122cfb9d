//! HTTP API handlers for plexkw-labeler

pub mod extract;
pub mod health;
pub mod labels;
pub mod tasks;
pub mod webhook;

pub use health::health_routes;
pub use labels::label_routes;
pub use tasks::task_routes;
pub use webhook::{parse_webhook_event, webhook_routes};
