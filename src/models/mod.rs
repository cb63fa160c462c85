//! Database-backed models.
//!
//! Rules and endpoints are owned by the CRUD surface; this core only reads
//! them. Notifications are the core's own durable artifact.

mod endpoint;
mod notification;
mod rule;

pub use endpoint::{Endpoint, EndpointType};
pub use notification::{NewNotification, Notification, NotificationStatus};
pub use rule::{Rule, WILDCARD};
