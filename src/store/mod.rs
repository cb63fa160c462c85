//! Durable store access.
//!
//! Rules and endpoints are read-only projections owned by the CRUD surface;
//! notifications are written here and nowhere else.

mod endpoints;
mod notifications;
mod rules;

pub use endpoints::EndpointStore;
pub use notifications::NotificationStore;
pub use rules::RuleStore;
