//! Subscriptions, subscription templates and the service that manages them

mod hydration;
mod model;
mod service;
mod topic_matcher;

pub use hydration::{apply_placeholders, HydrationError, HydrationField};
pub use model::{Subscription, SubscriptionTemplate};
pub use service::{generate_id, is_valid_global_parameter_key, SubscriptionService};
pub use topic_matcher::TopicMatcher;
