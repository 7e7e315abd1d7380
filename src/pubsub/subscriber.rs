/// The subscriber-facing side of the subscription lifecycle.
use crate::node::{Node, NodeName};
use async_trait::async_trait;
use std::sync::{Arc, Mutex};

/// Implemented by whatever holds a live subscription — typically a pub/sub
/// HTTP response object. The root calls these as the subscription
/// succeeds, fails at some lifecycle stage, or receives new data.
#[async_trait]
pub trait Subscriber: Send + Sync {
    /// A node this subscriber is subscribed to has a new version. `node`
    /// is shared with the store; callers read it through the lock just
    /// long enough to call `get_update_from`.
    async fn on_update(&self, name: &NodeName, node: Arc<Mutex<Node>>);

    /// `valid_node` answered negatively, or its callback was dropped.
    fn on_invalid_node_subscription(&self, name: &NodeName);

    /// `authorize` answered negatively, or its callback was dropped.
    fn on_unauthorized_node_subscription(&self, name: &NodeName);

    /// `node_init`'s callback was dropped.
    fn on_failed_node_subscription(&self, name: &NodeName);
}

/// A subscriber identified by pointer rather than by value, so a
/// subscriber set can tell two `Arc`s pointing at the same object apart
/// from two distinct subscribers that happen to compare equal.
#[derive(Clone)]
pub struct SubscriberHandle(pub Arc<dyn Subscriber>);

impl PartialEq for SubscriberHandle {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl Eq for SubscriberHandle {}

impl std::fmt::Debug for SubscriberHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "SubscriberHandle({:p})", Arc::as_ptr(&self.0))
    }
}
