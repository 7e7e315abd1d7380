/// The embedder-supplied side of the subscription lifecycle: validates
/// node names, authorizes subscribers, and supplies each new node's
/// initial value.
use super::callback::{AuthorizeCallback, NodeInitCallback, ValidNodeCallback};
use super::subscriber::Subscriber;
use crate::node::NodeName;
use std::sync::Arc;

/// Implemented by the embedder of the subscription root. Each step hands
/// the adapter a callback; the adapter may answer it synchronously,
/// answer it later from another task, or drop it (a dropped callback
/// reports failure on its own, see [`super::callback`]).
pub trait Adapter: Send + Sync {
    /// Is `name` a node this deployment recognizes?
    fn valid_node(&self, name: &NodeName, cb: ValidNodeCallback);

    /// May `subscriber` subscribe to `name`? Only called when the node's
    /// resolved configuration requires authorization.
    fn authorize(&self, subscriber: &Arc<dyn Subscriber>, name: &NodeName, cb: AuthorizeCallback);

    /// Supply the initial JSON value for a node being created for the
    /// first time.
    fn node_init(&self, name: &NodeName, cb: NodeInitCallback);

    /// `valid_node` failed or its callback was dropped.
    fn invalid_node_subscription(&self, name: &NodeName, subscriber: &Arc<dyn Subscriber>);

    /// `authorize` failed or its callback was dropped.
    fn unauthorized_subscription(&self, name: &NodeName, subscriber: &Arc<dyn Subscriber>);

    /// `node_init`'s callback was dropped.
    fn initialization_failed(&self, name: &NodeName, subscriber: &Arc<dyn Subscriber>);
}
