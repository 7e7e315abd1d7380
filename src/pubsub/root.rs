/// The subscription root: a map of node name to node state, driving the
/// validate → authorize → initialize → deliver lifecycle through an
/// adapter, and fanning out updates to subscribers.
use super::adapter::Adapter;
use super::callback::{AuthorizeCallback, NodeInitCallback, ValidNodeCallback};
use super::subscriber::{Subscriber, SubscriberHandle};
use crate::config::{Configuration, ConfigurationList};
use crate::error::{PubsubError, PubsubResult};
use crate::json::Value;
use crate::node::{Node, NodeGroup, NodeName};
use crate::version::{Version, FIRST_VERSION};
use dashmap::DashMap;
use std::sync::{Arc, Mutex};

/// A node plus the subscribers currently interested in it and the
/// configuration it was created under.
pub struct SubscribedNode {
    node: Arc<Mutex<Node>>,
    subscribers: Vec<SubscriberHandle>,
    configuration: Arc<Configuration>,
}

impl SubscribedNode {
    pub fn node(&self) -> &Arc<Mutex<Node>> {
        &self.node
    }

    pub fn configuration(&self) -> &Arc<Configuration> {
        &self.configuration
    }
}

/// Map of node name to subscribed node, plus the configuration list used
/// to resolve new nodes' behaviour and the adapter that drives the
/// lifecycle.
pub struct Root {
    nodes: DashMap<NodeName, SubscribedNode>,
    configurations: Mutex<ConfigurationList>,
    adapter: Arc<dyn Adapter>,
    history_budget_bytes: usize,
}

impl Root {
    pub fn new(
        adapter: Arc<dyn Adapter>,
        default_configuration: Configuration,
        history_budget_bytes: usize,
    ) -> Self {
        Root {
            nodes: DashMap::new(),
            configurations: Mutex::new(ConfigurationList::new(default_configuration)),
            adapter,
            history_budget_bytes,
        }
    }

    pub fn add_configuration(&self, group: NodeGroup, configuration: Configuration) {
        self.configurations
            .lock()
            .expect("configuration list lock poisoned")
            .add_configuration(group, configuration);
    }

    pub fn remove_configuration(&self, sample: &NodeName) -> PubsubResult<()> {
        self.configurations
            .lock()
            .expect("configuration list lock poisoned")
            .remove_configuration(sample)
    }

    fn resolve_configuration(&self, name: &NodeName) -> Arc<Configuration> {
        self.configurations
            .lock()
            .expect("configuration list lock poisoned")
            .get_configuration(name)
    }

    /// Drive the four-step subscription lifecycle for `name`. If a node
    /// by that name is already in the store, the subscriber joins it
    /// directly: validation, authorization and initialization only ever
    /// run for the first subscriber of a node, and the new subscriber is
    /// caught up with an immediate `on_update` rather than waiting for the
    /// next write.
    pub async fn subscribe(&self, subscriber: Arc<dyn Subscriber>, name: NodeName) {
        if self.nodes.contains_key(&name) {
            tracing::debug!(%name, "subscribe: joining existing node");
            let handle = SubscriberHandle(Arc::clone(&subscriber));
            if let Some(mut entry) = self.nodes.get_mut(&name) {
                if !entry.subscribers.contains(&handle) {
                    entry.subscribers.push(handle);
                }
            }
            if let Some(node) = entry_node(&self.nodes, &name) {
                subscriber.on_update(&name, node).await;
            }
            return;
        }

        tracing::debug!(%name, "subscribe: validating node");
        let (valid_cb, valid_result) = ValidNodeCallback::new();
        self.adapter.valid_node(&name, valid_cb);
        if valid_result.wait().await.is_none() {
            tracing::info!(%name, "subscribe: rejected, invalid node");
            self.adapter.invalid_node_subscription(&name, &subscriber);
            subscriber.on_invalid_node_subscription(&name);
            return;
        }

        let configuration = self.resolve_configuration(&name);

        if configuration.authorization_required {
            tracing::debug!(%name, "subscribe: authorizing");
            let (auth_cb, auth_result): (AuthorizeCallback, _) = AuthorizeCallback::new();
            self.adapter.authorize(&subscriber, &name, auth_cb);
            if auth_result.wait().await.is_none() {
                tracing::info!(%name, "subscribe: rejected, unauthorized");
                self.adapter.unauthorized_subscription(&name, &subscriber);
                subscriber.on_unauthorized_node_subscription(&name);
                return;
            }
        }

        tracing::debug!(%name, "subscribe: initializing node");
        let (init_cb, init_result): (NodeInitCallback, _) = NodeInitCallback::new();
        self.adapter.node_init(&name, init_cb);
        let initial_value = match init_result.wait().await {
            Some(v) => v,
            None => {
                tracing::info!(%name, "subscribe: rejected, initialization failed");
                self.adapter.initialization_failed(&name, &subscriber);
                subscriber.on_failed_node_subscription(&name);
                return;
            }
        };

        let node = Arc::new(Mutex::new(Node::new(FIRST_VERSION, initial_value)));
        let handle = SubscriberHandle(Arc::clone(&subscriber));

        // Another subscribe for the same name may have raced us to
        // insertion while we awaited the adapter; join that node instead
        // of creating a second one.
        let joined_existing = self.nodes.get(&name).is_some();
        if !joined_existing {
            tracing::info!(%name, "subscribe: node created");
            self.nodes.insert(
                name.clone(),
                SubscribedNode {
                    node,
                    subscribers: vec![handle],
                    configuration,
                },
            );
        } else if let Some(mut entry) = self.nodes.get_mut(&name) {
            entry.subscribers.push(handle);
        }

        if let Some(node) = entry_node(&self.nodes, &name) {
            subscriber.on_update(&name, node).await;
        }
    }

    pub fn unsubscribe(&self, subscriber: &Arc<dyn Subscriber>, name: &NodeName) {
        if let Some(mut entry) = self.nodes.get_mut(name) {
            let handle = SubscriberHandle(Arc::clone(subscriber));
            entry.subscribers.retain(|s| *s != handle);
        }
    }

    pub fn unsubscribe_all(&self, subscriber: &Arc<dyn Subscriber>) {
        let handle = SubscriberHandle(Arc::clone(subscriber));
        for mut entry in self.nodes.iter_mut() {
            entry.subscribers.retain(|s| *s != handle);
        }
    }

    /// Update the stored node's value, then deliver `on_update` to every
    /// current subscriber in turn. Delivery within a single subscriber is
    /// therefore FIFO per node; across nodes or subscribers no ordering
    /// is promised.
    pub async fn update_node(&self, name: &NodeName, new_data: Value) -> PubsubResult<()> {
        let (node, subscribers) = {
            let entry = self
                .nodes
                .get(name)
                .ok_or_else(|| PubsubError::NoSuchNode(name.to_string()))?;
            (Arc::clone(&entry.node), entry.subscribers.clone())
        };

        {
            let mut guard = node.lock().expect("node lock poisoned");
            guard.update(new_data, self.history_budget_bytes);
        }

        tracing::debug!(%name, subscriber_count = subscribers.len(), "node updated, notifying subscribers");
        for handle in subscribers {
            handle.0.on_update(name, Arc::clone(&node)).await;
        }
        Ok(())
    }

    pub fn current_version(&self, name: &NodeName) -> Option<Version> {
        self.nodes
            .get(name)
            .map(|entry| entry.node.lock().expect("node lock poisoned").current_version())
    }
}

fn entry_node(nodes: &DashMap<NodeName, SubscribedNode>, name: &NodeName) -> Option<Arc<Mutex<Node>>> {
    nodes.get(name).map(|entry| Arc::clone(&entry.node))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::sync::Notify;

    struct FixedAdapter {
        valid: bool,
        authorized: bool,
        init: Option<Value>,
    }

    impl Adapter for FixedAdapter {
        fn valid_node(&self, _name: &NodeName, cb: ValidNodeCallback) {
            if self.valid {
                cb.succeed(());
            }
        }

        fn authorize(&self, _subscriber: &Arc<dyn Subscriber>, _name: &NodeName, cb: AuthorizeCallback) {
            if self.authorized {
                cb.succeed(());
            }
        }

        fn node_init(&self, _name: &NodeName, cb: NodeInitCallback) {
            if let Some(v) = &self.init {
                cb.succeed(v.clone());
            }
        }

        fn invalid_node_subscription(&self, _name: &NodeName, _subscriber: &Arc<dyn Subscriber>) {}
        fn unauthorized_subscription(&self, _name: &NodeName, _subscriber: &Arc<dyn Subscriber>) {}
        fn initialization_failed(&self, _name: &NodeName, _subscriber: &Arc<dyn Subscriber>) {}
    }

    struct RecordingSubscriber {
        updates: AtomicUsize,
        invalid: AtomicUsize,
        unauthorized: AtomicUsize,
        failed: AtomicUsize,
        notify: Notify,
    }

    impl RecordingSubscriber {
        fn new() -> Self {
            RecordingSubscriber {
                updates: AtomicUsize::new(0),
                invalid: AtomicUsize::new(0),
                unauthorized: AtomicUsize::new(0),
                failed: AtomicUsize::new(0),
                notify: Notify::new(),
            }
        }
    }

    #[async_trait::async_trait]
    impl Subscriber for RecordingSubscriber {
        async fn on_update(&self, _name: &NodeName, _node: Arc<Mutex<Node>>) {
            self.updates.fetch_add(1, Ordering::SeqCst);
            self.notify.notify_one();
        }

        fn on_invalid_node_subscription(&self, _name: &NodeName) {
            self.invalid.fetch_add(1, Ordering::SeqCst);
        }

        fn on_unauthorized_node_subscription(&self, _name: &NodeName) {
            self.unauthorized.fetch_add(1, Ordering::SeqCst);
        }

        fn on_failed_node_subscription(&self, _name: &NodeName) {
            self.failed.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn name(n: &str) -> NodeName {
        NodeName::new().with("id", n)
    }

    #[tokio::test]
    async fn successful_subscription_delivers_initial_value() {
        let adapter = Arc::new(FixedAdapter {
            valid: true,
            authorized: true,
            init: Some(Value::number(1)),
        });
        let root = Root::new(adapter, Configuration::default(), 1000);
        let subscriber = Arc::new(RecordingSubscriber::new());

        root.subscribe(subscriber.clone(), name("a")).await;

        assert_eq!(subscriber.updates.load(Ordering::SeqCst), 1);
        assert_eq!(subscriber.invalid.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn invalid_node_stops_the_lifecycle() {
        let adapter = Arc::new(FixedAdapter {
            valid: false,
            authorized: true,
            init: Some(Value::number(1)),
        });
        let root = Root::new(adapter, Configuration::default(), 1000);
        let subscriber = Arc::new(RecordingSubscriber::new());

        root.subscribe(subscriber.clone(), name("a")).await;

        assert_eq!(subscriber.invalid.load(Ordering::SeqCst), 1);
        assert_eq!(subscriber.updates.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn unauthorized_subscriber_is_reported_and_not_stored() {
        let adapter = Arc::new(FixedAdapter {
            valid: true,
            authorized: false,
            init: Some(Value::number(1)),
        });
        let root = Root::new(adapter, Configuration::default(), 1000);
        let subscriber = Arc::new(RecordingSubscriber::new());

        root.subscribe(subscriber.clone(), name("a")).await;

        assert_eq!(subscriber.unauthorized.load(Ordering::SeqCst), 1);
        assert!(root.current_version(&name("a")).is_none());
    }

    #[tokio::test]
    async fn dropped_init_callback_reports_failure() {
        let adapter = Arc::new(FixedAdapter {
            valid: true,
            authorized: true,
            init: None,
        });
        let root = Root::new(adapter, Configuration::default(), 1000);
        let subscriber = Arc::new(RecordingSubscriber::new());

        root.subscribe(subscriber.clone(), name("a")).await;

        assert_eq!(subscriber.failed.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn a_second_subscriber_joins_without_revalidating_and_is_caught_up() {
        let adapter = Arc::new(FixedAdapter {
            valid: true,
            authorized: true,
            init: Some(Value::number(1)),
        });
        let root = Root::new(adapter, Configuration::default(), 1000);
        let first = Arc::new(RecordingSubscriber::new());
        let second = Arc::new(RecordingSubscriber::new());

        root.subscribe(first.clone(), name("a")).await;
        root.subscribe(second.clone(), name("a")).await;

        assert_eq!(second.updates.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn update_node_notifies_current_subscribers() {
        let adapter = Arc::new(FixedAdapter {
            valid: true,
            authorized: true,
            init: Some(Value::number(1)),
        });
        let root = Root::new(adapter, Configuration::default(), 1000);
        let subscriber = Arc::new(RecordingSubscriber::new());
        root.subscribe(subscriber.clone(), name("a")).await;

        root.update_node(&name("a"), Value::number(2)).await.unwrap();

        assert_eq!(subscriber.updates.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn update_node_for_an_unknown_name_is_a_domain_error() {
        let adapter = Arc::new(FixedAdapter {
            valid: true,
            authorized: true,
            init: Some(Value::number(1)),
        });
        let root = Root::new(adapter, Configuration::default(), 1000);

        let err = root.update_node(&name("never-subscribed"), Value::number(2)).await;

        assert!(matches!(err, Err(PubsubError::NoSuchNode(_))));
    }
}
