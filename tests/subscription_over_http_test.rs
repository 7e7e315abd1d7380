/// End-to-end: an HTTP GET on `/nodes/<id>` drives the connection state
/// machine, which dispatches into a subscription response, which drives
/// the subscription root through the adapter lifecycle and writes the
/// node's initial value back over the wire.
use pubsubd::config::Configuration;
use pubsubd::connection::{self, ConnectionTimeouts};
use pubsubd::io_plan::SimulatedSocket;
use pubsubd::json::Value;
use pubsubd::node::NodeName;
use pubsubd::pubsub::adapter::Adapter;
use pubsubd::pubsub::callback::{AuthorizeCallback, NodeInitCallback, ValidNodeCallback};
use pubsubd::pubsub::{Root, Subscriber};
use pubsubd::request::Request;
use pubsubd::response::{FixedResponse, Response, ResponseFactory};
use pubsubd::subscription_response::SubscriptionResponse;
use std::sync::Arc;
use std::time::Duration;

struct PermissiveAdapter;

impl Adapter for PermissiveAdapter {
    fn valid_node(&self, _name: &NodeName, cb: ValidNodeCallback) {
        cb.succeed(());
    }
    fn authorize(&self, _subscriber: &Arc<dyn Subscriber>, _name: &NodeName, cb: AuthorizeCallback) {
        cb.succeed(());
    }
    fn node_init(&self, _name: &NodeName, cb: NodeInitCallback) {
        cb.succeed(Value::number(42));
    }
    fn invalid_node_subscription(&self, _name: &NodeName, _subscriber: &Arc<dyn Subscriber>) {}
    fn unauthorized_subscription(&self, _name: &NodeName, _subscriber: &Arc<dyn Subscriber>) {}
    fn initialization_failed(&self, _name: &NodeName, _subscriber: &Arc<dyn Subscriber>) {}
}

struct PubsubFactory {
    root: Arc<Root>,
}

impl ResponseFactory for PubsubFactory {
    fn create_response(&self, request: &Request) -> Box<dyn Response> {
        let segments: Vec<&str> = request.path.trim_matches('/').split('/').collect();
        match segments.as_slice() {
            ["nodes", id] => Box::new(SubscriptionResponse::new(
                Arc::clone(&self.root),
                NodeName::new().with("id", *id),
            )),
            _ => Box::new(FixedResponse::status(404, "Not Found")),
        }
    }
}

#[tokio::test]
async fn get_request_subscribes_and_streams_the_initial_value() {
    let root = Arc::new(Root::new(
        Arc::new(PermissiveAdapter),
        Configuration::default(),
        4096,
    ));
    let factory: Arc<dyn ResponseFactory> = Arc::new(PubsubFactory { root: Arc::clone(&root) });

    let socket = SimulatedSocket::new();
    socket.feed(b"GET /nodes/a HTTP/1.1\r\nHost: x\r\n\r\n");

    let handle = tokio::spawn(connection::run(
        socket.clone(),
        factory,
        ConnectionTimeouts::default(),
    ));

    let mut written = Vec::new();
    for _ in 0..50 {
        tokio::time::sleep(Duration::from_millis(10)).await;
        written = socket.take_written();
        if !written.is_empty() {
            break;
        }
    }

    let body = String::from_utf8(written).unwrap();
    assert!(body.contains("\"kind\":\"full\""));
    assert!(body.contains("\"value\":42"));

    handle.abort();
}
