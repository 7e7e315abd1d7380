/// The pub/sub HTTP response (§4.F): a long-lived response that turns
/// node updates into written frames.
///
/// On first poll it subscribes to the requested node; each `on_update`
/// the root delivers is translated into a delta-or-full-value frame and
/// queued for the connection to write; on drop (client disconnect or
/// connection teardown) it unsubscribes from everything it ever joined.
use crate::json::Value;
use crate::node::{Node, NodeName};
use crate::pubsub::{Root, Subscriber};
use crate::response::{Response, ResponseState};
use crate::version::{Version, FIRST_VERSION};
use async_trait::async_trait;
use std::io;
use std::sync::{Arc, Mutex};
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;

/// Frame written for one update: either the full current value or a
/// delta array, tagged so the client can tell which it got.
fn frame(is_delta: bool, value: &Value) -> Vec<u8> {
    let kind = if is_delta { "delta" } else { "full" };
    let body = format!(
        "{{\"kind\":\"{}\",\"value\":{}}}\n",
        kind,
        value.serialize()
    );
    body.into_bytes()
}

struct Inner {
    last_sent_version: Mutex<Version>,
    sender: mpsc::UnboundedSender<Vec<u8>>,
}

#[async_trait]
impl Subscriber for Inner {
    async fn on_update(&self, _name: &NodeName, node: Arc<Mutex<Node>>) {
        let last_sent = *self.last_sent_version.lock().expect("lock poisoned");
        let (is_delta, value) = {
            let guard = node.lock().expect("node lock poisoned");
            let (is_delta, value) = guard.get_update_from(last_sent);
            *self.last_sent_version.lock().expect("lock poisoned") = guard.current_version();
            (is_delta, value)
        };
        let _ = self.sender.send(frame(is_delta, &value));
    }

    fn on_invalid_node_subscription(&self, _name: &NodeName) {
        let _ = self
            .sender
            .send(b"{\"error\":\"invalid_node\"}\n".to_vec());
    }

    fn on_unauthorized_node_subscription(&self, _name: &NodeName) {
        let _ = self
            .sender
            .send(b"{\"error\":\"unauthorized\"}\n".to_vec());
    }

    fn on_failed_node_subscription(&self, _name: &NodeName) {
        let _ = self
            .sender
            .send(b"{\"error\":\"initialization_failed\"}\n".to_vec());
    }
}

/// A [`Response`] that streams node updates to the client as they arrive.
pub struct SubscriptionResponse {
    root: Arc<Root>,
    name: NodeName,
    inner: Arc<Inner>,
    receiver: mpsc::UnboundedReceiver<Vec<u8>>,
    subscribed: bool,
    state: ResponseState,
}

impl SubscriptionResponse {
    pub fn new(root: Arc<Root>, name: NodeName) -> Self {
        let (sender, receiver) = mpsc::unbounded_channel();
        SubscriptionResponse {
            root,
            name,
            inner: Arc::new(Inner {
                last_sent_version: Mutex::new(FIRST_VERSION),
                sender,
            }),
            receiver,
            subscribed: false,
            state: ResponseState::Created,
        }
    }

    fn subscriber_handle(&self) -> Arc<dyn Subscriber> {
        Arc::clone(&self.inner) as Arc<dyn Subscriber>
    }
}

#[async_trait]
impl Response for SubscriptionResponse {
    async fn write_some(
        &mut self,
        socket: &mut (dyn AsyncWrite + Unpin + Send),
    ) -> io::Result<ResponseState> {
        self.state = ResponseState::Writing;
        if !self.subscribed {
            self.subscribed = true;
            let handle = self.subscriber_handle();
            let name = self.name.clone();
            let root = Arc::clone(&self.root);
            tokio::spawn(async move {
                root.subscribe(handle, name).await;
            });
        }

        match self.receiver.recv().await {
            Some(frame) => {
                socket.write_all(&frame).await?;
                // This response never completes on its own; the
                // connection keeps polling it until the client
                // disconnects and the response is dropped.
                Ok(ResponseState::Writing)
            }
            None => {
                self.state = ResponseState::Completed;
                Ok(self.state)
            }
        }
    }

    fn state(&self) -> ResponseState {
        self.state
    }
}

impl Drop for SubscriptionResponse {
    fn drop(&mut self) {
        let root = Arc::clone(&self.root);
        let handle = self.subscriber_handle();
        tokio::spawn(async move {
            root.unsubscribe_all(&handle);
        });
    }
}
