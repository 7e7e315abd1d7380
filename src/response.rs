/// Response objects and the factory that creates them from parsed
/// requests.
///
/// A response owns its own write lifecycle: the connection hands it a
/// socket and polls `write_some`, which reports how far it got. When a
/// response reaches `Completed` the connection pops it from the queue and
/// starts the next one (or arms the idle timer if none remain). A
/// subscription response (§4.F) can stay in `Writing` indefinitely,
/// between node updates, without blocking the rest of the queue: the
/// connection only ever has one response writing at a time, so a slow
/// subscription response does hold up later pipelined requests on the
/// same connection, same as a slow ordinary response would.
use crate::request::Request;
use async_trait::async_trait;
use std::io;
use tokio::io::{AsyncWrite, AsyncWriteExt};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseState {
    Created,
    Writing,
    Completed,
}

/// A response in progress. Implementations drive their own state and
/// report `Completed` once every byte they intend to write has been
/// handed to the socket.
#[async_trait]
pub trait Response: Send {
    /// Write as much of this response as is currently available, waiting
    /// for more (e.g. the next `on_update`) rather than returning early
    /// with [`ResponseState::Writing`] only when there is truly nothing
    /// left to write yet.
    async fn write_some(&mut self, socket: &mut (dyn AsyncWrite + Unpin + Send)) -> io::Result<ResponseState>;

    fn state(&self) -> ResponseState;
}

/// A response whose entire body is known up front: the common case for
/// anything that is not a long-lived subscription.
pub struct FixedResponse {
    bytes: Vec<u8>,
    written: usize,
    state: ResponseState,
}

impl FixedResponse {
    pub fn new(status_line: &str, headers: &[(&str, &str)], body: Vec<u8>) -> Self {
        let mut bytes = Vec::new();
        bytes.extend_from_slice(status_line.as_bytes());
        bytes.extend_from_slice(b"\r\n");
        for (k, v) in headers {
            bytes.extend_from_slice(k.as_bytes());
            bytes.extend_from_slice(b": ");
            bytes.extend_from_slice(v.as_bytes());
            bytes.extend_from_slice(b"\r\n");
        }
        bytes.extend_from_slice(b"content-length: ");
        bytes.extend_from_slice(body.len().to_string().as_bytes());
        bytes.extend_from_slice(b"\r\n\r\n");
        bytes.extend_from_slice(&body);
        FixedResponse {
            bytes,
            written: 0,
            state: ResponseState::Created,
        }
    }

    pub fn ok_json(body: Vec<u8>) -> Self {
        Self::new("HTTP/1.1 200 OK", &[("content-type", "application/json")], body)
    }

    pub fn status(code: u16, reason: &str) -> Self {
        Self::new(&format!("HTTP/1.1 {} {}", code, reason), &[], Vec::new())
    }
}

#[async_trait]
impl Response for FixedResponse {
    async fn write_some(&mut self, socket: &mut (dyn AsyncWrite + Unpin + Send)) -> io::Result<ResponseState> {
        self.state = ResponseState::Writing;
        socket.write_all(&self.bytes[self.written..]).await?;
        self.written = self.bytes.len();
        self.state = ResponseState::Completed;
        Ok(self.state)
    }

    fn state(&self) -> ResponseState {
        self.state
    }
}

/// Creates response objects from parsed requests. The only place the
/// connection state machine reaches outside itself to decide what a
/// request means; everything else in `connection.rs` is generic over
/// this trait.
pub trait ResponseFactory: Send + Sync {
    fn create_response(&self, request: &Request) -> Box<dyn Response>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io_plan::SimulatedSocket;

    #[tokio::test]
    async fn fixed_response_writes_its_full_bytes_and_completes() {
        let mut response = FixedResponse::ok_json(b"{\"a\":1}".to_vec());
        let mut socket = SimulatedSocket::new();
        let state = response.write_some(&mut socket).await.unwrap();
        assert_eq!(state, ResponseState::Completed);
        let written = socket.take_written();
        assert!(written.starts_with(b"HTTP/1.1 200 OK\r\n"));
        assert!(written.ends_with(b"{\"a\":1}"));
    }
}
