/// Per-connection state machine: reads pipelined requests, dispatches
/// them to response objects through a [`ResponseFactory`], and applies
/// independent idle/read/write timers.
use crate::io_plan::{Socket, TimerSource};
use crate::request::{try_parse_one, ParseOutcome};
use crate::response::{Response, ResponseFactory, ResponseState};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncReadExt;

/// Bound on how many bytes of unparsed request data a connection will
/// buffer before giving up on that connection.
const DEFAULT_INPUT_BUFFER_CAPACITY: usize = 64 * 1024;

pub struct ConnectionTimeouts {
    pub keep_alive_timeout: Duration,
    pub io_timeout: Duration,
}

impl Default for ConnectionTimeouts {
    fn default() -> Self {
        ConnectionTimeouts {
            keep_alive_timeout: Duration::from_secs(30),
            io_timeout: Duration::from_secs(3),
        }
    }
}

/// Why a connection's run loop ended. Exposed for tests; production code
/// just drops the connection either way.
#[derive(Debug, PartialEq, Eq)]
pub enum ConnectionOutcome {
    /// Peer closed after all requests were answered.
    ClosedCleanly,
    /// Peer half-closed mid-request; nothing was sent for it.
    ClosedMidRequest,
    /// `Connection: close` was honoured after one final response.
    ClientRequestedClose,
    /// A request overflowed the input buffer.
    BufferFull,
    /// A timer fired.
    IdleTimeout,
    ReadTimeout,
    WriteTimeout,
}

/// Drives one connection to completion: parses pipelined requests off
/// `socket`, dispatches each to a response built by `factory`, and writes
/// responses back in order, honouring idle/read/write timeouts.
pub async fn run<S: Socket>(
    mut socket: S,
    factory: Arc<dyn ResponseFactory>,
    timeouts: ConnectionTimeouts,
) -> ConnectionOutcome {
    let read_timer = TimerSource::new();
    let idle_timer = TimerSource::new();

    let mut input = Vec::new();
    let mut read_buf = vec![0u8; 8192];
    let mut queue: Vec<Box<dyn Response>> = Vec::new();
    let mut stop_after_queue_drains = false;
    let mut outcome = None;

    loop {
        // Drain and write whatever is queued before reading more: a
        // response must finish writing before the connection's timers
        // reset to idle.
        while let Some(front) = queue.first_mut() {
            if front.state() == ResponseState::Completed {
                queue.remove(0);
                continue;
            }
            let write_timer = TimerSource::new();
            let (epoch, armed) = write_timer.arm(timeouts.io_timeout);
            tokio::select! {
                result = front.write_some(&mut socket) => {
                    match result {
                        Ok(_) => {}
                        Err(_) => {
                            outcome = Some(ConnectionOutcome::WriteTimeout);
                            break;
                        }
                    }
                }
                _ = armed.wait(), if write_timer.is_current(epoch) => {
                    tracing::debug!("write timer fired, closing connection");
                    outcome = Some(ConnectionOutcome::WriteTimeout);
                    break;
                }
            }
            if front.state() == ResponseState::Completed {
                queue.remove(0);
            }
        }
        if outcome.is_some() {
            break;
        }

        if stop_after_queue_drains && queue.is_empty() {
            outcome = Some(ConnectionOutcome::ClientRequestedClose);
            break;
        }

        if input.len() >= DEFAULT_INPUT_BUFFER_CAPACITY {
            outcome = Some(ConnectionOutcome::BufferFull);
            break;
        }

        // The drain loop above always empties the queue before we get here,
        // so "idle" can't be read off the queue; it means no partial request
        // is sitting in the input buffer waiting on more bytes.
        let idle = input.is_empty();
        let timer = if idle { &idle_timer } else { &read_timer };
        let timeout = if idle {
            timeouts.keep_alive_timeout
        } else {
            timeouts.io_timeout
        };
        let (epoch, armed) = timer.arm(timeout);

        let n = tokio::select! {
            result = socket.read(&mut read_buf) => {
                match result {
                    Ok(n) => n,
                    Err(_) => {
                        outcome = Some(ConnectionOutcome::ReadTimeout);
                        break;
                    }
                }
            }
            _ = armed.wait(), if timer.is_current(epoch) => {
                tracing::debug!(idle, "{} timer fired, closing connection", if idle { "idle" } else { "read" });
                outcome = Some(if idle {
                    ConnectionOutcome::IdleTimeout
                } else {
                    ConnectionOutcome::ReadTimeout
                });
                break;
            }
        };

        if n == 0 {
            // Peer half-closed. If there is unparsed data that never
            // became a full request, nothing is sent for it.
            outcome = Some(if input.is_empty() {
                ConnectionOutcome::ClosedCleanly
            } else {
                ConnectionOutcome::ClosedMidRequest
            });
            break;
        }
        input.extend_from_slice(&read_buf[..n]);

        loop {
            match try_parse_one(&input) {
                ParseOutcome::Complete { request, consumed } => {
                    if request.wants_close() {
                        stop_after_queue_drains = true;
                    }
                    queue.push(factory.create_response(&request));
                    input.drain(..consumed);
                }
                ParseOutcome::Incomplete => break,
                ParseOutcome::Invalid => {
                    // Malformed requests are rejected at the boundary, not
                    // the connection: report a 400 and keep going.
                    queue.push(Box::new(crate::response::FixedResponse::status(
                        400,
                        "Bad Request",
                    )));
                    input.clear();
                    break;
                }
            }
        }
    }

    let outcome = outcome.unwrap_or(ConnectionOutcome::ClosedCleanly);
    tracing::info!(?outcome, "connection closed");
    outcome
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io_plan::SimulatedSocket;
    use crate::request::Request;
    use crate::response::FixedResponse;

    struct EchoPathFactory;

    impl ResponseFactory for EchoPathFactory {
        fn create_response(&self, request: &Request) -> Box<dyn Response> {
            Box::new(FixedResponse::ok_json(request.path.clone().into_bytes()))
        }
    }

    #[tokio::test]
    async fn pipelined_requests_each_produce_one_response() {
        let socket = SimulatedSocket::new();
        socket.feed(b"GET /a HTTP/1.1\r\n\r\nGET /b HTTP/1.1\r\nConnection: close\r\n\r\n");
        socket.close_peer();

        let outcome = run(
            socket.clone(),
            Arc::new(EchoPathFactory),
            ConnectionTimeouts::default(),
        )
        .await;

        assert_eq!(outcome, ConnectionOutcome::ClientRequestedClose);
        let written = socket.take_written();
        let written = String::from_utf8(written).unwrap();
        assert!(written.contains("/a"));
        assert!(written.contains("/b"));
    }

    #[tokio::test]
    async fn half_closed_peer_mid_request_gets_no_response() {
        let socket = SimulatedSocket::new();
        socket.feed(b"GET /a HTTP/1.1\r\nHost: x");
        socket.close_peer();

        let outcome = run(
            socket.clone(),
            Arc::new(EchoPathFactory),
            ConnectionTimeouts::default(),
        )
        .await;

        assert_eq!(outcome, ConnectionOutcome::ClosedMidRequest);
        assert!(socket.take_written().is_empty());
    }

    #[tokio::test]
    async fn clean_close_with_no_pending_request() {
        let socket = SimulatedSocket::new();
        socket.close_peer();

        let outcome = run(
            socket.clone(),
            Arc::new(EchoPathFactory),
            ConnectionTimeouts::default(),
        )
        .await;

        assert_eq!(outcome, ConnectionOutcome::ClosedCleanly);
    }

    #[tokio::test]
    async fn request_larger_than_the_input_buffer_closes_with_buffer_full() {
        let socket = SimulatedSocket::new();
        let mut raw = b"GET /".to_vec();
        raw.extend(std::iter::repeat(b'a').take(DEFAULT_INPUT_BUFFER_CAPACITY + 10));

        let handle = tokio::spawn(run(
            socket.clone(),
            Arc::new(EchoPathFactory),
            ConnectionTimeouts::default(),
        ));
        for chunk in raw.chunks(8192) {
            socket.feed(chunk);
        }

        let outcome = handle.await.unwrap();
        assert_eq!(outcome, ConnectionOutcome::BufferFull);
    }

    #[tokio::test]
    async fn two_thousand_pipelined_requests_each_produce_one_response() {
        let socket = SimulatedSocket::new();
        let one = b"GET / HTTP/1.1\r\n\r\n";
        let mut all = Vec::new();
        for _ in 0..2000 {
            all.extend_from_slice(one);
        }

        let handle = tokio::spawn(run(
            socket.clone(),
            Arc::new(EchoPathFactory),
            ConnectionTimeouts::default(),
        ));
        for chunk in all.chunks(400) {
            socket.feed(chunk);
        }

        let mut collected = Vec::new();
        for _ in 0..500 {
            tokio::time::sleep(Duration::from_millis(5)).await;
            collected.extend(socket.take_written());
            let count = collected.windows(15).filter(|w| *w == b"HTTP/1.1 200 OK").count();
            if count >= 2000 {
                break;
            }
        }
        let count = collected.windows(15).filter(|w| *w == b"HTTP/1.1 200 OK").count();
        assert_eq!(count, 2000);
        assert!(!handle.is_finished(), "connection stays open until the peer closes");

        socket.close_peer();
        let outcome = handle.await.unwrap();
        assert_eq!(outcome, ConnectionOutcome::ClosedCleanly);
    }

    struct FiveByteFactory;

    struct FiveByteResponse {
        state: ResponseState,
    }

    #[async_trait::async_trait]
    impl Response for FiveByteResponse {
        async fn write_some(
            &mut self,
            socket: &mut (dyn tokio::io::AsyncWrite + Unpin + Send),
        ) -> std::io::Result<ResponseState> {
            use tokio::io::AsyncWriteExt;
            self.state = ResponseState::Writing;
            socket.write_all(b"ABCDE").await?;
            self.state = ResponseState::Completed;
            Ok(self.state)
        }

        fn state(&self) -> ResponseState {
            self.state
        }
    }

    impl ResponseFactory for FiveByteFactory {
        fn create_response(&self, _request: &Request) -> Box<dyn Response> {
            Box::new(FiveByteResponse {
                state: ResponseState::Created,
            })
        }
    }

    #[tokio::test(start_paused = true)]
    async fn write_stall_triggers_write_timeout_leaving_partial_bytes_on_the_wire() {
        let socket = SimulatedSocket::new();
        socket.feed(b"GET /a HTTP/1.1\r\n\r\n");
        socket.stall_writes_after(2);

        let outcome = run(
            socket.clone(),
            Arc::new(FiveByteFactory),
            ConnectionTimeouts {
                keep_alive_timeout: Duration::from_secs(30),
                io_timeout: Duration::from_secs(3),
            },
        )
        .await;

        assert_eq!(outcome, ConnectionOutcome::WriteTimeout);
        assert_eq!(socket.take_written(), b"AB");
    }

    #[tokio::test(start_paused = true)]
    async fn idle_connection_after_a_served_response_times_out_on_keep_alive() {
        let socket = SimulatedSocket::new();
        socket.feed(b"GET /a HTTP/1.1\r\n\r\n");

        let outcome = run(
            socket.clone(),
            Arc::new(EchoPathFactory),
            ConnectionTimeouts {
                keep_alive_timeout: Duration::from_secs(30),
                io_timeout: Duration::from_secs(3),
            },
        )
        .await;

        assert_eq!(outcome, ConnectionOutcome::IdleTimeout);
    }
}
