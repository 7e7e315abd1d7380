/// Deterministic simulated sockets and timers, used to drive the
/// connection state machine from tests without a real network.
///
/// Production code talks to the connection through the same two traits
/// ([`Socket`] and [`Timers`]) that the simulated versions implement, so
/// the state machine in `connection.rs` never has to know which one it
/// has.
use std::collections::VecDeque;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll, Waker};
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio::sync::Notify;
use tokio::time::Instant;

/// Marker trait for anything the connection can read from and write to.
/// Implemented by `tokio::net::TcpStream` in production and by
/// [`SimulatedSocket`] in tests.
pub trait Socket: AsyncRead + AsyncWrite + Unpin + Send {}
impl<T: AsyncRead + AsyncWrite + Unpin + Send> Socket for T {}

/// An epoch-tagged timer handle. Firing a timer whose epoch no longer
/// matches the owner's current epoch is a no-op: this is how a completed
/// I/O cancels a timer race without an explicit cancel message crossing
/// the executor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimerEpoch(u64);

/// Issues epoch-tagged timers and lets the connection check whether a
/// fired timer is still the one it armed.
pub struct TimerSource {
    epoch: AtomicU64,
}

impl TimerSource {
    pub fn new() -> Self {
        TimerSource {
            epoch: AtomicU64::new(0),
        }
    }

    /// Arm a new timer, invalidating any previously armed one for this
    /// source. Returns the epoch the caller should check against when the
    /// returned future resolves.
    pub fn arm(&self, duration: Duration) -> (TimerEpoch, ArmedTimer) {
        let epoch = self.epoch.fetch_add(1, Ordering::SeqCst) + 1;
        (
            TimerEpoch(epoch),
            ArmedTimer {
                deadline: Instant::now() + duration,
            },
        )
    }

    /// True if `epoch` is still the most recently armed timer: i.e. no
    /// later `arm` call (cancellation-by-superseding) has happened since.
    pub fn is_current(&self, epoch: TimerEpoch) -> bool {
        self.epoch.load(Ordering::SeqCst) == epoch.0
    }

    /// Invalidate any outstanding timer without arming a new one.
    pub fn cancel(&self) {
        self.epoch.fetch_add(1, Ordering::SeqCst);
    }
}

impl Default for TimerSource {
    fn default() -> Self {
        Self::new()
    }
}

pub struct ArmedTimer {
    deadline: Instant,
}

impl ArmedTimer {
    pub async fn wait(self) {
        tokio::time::sleep_until(self.deadline).await;
    }
}

/// A socket whose reads and writes are driven entirely by the test:
/// `feed` supplies bytes as if they had arrived from the peer, and
/// `written` drains bytes the connection has written back. Reads return
/// `Pending` once the fed buffer is exhausted, exactly as a real socket
/// would when the peer has nothing more to say yet.
#[derive(Clone)]
pub struct SimulatedSocket {
    inner: Arc<Mutex<SimulatedSocketState>>,
    notify: Arc<Notify>,
}

struct SimulatedSocketState {
    inbound: VecDeque<u8>,
    outbound: Vec<u8>,
    peer_closed: bool,
    read_waker: Option<Waker>,
    /// Remaining bytes the peer will accept before it stalls. `None` means
    /// unlimited. Once it reaches zero, writes never complete again — a
    /// peer that has stopped reading, not one that will resume.
    write_budget: Option<usize>,
}

impl SimulatedSocket {
    pub fn new() -> Self {
        SimulatedSocket {
            inner: Arc::new(Mutex::new(SimulatedSocketState {
                inbound: VecDeque::new(),
                outbound: Vec::new(),
                peer_closed: false,
                read_waker: None,
                write_budget: None,
            })),
            notify: Arc::new(Notify::new()),
        }
    }

    /// After `n` more bytes are accepted, the peer stops reading: further
    /// writes never complete. Models a stalled peer for write-timeout
    /// tests.
    pub fn stall_writes_after(&self, n: usize) {
        let mut state = self.inner.lock().expect("simulated socket lock poisoned");
        state.write_budget = Some(n);
    }

    pub fn feed(&self, bytes: &[u8]) {
        let mut state = self.inner.lock().expect("simulated socket lock poisoned");
        state.inbound.extend(bytes.iter().copied());
        if let Some(waker) = state.read_waker.take() {
            waker.wake();
        }
        self.notify.notify_waiters();
    }

    /// Signal that the peer has half-closed: future reads return EOF once
    /// the fed bytes are drained.
    pub fn close_peer(&self) {
        let mut state = self.inner.lock().expect("simulated socket lock poisoned");
        state.peer_closed = true;
        if let Some(waker) = state.read_waker.take() {
            waker.wake();
        }
        self.notify.notify_waiters();
    }

    pub fn take_written(&self) -> Vec<u8> {
        let mut state = self.inner.lock().expect("simulated socket lock poisoned");
        std::mem::take(&mut state.outbound)
    }
}

impl Default for SimulatedSocket {
    fn default() -> Self {
        Self::new()
    }
}

impl AsyncRead for SimulatedSocket {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<std::io::Result<()>> {
        let mut state = self.inner.lock().expect("simulated socket lock poisoned");
        if state.inbound.is_empty() {
            if state.peer_closed {
                return Poll::Ready(Ok(()));
            }
            state.read_waker = Some(cx.waker().clone());
            return Poll::Pending;
        }
        let n = buf.remaining().min(state.inbound.len());
        let chunk: Vec<u8> = state.inbound.drain(..n).collect();
        buf.put_slice(&chunk);
        Poll::Ready(Ok(()))
    }
}

impl AsyncWrite for SimulatedSocket {
    fn poll_write(
        self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<std::io::Result<usize>> {
        let mut state = self.inner.lock().expect("simulated socket lock poisoned");
        match state.write_budget {
            Some(0) => Poll::Pending,
            Some(remaining) => {
                let n = buf.len().min(remaining);
                state.outbound.extend_from_slice(&buf[..n]);
                state.write_budget = Some(remaining - n);
                Poll::Ready(Ok(n))
            }
            None => {
                state.outbound.extend_from_slice(buf);
                Poll::Ready(Ok(buf.len()))
            }
        }
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
        Poll::Ready(Ok(()))
    }

    fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
        Poll::Ready(Ok(()))
    }
}
