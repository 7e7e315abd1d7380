/// Destructor-driven callback objects for the subscription lifecycle.
///
/// An adapter may answer a callback synchronously, asynchronously on a
/// later task, or not at all. The third case — discarding the callback —
/// must still be observable as a failure, without the adapter having to
/// remember to call anything. Each callback owns the sending half of a
/// oneshot channel and answers it with a failure from its `Drop`
/// implementation if nothing else has already consumed it; the receiving
/// half therefore always resolves, whether the adapter called `success`,
/// called `failure`, or simply let the callback go out of scope.
use crate::json::Value;
use tokio::sync::oneshot;

enum Answer<T> {
    Success(T),
    Failure,
}

/// A single-use callback carrying a value of type `T` on success.
pub struct Callback<T> {
    sender: Option<oneshot::Sender<Answer<T>>>,
}

/// The other end of a [`Callback`]; resolves once the callback is
/// answered or dropped.
pub struct CallbackResult<T> {
    receiver: oneshot::Receiver<Answer<T>>,
}

impl<T> Callback<T> {
    pub fn new() -> (Self, CallbackResult<T>) {
        let (tx, rx) = oneshot::channel();
        (
            Callback { sender: Some(tx) },
            CallbackResult { receiver: rx },
        )
    }

    fn answer(mut self, value: Answer<T>) {
        if let Some(tx) = self.sender.take() {
            let _ = tx.send(value);
        }
    }

    pub fn succeed(self, value: T) {
        self.answer(Answer::Success(value));
    }

    pub fn fail(self) {
        self.answer(Answer::Failure);
    }
}

impl<T> Drop for Callback<T> {
    fn drop(&mut self) {
        if let Some(tx) = self.sender.take() {
            let _ = tx.send(Answer::Failure);
        }
    }
}

impl<T> CallbackResult<T> {
    /// Wait for the callback to be answered. Always resolves to `Some`
    /// unless the executor itself is shutting down: a dropped callback
    /// still sends a failure from its `Drop` impl.
    pub async fn wait(self) -> Option<T> {
        match self.receiver.await {
            Ok(Answer::Success(v)) => Some(v),
            Ok(Answer::Failure) | Err(_) => None,
        }
    }
}

/// Callback for the `valid_node` adapter step; success carries no value.
pub type ValidNodeCallback = Callback<()>;
/// Callback for the `authorize` adapter step; success carries no value.
pub type AuthorizeCallback = Callback<()>;
/// Callback for the `node_init` adapter step; success carries the node's
/// initial JSON value.
pub type NodeInitCallback = Callback<Value>;

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn explicit_success_is_observed() {
        let (cb, result) = Callback::<u32>::new();
        cb.succeed(7);
        assert_eq!(result.wait().await, Some(7));
    }

    #[tokio::test]
    async fn explicit_failure_is_observed() {
        let (cb, result) = Callback::<u32>::new();
        cb.fail();
        assert_eq!(result.wait().await, None);
    }

    #[tokio::test]
    async fn dropping_the_callback_without_answering_is_a_failure() {
        let (cb, result) = Callback::<u32>::new();
        drop(cb);
        assert_eq!(result.wait().await, None);
    }
}
