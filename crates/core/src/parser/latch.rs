//! One-shot completion latch between the blocking parse worker and the
//! awaiting request.

use tokio::sync::oneshot;

/// Sending half. The first of [`end`](Self::end) or [`error`](Self::error)
/// settles the latch; anything after that is ignored.
#[derive(Debug)]
pub struct ParseLatch<T, E> {
    tx: Option<oneshot::Sender<Result<T, E>>>,
}

impl<T, E> ParseLatch<T, E> {
    pub fn new() -> (Self, oneshot::Receiver<Result<T, E>>) {
        let (tx, rx) = oneshot::channel();
        (Self { tx: Some(tx) }, rx)
    }

    /// Signal successful completion. Returns `false` if already settled.
    pub fn end(&mut self, value: T) -> bool {
        self.settle(Ok(value))
    }

    /// Signal failure. Returns `false` if already settled.
    pub fn error(&mut self, err: E) -> bool {
        self.settle(Err(err))
    }

    pub fn is_settled(&self) -> bool {
        self.tx.is_none()
    }

    fn settle(&mut self, outcome: Result<T, E>) -> bool {
        match self.tx.take() {
            Some(tx) => {
                // The receiver may be gone if the request was abandoned.
                if tx.send(outcome).is_err() {
                    tracing::debug!("Parse finished after its caller went away");
                }
                true
            }
            None => {
                tracing::debug!("Ignoring duplicate parse completion");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn first_end_wins() {
        let (mut latch, rx) = ParseLatch::<u32, String>::new();
        assert!(latch.end(1));
        assert!(!latch.end(2));
        assert!(!latch.error("late".into()));
        assert!(latch.is_settled());
        assert_eq!(rx.await.unwrap(), Ok(1));
    }

    #[tokio::test]
    async fn error_then_end_stays_rejected() {
        let (mut latch, rx) = ParseLatch::<u32, String>::new();
        assert!(latch.error("bad zip".into()));
        assert!(!latch.end(7));
        assert_eq!(rx.await.unwrap(), Err("bad zip".to_string()));
    }

    #[tokio::test]
    async fn dropped_latch_closes_receiver() {
        let (latch, rx) = ParseLatch::<u32, String>::new();
        drop(latch);
        assert!(rx.await.is_err());
    }

    #[test]
    fn settling_after_receiver_dropped_is_not_an_error() {
        let (mut latch, rx) = ParseLatch::<u32, String>::new();
        drop(rx);
        assert!(latch.end(3));
    }
}
