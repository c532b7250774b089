use futures::Stream;
use log::{debug, warn};
use tokio::sync::broadcast;

// Completions are rare (one generation in flight per session); a small
// buffer is plenty before a subscriber counts as lagged.
const CHANNEL_CAPACITY: usize = 32;

/// In-process multicast channel announcing "a proposal was saved for
/// file F". Late subscribers see no replay; per-publisher delivery order
/// is FIFO; a slow subscriber observes a logged gap, never an error that
/// fails the publisher.
pub struct ProposalBus {
    tx: broadcast::Sender<String>,
}

impl ProposalBus {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self { tx }
    }

    /// One delivery attempt per subscriber registered right now. Never
    /// blocks and never fails the caller.
    pub fn publish(&self, filename: &str) {
        match self.tx.send(filename.to_string()) {
            Ok(n) => debug!("proposal event for {filename} reached {n} subscriber(s)"),
            Err(_) => debug!("proposal event for {filename} had no subscribers"),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<String> {
        self.tx.subscribe()
    }

    /// Stream view of `subscribe()`; lagged gaps are logged and skipped,
    /// and the stream ends when the bus is dropped.
    pub fn stream(&self) -> impl Stream<Item = String> {
        futures::stream::unfold(self.subscribe(), |mut rx| async move {
            loop {
                match rx.recv().await {
                    Ok(filename) => return Some((filename, rx)),
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        warn!("proposal event stream lagged by {n} events");
                    }
                    Err(broadcast::error::RecvError::Closed) => return None,
                }
            }
        })
    }
}

impl Default for ProposalBus {
    fn default() -> Self {
        Self::new()
    }
}
