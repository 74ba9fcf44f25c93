//! Streamed response body delivered as a bounded channel of blocks.

use tokio::sync::mpsc;

use super::FetchError;

/// Producer half of a [`BodyStream`].
pub type BodySender = mpsc::Sender<Result<Vec<u8>, FetchError>>;

/// Response body as received from the network, one block at a time.
///
/// Dropping the stream tells the producer to stop.
#[derive(Debug)]
pub struct BodyStream {
    rx: mpsc::Receiver<Result<Vec<u8>, FetchError>>,
}

impl BodyStream {
    /// Bounded channel; the producer blocks once `capacity` blocks are queued.
    pub fn channel(capacity: usize) -> (BodySender, BodyStream) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (tx, BodyStream { rx })
    }

    /// Body made of already-known blocks and errors, in order.
    pub fn from_results(items: Vec<Result<Vec<u8>, FetchError>>) -> BodyStream {
        let (tx, stream) = Self::channel(items.len());
        for item in items {
            // Capacity covers every item.
            let _ = tx.try_send(item);
        }
        stream
    }

    pub fn from_blocks(blocks: Vec<Vec<u8>>) -> BodyStream {
        Self::from_results(blocks.into_iter().map(Ok).collect())
    }

    /// Next block, an error, or `None` at clean end of stream.
    pub async fn next_block(&mut self) -> Option<Result<Vec<u8>, FetchError>> {
        self.rx.recv().await
    }
}
