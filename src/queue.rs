/// Pending-download queue.
///
/// An unbounded FIFO of document URLs between the notification callback
/// (producer) and the scheduler loop (single consumer). Both halves are
/// cheap handles over one crossbeam channel, so no extra locking is needed.

use crossbeam_channel::{Receiver, RecvError, Sender, unbounded};

/// Producer half, cloned into the notification transport.
#[derive(Debug, Clone)]
pub struct QueueSender {
    tx: Sender<String>,
}

/// Consumer half, owned by the file acquirer.
#[derive(Debug)]
pub struct QueueStore {
    rx: Receiver<String>,
}

/// Creates a connected producer/consumer pair.
pub fn channel() -> (QueueSender, QueueStore) {
    let (tx, rx) = unbounded();
    (QueueSender { tx }, QueueStore { rx })
}

impl QueueSender {
    /// Appends a URL. Never blocks; a URL sent after the consumer is gone
    /// is dropped since nobody could ever process it.
    pub fn enqueue(&self, url: String) {
        let _ = self.tx.send(url);
    }
}

impl QueueStore {
    /// Blocks until a URL is available and returns the oldest one.
    ///
    /// Fails only when every producer is gone and the queue is empty.
    pub fn dequeue(&self) -> Result<String, RecvError> {
        self.rx.recv()
    }

    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }

    pub fn len(&self) -> usize {
        self.rx.len()
    }
}
