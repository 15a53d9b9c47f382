use crate::error::ClientError;
use crate::record::PushEntry;
use std::sync::Mutex;
use tokio::sync::mpsc;

/// Delivery channel between the sink and whatever ships entries to Loki.
///
/// Implementations own batching, retries and backpressure. The sink calls
/// `send` once per log event on the thread that logged it and `stop` once
/// during shutdown.
pub trait LokiClient: Send + Sync {
    /// Entry type the client transports; built from each [`PushEntry`].
    type Entry: From<PushEntry> + Send;

    /// Accept one entry for delivery.
    ///
    /// **Returns**
    /// - `Ok(())` once the entry has been queued. This does not mean it has
    ///   reached the backend.
    /// - `Err(..)` if the client refused the entry.
    fn send(&self, entry: Self::Entry) -> Result<(), ClientError>;

    /// Flush locally buffered entries, if the client buffers.
    ///
    /// Default implementation is a no-op.
    fn flush(&self) -> Result<(), ClientError> {
        Ok(())
    }

    /// Stop accepting entries and let the consumer terminate.
    fn stop(&self);
}

/// Client backed by a bounded Tokio channel.
///
/// `send` never blocks: a full channel is reported as [`ClientError::Full`]
/// so logging from inside an async runtime cannot stall a worker thread.
/// The receiving half is handed to a consumer such as
/// [`spawn_pusher`](crate::push::spawn_pusher).
pub struct ChannelClient<T = PushEntry> {
    sender: Mutex<Option<mpsc::Sender<T>>>,
}

impl<T: Send> ChannelClient<T> {
    /// Create a client with room for `buffer` entries (at least 1) and the
    /// receiver its consumer drains.
    pub fn new(buffer: usize) -> (Self, mpsc::Receiver<T>) {
        let (tx, rx) = mpsc::channel(buffer.max(1));
        (
            ChannelClient {
                sender: Mutex::new(Some(tx)),
            },
            rx,
        )
    }

    fn sender(&self) -> Option<mpsc::Sender<T>> {
        match self.sender.lock() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn is_stopped(&self) -> bool {
        self.sender().is_none()
    }
}

impl<T> LokiClient for ChannelClient<T>
where
    T: From<PushEntry> + Send,
{
    type Entry = T;

    fn send(&self, entry: T) -> Result<(), ClientError> {
        let sender = self.sender().ok_or(ClientError::Closed)?;
        sender.try_send(entry).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => ClientError::Full,
            mpsc::error::TrySendError::Closed(_) => ClientError::Closed,
        })
    }

    // Dropping the last sender closes the channel; the consumer drains what
    // is left and exits. Repeated calls are harmless.
    fn stop(&self) {
        let taken = match self.sender.lock() {
            Ok(mut guard) => guard.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        };
        drop(taken);
    }
}

/// A client that simply drops all entries.
///
/// Useful for measuring the overhead of the layer itself without any
/// external I/O, and for tests that don't care about delivery.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoopClient;

impl LokiClient for NoopClient {
    type Entry = PushEntry;

    fn send(&self, _entry: PushEntry) -> Result<(), ClientError> {
        Ok(())
    }

    fn stop(&self) {}
}
