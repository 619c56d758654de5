/// What a scan reports to its listeners.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexEvent {
    /// Periodic, throttled progress while the scan is running.
    Progress { indexed_up_to: usize, lines: usize },
    /// The whole file has been scanned; the line count is now exact.
    Finished { lines: usize },
}

/// A sink for scan notifications.
///
/// Called on the scanner thread. Anything that must run on a UI thread has to
/// be marshalled there by the implementation (a channel send is the usual way).
pub trait IndexListener: Send + Sync {
    fn on_update(&self, event: &IndexEvent);
}

/// Plain callbacks take no arguments and re-query the index themselves.
impl<F> IndexListener for F
where
    F: Fn() + Send + Sync,
{
    fn on_update(&self, _event: &IndexEvent) {
        self();
    }
}

impl IndexListener for crossbeam_channel::Sender<IndexEvent> {
    fn on_update(&self, event: &IndexEvent) {
        // A dropped receiver just means nobody is listening anymore.
        if self.send(*event).is_err() {
            tracing::trace!("index listener channel disconnected");
        }
    }
}
