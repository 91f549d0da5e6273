//! User-facing notices.

use parking_lot::Mutex;
use std::fmt;
use tokio::sync::mpsc;
use tracing::info;

/// Something the user should be told about.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notice {
    /// Connectivity was lost.
    WentOffline,
    /// Connectivity came back; a flush follows.
    Reconnected,
    /// A flush replayed `count` operations.
    Synced {
        /// Operations attempted in the flush.
        count: usize,
    },
}

impl fmt::Display for Notice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Notice::WentOffline => f.write_str("You are offline; data will be saved locally"),
            Notice::Reconnected => f.write_str("Reconnected, syncing…"),
            Notice::Synced { count: 1 } => f.write_str("1 operation synced"),
            Notice::Synced { count } => write!(f, "{count} operations synced"),
        }
    }
}

/// Delivers notices to the user.
pub trait Notifier: Send + Sync {
    /// Delivers one notice. Must not block.
    fn notify(&self, notice: Notice);
}

/// Writes notices to the log.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn notify(&self, notice: Notice) {
        info!(%notice, "notice");
    }
}

/// Forwards notices to a channel, typically drained by the UI.
#[derive(Debug, Clone)]
pub struct ChannelNotifier {
    tx: mpsc::UnboundedSender<Notice>,
}

impl ChannelNotifier {
    /// Creates a notifier and the receiving end.
    pub fn new() -> (Self, mpsc::UnboundedReceiver<Notice>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl Notifier for ChannelNotifier {
    fn notify(&self, notice: Notice) {
        // A closed receiver means nobody is listening any more.
        let _ = self.tx.send(notice);
    }
}

/// Keeps every notice for later inspection.
#[derive(Debug, Default)]
pub struct RecordingNotifier {
    notices: Mutex<Vec<Notice>>,
}

impl RecordingNotifier {
    /// Creates an empty recorder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Notices received so far.
    pub fn notices(&self) -> Vec<Notice> {
        self.notices.lock().clone()
    }

    /// Returns and forgets the notices received so far.
    pub fn take(&self) -> Vec<Notice> {
        std::mem::take(&mut *self.notices.lock())
    }
}

impl Notifier for RecordingNotifier {
    fn notify(&self, notice: Notice) {
        self.notices.lock().push(notice);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages() {
        assert_eq!(
            Notice::WentOffline.to_string(),
            "You are offline; data will be saved locally"
        );
        assert_eq!(Notice::Reconnected.to_string(), "Reconnected, syncing…");
        assert_eq!(Notice::Synced { count: 3 }.to_string(), "3 operations synced");
        assert_eq!(Notice::Synced { count: 1 }.to_string(), "1 operation synced");
    }

    #[test]
    fn channel_forwards() {
        let (notifier, mut rx) = ChannelNotifier::new();
        notifier.notify(Notice::Synced { count: 1 });
        assert_eq!(rx.try_recv().unwrap(), Notice::Synced { count: 1 });

        drop(rx);
        notifier.notify(Notice::WentOffline);
    }

    #[test]
    fn recorder_take_empties() {
        let recorder = RecordingNotifier::new();
        recorder.notify(Notice::Reconnected);
        assert_eq!(recorder.take(), vec![Notice::Reconnected]);
        assert!(recorder.notices().is_empty());
    }
}
