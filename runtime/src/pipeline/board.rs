use tokio::sync::watch;

use super::stage::{FileEvent, FileProjection};

/// Ordered, keyed set of file projections for one submitting session.
///
/// Every change is a single read-modify-write through the watch channel, so
/// file tasks finishing out of order cannot lose each other's updates.
/// Subscribers always see whole snapshots.
pub struct ProjectionBoard {
    tx: watch::Sender<Vec<FileProjection>>,
}

impl Default for ProjectionBoard {
    fn default() -> Self {
        Self::new()
    }
}

impl ProjectionBoard {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(Vec::new());
        Self { tx }
    }

    pub fn subscribe(&self) -> watch::Receiver<Vec<FileProjection>> {
        self.tx.subscribe()
    }

    pub fn snapshot(&self) -> Vec<FileProjection> {
        self.tx.borrow().clone()
    }

    pub fn register(&self, projection: FileProjection) {
        self.tx.send_modify(|files| files.push(projection));
    }

    /// Applies `event` to the entry keyed by `id`. `None` when the entry was
    /// removed in the meantime.
    pub fn apply(&self, id: &str, event: &FileEvent) -> Option<FileProjection> {
        let mut updated = None;
        self.tx.send_if_modified(|files| {
            let Some(slot) = files.iter_mut().find(|file| file.id == id) else {
                return false;
            };
            let next = slot.apply(event);
            let changed = next != *slot;
            *slot = next.clone();
            updated = Some(next);
            changed
        });
        updated
    }

    pub fn remove(&self, id: &str) -> bool {
        self.tx.send_if_modified(|files| {
            let before = files.len();
            files.retain(|file| file.id != id);
            files.len() != before
        })
    }
}
