//! Grouping of "download completed" notifications.
//!
//! Live events go through [`DownloadNotificationGrouper`], which waits for a
//! quiet period before showing one grouped notification. A full sync never
//! runs the per-event path, so [`recent_unread_downloads`] scans the
//! snapshot for the same case.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::task::JoinHandle;

use crate::model::{DownloadCompletedData, Notification, NotificationType};
use crate::stores::SystemNotifier;

type PendingQueue = Arc<Mutex<Vec<(String, DownloadCompletedData)>>>;

/// Debounced queue of completed downloads awaiting one grouped notification.
pub struct DownloadNotificationGrouper {
    notifier: Arc<dyn SystemNotifier>,
    debounce: Duration,
    queue: PendingQueue,
    flush_task: Mutex<Option<JoinHandle<()>>>,
}

impl DownloadNotificationGrouper {
    pub fn new(notifier: Arc<dyn SystemNotifier>, debounce: Duration) -> Self {
        Self {
            notifier,
            debounce,
            queue: Arc::new(Mutex::new(Vec::new())),
            flush_task: Mutex::new(None),
        }
    }

    /// Queue a completed download and restart the debounce window.
    ///
    /// Must be called from within a tokio runtime.
    pub fn enqueue(&self, notification_id: String, data: DownloadCompletedData) {
        {
            let mut queue = match self.queue.lock() {
                Ok(q) => q,
                Err(e) => {
                    tracing::error!("Download notification queue poisoned: {}", e);
                    return;
                }
            };
            if queue.iter().any(|(id, _)| *id == notification_id) {
                return;
            }
            queue.push((notification_id, data));
        }

        let queue = Arc::clone(&self.queue);
        let notifier = Arc::clone(&self.notifier);
        let debounce = self.debounce;
        let task = tokio::spawn(async move {
            tokio::time::sleep(debounce).await;
            // Drain and hand off with no await in between; aborting this
            // task from here on cannot lose the drained batch.
            if let Some((items, ids)) = drain(&queue) {
                tokio::spawn(async move {
                    tracing::debug!("Showing grouped notification for {} completed downloads", items.len());
                    notifier.show_grouped_downloads_completed(&items, &ids).await;
                });
            }
        });

        if let Ok(mut slot) = self.flush_task.lock() {
            if let Some(previous) = slot.replace(task) {
                previous.abort();
            }
        }
    }

    pub fn pending(&self) -> usize {
        self.queue.lock().map(|q| q.len()).unwrap_or(0)
    }

    /// Drop the pending flush and everything queued.
    pub fn cancel(&self) {
        if let Ok(mut slot) = self.flush_task.lock() {
            if let Some(task) = slot.take() {
                task.abort();
            }
        }
        if let Ok(mut queue) = self.queue.lock() {
            queue.clear();
        }
    }
}

impl Drop for DownloadNotificationGrouper {
    fn drop(&mut self) {
        if let Ok(mut slot) = self.flush_task.lock() {
            if let Some(task) = slot.take() {
                task.abort();
            }
        }
    }
}

/// Empty the queue, returning the payloads and their notification ids.
fn drain(queue: &PendingQueue) -> Option<(Vec<DownloadCompletedData>, Vec<String>)> {
    let drained: Vec<(String, DownloadCompletedData)> = match queue.lock() {
        Ok(mut q) => std::mem::take(&mut *q),
        Err(e) => {
            tracing::error!("Download notification queue poisoned: {}", e);
            return None;
        }
    };
    if drained.is_empty() {
        return None;
    }
    let (ids, items): (Vec<String>, Vec<DownloadCompletedData>) = drained.into_iter().unzip();
    Some((items, ids))
}

/// Unread `download_completed` notifications created after `cutoff`
/// (seconds since the epoch), with their decoded payloads.
pub fn recent_unread_downloads(
    notifications: &[Notification],
    cutoff: i64,
) -> Vec<(String, DownloadCompletedData)> {
    notifications
        .iter()
        .filter(|n| {
            n.is_unread()
                && n.notification_type == NotificationType::DownloadCompleted
                && n.created_at >= cutoff
        })
        .filter_map(|n| match n.download_completed_data() {
            Ok(data) => Some((n.id.clone(), data)),
            Err(e) => {
                tracing::warn!("Skipping download notification {} with bad payload: {}", n.id, e);
                None
            }
        })
        .collect()
}
