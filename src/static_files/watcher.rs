//! Filesystem watcher that triggers index rebuilds.

use std::path::Path;
use std::sync::Weak;
use std::time::Duration;

use notify::{Config, Event, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;

use crate::static_files::index::StaticIndex;

/// Quiet period collapsing bursts of events into one rebuild.
const DEBOUNCE: Duration = Duration::from_millis(200);

/// Watch `root` recursively. The returned watcher must be kept alive.
pub(crate) fn spawn_watcher(
    index: Weak<StaticIndex>,
    root: &Path,
    mut shutdown: broadcast::Receiver<()>,
) -> Result<(RecommendedWatcher, JoinHandle<()>), notify::Error> {
    let (tx, mut rx) = mpsc::unbounded_channel();

    let mut watcher = RecommendedWatcher::new(
        move |res: notify::Result<Event>| match res {
            Ok(event) => {
                if event.kind.is_create() || event.kind.is_modify() || event.kind.is_remove() {
                    let _ = tx.send(());
                }
            }
            Err(e) => tracing::error!(error = %e, "Static root watch error"),
        },
        Config::default(),
    )?;
    watcher.watch(root, RecursiveMode::Recursive)?;
    tracing::info!(root = ?root, "Static root watcher started");

    let task = tokio::spawn(async move {
        // Set while a change has not been folded into a snapshot yet.
        let mut dirty = false;
        loop {
            tokio::select! {
                received = rx.recv() => {
                    if received.is_none() {
                        break;
                    }
                    time_to_settle(&mut rx).await;
                    dirty = true;
                }
                _ = tokio::time::sleep(DEBOUNCE), if dirty => {}
                _ = shutdown.recv() => break,
            }

            if dirty {
                let Some(index) = index.upgrade() else { break };
                if index.try_rebuild().await.is_some() {
                    dirty = false;
                } else {
                    tracing::debug!("Rebuild in flight, retrying change-triggered rebuild");
                }
            }
        }
    });

    Ok((watcher, task))
}

async fn time_to_settle(rx: &mut mpsc::UnboundedReceiver<()>) {
    tokio::time::sleep(DEBOUNCE).await;
    while rx.try_recv().is_ok() {}
}

#[cfg(test)]
mod tests {
    use crate::config::schema::StaticFilesConfig;
    use crate::static_files::index::StaticIndex;
    use std::sync::Arc;
    use std::time::Duration;

    #[tokio::test]
    async fn test_watcher_rebuilds_on_change() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.txt"), "a").unwrap();
        let config = StaticFilesConfig {
            root_dir: dir.path().to_path_buf(),
            watch: true,
            ..StaticFilesConfig::default()
        };
        let index = Arc::new(StaticIndex::new(&config));
        index.start().await.unwrap();

        std::fs::write(dir.path().join("b.txt"), "b").unwrap();
        let mut found = false;
        for _ in 0..60 {
            tokio::time::sleep(Duration::from_millis(50)).await;
            if index.lookup("/b.txt").is_some() {
                found = true;
                break;
            }
        }
        index.stop();
        assert!(found);
    }

    #[tokio::test]
    async fn test_change_during_rebuild_is_picked_up_afterwards() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.txt"), "a").unwrap();
        let config = StaticFilesConfig {
            root_dir: dir.path().to_path_buf(),
            watch: true,
            ..StaticFilesConfig::default()
        };
        let index = Arc::new(StaticIndex::new(&config));
        index.start().await.unwrap();

        let busy = index.block_rebuilds().await;
        std::fs::write(dir.path().join("late.txt"), "late").unwrap();
        tokio::time::sleep(Duration::from_millis(600)).await;
        assert!(index.lookup("/late.txt").is_none());
        drop(busy);

        let mut found = false;
        for _ in 0..60 {
            tokio::time::sleep(Duration::from_millis(50)).await;
            if index.lookup("/late.txt").is_some() {
                found = true;
                break;
            }
        }
        index.stop();
        assert!(found);
    }
}
