//! Translates catalog source change notifications into invalidated browse parents.

use log::{debug, info, warn};
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::task::JoinHandle;

use crate::catalog::library_tree::track_derived_categories;
use crate::media_id::MediaId;
use crate::protocol::CatalogChange;

/// Parent ids a browsing surface should re-fetch after `change`.
pub fn invalidated_parents(change: &CatalogChange) -> Vec<MediaId> {
    match change {
        CatalogChange::AllTracks => track_derived_categories().to_vec(),
        CatalogChange::EntityChanged(media_id) => {
            let parent = media_id
                .browse_category()
                .filter(|_| !media_id.is_browsable())
                .unwrap_or_else(|| media_id.clone());
            vec![parent]
        }
    }
}

/// Hot multicast stream of invalidated parent ids.
pub struct ChangeFanout {
    invalidations: broadcast::Sender<MediaId>,
}

impl ChangeFanout {
    pub fn new(capacity: usize) -> Self {
        let (invalidations, _) = broadcast::channel(capacity.max(1));
        Self { invalidations }
    }

    /// Late subscribers do not see earlier invalidations.
    pub fn subscribe(&self) -> broadcast::Receiver<MediaId> {
        self.invalidations.subscribe()
    }

    /// Publishes the parents invalidated by `change` and returns how many were sent.
    pub fn publish(&self, change: &CatalogChange) -> usize {
        let parents = invalidated_parents(change);
        let count = parents.len();
        for parent in parents {
            debug!("ChangeFanout: invalidated {}", parent);
            // No subscribers is fine: the stream is hot.
            let _ = self.invalidations.send(parent);
        }
        count
    }

    /// Forwards every change from `changes` until the source closes its stream.
    pub fn spawn(&self, mut changes: broadcast::Receiver<CatalogChange>) -> JoinHandle<()> {
        let fanout = ChangeFanout {
            invalidations: self.invalidations.clone(),
        };
        tokio::spawn(async move {
            info!("ChangeFanout: started");
            loop {
                match changes.recv().await {
                    Ok(change) => {
                        fanout.publish(&change);
                    }
                    Err(RecvError::Lagged(skipped)) => {
                        // Missed entity changes cannot be recovered individually.
                        warn!(
                            "ChangeFanout: lagged by {} notifications, invalidating derived categories",
                            skipped
                        );
                        fanout.publish(&CatalogChange::AllTracks);
                    }
                    Err(RecvError::Closed) => break,
                }
            }
            info!("ChangeFanout: source stream closed");
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_all_tracks_fans_out_to_three_derived_categories() {
        let parents = invalidated_parents(&CatalogChange::AllTracks);
        let encoded: Vec<String> = parents.iter().map(MediaId::encode).collect();
        assert_eq!(
            encoded,
            vec![
                "tracks/all".to_string(),
                "playlists/most-rated".to_string(),
                "playlists/recently-added".to_string(),
            ]
        );
    }

    #[test]
    fn test_entity_change_maps_to_exactly_one_parent() {
        let album = MediaId::of_category("albums", "7");
        assert_eq!(
            invalidated_parents(&CatalogChange::EntityChanged(album.clone())),
            vec![album.clone()]
        );
        let leaf = MediaId::of_track("albums", "7", "3");
        assert_eq!(
            invalidated_parents(&CatalogChange::EntityChanged(leaf)),
            vec![album]
        );
    }

    #[tokio::test]
    async fn test_spawned_fanout_forwards_source_changes() {
        let (source_tx, _) = broadcast::channel(8);
        let fanout = ChangeFanout::new(8);
        let mut invalidated = fanout.subscribe();
        let handle = fanout.spawn(source_tx.subscribe());

        source_tx
            .send(CatalogChange::EntityChanged(MediaId::of_category(
                "playlists",
                "100",
            )))
            .expect("fanout is subscribed");

        let parent = tokio::time::timeout(Duration::from_secs(1), invalidated.recv())
            .await
            .expect("invalidation within timeout")
            .expect("stream open");
        assert_eq!(parent, MediaId::of_category("playlists", "100"));

        drop(source_tx);
        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("task ends when source closes")
            .expect("task did not panic");
    }
}
