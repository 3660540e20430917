use log::{debug, info, trace};

use crate::catalog::MediaCatalog;
use crate::media_id::MediaId;
use crate::protocol::{QueueItem, RepeatMode, ShuffleMode};
use crate::queue::Queue;

/// Why a queue is being loaded. Only explicit loads advance the generation counter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadKind {
    /// A user picked a new target to play.
    Explicit,
    /// Restoring the last queue at startup or on a lazy play.
    Resume,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadOutcome {
    /// A fresh queue was built; for explicit loads the generation counter advanced.
    Rebuilt,
    /// The target shares the loaded queue's category; only the position moved.
    Repositioned,
    /// The target names the loaded queue's category itself.
    Unchanged,
    /// The target has no category or does not resolve to a browsable parent.
    Rejected,
}

/// How to pick the current item inside the loaded queue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueueSelector {
    QueueId(u64),
    MediaId(MediaId),
}

// Builds and navigates the now-playing queue
pub struct QueueManager {
    queue: Option<Queue>,
    shuffle_mode: ShuffleMode,
    repeat_mode: RepeatMode,
    generation: u64,
}

impl QueueManager {
    pub fn new(shuffle_mode: ShuffleMode, repeat_mode: RepeatMode, generation: u64) -> Self {
        Self {
            queue: None,
            shuffle_mode,
            repeat_mode,
            generation,
        }
    }

    pub fn queue(&self) -> Option<&Queue> {
        self.queue.as_ref()
    }

    pub fn current(&self) -> Option<&QueueItem> {
        self.queue.as_ref().and_then(Queue::current)
    }

    pub fn shuffle_mode(&self) -> ShuffleMode {
        self.shuffle_mode
    }

    pub fn repeat_mode(&self) -> RepeatMode {
        self.repeat_mode
    }

    /// Current queue generation counter, the shuffle seed.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Loads the queue for `target`, reusing the loaded one when it shares the browse category.
    /// A leaf missing from the reused queue rebuilds it from the catalog.
    pub async fn load_queue(
        &mut self,
        catalog: &MediaCatalog,
        target: &MediaId,
        kind: LoadKind,
    ) -> LoadOutcome {
        let Some(origin) = target.browse_category() else {
            debug!("QueueManager: {} has no category, not loading", target);
            return LoadOutcome::Rejected;
        };

        if let Some(queue) = self.queue.as_mut() {
            if queue.shares_origin(target) {
                if target.track().is_none() {
                    trace!("QueueManager: {} already loaded", origin);
                    return LoadOutcome::Unchanged;
                }
                if let Some(position) = queue.position_of_media_id(target) {
                    queue.select_index(position);
                    debug!("QueueManager: repositioned to {} ({})", position, target);
                    return LoadOutcome::Repositioned;
                }
                // The catalog moved on since this queue was built.
                debug!("QueueManager: {} not in loaded queue, rebuilding", target);
            }
        }

        let Some(leaves) = catalog.playable_leaves(target).await else {
            debug!("QueueManager: {} does not resolve", origin);
            return LoadOutcome::Rejected;
        };

        if kind == LoadKind::Explicit {
            self.generation = self.generation.wrapping_add(1);
        }

        let mut queue = Queue::from_catalog(origin, leaves);
        let target_position = queue.position_of_media_id(target);
        if let Some(position) = target_position {
            queue.select_index(position);
        }
        if self.shuffle_mode.is_enabled() {
            queue.shuffle(self.generation);
            if target_position.is_none() {
                queue.select_index(0);
            }
        }

        info!(
            "QueueManager: built queue for {} with {} items (generation {}, shuffle {})",
            queue.origin(),
            queue.len(),
            self.generation,
            self.shuffle_mode.as_str()
        );
        self.queue = Some(queue);
        LoadOutcome::Rebuilt
    }

    /// Auto-advance step, honoring the repeat mode as-is.
    pub fn skip(&mut self, steps: i64) -> bool {
        let repeat_mode = self.repeat_mode;
        self.queue
            .as_mut()
            .is_some_and(|queue| queue.skip(steps, repeat_mode))
    }

    // Repeat-one wraps like repeat-all for user-requested skips.
    fn explicit_repeat_mode(&self) -> RepeatMode {
        match self.repeat_mode {
            RepeatMode::One => RepeatMode::All,
            other => other,
        }
    }

    /// User-requested step; repeat-one behaves as repeat-all for this step only.
    pub fn skip_explicit(&mut self, steps: i64) -> bool {
        let repeat_mode = self.explicit_repeat_mode();
        self.queue
            .as_mut()
            .is_some_and(|queue| queue.skip(steps, repeat_mode))
    }

    pub fn can_skip_explicit(&self, steps: i64) -> bool {
        let repeat_mode = self.explicit_repeat_mode();
        self.queue
            .as_ref()
            .is_some_and(|queue| queue.can_skip(steps, repeat_mode))
    }

    pub fn set_current_item(&mut self, selector: &QueueSelector) -> bool {
        let Some(queue) = self.queue.as_mut() else {
            return false;
        };
        let position = match selector {
            QueueSelector::QueueId(queue_id) => queue.position_of_queue_id(*queue_id),
            QueueSelector::MediaId(media_id) => queue.position_of_media_id(media_id),
        };
        position.is_some_and(|position| queue.select_index(position))
    }

    /// Applies `mode`, re-deriving the order from the current generation.
    pub fn set_shuffle_mode(&mut self, mode: ShuffleMode) {
        self.shuffle_mode = mode;
        if let Some(queue) = self.queue.as_mut() {
            if mode.is_enabled() {
                queue.shuffle(self.generation);
            } else {
                queue.unshuffle();
            }
        }
        debug!("QueueManager: shuffle mode {}", mode.as_str());
    }

    pub fn set_repeat_mode(&mut self, mode: RepeatMode) {
        self.repeat_mode = mode;
        debug!("QueueManager: repeat mode {}", mode.as_str());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::catalog_source::sample_library;
    use crate::catalog::{build_library_catalog, InMemoryCatalogSource, LibrarySnapshot};
    use crate::catalog::catalog_source::Track;
    use crate::config::LibraryConfig;
    use std::sync::Arc;

    fn catalog_for(snapshot: LibrarySnapshot) -> MediaCatalog {
        let source = Arc::new(InMemoryCatalogSource::new(snapshot));
        build_library_catalog(source, &LibraryConfig::default()).expect("valid library tree")
    }

    fn sample_catalog() -> MediaCatalog {
        catalog_for(sample_library())
    }

    fn large_catalog(count: u64) -> MediaCatalog {
        let mut snapshot = LibrarySnapshot::default();
        snapshot.tracks = (1..=count)
            .map(|id| Track {
                id,
                title: format!("Track {}", id),
                artist_id: 1,
                artist: "Various".to_string(),
                album_id: 1,
                album: "Compilation".to_string(),
                duration_ms: 60_000,
                disc_number: 1,
                track_number: id as u32,
                rating: 0,
                date_added_ms: id as i64,
                source: format!("/music/{}.flac", id),
                artwork: None,
            })
            .collect();
        catalog_for(snapshot)
    }

    fn titles(manager: &QueueManager) -> Vec<String> {
        manager
            .queue()
            .map(|queue| {
                queue
                    .items()
                    .iter()
                    .map(|item| item.description.title.clone())
                    .collect()
            })
            .unwrap_or_default()
    }

    fn current_index(manager: &QueueManager) -> Option<usize> {
        manager.queue().and_then(Queue::current_index)
    }

    fn leaf(track: &str) -> MediaId {
        MediaId::of_track("tracks", "all", track)
    }

    #[tokio::test]
    async fn test_load_queue_starts_at_target_leaf() {
        let catalog = sample_catalog();
        let mut manager = QueueManager::new(ShuffleMode::None, RepeatMode::None, 0);

        let outcome = manager.load_queue(&catalog, &leaf("2"), LoadKind::Explicit).await;

        assert_eq!(outcome, LoadOutcome::Rebuilt);
        assert_eq!(titles(&manager), vec!["A", "B", "C"]);
        assert_eq!(current_index(&manager), Some(1));
        assert_eq!(manager.generation(), 1);
    }

    #[tokio::test]
    async fn test_skip_past_last_item_reports_false() {
        let catalog = sample_catalog();
        let mut manager = QueueManager::new(ShuffleMode::None, RepeatMode::None, 0);
        manager.load_queue(&catalog, &leaf("2"), LoadKind::Explicit).await;

        assert!(manager.skip(1));
        assert_eq!(current_index(&manager), Some(2));
        assert_eq!(
            manager.current().map(|item| item.description.title.as_str()),
            Some("C")
        );
        assert!(!manager.skip(1));
        assert_eq!(current_index(&manager), Some(2));
    }

    #[tokio::test]
    async fn test_n_minus_one_skips_reach_last_index() {
        let catalog = large_catalog(9);
        let mut manager = QueueManager::new(ShuffleMode::None, RepeatMode::None, 0);
        manager
            .load_queue(&catalog, &MediaId::of_category("tracks", "all"), LoadKind::Explicit)
            .await;
        assert_eq!(current_index(&manager), Some(0));

        for _ in 0..8 {
            assert!(manager.skip(1));
        }
        assert_eq!(current_index(&manager), Some(8));
        assert!(!manager.skip(1));
        assert_eq!(current_index(&manager), Some(8));
    }

    #[tokio::test]
    async fn test_shuffled_builds_with_same_counter_match() {
        let catalog = large_catalog(20);
        let target = MediaId::of_category("tracks", "all");

        let mut first = QueueManager::new(ShuffleMode::All, RepeatMode::None, 5);
        let mut second = QueueManager::new(ShuffleMode::All, RepeatMode::None, 5);
        first.load_queue(&catalog, &target, LoadKind::Resume).await;
        second.load_queue(&catalog, &target, LoadKind::Resume).await;

        assert_eq!(first.generation(), 5);
        assert_eq!(titles(&first), titles(&second));
        assert_eq!(current_index(&first), Some(0));
    }

    #[tokio::test]
    async fn test_toggling_shuffle_rederives_same_permutation() {
        let catalog = large_catalog(15);
        let mut manager = QueueManager::new(ShuffleMode::All, RepeatMode::None, 3);
        manager
            .load_queue(&catalog, &MediaId::of_category("tracks", "all"), LoadKind::Resume)
            .await;
        let shuffled = titles(&manager);

        manager.set_shuffle_mode(ShuffleMode::None);
        let ordered: Vec<String> = (1..=15).map(|id| format!("Track {}", id)).collect();
        assert_eq!(titles(&manager), ordered);

        manager.set_shuffle_mode(ShuffleMode::All);
        assert_eq!(titles(&manager), shuffled);
    }

    #[tokio::test]
    async fn test_shuffled_build_keeps_target_leaf_current() {
        let catalog = large_catalog(12);
        let mut manager = QueueManager::new(ShuffleMode::All, RepeatMode::None, 0);
        manager.load_queue(&catalog, &leaf("7"), LoadKind::Explicit).await;

        assert_eq!(manager.current().map(|item| item.media_id.clone()), Some(leaf("7")));
    }

    #[tokio::test]
    async fn test_same_category_reuses_queue() {
        let catalog = sample_catalog();
        let mut manager = QueueManager::new(ShuffleMode::None, RepeatMode::None, 0);
        manager.load_queue(&catalog, &leaf("1"), LoadKind::Explicit).await;

        let outcome = manager.load_queue(&catalog, &leaf("3"), LoadKind::Explicit).await;
        assert_eq!(outcome, LoadOutcome::Repositioned);
        assert_eq!(current_index(&manager), Some(2));
        assert_eq!(manager.generation(), 1);

        let outcome = manager
            .load_queue(&catalog, &MediaId::of_category("tracks", "all"), LoadKind::Explicit)
            .await;
        assert_eq!(outcome, LoadOutcome::Unchanged);
        assert_eq!(current_index(&manager), Some(2));
        assert_eq!(manager.generation(), 1);
    }

    #[tokio::test]
    async fn test_leaf_missing_from_loaded_queue_rebuilds_it() {
        let source = Arc::new(InMemoryCatalogSource::new(sample_library()));
        let catalog = build_library_catalog(source.clone(), &LibraryConfig::default())
            .expect("valid library tree");
        let mut manager = QueueManager::new(ShuffleMode::None, RepeatMode::None, 0);
        manager.load_queue(&catalog, &leaf("1"), LoadKind::Explicit).await;

        let mut snapshot = sample_library();
        let mut added = snapshot.tracks[0].clone();
        added.id = 4;
        added.title = "D".to_string();
        snapshot.tracks.push(added);
        source.replace_snapshot(snapshot);

        let outcome = manager.load_queue(&catalog, &leaf("4"), LoadKind::Explicit).await;
        assert_eq!(outcome, LoadOutcome::Rebuilt);
        assert_eq!(titles(&manager), vec!["A", "B", "C", "D"]);
        assert_eq!(manager.current().map(|item| item.media_id.clone()), Some(leaf("4")));
        assert_eq!(manager.generation(), 2);

        // Still absent after the rebuild: the queue falls back to its first item.
        let outcome = manager.load_queue(&catalog, &leaf("99"), LoadKind::Explicit).await;
        assert_eq!(outcome, LoadOutcome::Rebuilt);
        assert_eq!(current_index(&manager), Some(0));
    }

    #[tokio::test]
    async fn test_other_category_rebuilds_queue() {
        let catalog = sample_catalog();
        let mut manager = QueueManager::new(ShuffleMode::None, RepeatMode::None, 0);
        manager.load_queue(&catalog, &leaf("1"), LoadKind::Explicit).await;

        let album_leaf = MediaId::of_track("albums", "1", "1");
        let outcome = manager.load_queue(&catalog, &album_leaf, LoadKind::Explicit).await;

        assert_eq!(outcome, LoadOutcome::Rebuilt);
        assert_eq!(manager.generation(), 2);
        assert_eq!(
            manager.queue().map(|queue| queue.origin().clone()),
            Some(MediaId::of_category("albums", "1"))
        );
        assert_eq!(manager.current().map(|item| item.media_id.clone()), Some(album_leaf));
    }

    #[tokio::test]
    async fn test_targets_without_category_are_rejected() {
        let catalog = sample_catalog();
        let mut manager = QueueManager::new(ShuffleMode::None, RepeatMode::None, 0);

        assert_eq!(
            manager
                .load_queue(&catalog, &MediaId::of_type("tracks"), LoadKind::Explicit)
                .await,
            LoadOutcome::Rejected
        );
        assert_eq!(
            manager
                .load_queue(&catalog, &MediaId::of_category("albums", "nope"), LoadKind::Explicit)
                .await,
            LoadOutcome::Rejected
        );
        assert!(manager.queue().is_none());
        assert_eq!(manager.generation(), 0);
    }

    #[tokio::test]
    async fn test_explicit_skip_wraps_under_repeat_one() {
        let catalog = sample_catalog();
        let mut manager = QueueManager::new(ShuffleMode::None, RepeatMode::One, 0);
        manager.load_queue(&catalog, &leaf("3"), LoadKind::Explicit).await;

        assert!(manager.skip(1));
        assert_eq!(current_index(&manager), Some(2));

        assert!(manager.can_skip_explicit(1));
        assert!(manager.skip_explicit(1));
        assert_eq!(current_index(&manager), Some(0));
        assert_eq!(manager.repeat_mode(), RepeatMode::One);
    }

    #[tokio::test]
    async fn test_set_current_item_by_queue_id_and_media_id() {
        let catalog = sample_catalog();
        let mut manager = QueueManager::new(ShuffleMode::None, RepeatMode::None, 0);
        assert!(!manager.set_current_item(&QueueSelector::QueueId(0)));

        manager.load_queue(&catalog, &leaf("1"), LoadKind::Explicit).await;
        assert!(manager.set_current_item(&QueueSelector::QueueId(2)));
        assert_eq!(current_index(&manager), Some(2));
        assert!(manager.set_current_item(&QueueSelector::MediaId(leaf("2"))));
        assert_eq!(current_index(&manager), Some(1));
        assert!(!manager.set_current_item(&QueueSelector::QueueId(40)));
        assert_eq!(current_index(&manager), Some(1));
    }
}
