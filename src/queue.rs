use rand::{rngs::StdRng, seq::SliceRandom, SeedableRng};

use crate::media_id::MediaId;
use crate::protocol::{CatalogItem, QueueItem, RepeatMode};

/// Ordered "now playing" queue built from one browse category.
#[derive(Debug, Clone)]
pub struct Queue {
    origin: MediaId,
    // Catalog order, kept so shuffle can be re-derived or undone.
    catalog_order: Vec<QueueItem>,
    items: Vec<QueueItem>,
    current_index: Option<usize>,
    shuffle_seed: Option<u64>,
}

impl Queue {
    /// Assigns increasing queue ids in catalog order. `origin` is the `type/category` id.
    pub fn from_catalog(origin: MediaId, leaves: Vec<CatalogItem>) -> Queue {
        let items: Vec<QueueItem> = leaves
            .into_iter()
            .enumerate()
            .map(|(position, description)| QueueItem {
                media_id: description.media_id.clone(),
                description,
                queue_id: position as u64,
            })
            .collect();
        let current_index = if items.is_empty() { None } else { Some(0) };
        Queue {
            origin,
            catalog_order: items.clone(),
            items,
            current_index,
            shuffle_seed: None,
        }
    }

    pub fn origin(&self) -> &MediaId {
        &self.origin
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn items(&self) -> &[QueueItem] {
        &self.items
    }

    pub fn current_index(&self) -> Option<usize> {
        self.current_index
    }

    pub fn current(&self) -> Option<&QueueItem> {
        self.current_index.and_then(|index| self.items.get(index))
    }

    /// True when `target` lives in the same browse category this queue was built from.
    pub fn shares_origin(&self, target: &MediaId) -> bool {
        target.browse_category().as_ref() == Some(&self.origin)
    }

    pub fn position_of_media_id(&self, media_id: &MediaId) -> Option<usize> {
        self.items.iter().position(|item| &item.media_id == media_id)
    }

    pub fn position_of_queue_id(&self, queue_id: u64) -> Option<usize> {
        self.items.iter().position(|item| item.queue_id == queue_id)
    }

    pub fn select_index(&mut self, index: usize) -> bool {
        if index >= self.items.len() {
            return false;
        }
        self.current_index = Some(index);
        true
    }

    fn skip_target(&self, steps: i64, repeat_mode: RepeatMode) -> Option<usize> {
        let current = self.current_index?;
        let len = self.items.len() as i64;
        if len == 0 {
            return None;
        }
        match repeat_mode {
            RepeatMode::One => Some(current),
            RepeatMode::All => Some((current as i64).saturating_add(steps).rem_euclid(len) as usize),
            RepeatMode::None => {
                let target = (current as i64).saturating_add(steps).clamp(0, len - 1) as usize;
                // Already at the boundary and stepping further out.
                if steps != 0 && target == current {
                    None
                } else {
                    Some(target)
                }
            }
        }
    }

    /// Whether [`Queue::skip`] with the same arguments would succeed.
    pub fn can_skip(&self, steps: i64, repeat_mode: RepeatMode) -> bool {
        self.skip_target(steps, repeat_mode).is_some()
    }

    /// Moves `steps` items; returns `false` and leaves the index unchanged when
    /// the queue is empty or already at the boundary in that direction.
    pub fn skip(&mut self, steps: i64, repeat_mode: RepeatMode) -> bool {
        match self.skip_target(steps, repeat_mode) {
            Some(target) => {
                self.current_index = Some(target);
                true
            }
            None => false,
        }
    }

    /// Reorders with a permutation derived only from `seed`, keeping the current item current.
    pub fn shuffle(&mut self, seed: u64) {
        let current_queue_id = self.current().map(|item| item.queue_id);
        let mut items = self.catalog_order.clone();
        let mut rng = StdRng::seed_from_u64(seed);
        items.shuffle(&mut rng);
        self.items = items;
        self.shuffle_seed = Some(seed);
        self.restore_current(current_queue_id);
    }

    /// Restores catalog order, keeping the current item current.
    pub fn unshuffle(&mut self) {
        if self.shuffle_seed.is_none() {
            return;
        }
        let current_queue_id = self.current().map(|item| item.queue_id);
        self.items = self.catalog_order.clone();
        self.shuffle_seed = None;
        self.restore_current(current_queue_id);
    }

    fn restore_current(&mut self, queue_id: Option<u64>) {
        self.current_index = queue_id
            .and_then(|queue_id| self.position_of_queue_id(queue_id))
            .or(if self.items.is_empty() { None } else { Some(0) });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::CatalogItemKind;

    fn leaves(count: u64) -> Vec<CatalogItem> {
        (1..=count)
            .map(|id| CatalogItem {
                media_id: MediaId::of_track("tracks", "all", id.to_string()),
                title: format!("Track {}", id),
                subtitle: String::new(),
                artwork: None,
                kind: CatalogItemKind::Playable {
                    duration_ms: 1_000,
                    disc_number: 1,
                    track_number: id as u32,
                    source: format!("/music/{}.flac", id),
                },
            })
            .collect()
    }

    fn queue(count: u64) -> Queue {
        Queue::from_catalog(MediaId::of_category("tracks", "all"), leaves(count))
    }

    fn queue_ids(queue: &Queue) -> Vec<u64> {
        queue.items().iter().map(|item| item.queue_id).collect()
    }

    #[test]
    fn test_queue_ids_increase_in_catalog_order() {
        let queue = queue(4);
        assert_eq!(queue_ids(&queue), vec![0, 1, 2, 3]);
        assert_eq!(queue.current_index(), Some(0));
    }

    #[test]
    fn test_empty_queue_has_no_current_item_and_cannot_skip() {
        let mut queue = queue(0);
        assert_eq!(queue.current_index(), None);
        assert!(queue.current().is_none());
        assert!(!queue.skip(1, RepeatMode::None));
        assert!(!queue.skip(1, RepeatMode::All));
    }

    #[test]
    fn test_skip_walks_to_last_then_reports_exhaustion() {
        let mut queue = queue(3);
        assert!(queue.skip(1, RepeatMode::None));
        assert!(queue.skip(1, RepeatMode::None));
        assert_eq!(queue.current_index(), Some(2));
        assert!(!queue.skip(1, RepeatMode::None));
        assert_eq!(queue.current_index(), Some(2));
    }

    #[test]
    fn test_skip_backwards_at_start_is_rejected() {
        let mut queue = queue(3);
        assert!(!queue.skip(-1, RepeatMode::None));
        assert_eq!(queue.current_index(), Some(0));
    }

    #[test]
    fn test_partial_overshoot_clamps_to_boundary() {
        let mut queue = queue(3);
        assert!(queue.skip(5, RepeatMode::None));
        assert_eq!(queue.current_index(), Some(2));
    }

    #[test]
    fn test_repeat_all_wraps_both_directions() {
        let mut queue = queue(3);
        assert!(queue.skip(-1, RepeatMode::All));
        assert_eq!(queue.current_index(), Some(2));
        assert!(queue.skip(1, RepeatMode::All));
        assert_eq!(queue.current_index(), Some(0));
    }

    #[test]
    fn test_repeat_one_stays_on_current_item() {
        let mut queue = queue(3);
        queue.select_index(2);
        assert!(queue.skip(1, RepeatMode::One));
        assert_eq!(queue.current_index(), Some(2));
    }

    #[test]
    fn test_shuffle_is_deterministic_for_a_seed() {
        let mut first = queue(12);
        let mut second = queue(12);
        first.shuffle(5);
        second.shuffle(5);
        assert_eq!(queue_ids(&first), queue_ids(&second));

        let mut sorted = queue_ids(&first);
        sorted.sort_unstable();
        assert_eq!(sorted, (0..12).collect::<Vec<u64>>());
    }

    #[test]
    fn test_reshuffle_with_same_seed_rederives_same_order() {
        let mut queue = queue(10);
        queue.shuffle(9);
        let shuffled = queue_ids(&queue);
        queue.unshuffle();
        assert_eq!(queue_ids(&queue), (0..10).collect::<Vec<u64>>());
        queue.shuffle(9);
        assert_eq!(queue_ids(&queue), shuffled);
    }

    #[test]
    fn test_shuffle_keeps_current_item_current() {
        let mut queue = queue(8);
        queue.select_index(3);
        let current = queue.current().map(|item| item.queue_id);
        queue.shuffle(42);
        assert_eq!(queue.current().map(|item| item.queue_id), current);
        queue.unshuffle();
        assert_eq!(queue.current_index(), Some(3));
    }

    #[test]
    fn test_shares_origin_compares_browse_category() {
        let queue = queue(2);
        assert!(queue.shares_origin(&MediaId::of_track("tracks", "all", "9")));
        assert!(queue.shares_origin(&MediaId::of_category("tracks", "all")));
        assert!(!queue.shares_origin(&MediaId::of_track("albums", "1", "1")));
        assert!(!queue.shares_origin(&MediaId::of_type("tracks")));
    }
}
