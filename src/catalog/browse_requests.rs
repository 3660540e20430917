//! Tracks in-flight browse requests so superseded results can be dropped.
//!
//! A newer request for the same parent does not cancel the older one; the
//! older result is simply discarded when it completes.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use crate::media_id::MediaId;
use crate::protocol::CatalogItem;

/// Result of a supersede-aware browse.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BrowseOutcome {
    /// `None` when the parent is absent or not browsable.
    Loaded(Option<Vec<CatalogItem>>),
    /// A newer request for the same parent was issued while this one ran.
    Superseded,
}

/// Handle returned by [`BrowseRequests::begin`].
#[derive(Debug)]
pub struct BrowseTicket {
    parent: MediaId,
    generation: u64,
}

#[derive(Clone, Default)]
pub struct BrowseRequests {
    latest: Arc<Mutex<HashMap<MediaId, u64>>>,
}

impl BrowseRequests {
    pub fn new() -> Self {
        Self::default()
    }

    fn with_latest<T>(&self, update: impl FnOnce(&mut HashMap<MediaId, u64>) -> T) -> T {
        match self.latest.lock() {
            Ok(mut latest) => update(&mut latest),
            Err(poisoned) => update(&mut poisoned.into_inner()),
        }
    }

    pub fn begin(&self, parent: &MediaId) -> BrowseTicket {
        let generation = self.with_latest(|latest| {
            let entry = latest.entry(parent.clone()).or_insert(0);
            *entry += 1;
            *entry
        });
        BrowseTicket {
            parent: parent.clone(),
            generation,
        }
    }

    /// Consumes the ticket; wraps `result` unless a newer request exists.
    pub fn finish(
        &self,
        ticket: BrowseTicket,
        result: Option<Vec<CatalogItem>>,
    ) -> BrowseOutcome {
        // Entries are kept so generations stay monotonic per parent.
        let is_latest =
            self.with_latest(|latest| latest.get(&ticket.parent) == Some(&ticket.generation));
        if is_latest {
            BrowseOutcome::Loaded(result)
        } else {
            BrowseOutcome::Superseded
        }
    }
}
