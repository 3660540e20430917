//! Read-only catalog source boundary and an in-memory implementation.
//!
//! The browse tree reads current snapshots through [`CatalogSource`] and
//! listens to its hot change stream. Storage and indexing live behind it.

use std::collections::HashMap;
use std::path::Path;
use std::sync::RwLock;

use async_trait::async_trait;
use log::{debug, info};
use tokio::sync::broadcast;

use crate::media_id::MediaId;
use crate::protocol::CatalogChange;

const CHANGE_CHANNEL_CAPACITY: usize = 64;
const MOST_RATED_LIMIT: usize = 25;

/// One indexed track.
#[derive(Debug, Clone, PartialEq, Eq, serde::Deserialize, serde::Serialize)]
pub struct Track {
    pub id: u64,
    pub title: String,
    #[serde(default)]
    pub artist_id: u64,
    #[serde(default)]
    pub artist: String,
    #[serde(default)]
    pub album_id: u64,
    #[serde(default)]
    pub album: String,
    #[serde(default)]
    pub duration_ms: u64,
    #[serde(default)]
    pub disc_number: u32,
    #[serde(default)]
    pub track_number: u32,
    /// User rating, 0 when unrated.
    #[serde(default)]
    pub rating: u8,
    #[serde(default)]
    pub date_added_ms: i64,
    /// Locator handed to the playback engine.
    pub source: String,
    #[serde(default)]
    pub artwork: Option<String>,
}

/// One album aggregate.
#[derive(Debug, Clone, PartialEq, Eq, serde::Deserialize, serde::Serialize)]
pub struct Album {
    pub id: u64,
    pub title: String,
    #[serde(default)]
    pub artist: String,
    #[serde(default)]
    pub track_count: u32,
    #[serde(default)]
    pub artwork: Option<String>,
}

/// One artist aggregate.
#[derive(Debug, Clone, PartialEq, Eq, serde::Deserialize, serde::Serialize)]
pub struct Artist {
    pub id: u64,
    pub name: String,
    #[serde(default)]
    pub album_count: u32,
    #[serde(default)]
    pub track_count: u32,
}

/// One user playlist.
#[derive(Debug, Clone, PartialEq, Eq, serde::Deserialize, serde::Serialize)]
pub struct Playlist {
    pub id: u64,
    pub title: String,
    #[serde(default)]
    pub track_count: u32,
}

/// Failures reported by a catalog source.
#[derive(Debug, thiserror::Error)]
pub enum CatalogSourceError {
    #[error("catalog source unavailable: {0}")]
    Unavailable(String),
    #[error("unknown playlist {0}")]
    UnknownPlaylist(u64),
    #[error("failed to read library snapshot: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse library snapshot: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Read-only provider of library snapshots plus a hot change stream.
#[async_trait]
pub trait CatalogSource: Send + Sync {
    async fn get_all_tracks(&self) -> Result<Vec<Track>, CatalogSourceError>;
    async fn get_all_albums(&self) -> Result<Vec<Album>, CatalogSourceError>;
    async fn get_all_artists(&self) -> Result<Vec<Artist>, CatalogSourceError>;
    async fn get_all_playlists(&self) -> Result<Vec<Playlist>, CatalogSourceError>;
    async fn get_most_rated_tracks(&self) -> Result<Vec<Track>, CatalogSourceError>;
    async fn get_playlist_tracks(&self, playlist_id: u64)
        -> Result<Vec<Track>, CatalogSourceError>;

    /// Subscribers only see notifications emitted after subscribing.
    fn subscribe_changes(&self) -> broadcast::Receiver<CatalogChange>;
}

/// Serialized library content, as loaded from a JSON snapshot file.
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Deserialize, serde::Serialize)]
pub struct LibrarySnapshot {
    #[serde(default)]
    pub tracks: Vec<Track>,
    #[serde(default)]
    pub albums: Vec<Album>,
    #[serde(default)]
    pub artists: Vec<Artist>,
    #[serde(default)]
    pub playlists: Vec<Playlist>,
    /// Playlist id -> ordered track ids.
    #[serde(default)]
    pub playlist_tracks: HashMap<u64, Vec<u64>>,
}

/// Catalog source backed by an in-process snapshot.
pub struct InMemoryCatalogSource {
    snapshot: RwLock<LibrarySnapshot>,
    changes: broadcast::Sender<CatalogChange>,
}

impl InMemoryCatalogSource {
    pub fn new(snapshot: LibrarySnapshot) -> Self {
        let (changes, _) = broadcast::channel(CHANGE_CHANNEL_CAPACITY);
        Self {
            snapshot: RwLock::new(snapshot),
            changes,
        }
    }

    /// Loads a snapshot from a JSON file.
    pub fn from_json_file(path: &Path) -> Result<Self, CatalogSourceError> {
        let content = std::fs::read_to_string(path)?;
        let snapshot: LibrarySnapshot = serde_json::from_str(&content)?;
        info!(
            "InMemoryCatalogSource: loaded {} tracks, {} albums, {} artists, {} playlists from {}",
            snapshot.tracks.len(),
            snapshot.albums.len(),
            snapshot.artists.len(),
            snapshot.playlists.len(),
            path.display()
        );
        Ok(Self::new(snapshot))
    }

    fn read<T>(&self, view: impl FnOnce(&LibrarySnapshot) -> T) -> T {
        match self.snapshot.read() {
            Ok(snapshot) => view(&snapshot),
            Err(poisoned) => view(&poisoned.into_inner()),
        }
    }

    fn write(&self, update: impl FnOnce(&mut LibrarySnapshot)) {
        match self.snapshot.write() {
            Ok(mut snapshot) => update(&mut snapshot),
            Err(poisoned) => update(&mut poisoned.into_inner()),
        }
    }

    fn notify(&self, change: CatalogChange) {
        debug!("InMemoryCatalogSource: emitting {:?}", change);
        // No receivers is fine: the stream is hot.
        let _ = self.changes.send(change);
    }

    /// Replaces the whole library and announces that every track may have changed.
    pub fn replace_snapshot(&self, snapshot: LibrarySnapshot) {
        self.write(|current| *current = snapshot);
        self.notify(CatalogChange::AllTracks);
    }

    /// Replaces one playlist's contents and announces that entity change.
    pub fn set_playlist_tracks(&self, playlist_id: u64, track_ids: Vec<u64>) {
        self.write(|snapshot| {
            let track_count = track_ids.len() as u32;
            if let Some(playlist) = snapshot
                .playlists
                .iter_mut()
                .find(|playlist| playlist.id == playlist_id)
            {
                playlist.track_count = track_count;
            }
            snapshot.playlist_tracks.insert(playlist_id, track_ids);
        });
        self.notify(CatalogChange::EntityChanged(MediaId::of_category(
            "playlists",
            playlist_id.to_string(),
        )));
    }

    /// Drops a track everywhere it appears. Returns `false` when it was not indexed.
    pub fn remove_track(&self, track_id: u64) -> bool {
        let mut removed = false;
        self.write(|snapshot| {
            let before = snapshot.tracks.len();
            snapshot.tracks.retain(|track| track.id != track_id);
            removed = snapshot.tracks.len() != before;
            for track_ids in snapshot.playlist_tracks.values_mut() {
                track_ids.retain(|id| *id != track_id);
            }
        });
        if removed {
            self.notify(CatalogChange::AllTracks);
        }
        removed
    }
}

#[async_trait]
impl CatalogSource for InMemoryCatalogSource {
    async fn get_all_tracks(&self) -> Result<Vec<Track>, CatalogSourceError> {
        Ok(self.read(|snapshot| snapshot.tracks.clone()))
    }

    async fn get_all_albums(&self) -> Result<Vec<Album>, CatalogSourceError> {
        Ok(self.read(|snapshot| snapshot.albums.clone()))
    }

    async fn get_all_artists(&self) -> Result<Vec<Artist>, CatalogSourceError> {
        Ok(self.read(|snapshot| snapshot.artists.clone()))
    }

    async fn get_all_playlists(&self) -> Result<Vec<Playlist>, CatalogSourceError> {
        Ok(self.read(|snapshot| snapshot.playlists.clone()))
    }

    async fn get_most_rated_tracks(&self) -> Result<Vec<Track>, CatalogSourceError> {
        Ok(self.read(|snapshot| {
            let mut rated: Vec<Track> = snapshot
                .tracks
                .iter()
                .filter(|track| track.rating > 0)
                .cloned()
                .collect();
            rated.sort_by(|left, right| {
                right
                    .rating
                    .cmp(&left.rating)
                    .then_with(|| left.title.cmp(&right.title))
            });
            rated.truncate(MOST_RATED_LIMIT);
            rated
        }))
    }

    async fn get_playlist_tracks(
        &self,
        playlist_id: u64,
    ) -> Result<Vec<Track>, CatalogSourceError> {
        self.read(|snapshot| -> Result<Vec<Track>, CatalogSourceError> {
            let track_ids = snapshot
                .playlist_tracks
                .get(&playlist_id)
                .ok_or(CatalogSourceError::UnknownPlaylist(playlist_id))?;
            let by_id: HashMap<u64, &Track> = snapshot
                .tracks
                .iter()
                .map(|track| (track.id, track))
                .collect();
            Ok(track_ids
                .iter()
                .filter_map(|id| by_id.get(id).map(|track| (*track).clone()))
                .collect())
        })
    }

    fn subscribe_changes(&self) -> broadcast::Receiver<CatalogChange> {
        self.changes.subscribe()
    }
}

/// Small library used across unit tests.
#[cfg(test)]
pub(crate) fn sample_library() -> LibrarySnapshot {
    fn track(id: u64, title: &str, album_id: u64, track_number: u32, rating: u8) -> Track {
        let (album, artist_id, artist) = match album_id {
            1 => ("Blue Lines", 10, "Massive Attack"),
            _ => ("Dummy", 20, "Portishead"),
        };
        Track {
            id,
            title: title.to_string(),
            artist_id,
            artist: artist.to_string(),
            album_id,
            album: album.to_string(),
            duration_ms: 200_000 + id * 1_000,
            disc_number: 1,
            track_number,
            rating,
            date_added_ms: 1_000 * id as i64,
            source: format!("/music/{}.flac", id),
            artwork: None,
        }
    }

    LibrarySnapshot {
        tracks: vec![
            track(1, "A", 1, 2, 0),
            track(2, "B", 2, 1, 5),
            track(3, "C", 1, 1, 3),
        ],
        albums: vec![
            Album {
                id: 1,
                title: "Blue Lines".to_string(),
                artist: "Massive Attack".to_string(),
                track_count: 2,
                artwork: Some("art://1".to_string()),
            },
            Album {
                id: 2,
                title: "Dummy".to_string(),
                artist: "Portishead".to_string(),
                track_count: 1,
                artwork: None,
            },
        ],
        artists: vec![
            Artist {
                id: 10,
                name: "Massive Attack".to_string(),
                album_count: 1,
                track_count: 2,
            },
            Artist {
                id: 20,
                name: "Portishead".to_string(),
                album_count: 1,
                track_count: 1,
            },
        ],
        playlists: vec![Playlist {
            id: 100,
            title: "Evening".to_string(),
            track_count: 2,
        }],
        playlist_tracks: HashMap::from([(100, vec![3, 2])]),
    }
}
