//! The music library browse tree: tracks, albums, artists, and playlists.

use std::sync::Arc;

use async_trait::async_trait;
use log::warn;

use crate::catalog::catalog_source::{CatalogSource, CatalogSourceError, Track};
use crate::catalog::media_catalog::{
    CatalogBuildError, CategoryProvider, DynamicCategoryProvider, MediaCatalog, SearchExtras,
    SearchProvider, TypeNode,
};
use crate::config::LibraryConfig;
use crate::media_id::MediaId;
use crate::protocol::{CatalogItem, CatalogItemKind};

pub const TYPE_TRACKS: &str = "tracks";
pub const TYPE_ALBUMS: &str = "albums";
pub const TYPE_ARTISTS: &str = "artists";
pub const TYPE_PLAYLISTS: &str = "playlists";

pub const CATEGORY_ALL: &str = "all";
pub const CATEGORY_MOST_RATED: &str = "most-rated";
pub const CATEGORY_RECENTLY_ADDED: &str = "recently-added";

/// Categories whose content is derived from the full track set.
pub fn track_derived_categories() -> [MediaId; 3] {
    [
        MediaId::of_category(TYPE_TRACKS, CATEGORY_ALL),
        MediaId::of_category(TYPE_PLAYLISTS, CATEGORY_MOST_RATED),
        MediaId::of_category(TYPE_PLAYLISTS, CATEGORY_RECENTLY_ADDED),
    ]
}

/// Builds the default library tree over `source`.
pub fn build_library_catalog(
    source: Arc<dyn CatalogSource>,
    library_config: &LibraryConfig,
) -> Result<MediaCatalog, CatalogBuildError> {
    let mut catalog = MediaCatalog::new(source);
    catalog.register_type(
        TypeNode::new(TYPE_TRACKS, "Tracks")
            .with_subtitle("Every track in the library")
            .with_category(CATEGORY_ALL, "All tracks", "", AllTracks)?,
    )?;
    catalog.register_type(
        TypeNode::new(TYPE_ALBUMS, "Albums").with_dynamic_categories(AlbumCategories)?,
    )?;
    catalog.register_type(
        TypeNode::new(TYPE_ARTISTS, "Artists").with_dynamic_categories(ArtistCategories)?,
    )?;
    catalog.register_type(
        TypeNode::new(TYPE_PLAYLISTS, "Playlists")
            .with_category(
                CATEGORY_MOST_RATED,
                "Most rated",
                "Your favorite tracks",
                MostRatedTracks,
            )?
            .with_category(
                CATEGORY_RECENTLY_ADDED,
                "Recently added",
                "Latest additions to the library",
                RecentlyAddedTracks {
                    limit: library_config.recently_added_limit,
                },
            )?
            .with_dynamic_categories(PlaylistCategories)?,
    )?;
    catalog.set_search_provider(TrackSearch);
    Ok(catalog)
}

fn or_empty<T>(result: Result<Vec<T>, CatalogSourceError>, what: &str) -> Vec<T> {
    match result {
        Ok(values) => values,
        Err(err) => {
            warn!("LibraryTree: failed to load {}: {}", what, err);
            Vec::new()
        }
    }
}

fn track_subtitle(track: &Track) -> String {
    match (track.artist.is_empty(), track.album.is_empty()) {
        (false, false) => format!("{} • {}", track.artist, track.album),
        (false, true) => track.artist.clone(),
        (true, false) => track.album.clone(),
        (true, true) => String::new(),
    }
}

/// Leaf representation of `track` under the `type/category` id `parent`.
pub fn track_leaf(parent: &MediaId, track: &Track) -> Option<CatalogItem> {
    Some(CatalogItem {
        media_id: parent.with_track(track.id.to_string())?,
        title: track.title.clone(),
        subtitle: track_subtitle(track),
        artwork: track.artwork.clone(),
        kind: CatalogItemKind::Playable {
            duration_ms: track.duration_ms,
            disc_number: track.disc_number,
            track_number: track.track_number,
            source: track.source.clone(),
        },
    })
}

fn track_leaves(parent: &MediaId, tracks: &[Track]) -> Vec<CatalogItem> {
    tracks
        .iter()
        .filter_map(|track| track_leaf(parent, track))
        .collect()
}

fn sort_by_disc_and_number(tracks: &mut [Track]) {
    tracks.sort_by(|left, right| {
        left.disc_number
            .cmp(&right.disc_number)
            .then_with(|| left.track_number.cmp(&right.track_number))
            .then_with(|| left.title.cmp(&right.title))
    });
}

fn numeric_key(parent: &MediaId) -> Option<u64> {
    parent.category()?.parse().ok()
}

struct AllTracks;

#[async_trait]
impl CategoryProvider for AllTracks {
    async fn children(&self, source: &dyn CatalogSource, parent: &MediaId) -> Vec<CatalogItem> {
        let tracks = or_empty(source.get_all_tracks().await, "tracks");
        track_leaves(parent, &tracks)
    }
}

struct MostRatedTracks;

#[async_trait]
impl CategoryProvider for MostRatedTracks {
    async fn children(&self, source: &dyn CatalogSource, parent: &MediaId) -> Vec<CatalogItem> {
        let tracks = or_empty(source.get_most_rated_tracks().await, "most rated tracks");
        track_leaves(parent, &tracks)
    }
}

struct RecentlyAddedTracks {
    limit: usize,
}

#[async_trait]
impl CategoryProvider for RecentlyAddedTracks {
    async fn children(&self, source: &dyn CatalogSource, parent: &MediaId) -> Vec<CatalogItem> {
        let mut tracks = or_empty(source.get_all_tracks().await, "tracks");
        tracks.sort_by(|left, right| right.date_added_ms.cmp(&left.date_added_ms));
        tracks.truncate(self.limit);
        track_leaves(parent, &tracks)
    }
}

struct AlbumCategories;

#[async_trait]
impl DynamicCategoryProvider for AlbumCategories {
    async fn categories(
        &self,
        source: &dyn CatalogSource,
        parent: &MediaId,
    ) -> Vec<CatalogItem> {
        let Some(media_type) = parent.media_type() else {
            return Vec::new();
        };
        or_empty(source.get_all_albums().await, "albums")
            .into_iter()
            .map(|album| {
                CatalogItem::browsable(
                    MediaId::of_category(media_type, album.id.to_string()),
                    album.title,
                    album.artist,
                    Some(album.track_count),
                )
                .with_artwork(album.artwork)
            })
            .collect()
    }

    async fn children(
        &self,
        source: &dyn CatalogSource,
        parent: &MediaId,
    ) -> Option<Vec<CatalogItem>> {
        let album_id = numeric_key(parent)?;
        let albums = or_empty(source.get_all_albums().await, "albums");
        if !albums.iter().any(|album| album.id == album_id) {
            return None;
        }
        let mut tracks: Vec<Track> = or_empty(source.get_all_tracks().await, "tracks")
            .into_iter()
            .filter(|track| track.album_id == album_id)
            .collect();
        sort_by_disc_and_number(&mut tracks);
        Some(track_leaves(parent, &tracks))
    }
}

struct ArtistCategories;

#[async_trait]
impl DynamicCategoryProvider for ArtistCategories {
    async fn categories(
        &self,
        source: &dyn CatalogSource,
        parent: &MediaId,
    ) -> Vec<CatalogItem> {
        let Some(media_type) = parent.media_type() else {
            return Vec::new();
        };
        or_empty(source.get_all_artists().await, "artists")
            .into_iter()
            .map(|artist| {
                let subtitle = format!(
                    "{} albums, {} tracks",
                    artist.album_count, artist.track_count
                );
                CatalogItem::browsable(
                    MediaId::of_category(media_type, artist.id.to_string()),
                    artist.name,
                    subtitle,
                    Some(artist.track_count),
                )
            })
            .collect()
    }

    async fn children(
        &self,
        source: &dyn CatalogSource,
        parent: &MediaId,
    ) -> Option<Vec<CatalogItem>> {
        let artist_id = numeric_key(parent)?;
        let artists = or_empty(source.get_all_artists().await, "artists");
        if !artists.iter().any(|artist| artist.id == artist_id) {
            return None;
        }
        let mut tracks: Vec<Track> = or_empty(source.get_all_tracks().await, "tracks")
            .into_iter()
            .filter(|track| track.artist_id == artist_id)
            .collect();
        tracks.sort_by(|left, right| {
            left.album
                .to_ascii_lowercase()
                .cmp(&right.album.to_ascii_lowercase())
                .then_with(|| left.disc_number.cmp(&right.disc_number))
                .then_with(|| left.track_number.cmp(&right.track_number))
        });
        Some(track_leaves(parent, &tracks))
    }
}

struct PlaylistCategories;

#[async_trait]
impl DynamicCategoryProvider for PlaylistCategories {
    async fn categories(
        &self,
        source: &dyn CatalogSource,
        parent: &MediaId,
    ) -> Vec<CatalogItem> {
        let Some(media_type) = parent.media_type() else {
            return Vec::new();
        };
        or_empty(source.get_all_playlists().await, "playlists")
            .into_iter()
            .map(|playlist| {
                let subtitle = format!("{} tracks", playlist.track_count);
                CatalogItem::browsable(
                    MediaId::of_category(media_type, playlist.id.to_string()),
                    playlist.title,
                    subtitle,
                    Some(playlist.track_count),
                )
            })
            .collect()
    }

    async fn children(
        &self,
        source: &dyn CatalogSource,
        parent: &MediaId,
    ) -> Option<Vec<CatalogItem>> {
        let playlist_id = numeric_key(parent)?;
        let playlists = or_empty(source.get_all_playlists().await, "playlists");
        if !playlists.iter().any(|playlist| playlist.id == playlist_id) {
            return None;
        }
        let tracks = or_empty(
            source.get_playlist_tracks(playlist_id).await,
            "playlist tracks",
        );
        Some(track_leaves(parent, &tracks))
    }
}

struct TrackSearch;

impl TrackSearch {
    fn matches_filter(value: &str, filter: Option<&String>) -> bool {
        match filter {
            Some(filter) => value
                .to_lowercase()
                .contains(filter.trim().to_lowercase().as_str()),
            None => true,
        }
    }

    /// Lower is better; `None` when the track does not match.
    fn rank(track: &Track, needle: &str) -> Option<u8> {
        if needle.is_empty() {
            return Some(3);
        }
        let title = track.title.to_lowercase();
        if title.starts_with(needle) {
            Some(0)
        } else if title.contains(needle) {
            Some(1)
        } else if track.artist.to_lowercase().contains(needle)
            || track.album.to_lowercase().contains(needle)
        {
            Some(2)
        } else {
            None
        }
    }
}

#[async_trait]
impl SearchProvider for TrackSearch {
    async fn search(
        &self,
        source: &dyn CatalogSource,
        query: &str,
        extras: &SearchExtras,
    ) -> Vec<CatalogItem> {
        let needle = query.trim().to_lowercase();
        if needle.is_empty() && extras.artist.is_none() && extras.album.is_none() {
            return Vec::new();
        }

        let mut ranked: Vec<(u8, Track)> = or_empty(source.get_all_tracks().await, "tracks")
            .into_iter()
            .filter(|track| {
                Self::matches_filter(&track.artist, extras.artist.as_ref())
                    && Self::matches_filter(&track.album, extras.album.as_ref())
            })
            .filter_map(|track| Self::rank(&track, &needle).map(|rank| (rank, track)))
            .collect();
        ranked.sort_by(|(left_rank, left), (right_rank, right)| {
            left_rank
                .cmp(right_rank)
                .then_with(|| left.title.to_lowercase().cmp(&right.title.to_lowercase()))
        });
        if let Some(limit) = extras.limit {
            ranked.truncate(limit);
        }

        let parent = MediaId::of_category(TYPE_TRACKS, CATEGORY_ALL);
        ranked
            .iter()
            .filter_map(|(_, track)| track_leaf(&parent, track))
            .collect()
    }
}
