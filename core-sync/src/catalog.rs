//! # Catalog
//!
//! Family wrappers over the generic orchestrator: one
//! [`SyncOrchestrator`] per entity family, wired to that family's cache and
//! remote gateways, plus [`CatalogCaches`], which purges every family when
//! the session token changes.

use crate::orchestrator::{ListRequest, SyncContext, SyncOrchestrator};
use crate::pagination::{FetchAllRequest, Relation};
use crate::remote::{FeedKind, ListFilter, RemoteGateway};
use crate::resource::ResourceStream;
use async_trait::async_trait;
use core_auth::{AuthError, CacheInvalidator};
use core_library::{
    Album, Artist, CacheFilter, CacheGateway, Entity, InMemoryCache, Playlist, Scope, Song,
};
use core_runtime::events::{CoreEvent, EventBus, LibraryEvent};
use std::sync::Arc;
use tracing::{info, instrument};

/// The four family caches.
#[derive(Clone)]
pub struct CatalogCaches {
    pub albums: Arc<dyn CacheGateway<Album>>,
    pub artists: Arc<dyn CacheGateway<Artist>>,
    pub playlists: Arc<dyn CacheGateway<Playlist>>,
    pub songs: Arc<dyn CacheGateway<Song>>,
    event_bus: EventBus,
}

impl CatalogCaches {
    pub fn new(
        albums: Arc<dyn CacheGateway<Album>>,
        artists: Arc<dyn CacheGateway<Artist>>,
        playlists: Arc<dyn CacheGateway<Playlist>>,
        songs: Arc<dyn CacheGateway<Song>>,
        event_bus: EventBus,
    ) -> Self {
        Self {
            albums,
            artists,
            playlists,
            songs,
            event_bus,
        }
    }

    /// In-memory caches for every family.
    pub fn in_memory(event_bus: EventBus) -> Self {
        Self::new(
            Arc::new(InMemoryCache::<Album>::new()),
            Arc::new(InMemoryCache::<Artist>::new()),
            Arc::new(InMemoryCache::<Playlist>::new()),
            Arc::new(InMemoryCache::<Song>::new()),
            event_bus,
        )
    }

    /// Clear every family.
    pub async fn clear_all(&self) -> core_library::Result<()> {
        self.albums.clear_family().await?;
        self.artists.clear_family().await?;
        self.playlists.clear_family().await?;
        self.songs.clear_family().await?;
        Ok(())
    }
}

#[async_trait]
impl CacheInvalidator for CatalogCaches {
    #[instrument(skip(self))]
    async fn purge_all(&self, reason: &str) -> core_auth::Result<()> {
        self.clear_all()
            .await
            .map_err(|e| AuthError::CachePurge(e.to_string()))?;

        info!("Purged entity caches");
        let _ = self
            .event_bus
            .emit(CoreEvent::Library(LibraryEvent::CachesPurged {
                reason: reason.to_string(),
            }));
        Ok(())
    }
}

/// The four family remotes.
#[derive(Clone)]
pub struct CatalogRemotes {
    pub albums: Arc<dyn RemoteGateway<Album>>,
    pub artists: Arc<dyn RemoteGateway<Artist>>,
    pub playlists: Arc<dyn RemoteGateway<Playlist>>,
    pub songs: Arc<dyn RemoteGateway<Song>>,
}

/// Songs of one playlist, addressed through the playlist's cached song ids.
struct PlaylistMembership {
    playlists: Arc<dyn CacheGateway<Playlist>>,
    playlist_id: String,
}

#[async_trait]
impl Relation for PlaylistMembership {
    async fn cache_filter(&self) -> core_library::Result<CacheFilter> {
        let ids = self
            .playlists
            .get_by_id(&self.playlist_id)
            .await?
            .map(|playlist| playlist.song_ids)
            .unwrap_or_default();
        Ok(CacheFilter::ids(ids))
    }

    async fn record(&self, ids: Vec<String>) -> core_library::Result<()> {
        if let Some(mut playlist) = self.playlists.get_by_id(&self.playlist_id).await? {
            playlist.item_count = ids.len() as u32;
            playlist.song_ids = ids;
            self.playlists.upsert_all(&[playlist]).await?;
        }
        Ok(())
    }
}

/// Families reachable through a [`Catalog`].
pub trait CatalogEntity: Entity {
    fn orchestrator(catalog: &Catalog) -> &SyncOrchestrator<Self>;
}

impl CatalogEntity for Album {
    fn orchestrator(catalog: &Catalog) -> &SyncOrchestrator<Self> {
        &catalog.albums
    }
}

impl CatalogEntity for Artist {
    fn orchestrator(catalog: &Catalog) -> &SyncOrchestrator<Self> {
        &catalog.artists
    }
}

impl CatalogEntity for Playlist {
    fn orchestrator(catalog: &Catalog) -> &SyncOrchestrator<Self> {
        &catalog.playlists
    }
}

impl CatalogEntity for Song {
    fn orchestrator(catalog: &Catalog) -> &SyncOrchestrator<Self> {
        &catalog.songs
    }
}

/// Entry point for every catalog read and write.
///
/// Every method returns immediately with a [`ResourceStream`]; the work
/// runs on the Tokio runtime the method was called from.
#[derive(Clone)]
pub struct Catalog {
    albums: SyncOrchestrator<Album>,
    artists: SyncOrchestrator<Artist>,
    playlists: SyncOrchestrator<Playlist>,
    songs: SyncOrchestrator<Song>,
    playlist_cache: Arc<dyn CacheGateway<Playlist>>,
}

impl Catalog {
    pub fn new(caches: &CatalogCaches, remotes: CatalogRemotes, ctx: SyncContext) -> Self {
        Self {
            albums: SyncOrchestrator::new(caches.albums.clone(), remotes.albums, ctx.clone()),
            artists: SyncOrchestrator::new(caches.artists.clone(), remotes.artists, ctx.clone()),
            playlists: SyncOrchestrator::new(
                caches.playlists.clone(),
                remotes.playlists,
                ctx.clone(),
            ),
            songs: SyncOrchestrator::new(caches.songs.clone(), remotes.songs, ctx),
            playlist_cache: caches.playlists.clone(),
        }
    }

    /// The orchestrator for family `T`.
    pub fn family<T: CatalogEntity>(&self) -> &SyncOrchestrator<T> {
        T::orchestrator(self)
    }

    // -------------------------------------------------------------------------
    // Reads
    // -------------------------------------------------------------------------

    pub fn albums(
        &self,
        query: &str,
        offset: u32,
        fetch_remote: bool,
    ) -> ResourceStream<Vec<Album>> {
        self.albums.list(ListRequest::search(query, offset, fetch_remote))
    }

    pub fn artists(
        &self,
        query: &str,
        offset: u32,
        fetch_remote: bool,
    ) -> ResourceStream<Vec<Artist>> {
        self.artists.list(ListRequest::search(query, offset, fetch_remote))
    }

    pub fn songs(&self, query: &str, offset: u32, fetch_remote: bool) -> ResourceStream<Vec<Song>> {
        self.songs.list(ListRequest::search(query, offset, fetch_remote))
    }

    /// Every playlist, fetched with adaptive pagination.
    pub fn playlists(&self, query: &str, fetch_remote: bool) -> ResourceStream<Vec<Playlist>> {
        self.playlists.fetch_all(FetchAllRequest::search(query, fetch_remote))
    }

    /// Every song of a playlist, in playlist order. A complete fetch also
    /// records the song ids on the cached playlist.
    pub fn playlist_songs(
        &self,
        playlist_id: &str,
        fetch_remote: bool,
    ) -> ResourceStream<Vec<Song>> {
        let relation = Arc::new(PlaylistMembership {
            playlists: self.playlist_cache.clone(),
            playlist_id: playlist_id.to_string(),
        });
        self.songs.fetch_all(FetchAllRequest::related(
            relation,
            ListFilter::Playlist(playlist_id.to_string()),
            fetch_remote,
        ))
    }

    pub fn album_songs(&self, album_id: &str, fetch_remote: bool) -> ResourceStream<Vec<Song>> {
        self.songs.list(ListRequest::related(
            Scope::Album(album_id.to_string()),
            ListFilter::Album(album_id.to_string()),
            fetch_remote,
        ))
    }

    pub fn artist_albums(&self, artist_id: &str, fetch_remote: bool) -> ResourceStream<Vec<Album>> {
        self.albums.list(ListRequest::related(
            Scope::Artist(artist_id.to_string()),
            ListFilter::Artist(artist_id.to_string()),
            fetch_remote,
        ))
    }

    /// Random, newest, recent, highest rated, most played and flagged songs,
    /// merged into one list.
    pub fn discover_songs(&self) -> ResourceStream<Vec<Song>> {
        let feeds = FeedKind::ALL.map(ListFilter::Feed).to_vec();
        self.songs.aggregate(feeds)
    }

    // -------------------------------------------------------------------------
    // Writes
    // -------------------------------------------------------------------------

    pub fn flag<T: CatalogEntity>(&self, id: &str, flagged: bool) -> ResourceStream<Option<T>> {
        self.family::<T>().flag(id, flagged)
    }

    pub fn rate<T: CatalogEntity>(
        &self,
        id: &str,
        rating: Option<u8>,
    ) -> ResourceStream<Option<T>> {
        self.family::<T>().rate(id, rating)
    }

    pub fn add_to_playlist(
        &self,
        playlist_id: &str,
        song_id: &str,
    ) -> ResourceStream<Option<Playlist>> {
        self.playlists.add_song(playlist_id, song_id)
    }

    pub fn remove_from_playlist(
        &self,
        playlist_id: &str,
        song_id: &str,
    ) -> ResourceStream<Option<Playlist>> {
        self.playlists.remove_song(playlist_id, song_id)
    }

    pub fn edit_playlist(
        &self,
        playlist_id: &str,
        song_ids: Vec<String>,
    ) -> ResourceStream<Option<Playlist>> {
        self.playlists.edit_playlist(playlist_id, song_ids)
    }
}
