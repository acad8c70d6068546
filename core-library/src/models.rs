//! Domain models for the cached catalog
//!
//! Every family implements [`Entity`], which is all the sync orchestrator
//! needs to know about a record: its id, how it is searched and addressed,
//! and the two user-mutable fields (flag and rating).

use crate::error::{LibraryError, Result};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Highest rating accepted by the server.
pub const MAX_RATING: u8 = 5;

// =============================================================================
// Families
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityFamily {
    Album,
    Artist,
    Playlist,
    Song,
}

impl EntityFamily {
    pub const ALL: [EntityFamily; 4] = [
        EntityFamily::Album,
        EntityFamily::Artist,
        EntityFamily::Playlist,
        EntityFamily::Song,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            EntityFamily::Album => "album",
            EntityFamily::Artist => "artist",
            EntityFamily::Playlist => "playlist",
            EntityFamily::Song => "song",
        }
    }
}

impl fmt::Display for EntityFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Relation key addressing entities linked to `family`/`id`, e.g. `album:12`.
pub fn scope_key(family: EntityFamily, id: &str) -> String {
    format!("{}:{}", family.as_str(), id)
}

// =============================================================================
// Entity trait
// =============================================================================

/// A cacheable catalog record.
pub trait Entity:
    Clone + fmt::Debug + PartialEq + Serialize + DeserializeOwned + Send + Sync + 'static
{
    const FAMILY: EntityFamily;

    /// Unique and stable within the family.
    fn id(&self) -> &str;

    /// Display name (title for songs). Required.
    fn name(&self) -> &str;

    /// Text matched by free-text cache queries.
    fn search_text(&self) -> String;

    /// Relation keys (see [`scope_key`]) this entity can be addressed by.
    fn scope_keys(&self) -> Vec<String> {
        Vec::new()
    }

    fn flagged(&self) -> bool;
    fn set_flagged(&mut self, flagged: bool);

    fn rating(&self) -> Option<u8>;
    fn set_rating(&mut self, rating: Option<u8>);

    /// Copy locally-derived state from the cached version of this record
    /// before it is overwritten by a network copy.
    fn retain_local(&mut self, _cached: &Self) {}

    /// Reject records missing required fields.
    fn validate(&self) -> Result<()> {
        if self.id().trim().is_empty() {
            return Err(invalid(Self::FAMILY, "id", "cannot be empty"));
        }
        if self.name().trim().is_empty() {
            return Err(invalid(Self::FAMILY, "name", "cannot be empty"));
        }
        if let Some(rating) = self.rating() {
            if rating > MAX_RATING {
                return Err(invalid(
                    Self::FAMILY,
                    "rating",
                    &format!("{} exceeds {}", rating, MAX_RATING),
                ));
            }
        }
        Ok(())
    }
}

fn invalid(family: EntityFamily, field: &str, message: &str) -> LibraryError {
    LibraryError::InvalidEntity {
        field: format!("{}.{}", family, field),
        message: message.to_string(),
    }
}

/// Implements the flag/rating accessors for structs with `flagged` and
/// `rating` fields.
macro_rules! user_state_accessors {
    () => {
        fn flagged(&self) -> bool {
            self.flagged
        }

        fn set_flagged(&mut self, flagged: bool) {
            self.flagged = flagged;
        }

        fn rating(&self) -> Option<u8> {
            self.rating
        }

        fn set_rating(&mut self, rating: Option<u8>) {
            self.rating = rating;
        }
    };
}

// =============================================================================
// Album
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Album {
    pub id: String,
    pub name: String,
    pub artist_id: Option<String>,
    pub artist_name: Option<String>,
    pub year: Option<i32>,
    pub song_count: u32,
    /// Server-issued art URL; embeds the session token.
    pub art_url: Option<String>,
    #[serde(default)]
    pub flagged: bool,
    #[serde(default)]
    pub rating: Option<u8>,
}

impl Album {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            ..Self::default()
        }
    }
}

impl Entity for Album {
    const FAMILY: EntityFamily = EntityFamily::Album;

    fn id(&self) -> &str {
        &self.id
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn search_text(&self) -> String {
        match &self.artist_name {
            Some(artist) => format!("{} {}", self.name, artist),
            None => self.name.clone(),
        }
    }

    fn scope_keys(&self) -> Vec<String> {
        self.artist_id
            .iter()
            .map(|id| scope_key(EntityFamily::Artist, id))
            .collect()
    }

    user_state_accessors!();
}

// =============================================================================
// Artist
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Artist {
    pub id: String,
    pub name: String,
    pub album_count: u32,
    pub song_count: u32,
    pub art_url: Option<String>,
    #[serde(default)]
    pub flagged: bool,
    #[serde(default)]
    pub rating: Option<u8>,
}

impl Artist {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            ..Self::default()
        }
    }
}

impl Entity for Artist {
    const FAMILY: EntityFamily = EntityFamily::Artist;

    fn id(&self) -> &str {
        &self.id
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn search_text(&self) -> String {
        self.name.clone()
    }

    user_state_accessors!();
}

// =============================================================================
// Playlist
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Playlist {
    pub id: String,
    pub name: String,
    pub owner: Option<String>,
    /// Server-reported number of entries.
    pub item_count: u32,
    /// Song ids in playlist order, recorded when the playlist's songs are
    /// fetched. Playlist listings do not carry them.
    #[serde(default)]
    pub song_ids: Vec<String>,
    pub art_url: Option<String>,
    #[serde(default)]
    pub flagged: bool,
    #[serde(default)]
    pub rating: Option<u8>,
}

impl Playlist {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            ..Self::default()
        }
    }
}

impl Entity for Playlist {
    const FAMILY: EntityFamily = EntityFamily::Playlist;

    fn id(&self) -> &str {
        &self.id
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn search_text(&self) -> String {
        self.name.clone()
    }

    user_state_accessors!();

    /// Listings carry no song ids. Keep the cached ones while they still
    /// account for every entry; after the playlist changed size they are
    /// stale and dropped.
    fn retain_local(&mut self, cached: &Self) {
        if self.song_ids.is_empty() && cached.song_ids.len() == self.item_count as usize {
            self.song_ids = cached.song_ids.clone();
        }
    }
}

// =============================================================================
// Song
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Song {
    pub id: String,
    pub title: String,
    pub album_id: Option<String>,
    pub album_name: Option<String>,
    pub artist_id: Option<String>,
    pub artist_name: Option<String>,
    pub track: Option<u32>,
    pub duration_secs: Option<u32>,
    /// Server-issued stream URL; embeds the session token.
    pub stream_url: Option<String>,
    pub art_url: Option<String>,
    #[serde(default)]
    pub flagged: bool,
    #[serde(default)]
    pub rating: Option<u8>,
}

impl Song {
    pub fn new(id: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            ..Self::default()
        }
    }
}

impl Entity for Song {
    const FAMILY: EntityFamily = EntityFamily::Song;

    fn id(&self) -> &str {
        &self.id
    }

    fn name(&self) -> &str {
        &self.title
    }

    fn search_text(&self) -> String {
        [
            Some(self.title.as_str()),
            self.artist_name.as_deref(),
            self.album_name.as_deref(),
        ]
        .into_iter()
        .flatten()
        .collect::<Vec<_>>()
        .join(" ")
    }

    fn scope_keys(&self) -> Vec<String> {
        let mut keys = Vec::with_capacity(2);
        if let Some(album_id) = &self.album_id {
            keys.push(scope_key(EntityFamily::Album, album_id));
        }
        if let Some(artist_id) = &self.artist_id {
            keys.push(scope_key(EntityFamily::Artist, artist_id));
        }
        keys
    }

    user_state_accessors!();
}
