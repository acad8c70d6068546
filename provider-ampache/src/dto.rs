//! Ampache JSON API response types
//!
//! Servers differ in how they encode scalars: ids arrive as strings or
//! numbers, `flag` as a boolean or `0`/`1`, and `rating` as a number,
//! a numeric string or `null`. The `lenient` helpers accept every variant.

use core_library::{Album, Artist, Playlist, Song, MAX_RATING};
use serde::{Deserialize, Serialize};

/// `{"error": {...}}` payload.
#[derive(Debug, Clone, Deserialize)]
pub struct ErrorEnvelope {
    pub error: ErrorBody,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorBody {
    #[serde(deserialize_with = "lenient::u32_value")]
    pub error_code: u32,
    #[serde(default)]
    pub error_message: String,
}

/// Answer to `action=handshake`.
#[derive(Debug, Clone, Deserialize)]
pub struct HandshakeResponse {
    pub auth: String,
    /// ISO 8601 expiry of the new session.
    #[serde(default)]
    pub session_expire: Option<String>,
    #[serde(default)]
    pub api: Option<String>,
}

/// Answer to `action=ping`. Only a live session carries `session_expire`.
#[derive(Debug, Clone, Deserialize)]
pub struct PingResponse {
    #[serde(default)]
    pub session_expire: Option<String>,
    #[serde(default)]
    pub version: Option<String>,
}

/// Answer to mutating actions.
#[derive(Debug, Clone, Deserialize)]
pub struct SuccessResponse {
    #[serde(default)]
    pub success: Option<String>,
}

/// `{"id": ..., "name": ...}` reference to another object.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ObjectRef {
    #[serde(deserialize_with = "lenient::string_value")]
    pub id: String,
    #[serde(default)]
    pub name: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AlbumDto {
    #[serde(deserialize_with = "lenient::string_value")]
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub artist: Option<ObjectRef>,
    #[serde(default, deserialize_with = "lenient::optional_i32")]
    pub year: Option<i32>,
    #[serde(default, alias = "songcount", deserialize_with = "lenient::u32_or_zero")]
    pub song_count: u32,
    #[serde(default)]
    pub art: Option<String>,
    #[serde(default, deserialize_with = "lenient::flag")]
    pub flag: bool,
    #[serde(default, deserialize_with = "lenient::rating")]
    pub rating: Option<u8>,
}

impl From<AlbumDto> for Album {
    fn from(dto: AlbumDto) -> Self {
        let (artist_id, artist_name) = split_ref(dto.artist);
        Album {
            id: dto.id,
            name: dto.name,
            artist_id,
            artist_name,
            year: dto.year.filter(|year| *year > 0),
            song_count: dto.song_count,
            art_url: dto.art,
            flagged: dto.flag,
            rating: dto.rating,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ArtistDto {
    #[serde(deserialize_with = "lenient::string_value")]
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default, alias = "albumcount", deserialize_with = "lenient::u32_or_zero")]
    pub album_count: u32,
    #[serde(default, alias = "songcount", deserialize_with = "lenient::u32_or_zero")]
    pub song_count: u32,
    #[serde(default)]
    pub art: Option<String>,
    #[serde(default, deserialize_with = "lenient::flag")]
    pub flag: bool,
    #[serde(default, deserialize_with = "lenient::rating")]
    pub rating: Option<u8>,
}

impl From<ArtistDto> for Artist {
    fn from(dto: ArtistDto) -> Self {
        Artist {
            id: dto.id,
            name: dto.name,
            album_count: dto.album_count,
            song_count: dto.song_count,
            art_url: dto.art,
            flagged: dto.flag,
            rating: dto.rating,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct PlaylistDto {
    #[serde(deserialize_with = "lenient::string_value")]
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub owner: Option<String>,
    #[serde(default, deserialize_with = "lenient::u32_or_zero")]
    pub items: u32,
    #[serde(default)]
    pub art: Option<String>,
    #[serde(default, deserialize_with = "lenient::flag")]
    pub flag: bool,
    #[serde(default, deserialize_with = "lenient::rating")]
    pub rating: Option<u8>,
}

impl From<PlaylistDto> for Playlist {
    fn from(dto: PlaylistDto) -> Self {
        Playlist {
            id: dto.id,
            name: dto.name,
            owner: dto.owner,
            item_count: dto.items,
            song_ids: Vec::new(),
            art_url: dto.art,
            flagged: dto.flag,
            rating: dto.rating,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct SongDto {
    #[serde(deserialize_with = "lenient::string_value")]
    pub id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub album: Option<ObjectRef>,
    #[serde(default)]
    pub artist: Option<ObjectRef>,
    #[serde(default, deserialize_with = "lenient::optional_u32")]
    pub track: Option<u32>,
    /// Duration in seconds.
    #[serde(default, deserialize_with = "lenient::optional_u32")]
    pub time: Option<u32>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub art: Option<String>,
    #[serde(default, deserialize_with = "lenient::flag")]
    pub flag: bool,
    #[serde(default, deserialize_with = "lenient::rating")]
    pub rating: Option<u8>,
}

impl From<SongDto> for Song {
    fn from(dto: SongDto) -> Self {
        let (album_id, album_name) = split_ref(dto.album);
        let (artist_id, artist_name) = split_ref(dto.artist);
        Song {
            id: dto.id,
            title: dto.title,
            album_id,
            album_name,
            artist_id,
            artist_name,
            track: dto.track.filter(|track| *track > 0),
            duration_secs: dto.time,
            stream_url: dto.url,
            art_url: dto.art,
            flagged: dto.flag,
            rating: dto.rating,
        }
    }
}

fn split_ref(reference: Option<ObjectRef>) -> (Option<String>, Option<String>) {
    match reference {
        Some(r) if !r.id.is_empty() => {
            let name = (!r.name.is_empty()).then_some(r.name);
            (Some(r.id), name)
        }
        _ => (None, None),
    }
}

mod lenient {
    use super::MAX_RATING;
    use serde::de::Error;
    use serde::{Deserialize, Deserializer};
    use serde_json::Value;

    fn as_u64(value: &Value) -> Option<u64> {
        match value {
            Value::Number(n) => n.as_u64(),
            Value::String(s) => s.trim().parse().ok(),
            Value::Bool(b) => Some(u64::from(*b)),
            _ => None,
        }
    }

    pub fn string_value<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
        match Value::deserialize(deserializer)? {
            Value::String(s) => Ok(s),
            Value::Number(n) => Ok(n.to_string()),
            other => Err(D::Error::custom(format!("expected id, got {}", other))),
        }
    }

    pub fn u32_value<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u32, D::Error> {
        let value = Value::deserialize(deserializer)?;
        as_u64(&value)
            .and_then(|n| u32::try_from(n).ok())
            .ok_or_else(|| D::Error::custom(format!("expected number, got {}", value)))
    }

    pub fn u32_or_zero<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u32, D::Error> {
        Ok(optional_u32(deserializer)?.unwrap_or(0))
    }

    pub fn optional_u32<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<u32>, D::Error> {
        let value = Value::deserialize(deserializer)?;
        Ok(as_u64(&value).and_then(|n| u32::try_from(n).ok()))
    }

    pub fn optional_i32<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<i32>, D::Error> {
        let value = Value::deserialize(deserializer)?;
        Ok(as_u64(&value).and_then(|n| i32::try_from(n).ok()))
    }

    pub fn flag<'de, D: Deserializer<'de>>(deserializer: D) -> Result<bool, D::Error> {
        let value = Value::deserialize(deserializer)?;
        Ok(match value {
            Value::Bool(b) => b,
            Value::String(s) => s == "true" || s == "1",
            other => as_u64(&other).is_some_and(|n| n > 0),
        })
    }

    /// Ratings outside 1..=5 are treated as unrated.
    pub fn rating<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<u8>, D::Error> {
        let value = Value::deserialize(deserializer)?;
        Ok(as_u64(&value)
            .and_then(|n| u8::try_from(n).ok())
            .filter(|n| (1..=MAX_RATING).contains(n)))
    }
}
