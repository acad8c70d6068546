//! Remote gateways over the Ampache JSON API
//!
//! One generic [`AmpacheGateway`] serves every entity family; the
//! per-family differences (action names, payload keys, DTO type) live in
//! [`AmpacheEntity`].

use async_trait::async_trait;
use core_auth::Session;
use core_library::{Album, Artist, Entity, EntityFamily, Playlist, Song};
use core_sync::{
    DomainCode, ListFilter, Mutation, PageRequest, RemoteError, RemoteGateway, RemotePage,
    RemoteResult,
};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::marker::PhantomData;
use std::sync::Arc;
use tracing::{debug, instrument};

use crate::client::{decode, AmpacheClient};
use crate::dto::{AlbumDto, ArtistDto, PlaylistDto, SongDto, SuccessResponse};
use crate::error::AmpacheError;

/// Ampache naming for one entity family.
pub trait AmpacheEntity: Entity {
    type Dto: DeserializeOwned + Into<Self> + Send;

    /// Listing action, e.g. `albums`.
    const LIST_ACTION: &'static str;
    /// Single-object action and `type` parameter value, e.g. `album`.
    const OBJECT: &'static str;
}

impl AmpacheEntity for Album {
    type Dto = AlbumDto;
    const LIST_ACTION: &'static str = "albums";
    const OBJECT: &'static str = "album";
}

impl AmpacheEntity for Artist {
    type Dto = ArtistDto;
    const LIST_ACTION: &'static str = "artists";
    const OBJECT: &'static str = "artist";
}

impl AmpacheEntity for Playlist {
    type Dto = PlaylistDto;
    const LIST_ACTION: &'static str = "playlists";
    const OBJECT: &'static str = "playlist";
}

impl AmpacheEntity for Song {
    type Dto = SongDto;
    const LIST_ACTION: &'static str = "songs";
    const OBJECT: &'static str = "song";
}

/// Query parameters of one API call.
type Params = Vec<(&'static str, String)>;

/// [`RemoteGateway`] for family `T` on one Ampache server.
pub struct AmpacheGateway<T> {
    client: Arc<AmpacheClient>,
    server_url: String,
    _family: PhantomData<fn() -> T>,
}

impl<T: AmpacheEntity> AmpacheGateway<T> {
    pub fn new(client: Arc<AmpacheClient>, server_url: impl Into<String>) -> Self {
        Self {
            client,
            server_url: server_url.into(),
            _family: PhantomData,
        }
    }

    /// Action and filter parameter for a listing.
    fn list_action(filter: &ListFilter) -> RemoteResult<(&'static str, Params)> {
        let action = match (T::FAMILY, filter) {
            (_, ListFilter::Search(query)) => {
                let params = if query.trim().is_empty() {
                    Vec::new()
                } else {
                    vec![("filter", query.trim().to_string())]
                };
                return Ok((T::LIST_ACTION, params));
            }
            (_, ListFilter::Feed(kind)) => {
                return Ok((
                    "stats",
                    vec![
                        ("type", T::OBJECT.to_string()),
                        ("filter", kind.as_str().to_string()),
                    ],
                ));
            }
            (EntityFamily::Song, ListFilter::Album(_)) => "album_songs",
            (EntityFamily::Song, ListFilter::Artist(_)) => "artist_songs",
            (EntityFamily::Song, ListFilter::Playlist(_)) => "playlist_songs",
            (EntityFamily::Album, ListFilter::Artist(_)) => "artist_albums",
            (family, other) => {
                return Err(RemoteError::domain(
                    DomainCode::Unsupported,
                    format!("{} listing by {} is not available", family, other.label()),
                ));
            }
        };

        let id = match filter {
            ListFilter::Album(id) | ListFilter::Artist(id) | ListFilter::Playlist(id) => id.clone(),
            _ => String::new(),
        };
        Ok((action, vec![("filter", id)]))
    }

    fn mutation_action(target: &str, mutation: &Mutation) -> RemoteResult<(&'static str, Params)> {
        let playlist_only = !matches!(mutation, Mutation::Flag { .. } | Mutation::Rate { .. });
        if playlist_only && T::FAMILY != EntityFamily::Playlist {
            return Err(RemoteError::domain(
                DomainCode::Unsupported,
                format!("{} is only available for playlists", mutation.name()),
            ));
        }

        let target = target.to_string();
        Ok(match mutation {
            Mutation::Flag { flagged } => (
                "flag",
                vec![
                    ("type", T::OBJECT.to_string()),
                    ("id", target),
                    ("flag", u8::from(*flagged).to_string()),
                ],
            ),
            Mutation::Rate { rating } => (
                "rate",
                vec![
                    ("type", T::OBJECT.to_string()),
                    ("id", target),
                    ("rating", rating.unwrap_or(0).to_string()),
                ],
            ),
            Mutation::PlaylistAddSong { song_id } => (
                "playlist_add_song",
                vec![("filter", target), ("song", song_id.clone())],
            ),
            Mutation::PlaylistRemoveSong { song_id } => (
                "playlist_remove_song",
                vec![("filter", target), ("song", song_id.clone())],
            ),
            Mutation::PlaylistReplaceItems { song_ids } => {
                let tracks: Vec<String> = (1..=song_ids.len()).map(|n| n.to_string()).collect();
                (
                    "playlist_edit",
                    vec![
                        ("filter", target),
                        ("items", song_ids.join(",")),
                        ("tracks", tracks.join(",")),
                    ],
                )
            }
        })
    }

    /// Decode the object array under `T::OBJECT`.
    fn decode_items(action: &str, mut value: Value) -> Result<Vec<T>, AmpacheError> {
        let items = match value.get_mut(T::OBJECT).map(Value::take) {
            Some(Value::Array(items)) => items,
            Some(Value::Null) => Vec::new(),
            Some(_) | None => {
                return Err(AmpacheError::Parse(format!(
                    "{} answer has no {} list",
                    action,
                    T::OBJECT
                )));
            }
        };

        items
            .into_iter()
            .map(|item| decode::<T::Dto>(action, item).map(Into::into))
            .collect()
    }
}

fn with_auth(session: &Session, mut params: Params) -> Params {
    params.insert(0, ("auth", session.token().to_string()));
    params
}

#[async_trait]
impl<T: AmpacheEntity> RemoteGateway<T> for AmpacheGateway<T> {
    #[instrument(
        skip(self, session),
        fields(
            family = %T::FAMILY,
            filter = %request.filter.label(),
            offset = request.offset,
            limit = request.limit
        )
    )]
    async fn list_page(
        &self,
        session: &Session,
        request: &PageRequest,
    ) -> RemoteResult<RemotePage<T>> {
        let (action, mut params) = Self::list_action(&request.filter)?;
        params.push(("offset", request.offset.to_string()));
        params.push(("limit", request.limit.to_string()));

        let value = match self
            .client
            .read(&self.server_url, action, &with_auth(session, params))
            .await
        {
            Ok(value) => value,
            // An empty result is reported as "not found" by list endpoints.
            Err(e) if e.is_not_found() => {
                debug!(action, "Empty listing");
                return Ok(RemotePage::new(Vec::new()));
            }
            Err(e) => return Err(e.into()),
        };

        let total = value
            .get("total_count")
            .and_then(Value::as_u64)
            .and_then(|n| u32::try_from(n).ok());
        let items = Self::decode_items(action, value)?;
        debug!(count = items.len(), total, "Listed page");

        Ok(match total {
            Some(total) => RemotePage::new(items).with_total(total),
            None => RemotePage::new(items),
        })
    }

    #[instrument(skip(self, session), fields(family = %T::FAMILY))]
    async fn fetch_one(&self, session: &Session, id: &str) -> RemoteResult<T> {
        let params = with_auth(session, vec![("filter", id.to_string())]);
        let value = self
            .client
            .read(&self.server_url, T::OBJECT, &params)
            .await?;

        // Newer servers answer with the bare object, older ones wrap it in a
        // one-element list.
        if value.get(T::OBJECT).is_some_and(Value::is_array) {
            return Self::decode_items(T::OBJECT, value)?
                .into_iter()
                .next()
                .ok_or_else(|| {
                    RemoteError::domain(DomainCode::NotFound, format!("{} {}", T::OBJECT, id))
                });
        }
        let dto = decode::<T::Dto>(T::OBJECT, value)?;
        Ok(dto.into())
    }

    #[instrument(
        skip(self, session, mutation),
        fields(family = %T::FAMILY, mutation = mutation.name())
    )]
    async fn mutate(
        &self,
        session: &Session,
        target: &str,
        mutation: &Mutation,
    ) -> RemoteResult<bool> {
        let (action, params) = Self::mutation_action(target, mutation)?;
        let value = self
            .client
            .write(&self.server_url, action, &with_auth(session, params))
            .await?;

        let response: SuccessResponse = decode(action, value)?;
        Ok(response.success.is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::test_support::*;
    use chrono::{Duration, Utc};
    use core_sync::FeedKind;

    fn session() -> Session {
        Session::with_lifetime("token-1", Utc::now(), Duration::hours(1))
    }

    fn gateway<T: AmpacheEntity>(http: MockHttpClient) -> AmpacheGateway<T> {
        AmpacheGateway::new(
            Arc::new(AmpacheClient::new(Arc::new(http))),
            "https://music.example.com",
        )
    }

    #[tokio::test]
    async fn test_list_page_decodes_items_and_total() {
        let mut http = MockHttpClient::new();
        http.expect_execute_with_retry().times(1).returning(|request, _| {
            assert_eq!(request.query_value("action"), Some("albums"));
            assert_eq!(request.query_value("auth"), Some("token-1"));
            assert_eq!(request.query_value("filter"), Some("abc"));
            assert_eq!(request.query_value("limit"), Some("2"));
            json_response(
                r#"{"total_count": 3, "album": [
                    {"id": "1", "name": "Abc One"},
                    {"id": "2", "name": "Abc Two", "artist": {"id": "9", "name": "Ann"}}
                ]}"#,
            )
        });

        let page = gateway::<Album>(http)
            .list_page(&session(), &PageRequest::new(ListFilter::Search("abc".into()), 0, 2))
            .await
            .unwrap();
        assert_eq!(page.items.len(), 2);
        assert_eq!(page.total, Some(3));
        assert_eq!(page.items[1].artist_id.as_deref(), Some("9"));
    }

    #[tokio::test]
    async fn test_browse_sends_no_filter() {
        let mut http = MockHttpClient::new();
        http.expect_execute_with_retry().returning(|request, _| {
            assert_eq!(request.query_value("filter"), None);
            json_response(r#"{"artist": []}"#)
        });

        let page = gateway::<Artist>(http)
            .list_page(&session(), &PageRequest::new(ListFilter::Search(String::new()), 0, 50))
            .await
            .unwrap();
        assert!(page.items.is_empty());
    }

    #[tokio::test]
    async fn test_not_found_on_listing_is_empty_page() {
        let mut http = MockHttpClient::new();
        http.expect_execute_with_retry().returning(|_, _| {
            json_response(r#"{"error": {"errorCode": "4704", "errorMessage": "Not Found"}}"#)
        });

        let page = gateway::<Song>(http)
            .list_page(&session(), &PageRequest::new(ListFilter::Playlist("5".into()), 0, 50))
            .await
            .unwrap();
        assert!(page.items.is_empty());
    }

    #[tokio::test]
    async fn test_relation_listings_use_relation_actions() {
        let mut http = MockHttpClient::new();
        http.expect_execute_with_retry().returning(|request, _| {
            assert_eq!(request.query_value("action"), Some("playlist_songs"));
            assert_eq!(request.query_value("filter"), Some("5"));
            json_response(r#"{"song": [{"id": "1", "title": "Intro"}]}"#)
        });

        let page = gateway::<Song>(http)
            .list_page(&session(), &PageRequest::new(ListFilter::Playlist("5".into()), 0, 50))
            .await
            .unwrap();
        assert_eq!(page.items[0].title, "Intro");
    }

    #[tokio::test]
    async fn test_feeds_use_stats() {
        let mut http = MockHttpClient::new();
        http.expect_execute_with_retry().returning(|request, _| {
            assert_eq!(request.query_value("action"), Some("stats"));
            assert_eq!(request.query_value("type"), Some("song"));
            assert_eq!(request.query_value("filter"), Some("highest"));
            json_response(r#"{"song": []}"#)
        });

        gateway::<Song>(http)
            .list_page(
                &session(),
                &PageRequest::new(ListFilter::Feed(FeedKind::Highest), 0, 50),
            )
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_unsupported_relation_fails_without_request() {
        let mut http = MockHttpClient::new();
        http.expect_execute_with_retry().times(0);

        let error = gateway::<Artist>(http)
            .list_page(&session(), &PageRequest::new(ListFilter::Album("1".into()), 0, 50))
            .await
            .unwrap_err();
        assert!(matches!(
            error,
            RemoteError::Domain {
                code: DomainCode::Unsupported,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_missing_list_key_is_malformed() {
        let mut http = MockHttpClient::new();
        http.expect_execute_with_retry()
            .returning(|_, _| json_response(r#"{"unexpected": true}"#));

        let error = gateway::<Album>(http)
            .list_page(&session(), &PageRequest::new(ListFilter::Search(String::new()), 0, 50))
            .await
            .unwrap_err();
        assert!(matches!(error, RemoteError::Malformed(_)));
    }

    #[tokio::test]
    async fn test_expired_session_is_reported() {
        let mut http = MockHttpClient::new();
        http.expect_execute_with_retry().returning(|_, _| {
            json_response(r#"{"error": {"errorCode": "4701", "errorMessage": "Session Expired"}}"#)
        });

        let error = gateway::<Album>(http)
            .list_page(&session(), &PageRequest::new(ListFilter::Search(String::new()), 0, 50))
            .await
            .unwrap_err();
        assert!(error.is_session_expired());
    }

    #[tokio::test]
    async fn test_fetch_one_accepts_bare_and_wrapped_objects() {
        let mut http = MockHttpClient::new();
        http.expect_execute_with_retry()
            .times(1)
            .returning(|_, _| json_response(r#"{"id": "5", "name": "Road Trip", "items": 3}"#));
        let playlist = gateway::<Playlist>(http)
            .fetch_one(&session(), "5")
            .await
            .unwrap();
        assert_eq!(playlist.item_count, 3);

        let mut http = MockHttpClient::new();
        http.expect_execute_with_retry().times(1).returning(|_, _| {
            json_response(r#"{"playlist": [{"id": "5", "name": "Road Trip", "items": 4}]}"#)
        });
        let playlist = gateway::<Playlist>(http)
            .fetch_one(&session(), "5")
            .await
            .unwrap();
        assert_eq!(playlist.item_count, 4);
    }

    #[tokio::test]
    async fn test_mutation_requires_success_field() {
        let mut http = MockHttpClient::new();
        http.expect_execute().times(1).returning(|request| {
            assert_eq!(request.query_value("action"), Some("flag"));
            assert_eq!(request.query_value("type"), Some("song"));
            assert_eq!(request.query_value("flag"), Some("1"));
            json_response(r#"{"success": "flag ADDED to 1"}"#)
        });
        let confirmed = gateway::<Song>(http)
            .mutate(&session(), "1", &Mutation::Flag { flagged: true })
            .await
            .unwrap();
        assert!(confirmed);

        let mut http = MockHttpClient::new();
        http.expect_execute()
            .times(1)
            .returning(|_| json_response(r#"{"message": "ok?"}"#));
        let confirmed = gateway::<Song>(http)
            .mutate(&session(), "1", &Mutation::Rate { rating: Some(3) })
            .await
            .unwrap();
        assert!(!confirmed);
    }

    #[tokio::test]
    async fn test_playlist_edit_sends_items_and_tracks() {
        let mut http = MockHttpClient::new();
        http.expect_execute().times(1).returning(|request| {
            assert_eq!(request.query_value("action"), Some("playlist_edit"));
            assert_eq!(request.query_value("filter"), Some("5"));
            assert_eq!(request.query_value("items"), Some("a,b,c"));
            assert_eq!(request.query_value("tracks"), Some("1,2,3"));
            json_response(r#"{"success": "playlist changes saved"}"#)
        });

        let mutation = Mutation::PlaylistReplaceItems {
            song_ids: vec!["a".into(), "b".into(), "c".into()],
        };
        assert!(gateway::<Playlist>(http)
            .mutate(&session(), "5", &mutation)
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn test_playlist_mutation_on_other_family_is_unsupported() {
        let mut http = MockHttpClient::new();
        http.expect_execute().times(0);

        let error = gateway::<Album>(http)
            .mutate(
                &session(),
                "1",
                &Mutation::PlaylistAddSong {
                    song_id: "2".into(),
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(
            error,
            RemoteError::Domain {
                code: DomainCode::Unsupported,
                ..
            }
        ));
    }
}
