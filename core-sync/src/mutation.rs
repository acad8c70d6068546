//! Mutation flows
//!
//! A mutation is sent to the server first; the cache only changes after the
//! server confirmed it. An explicit error payload, or an answer without a
//! success marker, fails the flow and leaves the cache as it was.

use crate::error::{Result, SyncError};
use crate::orchestrator::{Completion, Operation, SyncOrchestrator};
use crate::remote::{DomainCode, Mutation, RemoteError};
use crate::resource::{Emitter, ResourceStream};
use core_auth::Session;
use core_library::{Entity, Playlist, MAX_RATING};
use core_runtime::events::LibraryEvent;
use tracing::{debug, info, warn};

impl<T: Entity> SyncOrchestrator<T> {
    /// Flag or unflag `id`.
    pub fn flag(&self, id: impl Into<String>, flagged: bool) -> ResourceStream<Option<T>> {
        self.mutate(id.into(), Mutation::Flag { flagged }, move |entity: &mut T| {
            entity.set_flagged(flagged);
        })
    }

    /// Rate `id` from 0 to 5; `None` clears the rating.
    pub fn rate(&self, id: impl Into<String>, rating: Option<u8>) -> ResourceStream<Option<T>> {
        if let Some(value) = rating.filter(|value| *value > MAX_RATING) {
            return self.launch("rate", move |_, _, _| async move {
                Err(SyncError::InvalidInput(format!("rating {} exceeds {}", value, MAX_RATING)))
            });
        }
        self.mutate(id.into(), Mutation::Rate { rating }, move |entity: &mut T| {
            entity.set_rating(rating);
        })
    }

    /// Send `mutation` for `target`, then apply `apply` to the cached copy.
    ///
    /// Emits the updated cached entity, or `None` when it is not cached.
    pub fn mutate<F>(
        &self,
        target: String,
        mutation: Mutation,
        apply: F,
    ) -> ResourceStream<Option<T>>
    where
        F: FnOnce(&mut T) + Send + 'static,
    {
        self.launch(mutation.name(), move |this, emitter, op| async move {
            this.run_mutation(&emitter, &op, target, mutation, apply)
                .await
        })
    }

    async fn run_mutation<F>(
        &self,
        emitter: &Emitter<Option<T>>,
        op: &Operation,
        target: String,
        mutation: Mutation,
        apply: F,
    ) -> Result<Completion>
    where
        F: FnOnce(&mut T) + Send,
    {
        if op.offline {
            return Err(SyncError::Offline);
        }

        let session = self.session(emitter).await?;
        self.confirm(emitter, &session, &target, &mutation).await?;

        let updated = match self.cache.get_by_id(&target).await? {
            Some(mut entity) => {
                apply(&mut entity);
                self.cache.upsert_all(std::slice::from_ref(&entity)).await?;
                self.publish_library(LibraryEvent::EntityMutated {
                    family: T::FAMILY.as_str().to_string(),
                    id: target.clone(),
                    change: mutation.name().to_string(),
                });
                Some(entity)
            }
            None => {
                debug!(id = %target, "Mutated entity is not cached");
                None
            }
        };

        let count = usize::from(updated.is_some());
        emitter.success(updated, None).await?;
        Ok(Completion::full(count))
    }

    /// Send a mutation and require an explicit success.
    pub(crate) async fn confirm<R: Send + 'static>(
        &self,
        emitter: &Emitter<R>,
        session: &Session,
        target: &str,
        mutation: &Mutation,
    ) -> Result<()> {
        match emitter
            .guard(self.remote.mutate(session, target, mutation))
            .await?
        {
            Ok(true) => Ok(()),
            Ok(false) => Err(SyncError::Rejected(format!(
                "server did not confirm {} on {}",
                mutation.name(),
                target
            ))),
            Err(e) => Err(self.remote_failure(session, e).await),
        }
    }

    /// Authoritative server copy of `id`.
    pub(crate) async fn fetch_remote<R: Send + 'static>(
        &self,
        emitter: &Emitter<R>,
        session: &Session,
        id: &str,
    ) -> Result<T> {
        match emitter.guard(self.remote.fetch_one(session, id)).await? {
            Ok(entity) => Ok(entity),
            Err(e) => Err(self.remote_failure(session, e).await),
        }
    }
}

// -----------------------------------------------------------------------------
// Playlist edits
// -----------------------------------------------------------------------------

impl SyncOrchestrator<Playlist> {
    /// Append one song and mirror it in the cached playlist.
    pub fn add_song(
        &self,
        playlist_id: impl Into<String>,
        song_id: impl Into<String>,
    ) -> ResourceStream<Option<Playlist>> {
        let song_id = song_id.into();
        let mutation = Mutation::PlaylistAddSong {
            song_id: song_id.clone(),
        };
        self.mutate(playlist_id.into(), mutation, move |playlist: &mut Playlist| {
            if playlist.song_ids.len() == playlist.item_count as usize {
                playlist.song_ids.push(song_id);
            } else {
                playlist.song_ids.clear();
            }
            playlist.item_count += 1;
        })
    }

    /// Remove one song and mirror it in the cached playlist.
    pub fn remove_song(
        &self,
        playlist_id: impl Into<String>,
        song_id: impl Into<String>,
    ) -> ResourceStream<Option<Playlist>> {
        let song_id = song_id.into();
        let mutation = Mutation::PlaylistRemoveSong {
            song_id: song_id.clone(),
        };
        self.mutate(playlist_id.into(), mutation, move |playlist: &mut Playlist| {
            if let Some(index) = playlist.song_ids.iter().position(|id| *id == song_id) {
                playlist.song_ids.remove(index);
            }
            playlist.item_count = playlist.item_count.saturating_sub(1);
            if playlist.song_ids.len() != playlist.item_count as usize {
                playlist.song_ids.clear();
            }
        })
    }

    /// Add `song_ids` to a playlist.
    ///
    /// Tries to replace the full item list in one call. When the server
    /// rejects that, or the current items are not known locally, adds the
    /// songs one at a time, tolerating individual failures, and then checks
    /// the server copy actually grew. Emits the server-confirmed playlist.
    pub fn edit_playlist(
        &self,
        playlist_id: impl Into<String>,
        song_ids: Vec<String>,
    ) -> ResourceStream<Option<Playlist>> {
        let playlist_id = playlist_id.into();
        self.launch("edit_playlist", move |this, emitter, op| async move {
            this.run_edit_playlist(&emitter, &op, playlist_id, song_ids)
                .await
        })
    }

    async fn run_edit_playlist(
        &self,
        emitter: &Emitter<Option<Playlist>>,
        op: &Operation,
        playlist_id: String,
        additions: Vec<String>,
    ) -> Result<Completion> {
        if op.offline {
            return Err(SyncError::Offline);
        }
        if additions.is_empty() {
            return Err(SyncError::InvalidInput("no songs to add".to_string()));
        }

        let session = self.session(emitter).await?;
        let baseline = self.fetch_remote(emitter, &session, &playlist_id).await?;

        // The full list can only be rebuilt when the cached ids cover every
        // entry the server reports.
        let known_items = self
            .cache
            .get_by_id(&playlist_id)
            .await?
            .map(|cached| cached.song_ids)
            .filter(|ids| ids.len() == baseline.item_count as usize);

        let bulk_result = match &known_items {
            Some(known) => {
                let mut full_list = known.clone();
                full_list.extend(additions.iter().cloned());
                let mutation = Mutation::PlaylistReplaceItems {
                    song_ids: full_list.clone(),
                };
                match self
                    .confirm(emitter, &session, &playlist_id, &mutation)
                    .await
                {
                    Ok(()) => Some(full_list),
                    Err(SyncError::Domain { code, message })
                        if code != DomainCode::SessionExpired =>
                    {
                        info!(
                            %code,
                            error = %message,
                            "Bulk playlist edit rejected; adding one by one"
                        );
                        None
                    }
                    Err(SyncError::Rejected(message)) => {
                        info!(
                            error = %message,
                            "Bulk playlist edit unconfirmed; adding one by one"
                        );
                        None
                    }
                    Err(e) => return Err(e),
                }
            }
            None => {
                debug!("Playlist items not known locally; adding one by one");
                None
            }
        };

        let confirmed = match bulk_result {
            Some(full_list) => {
                let mut server = self.fetch_remote(emitter, &session, &playlist_id).await?;
                if full_list.len() == server.item_count as usize {
                    server.song_ids = full_list;
                }
                server
            }
            None => {
                let added = self
                    .add_one_by_one(emitter, &session, &playlist_id, &additions)
                    .await?;

                let mut server = self.fetch_remote(emitter, &session, &playlist_id).await?;
                if server.item_count <= baseline.item_count {
                    return Err(SyncError::Rejected(format!(
                        "playlist {} did not grow ({} items before, {} after)",
                        playlist_id, baseline.item_count, server.item_count
                    )));
                }

                if let Some(mut list) = known_items {
                    list.extend(added);
                    if list.len() == server.item_count as usize {
                        server.song_ids = list;
                    }
                }
                server
            }
        };

        self.merge(std::slice::from_ref(&confirmed), false).await?;
        self.publish_library(LibraryEvent::EntityMutated {
            family: Playlist::FAMILY.as_str().to_string(),
            id: playlist_id,
            change: "playlist_edit".to_string(),
        });

        let cached = self.cache.get_by_id(confirmed.id()).await?;
        emitter.success(cached, Some(Some(confirmed))).await?;
        Ok(Completion::full(1))
    }

    /// Returns the ids the server confirmed, in order.
    async fn add_one_by_one(
        &self,
        emitter: &Emitter<Option<Playlist>>,
        session: &Session,
        playlist_id: &str,
        song_ids: &[String],
    ) -> Result<Vec<String>> {
        let mut added = Vec::with_capacity(song_ids.len());

        for song_id in song_ids {
            let mutation = Mutation::PlaylistAddSong {
                song_id: song_id.clone(),
            };
            let outcome = emitter
                .guard(self.remote.mutate(session, playlist_id, &mutation))
                .await?;

            match outcome {
                Ok(true) => added.push(song_id.clone()),
                Ok(false) => warn!(song_id = %song_id, "Server did not confirm song add"),
                Err(e) if e.is_session_expired() => {
                    return Err(self.remote_failure(session, e).await);
                }
                Err(RemoteError::Network(message)) => {
                    warn!(song_id = %song_id, error = %message, "Song add failed; continuing")
                }
                Err(e) => warn!(song_id = %song_id, error = %e, "Song add rejected; continuing"),
            }
        }

        info!(
            requested = song_ids.len(),
            added = added.len(),
            "Added songs one by one"
        );
        Ok(added)
    }
}
