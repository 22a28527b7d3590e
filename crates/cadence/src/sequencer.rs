//! Play queue: explicitly scheduled tracks first, then policy-driven dynamic tracks.
//!
//! ```text
//!   history (newest last) <- current <- scheduled (FIFO) <- dynamic (policy lookahead)
//! ```
//! `next()` is the only operation that consults the catalog. It is transactional: when
//! no new track can be obtained the queue is left exactly as it was.

use std::collections::VecDeque;
use std::fmt;

use async_trait::async_trait;
use serde::Deserialize;
use thiserror::Error;

use crate::catalog::{Catalog, CatalogError, TrackRecord};

/// How the queue refills once the scheduled tracks run out.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum Policy {
    /// Stop after the scheduled tracks.
    QueueOnly,
    /// Play a random album in order, then another.
    #[default]
    AlbumShuffle,
    /// Play every track of a random artist, then another.
    ArtistShuffle,
    /// One random track at a time.
    TrackShuffle,
}

impl Policy {
    pub const ALL: [Policy; 4] = [
        Policy::QueueOnly,
        Policy::AlbumShuffle,
        Policy::ArtistShuffle,
        Policy::TrackShuffle,
    ];

    /// The following policy in [`Policy::ALL`], wrapping around.
    pub fn cycle(self) -> Policy {
        let idx = Self::ALL.iter().position(|p| *p == self).unwrap_or(0);
        Self::ALL[(idx + 1) % Self::ALL.len()]
    }
}

impl fmt::Display for Policy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Policy::QueueOnly => "queue only",
            Policy::AlbumShuffle => "album shuffle",
            Policy::ArtistShuffle => "artist shuffle",
            Policy::TrackShuffle => "track shuffle",
        })
    }
}

#[derive(Debug, Error)]
pub enum QueueError {
    #[error("end of queue")]
    EndOfQueue,
    #[error(transparent)]
    Catalog(#[from] CatalogError),
}

/// Catalog queries the queue needs to refill its dynamic portion.
#[async_trait]
pub trait TrackSource: Send + Sync {
    async fn get_random_track(&self) -> Result<TrackRecord, CatalogError>;
    async fn get_random_album(&self) -> Result<String, CatalogError>;
    async fn get_random_artist(&self) -> Result<String, CatalogError>;
    async fn get_album_tracks(&self, name: &str) -> Result<Vec<TrackRecord>, CatalogError>;
    async fn get_artist_tracks(&self, name: &str) -> Result<Vec<TrackRecord>, CatalogError>;
}

#[async_trait]
impl TrackSource for Catalog {
    async fn get_random_track(&self) -> Result<TrackRecord, CatalogError> {
        Catalog::get_random_track(self).await
    }

    async fn get_random_album(&self) -> Result<String, CatalogError> {
        Catalog::get_random_album(self).await
    }

    async fn get_random_artist(&self) -> Result<String, CatalogError> {
        Catalog::get_random_artist(self).await
    }

    async fn get_album_tracks(&self, name: &str) -> Result<Vec<TrackRecord>, CatalogError> {
        Catalog::get_album_tracks(self, name).await
    }

    async fn get_artist_tracks(&self, name: &str) -> Result<Vec<TrackRecord>, CatalogError> {
        Catalog::get_artist_tracks(self, name).await
    }
}

pub struct Sequencer<S> {
    source: S,
    policy: Policy,
    current: Option<TrackRecord>,
    scheduled: VecDeque<TrackRecord>,
    dynamic: VecDeque<TrackRecord>,
    history: Vec<TrackRecord>,
}

impl<S: TrackSource> Sequencer<S> {
    pub fn new(source: S, policy: Policy) -> Self {
        Self {
            source,
            policy,
            current: None,
            scheduled: VecDeque::new(),
            dynamic: VecDeque::new(),
            history: Vec::new(),
        }
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    pub fn policy(&self) -> Policy {
        self.policy
    }

    /// Switch policy. The dynamic lookahead always belongs to the old policy and is dropped.
    pub fn set_policy(&mut self, policy: Policy) {
        tracing::debug!(from = %self.policy, to = %policy, "policy changed");
        self.policy = policy;
        self.dynamic.clear();
    }

    pub fn current(&self) -> Option<&TrackRecord> {
        self.current.as_ref()
    }

    pub fn history(&self) -> &[TrackRecord] {
        &self.history
    }

    pub fn append(&mut self, track: TrackRecord) {
        self.scheduled.push_back(track);
    }

    pub fn extend(&mut self, tracks: impl IntoIterator<Item = TrackRecord>) {
        self.scheduled.extend(tracks);
    }

    /// Scheduled tracks, then the buffered dynamic ones.
    pub fn upcoming(&self) -> impl Iterator<Item = &TrackRecord> {
        self.scheduled.iter().chain(self.dynamic.iter())
    }

    /// Advance to the next track.
    pub async fn next(&mut self) -> Result<TrackRecord, QueueError> {
        let track = match self.scheduled.pop_front() {
            Some(track) => track,
            None => {
                if self.dynamic.is_empty() {
                    self.refill().await?;
                }
                self.dynamic.pop_front().ok_or(QueueError::EndOfQueue)?
            }
        };
        if let Some(previous) = self.current.replace(track.clone()) {
            self.history.push(previous);
        }
        Ok(track)
    }

    /// Step back one track. With no history this is a no-op returning the current track.
    pub fn previous(&mut self) -> Option<&TrackRecord> {
        if let Some(back) = self.history.pop() {
            if let Some(current) = self.current.replace(back) {
                self.scheduled.push_front(current);
            }
        }
        self.current.as_ref()
    }

    async fn refill(&mut self) -> Result<(), QueueError> {
        let tracks = match self.policy {
            Policy::QueueOnly => return Err(QueueError::EndOfQueue),
            Policy::TrackShuffle => vec![self.source.get_random_track().await?],
            Policy::AlbumShuffle => {
                let album = self.source.get_random_album().await?;
                tracing::info!(album = %album, "shuffled to album");
                self.source.get_album_tracks(&album).await?
            }
            Policy::ArtistShuffle => {
                let artist = self.source.get_random_artist().await?;
                tracing::info!(artist = %artist, "shuffled to artist");
                self.source.get_artist_tracks(&artist).await?
            }
        };
        if tracks.is_empty() {
            return Err(CatalogError::NotFound(format!("no tracks for {}", self.policy)).into());
        }
        self.dynamic.extend(tracks);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;
    use std::sync::Mutex;

    fn track(path: &str) -> TrackRecord {
        TrackRecord::new(path)
    }

    fn paths<'a>(tracks: impl Iterator<Item = &'a TrackRecord>) -> Vec<String> {
        tracks.map(|t| t.file_path.clone()).collect()
    }

    /// Albums keyed by name; "random" picks rotate through them in key order.
    #[derive(Default)]
    struct FakeSource {
        albums: BTreeMap<String, Vec<TrackRecord>>,
        artists: BTreeMap<String, Vec<TrackRecord>>,
        draws: Mutex<usize>,
        track_draws: Mutex<usize>,
        fail: bool,
    }

    impl FakeSource {
        fn with_albums(albums: &[(&str, &[&str])]) -> Self {
            let mut src = FakeSource::default();
            for (name, tracks) in albums {
                src.albums
                    .insert(name.to_string(), tracks.iter().map(|p| track(p)).collect());
            }
            src
        }

        fn with_artists(artists: &[(&str, &[&str])]) -> Self {
            let mut src = FakeSource::default();
            for (name, tracks) in artists {
                src.artists
                    .insert(name.to_string(), tracks.iter().map(|p| track(p)).collect());
            }
            src
        }

        fn track_draws(&self) -> usize {
            *self.track_draws.lock().unwrap()
        }

        fn draw<'a, T>(&self, keys: impl ExactSizeIterator<Item = &'a T>) -> Option<&'a T> {
            let len = keys.len();
            if len == 0 {
                return None;
            }
            let mut draws = self.draws.lock().unwrap();
            let pick = *draws % len;
            *draws += 1;
            keys.into_iter().nth(pick)
        }

        fn check(&self) -> Result<(), CatalogError> {
            if self.fail {
                Err(CatalogError::NotFound("offline".to_string()))
            } else {
                Ok(())
            }
        }
    }

    #[async_trait]
    impl TrackSource for FakeSource {
        async fn get_random_track(&self) -> Result<TrackRecord, CatalogError> {
            self.check()?;
            *self.track_draws.lock().unwrap() += 1;
            let all: Vec<&TrackRecord> = self.albums.values().flatten().collect();
            self.draw(all.iter())
                .map(|t| (**t).clone())
                .ok_or_else(|| CatalogError::NotFound("empty".to_string()))
        }

        async fn get_random_album(&self) -> Result<String, CatalogError> {
            self.check()?;
            self.draw(self.albums.keys())
                .cloned()
                .ok_or_else(|| CatalogError::NotFound("no albums".to_string()))
        }

        async fn get_random_artist(&self) -> Result<String, CatalogError> {
            self.check()?;
            self.draw(self.artists.keys())
                .cloned()
                .ok_or_else(|| CatalogError::NotFound("no artists".to_string()))
        }

        async fn get_album_tracks(&self, name: &str) -> Result<Vec<TrackRecord>, CatalogError> {
            Ok(self.albums.get(name).cloned().unwrap_or_default())
        }

        async fn get_artist_tracks(&self, name: &str) -> Result<Vec<TrackRecord>, CatalogError> {
            Ok(self.artists.get(name).cloned().unwrap_or_default())
        }
    }

    #[tokio::test]
    async fn scheduled_tracks_play_fifo_with_history() {
        let mut q = Sequencer::new(FakeSource::default(), Policy::QueueOnly);
        q.append(track("A"));
        q.extend([track("B"), track("C")]);

        assert_eq!(q.next().await.unwrap().file_path, "A");
        assert_eq!(q.next().await.unwrap().file_path, "B");
        assert_eq!(q.previous().unwrap().file_path, "A");
        assert_eq!(q.previous().unwrap().file_path, "A");
        assert_eq!(q.next().await.unwrap().file_path, "B");
        assert_eq!(q.next().await.unwrap().file_path, "C");
        assert!(matches!(q.next().await, Err(QueueError::EndOfQueue)));
        assert_eq!(q.current().unwrap().file_path, "C");
        assert_eq!(paths(q.history().iter()), vec!["A", "B"]);
    }

    #[tokio::test]
    async fn previous_before_first_next_is_a_noop() {
        let mut q = Sequencer::new(FakeSource::default(), Policy::QueueOnly);
        q.append(track("A"));
        assert!(q.previous().is_none());
        assert_eq!(paths(q.upcoming()), vec!["A"]);
    }

    #[tokio::test]
    async fn empty_queue_only_is_end_of_queue() {
        let mut q = Sequencer::new(FakeSource::default(), Policy::QueueOnly);
        assert!(matches!(q.next().await, Err(QueueError::EndOfQueue)));
        assert!(q.current().is_none());
        assert!(q.history().is_empty());
    }

    #[tokio::test]
    async fn album_shuffle_plays_whole_album_before_drawing_again() {
        let src = FakeSource::with_albums(&[("X", &["x1", "x2", "x3"])]);
        let mut q = Sequencer::new(src, Policy::AlbumShuffle);

        let mut played = Vec::new();
        for _ in 0..3 {
            played.push(q.next().await.unwrap().file_path);
        }
        assert_eq!(played, vec!["x1", "x2", "x3"]);
        assert_eq!(*q.source().draws.lock().unwrap(), 1);

        assert_eq!(q.next().await.unwrap().file_path, "x1");
        assert_eq!(*q.source().draws.lock().unwrap(), 2);
    }

    #[tokio::test]
    async fn scheduled_track_preempts_mid_album_and_keeps_buffer() {
        let src = FakeSource::with_albums(&[("X", &["x1", "x2", "x3"])]);
        let mut q = Sequencer::new(src, Policy::AlbumShuffle);
        assert_eq!(q.next().await.unwrap().file_path, "x1");

        q.append(track("manual"));
        assert_eq!(paths(q.upcoming()), vec!["manual", "x2", "x3"]);
        assert_eq!(q.next().await.unwrap().file_path, "manual");
        assert_eq!(q.next().await.unwrap().file_path, "x2");
        assert_eq!(q.next().await.unwrap().file_path, "x3");
        assert_eq!(*q.source().draws.lock().unwrap(), 1);
    }

    #[tokio::test]
    async fn set_policy_clears_dynamic_buffer() {
        let src = FakeSource::with_albums(&[("X", &["x1", "x2", "x3"])]);
        let mut q = Sequencer::new(src, Policy::AlbumShuffle);
        q.next().await.unwrap();
        assert_eq!(q.upcoming().count(), 2);

        q.set_policy(Policy::QueueOnly);
        assert_eq!(q.upcoming().count(), 0);
        assert!(matches!(q.next().await, Err(QueueError::EndOfQueue)));
        assert_eq!(q.current().unwrap().file_path, "x1");
    }

    #[tokio::test]
    async fn switching_album_to_track_shuffle_never_replays_album_lookahead() {
        let src = FakeSource::with_albums(&[("X", &["x1", "x2", "x3"]), ("Y", &["y1"])]);
        let mut q = Sequencer::new(src, Policy::AlbumShuffle);
        assert_eq!(q.next().await.unwrap().file_path, "x1");
        assert_eq!(paths(q.upcoming()), vec!["x2", "x3"]);

        q.set_policy(Policy::TrackShuffle);
        assert_eq!(q.upcoming().count(), 0);

        for expected_draws in 1..=3 {
            q.next().await.unwrap();
            assert_eq!(q.source().track_draws(), expected_draws);
            assert_eq!(q.upcoming().count(), 0);
        }
    }

    #[tokio::test]
    async fn track_shuffle_buffers_one_track_at_a_time() {
        let src = FakeSource::with_albums(&[("X", &["x1", "x2"])]);
        let mut q = Sequencer::new(src, Policy::TrackShuffle);
        assert_eq!(q.next().await.unwrap().file_path, "x1");
        assert_eq!(q.upcoming().count(), 0);
        assert_eq!(q.next().await.unwrap().file_path, "x2");
        assert_eq!(paths(q.history().iter()), vec!["x1"]);
    }

    #[tokio::test]
    async fn artist_shuffle_plays_every_track_of_one_artist() {
        let src = FakeSource::with_artists(&[("Ann", &["a1", "a2", "a3"]), ("Bob", &["b1"])]);
        let mut q = Sequencer::new(src, Policy::ArtistShuffle);

        assert_eq!(q.next().await.unwrap().file_path, "a1");
        assert_eq!(paths(q.upcoming()), vec!["a2", "a3"]);
        assert_eq!(q.next().await.unwrap().file_path, "a2");
        assert_eq!(q.next().await.unwrap().file_path, "a3");
        assert_eq!(*q.source().draws.lock().unwrap(), 1);

        assert_eq!(q.next().await.unwrap().file_path, "b1");
        assert_eq!(*q.source().draws.lock().unwrap(), 2);
        assert_eq!(paths(q.history().iter()), vec!["a1", "a2", "a3"]);
    }

    #[tokio::test]
    async fn artist_shuffle_with_no_artists_is_not_found() {
        let src = FakeSource::with_albums(&[("X", &["x1"])]);
        let mut q = Sequencer::new(src, Policy::ArtistShuffle);
        assert!(matches!(
            q.next().await,
            Err(QueueError::Catalog(CatalogError::NotFound(_)))
        ));
    }

    #[tokio::test]
    async fn failed_refill_leaves_state_untouched() {
        let mut src = FakeSource::with_albums(&[("X", &["x1"])]);
        src.fail = true;
        let mut q = Sequencer::new(src, Policy::AlbumShuffle);
        q.append(track("A"));
        assert_eq!(q.next().await.unwrap().file_path, "A");

        assert!(q.next().await.is_err());
        assert_eq!(q.current().unwrap().file_path, "A");
        assert!(q.history().is_empty());
    }

    #[test]
    fn policy_cycles_through_all_variants() {
        let mut p = Policy::QueueOnly;
        let mut seen = Vec::new();
        for _ in 0..4 {
            seen.push(p);
            p = p.cycle();
        }
        assert_eq!(seen, Policy::ALL.to_vec());
        assert_eq!(p, Policy::QueueOnly);
    }
}
