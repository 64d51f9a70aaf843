use std::time::Instant;

use rspotify::{model::PlayableItem, prelude::*, AuthCodePkceSpotify};
use tracing::trace;

use crate::{engine::PlaybackSample, event::TrackMetadata};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlaybackSnapshot {
    pub track: TrackMetadata,
    pub sample: PlaybackSample,
}

/// Source of playback samples. `Ok(None)` means nothing is playing.
#[async_trait::async_trait]
pub trait PlaybackSource: Send {
    async fn poll(&mut self) -> anyhow::Result<Option<PlaybackSnapshot>>;
}

/// Polls the Spotify "currently playing" endpoint, timing each round trip.
pub struct SpotifyPlayback {
    spotify: AuthCodePkceSpotify,
    sequence: u64,
}

impl SpotifyPlayback {
    pub fn new(spotify: AuthCodePkceSpotify) -> Self {
        Self {
            spotify,
            sequence: 0,
        }
    }
}

#[async_trait::async_trait]
impl PlaybackSource for SpotifyPlayback {
    async fn poll(&mut self) -> anyhow::Result<Option<PlaybackSnapshot>> {
        self.spotify.auto_reauth().await?;

        let started = Instant::now();
        let context = self
            .spotify
            .current_playing(None, None::<Vec<_>>)
            .await?;
        let latency_ms = started.elapsed().as_millis() as u64;
        trace!(latency_ms, "polled Spotify");

        let Some(context) = context else {
            return Ok(None);
        };
        let Some(PlayableItem::Track(track)) = context.item else {
            return Ok(None);
        };

        let duration_ms = track.duration.num_milliseconds().max(0) as u64;
        let metadata = TrackMetadata {
            // local files have no id
            track_id: track
                .id
                .as_ref()
                .map(|id| id.id().to_owned())
                .unwrap_or_else(|| format!("local:{}", track.name)),
            track_artists: track
                .artists
                .iter()
                .map(|it| it.name.as_str())
                .collect::<Vec<_>>()
                .join(", "),
            track_album: track.album.name,
            track_name: track.name,
            duration_ms,
        };

        self.sequence += 1;
        let sample = PlaybackSample {
            sequence: self.sequence,
            elapsed_ms: context
                .progress
                .map(|it| it.num_milliseconds().max(0) as u64)
                .unwrap_or_default(),
            duration_ms,
            is_playing: context.is_playing,
            latency_ms,
        };
        Ok(Some(PlaybackSnapshot {
            track: metadata,
            sample,
        }))
    }
}
