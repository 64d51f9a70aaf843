use std::{
    sync::Arc,
    time::{Duration, Instant},
};

use anyhow::anyhow;
use handlebars::{no_escape, Handlebars};
use serde_json::json;
use tokio::time::{interval, timeout, MissedTickBehavior};
use tracing::{debug, info, trace, warn};

use crate::{
    config::LyricsyncConfig,
    engine::SyncEngine,
    event::{StatusEvent, TrackMetadata, UserInput},
    lyrics::{
        provider::{LyricsPayload, LyricsQuery, ProviderCascade},
        LyricSet,
    },
    playback::{PlaybackSnapshot, PlaybackSource},
};

const SONG_LABEL: &str = "song_label";

/// Result of a background lyric lookup, tagged with the track it was started for.
#[derive(Debug)]
struct FetchedLyrics {
    track_id: String,
    payload: Option<LyricsPayload>,
}

/// Owns the [`SyncEngine`] and feeds it samples, timer ticks, user input and fetched lyrics.
pub struct Session {
    engine: SyncEngine,
    cascade: Arc<ProviderCascade>,
    config: Arc<LyricsyncConfig>,
    labels: Handlebars<'static>,
    status_tx: flume::Sender<StatusEvent>,
    input_rx: flume::Receiver<UserInput>,
    current_track: Option<TrackMetadata>,
    song_label: String,
    started: Instant,
}

impl Session {
    pub fn new(
        cascade: ProviderCascade,
        config: Arc<LyricsyncConfig>,
        status_tx: flume::Sender<StatusEvent>,
        input_rx: flume::Receiver<UserInput>,
    ) -> anyhow::Result<Self> {
        let mut labels = Handlebars::new();
        labels.register_escape_fn(no_escape);
        labels.register_template_string(SONG_LABEL, &config.display.song_label_format)?;
        Ok(Self {
            engine: SyncEngine::new(config.timing.engine_settings()),
            cascade: Arc::new(cascade),
            config,
            labels,
            status_tx,
            input_rx,
            current_track: None,
            song_label: String::new(),
            started: Instant::now(),
        })
    }

    /// Runs until the user quits or the render target goes away.
    ///
    /// The source is polled on its own task, so user input and timers are
    /// serviced while a request is in flight.
    pub async fn run<P: PlaybackSource + 'static>(mut self, source: P) -> anyhow::Result<()> {
        let (lyrics_tx, lyrics_rx) = flume::unbounded::<FetchedLyrics>();
        let (snapshot_tx, snapshot_rx) = flume::unbounded::<PlaybackSnapshot>();

        let poller = tokio::spawn(run_poller(
            source,
            Duration::from_millis(self.config.timing.poll_interval_ms),
            Duration::from_millis(self.config.timing.poll_timeout_ms),
            snapshot_tx,
        ));
        let mut tick = interval(Duration::from_millis(self.config.timing.tick_ms));
        tick.set_missed_tick_behavior(MissedTickBehavior::Skip);

        self.emit(self.engine.snapshot_events())?;

        let result = loop {
            let step = tokio::select! {
                Ok(snapshot) = snapshot_rx.recv_async() => self.on_snapshot(snapshot, &lyrics_tx),
                _ = tick.tick() => {
                    let events = self.engine.tick(self.now_ms());
                    self.emit(events)
                }
                input = self.input_rx.recv_async() => match input {
                    Ok(UserInput::Quit) | Err(_) => break Ok(()),
                    Ok(input) => {
                        trace!(?input, "user input");
                        let events = self.engine.handle_input(input, self.now_ms());
                        self.emit(events)
                    }
                },
                Ok(fetched) = lyrics_rx.recv_async() => self.on_lyrics_fetched(fetched),
            };
            if let Err(e) = step {
                break Err(e);
            }
        };

        poller.abort();
        info!("session finished");
        result
    }

    fn on_snapshot(
        &mut self,
        snapshot: PlaybackSnapshot,
        lyrics_tx: &flume::Sender<FetchedLyrics>,
    ) -> anyhow::Result<()> {
        let is_new_track = self
            .current_track
            .as_ref()
            .map_or(true, |current| current.track_id != snapshot.track.track_id);
        if is_new_track {
            self.begin_track(snapshot.track, lyrics_tx)?;
        }
        let events = self.engine.on_sample(snapshot.sample, self.now_ms());
        self.emit(events)
    }

    fn begin_track(
        &mut self,
        track: TrackMetadata,
        lyrics_tx: &flume::Sender<FetchedLyrics>,
    ) -> anyhow::Result<()> {
        info!(track = %track.track_name, artists = %track.track_artists, "new track");
        self.song_label = self.render_label(&track);
        self.emit([StatusEvent::NewTrack {
            metadata: track.clone(),
        }])?;
        let placeholder = self.engine.load_lyrics(self.song_label.clone(), LyricSet::empty());
        self.emit([placeholder])?;

        let cascade = self.cascade.clone();
        let query = LyricsQuery::for_track(&track);
        let track_id = track.track_id.clone();
        let tx = lyrics_tx.clone();
        tokio::spawn(async move {
            let payload = cascade.search(&query).await;
            // the session may already be gone
            let _ = tx.send(FetchedLyrics { track_id, payload });
        });

        self.current_track = Some(track);
        Ok(())
    }

    fn on_lyrics_fetched(&mut self, fetched: FetchedLyrics) -> anyhow::Result<()> {
        let current = self.current_track.as_ref().map(|it| it.track_id.as_str());
        if current != Some(fetched.track_id.as_str()) {
            debug!(track_id = %fetched.track_id, "discarding lyrics for a previous track");
            return Ok(());
        }
        let lyrics = match fetched.payload {
            Some(payload) => {
                let lyrics = LyricSet::from_payload(payload, self.config.lyrics.max_plain_lines);
                if lyrics.is_empty() {
                    info!("lyrics had no displayable lines");
                }
                lyrics
            }
            None => {
                info!("no lyrics found");
                LyricSet::empty()
            }
        };
        let event = self.engine.load_lyrics(self.song_label.clone(), lyrics);
        self.emit([event])
    }

    fn render_label(&self, track: &TrackMetadata) -> String {
        let data = json!({
            "title": track.track_name,
            "artist": track.track_artists,
            "album": track.track_album,
        });
        self.labels.render(SONG_LABEL, &data).unwrap_or_else(|e| {
            warn!("song label template failed: {e}");
            format!("{} - {}", track.track_name, track.track_artists)
        })
    }

    fn now_ms(&self) -> u64 {
        self.started.elapsed().as_millis() as u64
    }

    fn emit(&self, events: impl IntoIterator<Item = StatusEvent>) -> anyhow::Result<()> {
        for event in events {
            self.status_tx
                .send(event)
                .map_err(|_| anyhow!("render target disconnected"))?;
        }
        Ok(())
    }
}

/// Polls `source` every `period` and forwards what it reports until the session hangs up.
async fn run_poller<P: PlaybackSource>(
    mut source: P,
    period: Duration,
    limit: Duration,
    snapshot_tx: flume::Sender<PlaybackSnapshot>,
) {
    let mut poll = interval(period);
    poll.set_missed_tick_behavior(MissedTickBehavior::Delay);
    while !snapshot_tx.is_disconnected() {
        poll.tick().await;
        if let Some(snapshot) = poll_once(&mut source, limit).await {
            if snapshot_tx.send_async(snapshot).await.is_err() {
                break;
            }
        }
    }
    debug!("poller stopped");
}

/// A failed or timed out poll is a skipped tick, never an error.
async fn poll_once<P: PlaybackSource>(source: &mut P, limit: Duration) -> Option<PlaybackSnapshot> {
    match timeout(limit, source.poll()).await {
        Ok(Ok(snapshot)) => snapshot,
        Ok(Err(e)) => {
            warn!("playback poll failed: {e:#}");
            None
        }
        Err(_) => {
            debug!(timeout_ms = limit.as_millis() as u64, "playback poll timed out");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;

    use super::*;
    use crate::{
        config::DEFAULT_CONFIG,
        engine::{visibility::Visibility, PlaybackSample},
        error::LyricsError,
        lyrics::provider::{LyricsBody, LyricsProvider},
    };

    struct ScriptedSource {
        snapshots: VecDeque<anyhow::Result<Option<PlaybackSnapshot>>>,
    }

    #[async_trait::async_trait]
    impl PlaybackSource for ScriptedSource {
        async fn poll(&mut self) -> anyhow::Result<Option<PlaybackSnapshot>> {
            self.snapshots.pop_front().unwrap_or(Ok(None))
        }
    }

    struct StaticProvider;

    #[async_trait::async_trait]
    impl LyricsProvider for StaticProvider {
        fn name(&self) -> &str {
            "static"
        }

        async fn fetch(&self, _query: &LyricsQuery) -> Result<Option<LyricsBody>, LyricsError> {
            Ok(Some(LyricsBody::Synced("[00:00.00]one\n[00:01.00]two\n[00:02.00]three".to_owned())))
        }
    }

    fn snapshot(sequence: u64, elapsed_ms: u64) -> PlaybackSnapshot {
        PlaybackSnapshot {
            track: TrackMetadata {
                track_id: "track-1".to_owned(),
                track_name: "Song".to_owned(),
                track_artists: "Artist & Band".to_owned(),
                track_album: "Album".to_owned(),
                duration_ms: 180_000,
            },
            sample: PlaybackSample {
                sequence,
                elapsed_ms,
                duration_ms: 180_000,
                is_playing: true,
                latency_ms: 0,
            },
        }
    }

    struct SlowSource {
        delay: Duration,
        sequence: u64,
    }

    #[async_trait::async_trait]
    impl PlaybackSource for SlowSource {
        async fn poll(&mut self) -> anyhow::Result<Option<PlaybackSnapshot>> {
            tokio::time::sleep(self.delay).await;
            self.sequence += 1;
            Ok(Some(snapshot(self.sequence, self.sequence * 1000)))
        }
    }

    fn scripted(snapshots: Vec<anyhow::Result<Option<PlaybackSnapshot>>>) -> ScriptedSource {
        ScriptedSource {
            snapshots: snapshots.into(),
        }
    }

    async fn session() -> (Session, flume::Receiver<StatusEvent>, flume::Sender<UserInput>) {
        let config = LyricsyncConfig::read_from_str(DEFAULT_CONFIG, std::path::Path::new("."))
            .await
            .unwrap();
        let (status_tx, status_rx) = flume::unbounded();
        let (input_tx, input_rx) = flume::unbounded();
        let session = Session::new(
            ProviderCascade::new(vec![Box::new(StaticProvider) as Box<dyn LyricsProvider>], 50),
            Arc::new(config),
            status_tx,
            input_rx,
        )
        .unwrap();
        (session, status_rx, input_tx)
    }

    const POLL_LIMIT: Duration = Duration::from_millis(2000);

    #[tokio::test]
    async fn new_track_emits_placeholder_then_fetched_lyrics() {
        let (mut session, status_rx, _input_tx) = session().await;
        let mut source = scripted(vec![Ok(Some(snapshot(1, 1500)))]);
        let (lyrics_tx, lyrics_rx) = flume::unbounded();

        let snapshot = poll_once(&mut source, POLL_LIMIT).await.unwrap();
        session.on_snapshot(snapshot, &lyrics_tx).unwrap();
        let fetched = lyrics_rx.recv_async().await.unwrap();
        session.on_lyrics_fetched(fetched).unwrap();

        let events = status_rx.drain().collect::<Vec<_>>();
        assert!(matches!(events[0], StatusEvent::NewTrack { .. }));
        assert_eq!(
            events[1],
            StatusEvent::NewLyrics {
                song_label: "Song - Artist & Band".to_owned(),
                lines: vec![],
                is_synchronized: false,
                source_label: None,
            }
        );
        assert!(events.contains(&StatusEvent::VisibilityChanged {
            visibility: Visibility::Visible
        }));
        assert_eq!(
            events.last(),
            Some(&StatusEvent::NewLyrics {
                song_label: "Song - Artist & Band".to_owned(),
                lines: vec!["one".to_owned(), "two".to_owned(), "three".to_owned()],
                is_synchronized: true,
                source_label: Some("static".to_owned()),
            })
        );
    }

    #[tokio::test]
    async fn stale_lyrics_are_discarded() {
        let (mut session, status_rx, _input_tx) = session().await;
        session
            .on_lyrics_fetched(FetchedLyrics {
                track_id: "old".to_owned(),
                payload: None,
            })
            .unwrap();
        assert!(status_rx.is_empty());
    }

    #[tokio::test]
    async fn failed_polls_keep_engine_state() {
        let (mut session, status_rx, _input_tx) = session().await;
        let (lyrics_tx, lyrics_rx) = flume::unbounded();
        let mut source = scripted(vec![
            Ok(Some(snapshot(1, 1500))),
            Err(anyhow!("network down")),
            Ok(None),
        ]);

        let accepted = poll_once(&mut source, POLL_LIMIT).await.unwrap();
        session.on_snapshot(accepted, &lyrics_tx).unwrap();
        session
            .on_lyrics_fetched(lyrics_rx.recv_async().await.unwrap())
            .unwrap();
        session.engine.on_sample(snapshot(2, 1500).sample, session.now_ms());
        let before = session.engine.timing_state();
        assert_eq!(before.current_line_index, 1);
        status_rx.drain().for_each(drop);

        assert!(poll_once(&mut source, POLL_LIMIT).await.is_none());
        assert!(poll_once(&mut source, POLL_LIMIT).await.is_none());
        assert_eq!(session.engine.timing_state(), before);
        assert!(session.engine.tick(session.now_ms()).is_empty());
        assert!(status_rx.is_empty());
    }

    #[tokio::test]
    async fn poller_forwards_only_successful_polls() {
        let source = scripted(vec![Err(anyhow!("network down")), Ok(Some(snapshot(7, 100)))]);
        let (snapshot_tx, snapshot_rx) = flume::unbounded();
        let poller = tokio::spawn(run_poller(
            source,
            Duration::from_millis(10),
            POLL_LIMIT,
            snapshot_tx,
        ));

        let received = snapshot_rx.recv_async().await.unwrap();
        assert_eq!(received.sample.sequence, 7);
        poller.abort();
    }

    #[tokio::test]
    async fn slow_polls_do_not_delay_input() {
        let (session, status_rx, input_tx) = session().await;
        let source = SlowSource {
            delay: Duration::from_millis(1500),
            sequence: 0,
        };
        let task = tokio::spawn(session.run(source));

        tokio::time::sleep(Duration::from_millis(50)).await;
        let pressed = Instant::now();
        input_tx.send(UserInput::OffsetIncrease).unwrap();
        let changed = timeout(Duration::from_millis(500), async {
            loop {
                if let StatusEvent::OffsetChanged {
                    offset_ms: 250,
                    transient: true,
                } = status_rx.recv_async().await.unwrap()
                {
                    break;
                }
            }
        })
        .await;
        assert!(changed.is_ok(), "offset change took {:?}", pressed.elapsed());

        input_tx.send(UserInput::Quit).unwrap();
        task.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn quit_input_ends_the_session() {
        let (session, status_rx, input_tx) = session().await;
        input_tx.send(UserInput::Quit).unwrap();
        session.run(scripted(vec![])).await.unwrap();
        assert_eq!(
            status_rx.recv().unwrap(),
            StatusEvent::OffsetChanged {
                offset_ms: 0,
                transient: false,
            }
        );
    }
}
