//! Lyric lookups against remote providers.
//!
//! Providers are tried in order by [`ProviderCascade`], each with a cleaned,
//! the original and a simplified version of the query. The first usable
//! payload wins and every failure along the way is logged and skipped.

use std::time::Duration;

use lazy_static::lazy_static;
use regex::Regex;
use reqwest::{Client, StatusCode, Url};
use serde::Deserialize;
use tracing::{debug, info, warn};

use crate::{config::LyricsConfiguration, error::LyricsError, event::TrackMetadata};

use super::lrc;

lazy_static! {
    static ref PARENTHESISED: Regex = Regex::new(r"\(.*?\)").unwrap();
    static ref BRACKETED: Regex = Regex::new(r"\[.*?\]").unwrap();
    static ref FEATURING: Regex = Regex::new(r"(?i)(feat|ft)\..*$").unwrap();
    static ref WHITESPACE: Regex = Regex::new(r"\s+").unwrap();
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LyricsQuery {
    pub artist: String,
    pub title: String,
    pub duration_ms: u64,
}

impl LyricsQuery {
    pub fn for_track(track: &TrackMetadata) -> Self {
        Self {
            artist: track.track_artists.clone(),
            title: track.track_name.clone(),
            duration_ms: track.duration_ms,
        }
    }

    /// Strips parenthesised/bracketed segments and featured artists.
    pub fn cleaned(&self) -> Self {
        Self {
            artist: clean_search_term(&self.artist),
            title: clean_search_term(&self.title),
            duration_ms: self.duration_ms,
        }
    }

    /// Main artist only, title up to the first `(` or `[`.
    pub fn simplified(&self) -> Self {
        let artist = self.artist.split(',').next().unwrap_or_default();
        let artist = artist.split("feat").next().unwrap_or_default();
        let artist = artist.split("ft.").next().unwrap_or_default();
        let title = self.title.split(['(', '[']).next().unwrap_or_default();
        Self {
            artist: artist.trim().to_owned(),
            title: title.trim().to_owned(),
            duration_ms: self.duration_ms,
        }
    }

    fn is_blank(&self) -> bool {
        self.artist.is_empty() || self.title.is_empty()
    }
}

pub fn clean_search_term(term: &str) -> String {
    let term = PARENTHESISED.replace_all(term, "");
    let term = BRACKETED.replace_all(&term, "");
    let term = FEATURING.replace(&term, "");
    WHITESPACE.replace_all(&term, " ").trim().to_owned()
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LyricsBody {
    Synced(String),
    Plain(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LyricsPayload {
    pub body: LyricsBody,
    /// Label of the provider that produced this payload.
    pub source: String,
}

#[async_trait::async_trait]
pub trait LyricsProvider: Send + Sync {
    fn name(&self) -> &str;

    /// `Ok(None)` when the provider simply has no lyrics for the query.
    async fn fetch(&self, query: &LyricsQuery) -> Result<Option<LyricsBody>, LyricsError>;
}

pub struct ProviderCascade {
    providers: Vec<Box<dyn LyricsProvider>>,
    min_plain_chars: usize,
}

impl ProviderCascade {
    pub fn new(providers: Vec<Box<dyn LyricsProvider>>, min_plain_chars: usize) -> Self {
        Self {
            providers,
            min_plain_chars,
        }
    }

    pub fn from_config(config: &LyricsConfiguration) -> anyhow::Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_millis(config.request_timeout_ms))
            .user_agent(concat!("lyricsync/", env!("CARGO_PKG_VERSION")))
            .build()?;
        let providers: Vec<Box<dyn LyricsProvider>> = vec![
            Box::new(LrclibProvider::new(client.clone(), config.lrclib_url.clone())),
            Box::new(LyricsOvhProvider::new(client, config.lyrics_ovh_url.clone())),
        ];
        Ok(Self::new(providers, config.min_plain_chars))
    }

    pub async fn search(&self, query: &LyricsQuery) -> Option<LyricsPayload> {
        let mut variants: Vec<LyricsQuery> = Vec::with_capacity(3);
        for variant in [query.cleaned(), query.clone(), query.simplified()] {
            if !variant.is_blank() && !variants.contains(&variant) {
                variants.push(variant);
            }
        }

        for variant in &variants {
            for provider in &self.providers {
                debug!(provider = provider.name(), artist = %variant.artist, title = %variant.title, "querying lyrics");
                match provider.fetch(variant).await {
                    Ok(Some(body)) if self.is_usable(&body) => {
                        info!(provider = provider.name(), "found lyrics");
                        return Some(LyricsPayload {
                            body,
                            source: provider.name().to_owned(),
                        });
                    }
                    Ok(Some(_)) => debug!(provider = provider.name(), "discarding unusable lyrics"),
                    Ok(None) => debug!(provider = provider.name(), "no lyrics"),
                    Err(e) => warn!(provider = provider.name(), "lyrics lookup failed: {e}"),
                }
            }
        }
        None
    }

    fn is_usable(&self, body: &LyricsBody) -> bool {
        match body {
            LyricsBody::Synced(blob) => !lrc::parse(blob).is_empty(),
            LyricsBody::Plain(blob) => {
                let trimmed = blob.trim();
                !trimmed.is_empty() && trimmed.chars().count() >= self.min_plain_chars
            }
        }
    }
}

/// LRCLIB-style `api/get` endpoint, preferring synchronized lyrics.
pub struct LrclibProvider {
    client: Client,
    base_url: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LrclibRecord {
    synced_lyrics: Option<String>,
    plain_lyrics: Option<String>,
}

impl LrclibProvider {
    pub fn new(client: Client, base_url: String) -> Self {
        Self { client, base_url }
    }
}

#[async_trait::async_trait]
impl LyricsProvider for LrclibProvider {
    fn name(&self) -> &str {
        "LRCLIB"
    }

    async fn fetch(&self, query: &LyricsQuery) -> Result<Option<LyricsBody>, LyricsError> {
        let url = endpoint(&self.base_url, &["api", "get"])?;
        let duration = (query.duration_ms / 1000).to_string();
        let resp = self
            .client
            .get(url)
            .query(&[
                ("artist_name", query.artist.as_str()),
                ("track_name", query.title.as_str()),
                ("duration", duration.as_str()),
            ])
            .send()
            .await?;
        if resp.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !resp.status().is_success() {
            return Err(LyricsError::Status(resp.status()));
        }
        let record = resp.json::<LrclibRecord>().await?;
        let body = match (record.synced_lyrics, record.plain_lyrics) {
            (Some(synced), _) if !synced.trim().is_empty() => Some(LyricsBody::Synced(synced)),
            (_, Some(plain)) if !plain.trim().is_empty() => Some(LyricsBody::Plain(plain)),
            _ => None,
        };
        Ok(body)
    }
}

/// lyrics.ovh-style `v1/{artist}/{title}` endpoint. Plain text only.
pub struct LyricsOvhProvider {
    client: Client,
    base_url: String,
}

#[derive(Debug, Deserialize)]
struct LyricsOvhRecord {
    lyrics: Option<String>,
}

impl LyricsOvhProvider {
    pub fn new(client: Client, base_url: String) -> Self {
        Self { client, base_url }
    }
}

#[async_trait::async_trait]
impl LyricsProvider for LyricsOvhProvider {
    fn name(&self) -> &str {
        "lyrics.ovh"
    }

    async fn fetch(&self, query: &LyricsQuery) -> Result<Option<LyricsBody>, LyricsError> {
        let url = endpoint(&self.base_url, &["v1", &query.artist, &query.title])?;
        let resp = self.client.get(url).send().await?;
        if resp.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !resp.status().is_success() {
            return Err(LyricsError::Status(resp.status()));
        }
        let record = resp.json::<LyricsOvhRecord>().await?;
        Ok(record
            .lyrics
            .map(|it| it.trim().to_owned())
            .filter(|it| !it.is_empty())
            .map(LyricsBody::Plain))
    }
}

/// Appends percent-encoded path segments to a base URL.
fn endpoint(base_url: &str, segments: &[&str]) -> Result<Url, LyricsError> {
    let mut url = Url::parse(base_url).map_err(|e| LyricsError::InvalidUrl(format!("{base_url}: {e}")))?;
    url.path_segments_mut()
        .map_err(|_| LyricsError::InvalidUrl(base_url.to_owned()))?
        .pop_if_empty()
        .extend(segments);
    Ok(url)
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use super::*;

    struct FakeProvider {
        name: &'static str,
        answers: Mutex<Vec<Result<Option<LyricsBody>, LyricsError>>>,
        seen: Arc<Mutex<Vec<(&'static str, LyricsQuery)>>>,
    }

    impl FakeProvider {
        fn boxed(
            name: &'static str,
            answers: Vec<Result<Option<LyricsBody>, LyricsError>>,
            seen: &Arc<Mutex<Vec<(&'static str, LyricsQuery)>>>,
        ) -> Box<dyn LyricsProvider> {
            Box::new(Self {
                name,
                answers: Mutex::new(answers),
                seen: seen.clone(),
            })
        }
    }

    #[async_trait::async_trait]
    impl LyricsProvider for FakeProvider {
        fn name(&self) -> &str {
            self.name
        }

        async fn fetch(&self, query: &LyricsQuery) -> Result<Option<LyricsBody>, LyricsError> {
            self.seen.lock().unwrap().push((self.name, query.clone()));
            let mut answers = self.answers.lock().unwrap();
            if answers.is_empty() {
                Ok(None)
            } else {
                answers.remove(0)
            }
        }
    }

    fn query() -> LyricsQuery {
        LyricsQuery {
            artist: "Main Artist, Other feat. Guest".to_owned(),
            title: "Song Title (Remastered 2011) [Live]".to_owned(),
            duration_ms: 215_000,
        }
    }

    fn long_plain() -> LyricsBody {
        LyricsBody::Plain("a line of lyrics that is certainly long enough to count\nmore".to_owned())
    }

    #[test]
    fn cleans_search_terms() {
        assert_eq!(clean_search_term("Song (Remix)  [Live]   Edit"), "Song Edit");
        assert_eq!(clean_search_term("Artist Feat. Someone"), "Artist");
        assert_eq!(clean_search_term("Artist ft. Someone"), "Artist");
        assert_eq!(clean_search_term("  plain  "), "plain");
    }

    #[test]
    fn simplifies_queries() {
        let simplified = query().simplified();
        assert_eq!(simplified.artist, "Main Artist");
        assert_eq!(simplified.title, "Song Title");
        assert_eq!(simplified.duration_ms, 215_000);
    }

    #[tokio::test]
    async fn first_usable_payload_wins() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let cascade = ProviderCascade::new(
            vec![
                FakeProvider::boxed("broken", vec![Err(LyricsError::InvalidUrl("x".to_owned()))], &seen),
                FakeProvider::boxed("good", vec![Ok(Some(long_plain()))], &seen),
            ],
            50,
        );
        let payload = cascade.search(&query()).await.expect("lyrics");
        assert_eq!(payload.source, "good");
        assert_eq!(payload.body, long_plain());

        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 2);
        assert_eq!(seen[0].1, query().cleaned());
    }

    #[tokio::test]
    async fn short_plain_and_unparseable_synced_are_skipped() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let cascade = ProviderCascade::new(
            vec![FakeProvider::boxed(
                "only",
                vec![
                    Ok(Some(LyricsBody::Plain("too short".to_owned()))),
                    Ok(Some(LyricsBody::Synced("no timestamps here".to_owned()))),
                    Ok(Some(LyricsBody::Synced("[00:01.00]finally".to_owned()))),
                ],
                &seen,
            )],
            50,
        );
        let payload = cascade.search(&query()).await.expect("lyrics");
        assert_eq!(payload.body, LyricsBody::Synced("[00:01.00]finally".to_owned()));

        // cleaned, original, simplified
        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 3);
        assert_eq!(seen[1].1, query());
        assert_eq!(seen[2].1, query().simplified());
    }

    #[tokio::test]
    async fn exhausted_cascade_yields_none() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let cascade = ProviderCascade::new(vec![FakeProvider::boxed("empty", vec![], &seen)], 50);
        assert_eq!(cascade.search(&query()).await, None);
    }

    #[test]
    fn endpoint_encodes_segments() {
        let url = endpoint("https://api.lyrics.ovh/", &["v1", "AC/DC", "Back In Black"]).unwrap();
        assert_eq!(url.as_str(), "https://api.lyrics.ovh/v1/AC%2FDC/Back%20In%20Black");
    }

    #[test]
    fn endpoint_rejects_bad_base() {
        assert!(matches!(endpoint("not a url", &["v1"]), Err(LyricsError::InvalidUrl(_))));
    }
}
