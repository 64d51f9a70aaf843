use std::path::{Path, PathBuf};

use anyhow::Context;
use home::home_dir;
use ratatui::style::Color;
use serde::{
    de::{DeserializeOwned, Visitor},
    Deserialize,
};
use tokio::io::AsyncReadExt;

use crate::engine::EngineSettings;

pub const DEFAULT_CONFIG: &str = include_str!("../config/default.toml");

#[derive(Debug, Clone)]
pub struct LyricsyncConfig {
    pub api: ApiConfiguration,
    pub timing: TimingConfiguration,
    pub lyrics: LyricsConfiguration,
    pub display: DisplayConfiguration,
    pub theme: ThemeConfiguration,
}

impl LyricsyncConfig {
    /// Loads `path`, or `~/.config/lyricsync/config.toml` falling back to the
    /// built-in defaults when that file does not exist.
    pub async fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        let config_dir = config_dir()?;
        let str = match path {
            Some(path) => tokio::fs::read_to_string(path)
                .await
                .with_context(|| format!("reading config {}", path.display()))?,
            None => {
                let default_path = config_dir.join("config.toml");
                if tokio::fs::try_exists(&default_path).await.unwrap_or(false) {
                    tokio::fs::read_to_string(&default_path).await?
                } else {
                    DEFAULT_CONFIG.to_owned()
                }
            }
        };
        Self::read_from_str(&str, &config_dir).await
    }

    pub async fn read_from_str(str: &str, config_dir: &Path) -> anyhow::Result<Self> {
        let unresolved = toml::from_str::<LyricsyncConfigUnresolved>(str)?;
        let api = unresolved.api.resolve(config_dir).await?;
        let timing = unresolved.timing.resolve(config_dir).await?;
        let lyrics = unresolved.lyrics.resolve(config_dir).await?;
        let display = unresolved.display.resolve(config_dir).await?;
        let theme = unresolved.theme.resolve(config_dir).await?;
        Ok(Self {
            api,
            timing,
            lyrics,
            display,
            theme,
        })
    }
}

pub fn config_dir() -> anyhow::Result<PathBuf> {
    let home = home_dir().context("could not determine home directory")?;
    Ok(home.join(".config").join("lyricsync"))
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfiguration {
    pub spotify_client_id: String,
    pub redirect_port: u16,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TimingConfiguration {
    pub poll_interval_ms: u64,
    pub poll_timeout_ms: u64,
    pub tick_ms: u64,
    pub initial_offset_ms: i64,
    pub hide_delay_ms: u64,
    pub feedback_ms: u64,
}

impl TimingConfiguration {
    pub fn engine_settings(&self) -> EngineSettings {
        EngineSettings {
            initial_offset_ms: self.initial_offset_ms,
            hide_delay_ms: self.hide_delay_ms,
            feedback_ms: self.feedback_ms,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct LyricsConfiguration {
    pub lrclib_url: String,
    pub lyrics_ovh_url: String,
    pub request_timeout_ms: u64,
    pub min_plain_chars: usize,
    pub max_plain_lines: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DisplayConfiguration {
    pub song_label_format: String,
    pub scroll_offset: u16,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ThemeConfiguration {
    pub inactive_text_color: ThemeColor,
    pub active_text_color: ThemeColor,
    pub border_color: ThemeColor,
    pub progress_color: ThemeColor,
    pub banner_color: ThemeColor,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(transparent)]
pub struct ThemeColor(pub Color);

impl<'de> Deserialize<'de> for ThemeColor {
    fn deserialize<D>(de: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        de.deserialize_str(ColorVisitor)
    }
}

struct ColorVisitor;

impl<'v> Visitor<'v> for ColorVisitor {
    type Value = ThemeColor;

    fn expecting(&self, formatter: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(formatter, "a color name or #rrggbb hex string")
    }

    fn visit_str<E>(self, v: &str) -> Result<Self::Value, E>
    where
        E: serde::de::Error,
    {
        if let Some(stripped) = v.strip_prefix('#') {
            let color_rgb = u32::from_str_radix(stripped, 16).map_err(|e| {
                serde::de::Error::custom(format!("Invalid hex string for color {e}"))
            })?;
            let r = (color_rgb & 0xFF0000) >> 16;
            let g = (color_rgb & 0x00FF00) >> 8;
            let b = color_rgb & 0x0000FF;
            Ok(ThemeColor(Color::Rgb(r as u8, g as u8, b as u8)))
        } else {
            v.parse::<Color>()
                .map_err(|e| serde::de::Error::custom(format!("Invalid named color format {e}")))
                .map(ThemeColor)
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
struct LyricsyncConfigUnresolved {
    api: MaybeLink<ApiConfiguration>,
    timing: MaybeLink<TimingConfiguration>,
    lyrics: MaybeLink<LyricsConfiguration>,
    display: MaybeLink<DisplayConfiguration>,
    theme: MaybeLink<ThemeConfiguration>,
}

/// A config section given either inline or as `{ include = "file.toml" }`
/// relative to the config directory.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum MaybeLink<V> {
    Explicit(V),
    Link { include: PathBuf },
}

impl<V: DeserializeOwned> MaybeLink<V> {
    async fn resolve(self, config_dir: &Path) -> anyhow::Result<V> {
        match self {
            MaybeLink::Explicit(value) => Ok(value),
            MaybeLink::Link { include } => {
                let path = config_dir.join(include);
                let mut file = tokio::fs::File::open(&path)
                    .await
                    .with_context(|| format!("opening included config {}", path.display()))?;
                let mut str = String::new();
                file.read_to_string(&mut str).await?;
                toml::from_str(&str).map_err(anyhow::Error::from)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn default_config_parses() {
        let config = LyricsyncConfig::read_from_str(DEFAULT_CONFIG, Path::new("."))
            .await
            .unwrap();
        assert_eq!(config.timing.poll_interval_ms, 500);
        assert_eq!(config.timing.engine_settings(), EngineSettings::default());
        assert_eq!(config.lyrics.max_plain_lines, 50);
        assert_eq!(config.theme.active_text_color, ThemeColor(Color::LightGreen));
        assert_eq!(config.theme.banner_color, ThemeColor(Color::Rgb(0xff, 0xaf, 0x00)));
    }

    #[tokio::test]
    async fn included_sections_resolve_against_config_dir() {
        let dir = std::env::temp_dir().join(format!("lyricsync-config-{}", std::process::id()));
        tokio::fs::create_dir_all(&dir).await.unwrap();
        tokio::fs::write(
            dir.join("timing.toml"),
            "poll_interval_ms = 250\npoll_timeout_ms = 1000\ntick_ms = 50\n\
             initial_offset_ms = -500\nhide_delay_ms = 10000\nfeedback_ms = 1500\n",
        )
        .await
        .unwrap();

        let start = DEFAULT_CONFIG.find("[timing]").unwrap();
        let end = DEFAULT_CONFIG.find("[lyrics]").unwrap();
        let source = format!(
            "timing = {{ include = \"timing.toml\" }}\n{}{}",
            &DEFAULT_CONFIG[..start],
            &DEFAULT_CONFIG[end..]
        );
        let config = LyricsyncConfig::read_from_str(&source, &dir).await.unwrap();
        assert_eq!(config.timing.poll_interval_ms, 250);
        assert_eq!(config.timing.initial_offset_ms, -500);

        tokio::fs::remove_dir_all(&dir).await.ok();
    }

    #[tokio::test]
    async fn rejects_bad_colors() {
        let source = DEFAULT_CONFIG.replace("\"lightgreen\"", "\"#zzzzzz\"");
        assert!(LyricsyncConfig::read_from_str(&source, Path::new(".")).await.is_err());
    }
}
