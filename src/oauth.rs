use std::path::PathBuf;

use anyhow::{anyhow, bail, Context};
use reqwest::Url;
use rspotify::{model::Token, prelude::*, scopes, AuthCodePkceSpotify, Config, Credentials, OAuth};
use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    net::{TcpListener, TcpStream},
};
use tracing::{debug, info, warn};

/// What a token read back from the cache is good for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CachedLogin {
    Ready,
    Refresh,
    Prompt,
}

fn cached_login(token: Option<&Token>) -> CachedLogin {
    match token {
        Some(token) if !token.is_expired() => CachedLogin::Ready,
        Some(token) if token.refresh_token.is_some() => CachedLogin::Refresh,
        _ => CachedLogin::Prompt,
    }
}

/// Logs in with the cached token at `cache_path` when it is still usable,
/// otherwise runs the PKCE authorization flow, capturing the redirect on a
/// local port. Fresh tokens are written back to `cache_path`.
pub async fn authorize(
    client_id: &str,
    redirect_port: u16,
    cache_path: PathBuf,
) -> anyhow::Result<AuthCodePkceSpotify> {
    if client_id.is_empty() {
        bail!("No Spotify client id configured (set api.spotify_client_id or pass --client-id)");
    }
    if let Some(parent) = cache_path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    let creds = Credentials::new_pkce(client_id);
    let oauth = OAuth {
        redirect_uri: format!("http://localhost:{redirect_port}/callback"),
        scopes: scopes!("user-read-playback-state", "user-read-currently-playing"),
        ..Default::default()
    };
    let config = Config {
        token_cached: true,
        token_refreshing: true,
        cache_path,
        ..Default::default()
    };
    let mut spotify = AuthCodePkceSpotify::with_config(creds, oauth, config);

    // a missing or unreadable cache just means a fresh login
    let cached = spotify.read_token_cache(true).await.unwrap_or_else(|e| {
        debug!("no usable token cache: {e}");
        None
    });
    match cached_login(cached.as_ref()) {
        CachedLogin::Ready => {
            store_token(&spotify, cached).await?;
            info!("authorized with cached Spotify token");
            return Ok(spotify);
        }
        CachedLogin::Refresh => {
            store_token(&spotify, cached).await?;
            match spotify.refresh_token().await {
                Ok(()) => {
                    info!("refreshed cached Spotify token");
                    return Ok(spotify);
                }
                Err(e) => warn!("could not refresh cached token: {e}"),
            }
        }
        CachedLogin::Prompt => {}
    }

    let url = spotify.get_authorize_url(None)?;
    eprintln!("Authorize lyricsync in your browser: {url}");
    if let Err(e) = webbrowser::open(&url) {
        warn!("could not open browser: {e}");
    }

    let (code, state) = server_oneshot(redirect_port).await?;
    if state != spotify.get_oauth().state {
        bail!("OAuth state mismatch, refusing token exchange");
    }
    // also writes the token cache
    spotify.request_token(&code).await?;
    info!("authorized with Spotify");
    Ok(spotify)
}

async fn store_token(spotify: &AuthCodePkceSpotify, token: Option<Token>) -> anyhow::Result<()> {
    *spotify
        .get_token()
        .lock()
        .await
        .map_err(|_| anyhow!("could not lock the Spotify token"))? = token;
    Ok(())
}

async fn server_oneshot(port: u16) -> anyhow::Result<(String, String)> {
    let tcp_listener = TcpListener::bind(("127.0.0.1", port))
        .await
        .with_context(|| format!("binding OAuth callback listener on port {port}"))?;

    // Only accept a single successful callback
    while let Ok((client, _)) = tcp_listener.accept().await {
        match handle_client(client).await {
            Ok(val) => return Ok(val),
            Err(e) => warn!("ignoring OAuth callback: {e}"),
        }
    }

    bail!("Failed to accept OAuth connection!")
}

async fn handle_client(mut client: TcpStream) -> anyhow::Result<(String, String)> {
    let mut buf = vec![0u8; 4096];
    let read = client.read(&mut buf).await?;
    let request = String::from_utf8_lossy(&buf[..read]);
    let parsed = parse_callback(request.lines().next().unwrap_or_default());

    let body = if parsed.is_ok() {
        "Success! You may now close this window."
    } else {
        "Authorization failed. You may close this window."
    };
    let response = format!(
        "HTTP/1.1 200 OK\r\ncontent-length: {}\r\ncontent-type: text/plain\r\n\r\n{body}",
        body.len()
    );
    client.write_all(response.as_bytes()).await?;
    parsed
}

/// Extracts `code` and `state` from a request line such as
/// `GET /callback?code=...&state=... HTTP/1.1`.
fn parse_callback(request_line: &str) -> anyhow::Result<(String, String)> {
    let target = request_line
        .split_whitespace()
        .nth(1)
        .context("malformed request line")?;
    let url = Url::parse(&format!("http://localhost{target}"))
        .with_context(|| format!("malformed callback target {target}"))?;
    if url.path() != "/callback" {
        bail!("unexpected callback path {}", url.path());
    }

    let mut code = None;
    let mut state = None;
    for (key, value) in url.query_pairs() {
        match key.as_ref() {
            "code" => code = Some(value.into_owned()),
            "state" => state = Some(value.into_owned()),
            "error" => bail!("authorization denied: {value}"),
            _ => {}
        }
    }
    Ok((
        code.context("callback missing code")?,
        state.context("callback missing state")?,
    ))
}
