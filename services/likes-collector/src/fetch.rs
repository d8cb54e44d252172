//!
//! src/fetch.rs  Andrew Belles  Sept 14th, 2025
//!
//! Defines the remote collaborators the collector talks to (the music
//! session and the raw media transport) and their reqwest backed
//! implementations against the Yandex Music api
//!

use std::time::Duration;

use async_trait::async_trait;
use md5::{Digest, Md5};
use reqwest::{Client, StatusCode, header, redirect, RequestBuilder};
use scraper::{ElementRef, Html, Node, Selector};
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, warn};
use url::Url;

use crate::config::{HttpConfig, YandexConfig};
use crate::types::{FullTrack, LikedTrackRef, MediaCandidate};
use crate::CollectorError;

/// Salt the storage hosts expect when signing direct links
const SIGN_SALT: &str = "XGRlBW9FXlekgbPrRHuSiA";
const CLIENT_HEADER: &str = "x-yandex-music-client";
const CLIENT_HEADER_VALUE: &str = "YandexMusicAndroid/24023621";

///
/// Remote catalog as seen by the pipeline. One authenticated session,
/// used read-only for the whole run.
///
#[async_trait]
pub trait MusicSession: Send + Sync {
    /// Liked tracks of the session owner, in the order the remote returns them
    async fn liked_tracks(&self) -> Result<Vec<LikedTrackRef>, CollectorError>;

    async fn full_track(&self, id: &str) -> Result<FullTrack, CollectorError>;

    /// Playable encodings for a track, each with a directly fetchable url
    async fn media_candidates(&self, track: &FullTrack) ->
        Result<Vec<MediaCandidate>, CollectorError>;
}

/// Response body consumed chunk by chunk
#[async_trait]
pub trait BodyStream: Send {
    async fn next_chunk(&mut self) -> Result<Option<Vec<u8>>, CollectorError>;
}

#[async_trait]
pub trait MediaTransport: Send + Sync {
    async fn stream_get(&self, url: &str, timeout: Duration) ->
        Result<Box<dyn BodyStream>, CollectorError>;
}

/// Client building functionality
fn client_helper(http: &HttpConfig) -> reqwest::ClientBuilder {
    Client::builder()
        .timeout(http.timeout)
        .connect_timeout(http.connect_timeout)
        .redirect(redirect::Policy::limited(http.max_redirects as usize))
        .user_agent(http.user_agent.clone())
}

fn client_with_headers(http: &HttpConfig, headers: header::HeaderMap) ->
    Result<Client, CollectorError> {
    client_helper(http)
        .default_headers(headers)
        .build()
        .map_err(|e| CollectorError::Http(format!("build client: {e}")))
}

pub fn yandex_client(http: &HttpConfig, token: &str) -> Result<Client, CollectorError> {
    let mut h = header::HeaderMap::new();
    h.insert(header::ACCEPT, header::HeaderValue::from_static("application/json"));
    h.insert(CLIENT_HEADER, header::HeaderValue::from_static(CLIENT_HEADER_VALUE));

    let mut auth = header::HeaderValue::from_str(&format!("OAuth {token}"))
        .map_err(|_| CollectorError::Config(
            "session token contains invalid header characters".into()
        ))?;
    auth.set_sensitive(true);
    h.insert(header::AUTHORIZATION, auth);

    client_with_headers(http, h)
}

/// Pulls a readable message out of an error body, json or not
fn error_message(body: &str) -> String {
    if let Ok(v) = serde_json::from_str::<Value>(body) {
        let name = v.pointer("/error/name").and_then(Value::as_str);
        let message = v.pointer("/error/message").and_then(Value::as_str);
        match (name, message) {
            (Some(n), Some(m)) => return format!("{n}: {m}"),
            (Some(s), None) | (None, Some(s)) => return s.to_string(),
            _ => {}
        }
    }
    body.chars().take(200).collect()
}

/// Sends the request and unwraps the api `result` envelope
async fn api_result(request: RequestBuilder) -> Result<Value, CollectorError> {
    let response = request.send().await?;
    let status = response.status();

    if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
        let body = response.text().await.unwrap_or_default();
        return Err(CollectorError::Auth(
            format!("status {status}: {}", error_message(&body))
        ));
    }
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(CollectorError::Api {
            status: status.as_u16(),
            message: error_message(&body)
        });
    }

    let mut value: Value = response.json().await?;
    match value.get_mut("result").map(Value::take) {
        Some(result) if !result.is_null() => Ok(result),
        _ => Err(CollectorError::Parse("response missing result".into()))
    }
}

/// What a download-info document carries for signing a direct link
#[derive(Debug, PartialEq, Eq)]
struct DirectLinkParts {
    host: String,
    path: String,
    ts: String,
    s: String
}

/// Element text with entities decoded. The html parser keeps CDATA
/// sections as comments, their payload counts as text.
fn element_text(element: ElementRef<'_>) -> String {
    element.descendants()
        .filter_map(|node| match node.value() {
            Node::Text(text) => Some(&**text),
            Node::Comment(comment) => comment.strip_prefix("[CDATA[")
                .and_then(|c| c.strip_suffix("]]")),
            _ => None
        })
        .collect()
}

fn download_info_field(doc: &Html, tag: &str) -> Result<String, CollectorError> {
    let selector = Selector::parse(&format!("download-info > {tag}"))
        .map_err(|e| CollectorError::Parse(format!("selector for <{tag}>: {e:?}")))?;

    doc.select(&selector)
        .next()
        .map(|element| element_text(element).trim().to_string())
        .filter(|v| !v.is_empty())
        .ok_or_else(|| CollectorError::Parse(format!("download-info missing <{tag}>")))
}

fn parse_download_info(body: &str) -> Result<DirectLinkParts, CollectorError> {
    let doc = Html::parse_document(body);
    Ok( DirectLinkParts {
        host: download_info_field(&doc, "host")?,
        path: download_info_field(&doc, "path")?,
        ts: download_info_field(&doc, "ts")?,
        s: download_info_field(&doc, "s")?
    })
}

fn sign_direct_link(host: &str, path: &str, ts: &str, s: &str) -> String {
    let unsigned = path.strip_prefix('/').unwrap_or(path);
    let sign = Md5::digest(format!("{SIGN_SALT}{unsigned}{s}").as_bytes());
    format!("https://{host}/get-mp3/{sign:x}/{ts}{path}")
}

fn direct_link_from_xml(body: &str) -> Result<String, CollectorError> {
    let parts = parse_download_info(body)?;
    Ok(sign_direct_link(&parts.host, &parts.path, &parts.ts, &parts.s))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DownloadInfo {
    codec: String,
    bitrate_in_kbps: u32,
    download_info_url: String
}

#[derive(Clone, Debug)]
pub struct YandexClient {
    pub http: Client,
    pub api_base: Url,
    pub uid: String
}

impl YandexClient {
    ///
    /// Establishes the session: a bad or expired token fails here, before
    /// anything is enumerated or written.
    ///
    pub async fn connect(http_config: &HttpConfig, cfg: &YandexConfig, token: &str) ->
        Result<Self, CollectorError> {
        let http = yandex_client(http_config, token)?;
        let mut this = Self { http, api_base: cfg.api_base.clone(), uid: String::new() };

        let status = api_result(this.account_status()?).await?;
        let uid = match status.pointer("/account/uid") {
            Some(Value::Number(n)) => n.to_string(),
            Some(Value::String(s)) if !s.is_empty() => s.clone(),
            _ => return Err(CollectorError::Auth(
                "account status has no uid, token rejected".into()
            ))
        };
        debug!(uid = %uid, "session.connected");
        this.uid = uid;
        Ok(this)
    }

    fn endpoint(&self, segments: &[&str]) -> Result<Url, CollectorError> {
        let mut url = self.api_base.clone();
        url.path_segments_mut()
            .map_err(|_| CollectorError::Config(
                format!("api base cannot take a path: {}", self.api_base)
            ))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    /// GET /account/status
    pub fn account_status(&self) -> Result<RequestBuilder, CollectorError> {
        Ok(self.http.get(self.endpoint(&["account", "status"])?))
    }

    /// GET /users/{uid}/likes/tracks
    pub fn likes_tracks(&self) -> Result<RequestBuilder, CollectorError> {
        let url = self.endpoint(&["users", &self.uid, "likes", "tracks"])?;
        Ok(self.http.get(url))
    }

    /// GET /tracks/{id}
    pub fn track(&self, track_id: &str) -> Result<RequestBuilder, CollectorError> {
        Ok(self.http.get(self.endpoint(&["tracks", track_id])?))
    }

    /// GET /tracks/{id}/download-info
    pub fn download_info(&self, track_id: &str) -> Result<RequestBuilder, CollectorError> {
        Ok(self.http.get(self.endpoint(&["tracks", track_id, "download-info"])?))
    }

    /// GET {downloadInfoUrl}, answers with a small xml document
    async fn direct_link(&self, download_info_url: &str) -> Result<String, CollectorError> {
        let url = Url::parse(download_info_url)?;
        let response = self.http.get(url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(CollectorError::Api {
                status: status.as_u16(),
                message: "download-info document".into()
            });
        }
        let body = response.text().await?;
        direct_link_from_xml(&body)
    }
}

#[async_trait]
impl MusicSession for YandexClient {
    async fn liked_tracks(&self) -> Result<Vec<LikedTrackRef>, CollectorError> {
        let value = api_result(self.likes_tracks()?).await?;
        let tracks = value.pointer("/library/tracks")
            .cloned()
            .unwrap_or(Value::Array(Vec::new()));
        if tracks.is_null() {
            return Ok(Vec::new());
        }
        Ok(serde_json::from_value(tracks)?)
    }

    async fn full_track(&self, id: &str) -> Result<FullTrack, CollectorError> {
        let value = api_result(self.track(id)?).await?;
        let first = value.as_array()
            .and_then(|arr| arr.first())
            .cloned()
            .ok_or_else(|| CollectorError::Parse(format!("no track returned for {id}")))?;
        Ok(serde_json::from_value(first)?)
    }

    async fn media_candidates(&self, track: &FullTrack) ->
        Result<Vec<MediaCandidate>, CollectorError> {
        let value = api_result(self.download_info(&track.id)?).await?;
        let infos: Vec<DownloadInfo> = serde_json::from_value(value)?;

        let mut candidates = Vec::with_capacity(infos.len());
        for info in infos {
            match self.direct_link(&info.download_info_url).await {
                Ok(url) => candidates.push(MediaCandidate {
                    codec: info.codec,
                    bitrate_kbps: info.bitrate_in_kbps,
                    url
                }),
                Err(e) => warn!(
                    track = %track.id, codec = %info.codec,
                    bitrate = info.bitrate_in_kbps, error = %e,
                    "media.direct_link.failed"
                )
            }
        }
        Ok(candidates)
    }
}

///
/// Plain streaming GET. The timeout bounds the wait for the response head
/// and for each body chunk, not the whole transfer.
///
#[derive(Clone, Debug)]
pub struct ReqwestTransport {
    pub http: Client
}

impl ReqwestTransport {
    pub fn new(http_config: &HttpConfig) -> Result<Self, CollectorError> {
        let http = Client::builder()
            .connect_timeout(http_config.connect_timeout)
            .redirect(redirect::Policy::limited(http_config.max_redirects as usize))
            .user_agent(http_config.user_agent.clone())
            .build()
            .map_err(|e| CollectorError::Http(format!("build client: {e}")))?;
        Ok( Self { http } )
    }
}

struct ReqwestBody {
    response: reqwest::Response,
    timeout: Duration
}

#[async_trait]
impl BodyStream for ReqwestBody {
    async fn next_chunk(&mut self) -> Result<Option<Vec<u8>>, CollectorError> {
        let chunk = tokio::time::timeout(self.timeout, self.response.chunk())
            .await
            .map_err(|_| CollectorError::Http("timed out reading body".into()))??;
        Ok(chunk.map(|bytes| bytes.to_vec()))
    }
}

#[async_trait]
impl MediaTransport for ReqwestTransport {
    async fn stream_get(&self, url: &str, timeout: Duration) ->
        Result<Box<dyn BodyStream>, CollectorError> {
        let url = Url::parse(url)?;
        let response = tokio::time::timeout(timeout, self.http.get(url).send())
            .await
            .map_err(|_| CollectorError::Http("timed out waiting for response".into()))??;

        let status = response.status();
        if !status.is_success() {
            return Err(CollectorError::Api {
                status: status.as_u16(),
                message: status.canonical_reason().unwrap_or("unknown").to_string()
            });
        }
        Ok(Box::new(ReqwestBody { response, timeout }))
    }
}
