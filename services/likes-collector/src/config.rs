//!
//! src/config.rs  Andrew Belles  Sept 13th, 2025
//!
//! Loads collector configuration from the environment (and .env),
//! validating remote urls and the session token before any request
//!

use url::Url;
use std::time;
use crate::CollectorError;

/// Constants for HTTP Config
pub const HTTP_TIMEOUT: u64 = 15000;
pub const HTTP_CONNECT_TIMEOUT: u64 = 5000;
pub const HTTP_MAX_REDIRECTS: u8 = 4;

/// Constants for the collection pipeline
pub const TRACK_DELAY_MS: u64 = 500;
pub const DOWNLOAD_TIMEOUT: u64 = 30;
pub const DOWNLOAD_CHUNK_SIZE: usize = 8 * 1024;
pub const MIN_AUDIO_BYTES: u64 = 1024;

pub const MIN_TOKEN_LEN: usize = 20;
pub const YANDEX_API_BASE: &str = "https://api.music.yandex.net/";
pub const YANDEX_API_HOST: &str = "api.music.yandex.net";
pub const SOURCE_LABEL: &str = "Yandex Music API";

/// Wrapper over env::var that treats blank values as unset
fn env_opt(s: &str) -> Option<String> {
    match std::env::var(s) {
        Ok(v) if !v.trim().is_empty() => Some(v),
        _ => None
    }
}

fn env_to_u64(s: &str, default: u64) -> u64 {
    env_opt(s)
        .and_then(|v| v.trim().parse::<u64>().ok())
        .unwrap_or(default)
}

/// Ensures that url is https
fn ensure_https(url: &Url) -> Result<(), String> {
    if url.scheme() == "https" {
        Ok(())
    } else {
        Err(format!("URL must be https: {url}"))
    }
}

fn ensure_host(url: &Url, expected_host: &str) -> Result<(), String> {
    match url.host_str() {
        Some(h) if h.eq_ignore_ascii_case(expected_host) => Ok(()),
        Some(h) => Err(
            format!("Unexpected host for {url} (got {h}, expected {expected_host})")
        ),
        None => Err(format!("URL missing host: {url}"))
    }
}

///
/// Session token handed to us out-of-band. Only trimmed and length checked,
/// the remote decides whether it is actually valid.
///
pub fn validate_token(raw: &str) -> Result<String, CollectorError> {
    let token = raw.trim();
    if token.is_empty() {
        return Err(CollectorError::Config("session token is empty".into()));
    }
    if token.chars().count() < MIN_TOKEN_LEN {
        return Err(CollectorError::Config(format!(
            "session token too short ({} chars, need at least {MIN_TOKEN_LEN})",
            token.chars().count()
        )));
    }
    Ok(token.to_string())
}

/// Keeps the first and last four characters, safe to log
pub fn mask_token(token: &str) -> String {
    let chars: Vec<char> = token.chars().collect();
    if chars.len() <= 10 {
        return token.to_string();
    }
    let start: String = chars[..4].iter().collect();
    let end: String = chars[chars.len() - 4..].iter().collect();
    let middle = "*".repeat((chars.len() - 8).min(12));
    format!("{start}{middle}{end}")
}

///
/// Configuration for Http timeouts, redirects, etc.
///
#[derive(Debug, Clone)]
pub struct HttpConfig {
    pub timeout: time::Duration,
    pub connect_timeout: time::Duration,
    pub max_redirects: u8,
    pub user_agent: String
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            timeout: time::Duration::from_millis(HTTP_TIMEOUT),
            connect_timeout: time::Duration::from_millis(HTTP_CONNECT_TIMEOUT),
            max_redirects: HTTP_MAX_REDIRECTS,
            user_agent: format!("likes-collector/{}", env!("CARGO_PKG_VERSION"))
        }
    }
}

/// Configuration that the Yandex Music api expects when hitting endpoints
#[derive(Debug, Clone)]
pub struct YandexConfig {
    pub api_base: Url,
    pub source_label: String
}

fn build_yandex() -> Result<YandexConfig, CollectorError> {
    let api_base = env_opt("YANDEX_API_BASE")
        .unwrap_or_else(|| YANDEX_API_BASE.to_string());
    let mut api_base = Url::parse(&api_base)
        .map_err(|e| CollectorError::Config(
            format!("YANDEX_API_BASE invalid {e}")
        ))?;

    ensure_https(&api_base).map_err(CollectorError::Config)?;
    ensure_host(&api_base, YANDEX_API_HOST).map_err(CollectorError::Config)?;

    // ensure trailing slash so join() keeps the base path
    if !api_base.path().ends_with('/') {
        let mut path = api_base.path().to_string();
        path.push('/');
        api_base.set_path(&path);
    }

    Ok( YandexConfig { api_base, source_label: SOURCE_LABEL.to_string() } )
}

///
/// Configuration for the audio fetcher
///
#[derive(Debug, Clone)]
pub struct DownloadConfig {
    pub timeout: time::Duration,
    pub chunk_size: usize,
    pub min_bytes: u64
}

impl Default for DownloadConfig {
    fn default() -> Self {
        Self {
            timeout: time::Duration::from_secs(DOWNLOAD_TIMEOUT),
            chunk_size: DOWNLOAD_CHUNK_SIZE,
            min_bytes: MIN_AUDIO_BYTES
        }
    }
}

#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub track_delay: time::Duration,    // cooperative throttle between tracks
    pub download: DownloadConfig
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            track_delay: time::Duration::from_millis(TRACK_DELAY_MS),
            download: DownloadConfig::default()
        }
    }
}

/// The remote tolerates roughly two requests a second, never go below that
pub fn clamp_track_delay(ms: u64) -> time::Duration {
    time::Duration::from_millis(ms.max(TRACK_DELAY_MS))
}

fn build_pipeline() -> PipelineConfig {
    let requested = env_to_u64("COLLECTOR_TRACK_DELAY_MS", TRACK_DELAY_MS);
    PipelineConfig {
        track_delay: clamp_track_delay(requested),
        download: DownloadConfig::default()
    }
}

///
/// Configuration for Logger
///

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Pretty,
    Json
}

impl LogFormat {
    pub fn parse(s: &str) -> Option<LogFormat> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pretty" => Some(LogFormat::Pretty),
            "json"   => Some(LogFormat::Json),
            _ => None
        }
    }
}

#[derive(Debug, Clone)]
pub struct LoggingConfig {
    pub filter_directives: String,
    pub format: LogFormat,
    pub with_ansi: bool,
    pub include_file_line: bool,
    pub include_target: bool
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter_directives: "info,likes_collector=debug,reqwest=warn".to_string(),
            format: LogFormat::Pretty,
            with_ansi: true,
            include_file_line: false,
            include_target: true
        }
    }
}

fn build_logging() -> LoggingConfig {
    let mut logging = LoggingConfig::default();
    if let Some(format) = env_opt("COLLECTOR_LOG_FORMAT").as_deref()
        .and_then(LogFormat::parse) {
        logging.format = format;
    }
    if logging.format == LogFormat::Json {
        logging.with_ansi = false;
        logging.include_file_line = true;
    }
    logging
}

///
/// AppConfig which holds everything the collector needs besides the
/// per-invocation arguments (token, output dir, audio flag)
///
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub http: HttpConfig,
    pub yandex: YandexConfig,
    pub pipeline: PipelineConfig,
    pub logging: LoggingConfig
}

///
/// Return all environment variables to caller at program start.
///
pub fn load_config() -> Result<AppConfig, CollectorError> {
    dotenvy::dotenv().ok();

    let http     = HttpConfig::default();
    let yandex   = build_yandex()?;
    let pipeline = build_pipeline();
    let logging  = build_logging();

    Ok( AppConfig { http, yandex, pipeline, logging } )
}
