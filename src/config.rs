use std::env;
use std::path::PathBuf;
use std::time::Duration;

use crate::error::AppError;

#[derive(Debug, Clone)]
pub struct Config {
    pub http_port: u16,
    pub log_level: String,
    pub log_json: bool,
    pub remote_endpoint: String,
    pub queue_dir: PathBuf,
    pub queue_storage_key: String,
    pub gps_timeout: Duration,
    pub gps_accuracy_threshold_m: f64,
    pub max_fix_age: Duration,
    pub submit_timeout: Duration,
    pub sync_retry_interval: Duration,
    pub connectivity_probe_interval: Duration,
    pub event_buffer_size: usize,
    pub max_photo_bytes: usize,
    pub start_online: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            http_port: 3000,
            log_level: "info".to_string(),
            log_json: false,
            remote_endpoint: "http://127.0.0.1:50051".to_string(),
            queue_dir: PathBuf::from("./data"),
            queue_storage_key: "pending_field_actions".to_string(),
            gps_timeout: Duration::from_millis(7_000),
            gps_accuracy_threshold_m: crate::geo::DEFAULT_ACCURACY_THRESHOLD_M,
            max_fix_age: Duration::from_secs(30),
            submit_timeout: Duration::from_secs(10),
            sync_retry_interval: Duration::from_secs(30),
            connectivity_probe_interval: Duration::from_secs(15),
            event_buffer_size: 256,
            max_photo_bytes: 20 * 1024 * 1024,
            start_online: true,
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self, AppError> {
        let _ = dotenvy::dotenv();
        let defaults = Self::default();

        Ok(Self {
            http_port: parse_or_default("HTTP_PORT", defaults.http_port)?,
            log_level: env::var("LOG_LEVEL").unwrap_or(defaults.log_level),
            log_json: env::var("LOG_FORMAT").is_ok_and(|format| format.eq_ignore_ascii_case("json")),
            remote_endpoint: env::var("REMOTE_ENDPOINT").unwrap_or(defaults.remote_endpoint),
            queue_dir: env::var("QUEUE_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.queue_dir),
            queue_storage_key: env::var("QUEUE_STORAGE_KEY")
                .unwrap_or(defaults.queue_storage_key),
            gps_timeout: Duration::from_millis(parse_or_default("GPS_TIMEOUT_MS", 7_000)?),
            gps_accuracy_threshold_m: parse_or_default(
                "GPS_ACCURACY_THRESHOLD_M",
                defaults.gps_accuracy_threshold_m,
            )?,
            max_fix_age: Duration::from_secs(parse_or_default("MAX_FIX_AGE_SECS", 30)?),
            submit_timeout: Duration::from_secs(parse_or_default("SUBMIT_TIMEOUT_SECS", 10)?),
            sync_retry_interval: Duration::from_secs(parse_or_default(
                "SYNC_RETRY_INTERVAL_SECS",
                30,
            )?),
            connectivity_probe_interval: Duration::from_secs(parse_or_default(
                "CONNECTIVITY_PROBE_INTERVAL_SECS",
                15,
            )?),
            event_buffer_size: parse_or_default("EVENT_BUFFER_SIZE", defaults.event_buffer_size)?,
            max_photo_bytes: parse_or_default("MAX_PHOTO_BYTES", defaults.max_photo_bytes)?,
            start_online: parse_or_default("START_ONLINE", defaults.start_online)?,
        })
    }
}

fn parse_or_default<T>(key: &str, default: T) -> Result<T, AppError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match env::var(key) {
        Ok(raw) => raw
            .parse::<T>()
            .map_err(|err| AppError::Internal(format!("invalid {key}: {err}"))),
        Err(_) => Ok(default),
    }
}
