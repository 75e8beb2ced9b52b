use std::time::Duration;

use chrono::Utc;
use tokio::sync::watch;
use tokio::time::timeout;

use crate::error::GpsError;
use crate::geo::is_valid_coordinate;
use crate::models::coordinate::GpsFix;

/// Allowed lead of a fix timestamp over the local clock.
pub const MAX_CLOCK_SKEW: Duration = Duration::from_secs(5);

#[derive(Debug, Clone)]
pub struct FixOptions {
    pub timeout: Duration,
    pub max_age: Duration,
}

impl Default for FixOptions {
    fn default() -> Self {
        Self {
            timeout: Duration::from_millis(7_000),
            max_age: Duration::from_secs(30),
        }
    }
}

/// One-shot "current position" from the host platform.
#[tonic::async_trait]
pub trait GpsProvider: Send + Sync {
    async fn current_position(&self, options: &FixOptions) -> Result<GpsFix, GpsError>;
}

/// Acquires a fix for a status transition. Bounded by `options.timeout`;
/// fixes older than `options.max_age`, or dated ahead of the local clock by
/// more than `MAX_CLOCK_SKEW`, are refused rather than reused.
pub async fn acquire_fresh_fix(
    provider: &dyn GpsProvider,
    options: &FixOptions,
) -> Result<GpsFix, GpsError> {
    let fix = timeout(options.timeout, provider.current_position(options))
        .await
        .map_err(|_| GpsError::Timeout(options.timeout))??;

    if !is_valid_coordinate(&fix.coordinate)
        || fix.accuracy_meters.is_nan()
        || fix.accuracy_meters < 0.0
    {
        return Err(GpsError::InvalidFix);
    }

    let age = fix.age(Utc::now());
    let skew = chrono::Duration::from_std(MAX_CLOCK_SKEW).unwrap_or(chrono::Duration::zero());
    if age < -skew {
        return Err(GpsError::FutureDated {
            ahead_secs: -age.num_seconds(),
        });
    }

    let max_age = chrono::Duration::from_std(options.max_age).unwrap_or(chrono::Duration::MAX);
    if age > max_age {
        return Err(GpsError::Stale {
            age_secs: age.num_seconds(),
        });
    }

    Ok(fix)
}

/// Used when the device has no positioning at all.
pub struct NoGps;

#[tonic::async_trait]
impl GpsProvider for NoGps {
    async fn current_position(&self, _options: &FixOptions) -> Result<GpsFix, GpsError> {
        Err(GpsError::Unavailable("no positioning source configured".into()))
    }
}

/// A fix the client captured at the moment of the tap and sent along with
/// the request. Subject to the same freshness check as any other fix.
pub struct ReportedFix(pub Option<GpsFix>);

#[tonic::async_trait]
impl GpsProvider for ReportedFix {
    async fn current_position(&self, _options: &FixOptions) -> Result<GpsFix, GpsError> {
        self.0
            .clone()
            .ok_or_else(|| GpsError::Unavailable("client sent no fix".into()))
    }
}

/// Latest low-power watch tick, for map display only. Status transitions
/// never read from here.
pub struct LocationWatch {
    latest: watch::Sender<Option<GpsFix>>,
}

impl Default for LocationWatch {
    fn default() -> Self {
        Self::new()
    }
}

impl LocationWatch {
    pub fn new() -> Self {
        let (latest, _) = watch::channel(None);
        Self { latest }
    }

    pub fn record(&self, fix: GpsFix) {
        self.latest.send_replace(Some(fix));
    }

    pub fn latest(&self) -> Option<GpsFix> {
        self.latest.borrow().clone()
    }
}
