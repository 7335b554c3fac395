use crate::config::UplinkConfig;
use crate::sync::coordinator::SyncOptions;

/// Current time as Unix milliseconds
pub fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// Whether `uplink` must be asked for fresh metadata.
///
/// `last_fetched` is the Unix-millisecond timestamp of the last successful
/// fetch from this uplink, if any. A non-positive `maxage` always fetches.
pub fn should_fetch(uplink: &UplinkConfig, last_fetched: Option<i64>, options: &SyncOptions) -> bool {
    should_fetch_at(uplink, last_fetched, options.force_refresh, now_millis())
}

pub fn should_fetch_at(
    uplink: &UplinkConfig,
    last_fetched: Option<i64>,
    force_refresh: bool,
    now: i64,
) -> bool {
    if force_refresh {
        return true;
    }
    let Some(last) = last_fetched else {
        return true;
    };
    let maxage = uplink.maxage.millis();
    if maxage <= 0 {
        return true;
    }
    now.saturating_sub(last) > maxage
}
