use metrics::{counter, gauge, histogram};
use std::time::Instant;

// ── Metric names ────────────────────────────────────────────────────────

/// Total HTTP requests by endpoint and status
pub const REQUESTS_TOTAL: &str = "cuegate_requests_total";
/// Request duration in seconds
pub const REQUEST_DURATION: &str = "cuegate_request_duration_seconds";
/// Currently active per-channel coordinator actors
pub const ACTIVE_CHANNELS: &str = "cuegate_active_channels";
/// Ad breaks started across all channels
pub const AD_BREAKS_STARTED: &str = "cuegate_ad_breaks_started_total";
/// SCTE-35 cues seen, by outcome (accepted, duplicate, filtered, invalid)
pub const SCTE35_CUES: &str = "cuegate_scte35_cues_total";
/// VAST requests by result (success, error, timeout, empty)
pub const VAST_REQUESTS: &str = "cuegate_vast_requests_total";
/// Slate fallback activations
pub const SLATE_FALLBACKS: &str = "cuegate_slate_fallbacks_total";
/// Origin fetch errors
pub const ORIGIN_FETCH_ERRORS: &str = "cuegate_origin_fetch_errors_total";
/// Channel-config cache outcomes (hit, miss, invalidate)
pub const CONFIG_CACHE: &str = "cuegate_config_cache_total";
/// Per-channel lock acquisition timeouts
pub const LOCK_TIMEOUTS: &str = "cuegate_lock_timeouts_total";

// ── Recording helpers ───────────────────────────────────────────────────

/// Record an incoming request
pub fn record_request(endpoint: &str, status: u16) {
    counter!(REQUESTS_TOTAL, "endpoint" => endpoint.to_string(), "status" => status.to_string())
        .increment(1);
}

/// Record request duration
pub fn record_duration(endpoint: &str, start: Instant) {
    let duration = start.elapsed().as_secs_f64();
    histogram!(REQUEST_DURATION, "endpoint" => endpoint.to_string()).record(duration);
}

/// Update active per-channel actor count
pub fn set_active_channels(count: usize) {
    gauge!(ACTIVE_CHANNELS).set(count as f64);
}

/// Record an ad break transitioning Idle → Active
pub fn record_ad_break_started(source: &str) {
    counter!(AD_BREAKS_STARTED, "source" => source.to_string()).increment(1);
}

/// Record an SCTE-35 cue outcome
pub fn record_scte35_cue(outcome: &str) {
    counter!(SCTE35_CUES, "outcome" => outcome.to_string()).increment(1);
}

/// Record a VAST request result
pub fn record_vast_request(result: &str) {
    counter!(VAST_REQUESTS, "result" => result.to_string()).increment(1);
}

/// Record a slate fallback activation
pub fn record_slate_fallback() {
    counter!(SLATE_FALLBACKS).increment(1);
}

/// Record an origin fetch error
pub fn record_origin_error() {
    counter!(ORIGIN_FETCH_ERRORS).increment(1);
}

/// Record a channel-config cache outcome
pub fn record_config_cache(outcome: &str) {
    counter!(CONFIG_CACHE, "outcome" => outcome.to_string()).increment(1);
}

/// Record a per-channel write-lock acquisition timeout
pub fn record_lock_timeout() {
    counter!(LOCK_TIMEOUTS).increment(1);
}
