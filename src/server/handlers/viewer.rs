//! Viewer HTTP surface (§4.7): master-playlist rewrite and per-variant
//! ad-break application. Unauthenticated by design — only the control
//! plane (`cue`, `status`) is gated.

use std::collections::HashMap;
use std::time::Instant;

use axum::{
    extract::{Path, Query, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
};
use m3u8_rs::{MediaPlaylist, Playlist};

use crate::ad::slate;
use crate::config::{ChannelConfig, DeliveryMode};
use crate::error::{GatewayError, Result};
use crate::hls::parser;
use crate::metrics;
use crate::server::state::AppState;
use crate::server::url_validation::validate_origin_url;
use crate::transform::{sgai, ssai};
use crate::types::{AdBreakState, ServedMode};

/// `GET /{org}/{channel}/master.m3u8` (§4.7).
pub async fn serve_master(
    Path((org, channel)): Path<(String, String)>,
    State(state): State<AppState>,
) -> Result<Response> {
    let start = Instant::now();
    let cfg = state.config_cache.get(&org, &channel).await?;

    let (body, origin_base) = fetch_origin(&state, &cfg.origin_url).await?;
    let playlist = parser::parse_hls_playlist(&body)?;

    let rewritten = parser::rewrite_master_urls(
        playlist,
        &org,
        &channel,
        &state.config.base_url,
        &origin_base,
    );
    let text = parser::serialize_playlist(&rewritten)?;

    metrics::record_request("master", 200);
    metrics::record_duration("master", start);
    Ok(respond(text, cfg.manifest_cache_max_age_s, false))
}

/// `GET /{org}/{channel}/{variant}` (§4.7).
///
/// Origin fetch and the Coordinator's config lookup run concurrently
/// (§9 "express the request path as a cooperative pipeline"); the
/// Coordinator's break read itself depends on the resolved config, so it
/// joins only the two independent suspension points.
pub async fn serve_variant(
    Path((org, channel, _variant)): Path<(String, String, String)>,
    Query(params): Query<HashMap<String, String>>,
    headers: HeaderMap,
    State(state): State<AppState>,
) -> Result<Response> {
    let start = Instant::now();

    let origin_url = params
        .get("origin")
        .cloned()
        .ok_or_else(|| GatewayError::BadRequest("missing origin query parameter".into()))?;
    validate_origin_url(&origin_url)?;

    let bitrate_kbps: u32 = params.get("bitrate").and_then(|v| v.parse().ok()).unwrap_or(0);
    let force = params.get("force").cloned();

    let (cfg, (body, _)) = tokio::try_join!(
        state.config_cache.get(&org, &channel),
        fetch_origin(&state, &origin_url),
    )?;

    let playlist = parser::parse_hls_playlist(&body)?;
    let mut media = match playlist {
        Playlist::MediaPlaylist(m) => m,
        Playlist::MasterPlaylist(_) => {
            return Err(GatewayError::MalformedManifest(
                "variant endpoint received a master playlist".into(),
            ))
        }
    };

    let origin_base = parser::origin_base_of(&origin_url);
    parser::absolutize_segment_urls(&mut media, &origin_base);

    let view = state.coordinator.read(&cfg).await?;

    let (final_media, no_store) = match view {
        Some(view) => {
            let (media, _mode) = apply_ad_break(
                &state,
                &cfg,
                &view.state,
                view.pinned_mode,
                media,
                &headers,
                force.as_deref(),
                bitrate_kbps,
            )
            .await?;
            (media, true)
        }
        None => (media, false),
    };

    let text = parser::serialize_playlist(&Playlist::MediaPlaylist(final_media))?;

    metrics::record_request("variant", 200);
    metrics::record_duration("variant", start);
    Ok(respond(text, cfg.segment_cache_max_age_s, no_store))
}

async fn fetch_origin(state: &AppState, url: &str) -> Result<(String, String)> {
    let resp = state.http_client.get(url).send().await.map_err(|e| {
        metrics::record_origin_error();
        GatewayError::OriginUnavailable(e.to_string())
    })?;

    if !resp.status().is_success() {
        metrics::record_origin_error();
        return Err(GatewayError::OriginUnavailable(format!(
            "origin returned {}",
            resp.status()
        )));
    }

    let body = resp
        .text()
        .await
        .map_err(|e| GatewayError::OriginUnavailable(e.to_string()))?;
    Ok((body, parser::origin_base_of(url)))
}

/// Serving-mode selection and transform application (§4.6 "Serving mode
/// selection", §4.2). `media` is consumed and handed back rewritten (or
/// unmodified, on an `ssai_only`/PdtMissing fallback).
///
/// In `auto` mode, the first request for an `event_id` must try its
/// preferred mode *before* pinning anything: `pin_mode` is first-write-wins,
/// so pinning the preference up front would leave a later PdtMissing
/// fallback unable to ever record that SGAI was the mode that actually
/// worked (spec.md:127, Scenario 3). Only the mode that rendering settled
/// on gets pinned.
async fn apply_ad_break(
    state: &AppState,
    cfg: &ChannelConfig,
    break_state: &AdBreakState,
    pinned: Option<ServedMode>,
    media: MediaPlaylist,
    headers: &HeaderMap,
    force: Option<&str>,
    bitrate_kbps: u32,
) -> Result<(MediaPlaylist, ServedMode)> {
    let attempt_mode = match cfg.mode {
        DeliveryMode::SsaiOnly => ServedMode::Ssai,
        DeliveryMode::SgaiOnly => ServedMode::Sgai,
        DeliveryMode::Auto => pinned.unwrap_or_else(|| preferred_mode(headers, force)),
    };

    let needs_pin = cfg.mode == DeliveryMode::Auto && pinned.is_none();
    if !needs_pin {
        return render_break(attempt_mode, cfg, break_state, media, bitrate_kbps);
    }

    let unrendered = media.clone();
    let (rendered, served) = render_break(attempt_mode, cfg, break_state, media, bitrate_kbps)?;

    let resolved = state
        .coordinator
        .pin_mode(&cfg.channel_id, &break_state.event_id, served)
        .await?;

    if resolved == served {
        Ok((rendered, served))
    } else {
        // A concurrent request already pinned a different mode for this
        // event; defer to it rather than serve a mode nobody else will see
        // again for this break.
        render_break(resolved, cfg, break_state, unrendered, bitrate_kbps)
    }
}

/// Render a single ad break under `mode`, with the §4.6/§4.5 transform
/// fallbacks: SSAI's `PdtMissing` downgrades to SGAI (except `ssai_only`,
/// which serves unmodified origin), and `NoMatchingVariant` retries once
/// against the channel's slate decision (spec.md:194).
fn render_break(
    mode: ServedMode,
    cfg: &ChannelConfig,
    break_state: &AdBreakState,
    mut media: MediaPlaylist,
    bitrate_kbps: u32,
) -> Result<(MediaPlaylist, ServedMode)> {
    match mode {
        ServedMode::Ssai => match ssai::splice_ad_break(
            media.clone(),
            &break_state.decision,
            break_state.start_time,
            bitrate_kbps,
        ) {
            Ok(spliced) => Ok((spliced, ServedMode::Ssai)),
            Err(GatewayError::PdtMissing) if cfg.mode == DeliveryMode::SsaiOnly => {
                // §4.6: ssai_only never downgrades to SGAI, serve unmodified origin.
                Ok((media, ServedMode::Ssai))
            }
            Err(GatewayError::PdtMissing) => {
                sgai::inject_interstitial(
                    &mut media,
                    &break_state.decision,
                    break_state.start_time,
                    break_state.duration_s,
                );
                Ok((media, ServedMode::Sgai))
            }
            Err(GatewayError::NoMatchingVariant) => {
                match slate::resolve_for_channel(cfg, &break_state.event_id) {
                    Some(slate_decision) => {
                        let spliced = ssai::splice_ad_break(
                            media,
                            &slate_decision,
                            break_state.start_time,
                            bitrate_kbps,
                        )
                        .map_err(|_| GatewayError::NoMatchingVariant)?;
                        Ok((spliced, ServedMode::Ssai))
                    }
                    None => Err(GatewayError::NoMatchingVariant),
                }
            }
            Err(e) => Err(e),
        },
        ServedMode::Sgai => {
            sgai::inject_interstitial(
                &mut media,
                &break_state.decision,
                break_state.start_time,
                break_state.duration_s,
            );
            Ok((media, ServedMode::Sgai))
        }
    }
}

fn preferred_mode(headers: &HeaderMap, force: Option<&str>) -> ServedMode {
    match force {
        Some("sgai") => return ServedMode::Sgai,
        Some("ssai") => return ServedMode::Ssai,
        _ => {}
    }
    if is_apple_client(headers) {
        ServedMode::Sgai
    } else {
        ServedMode::Ssai
    }
}

const APPLE_MARKERS: [&str; 7] = [
    "AppleCoreMedia",
    "AppleTV",
    "CFNetwork",
    "iPhone",
    "iPad",
    "iPod",
    "Macintosh",
];

fn is_apple_client(headers: &HeaderMap) -> bool {
    headers
        .get(header::USER_AGENT)
        .and_then(|v| v.to_str().ok())
        .map(|ua| APPLE_MARKERS.iter().any(|marker| ua.contains(marker)))
        .unwrap_or(false)
}

fn respond(body: String, max_age_s: u32, no_store: bool) -> Response {
    let cache_control = if no_store {
        "no-store".to_string()
    } else {
        format!("public, max-age={max_age_s}")
    };

    (
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, "application/vnd.apple.mpegurl".to_string()),
            (header::CACHE_CONTROL, cache_control),
        ],
        body,
    )
        .into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{AdDecision, AdItem, BreakSource};
    use chrono::{DateTime, FixedOffset, TimeZone};
    use m3u8_rs::MediaSegment;
    use std::collections::BTreeMap;

    fn pdt(sec_offset: i64) -> DateTime<FixedOffset> {
        let base = FixedOffset::east_opt(0)
            .unwrap()
            .with_ymd_and_hms(2026, 1, 1, 0, 0, 0)
            .unwrap();
        base + chrono::Duration::seconds(sec_offset)
    }

    fn segment(sec_offset: i64, duration: f32) -> MediaSegment {
        MediaSegment {
            uri: format!("seg{sec_offset}.ts"),
            duration,
            program_date_time: Some(pdt(sec_offset)),
            ..Default::default()
        }
    }

    fn channel(mode: DeliveryMode) -> ChannelConfig {
        ChannelConfig {
            channel_id: "chan-1".into(),
            organization_slug: "acme".into(),
            channel_slug: "sports1".into(),
            origin_url: "https://origin.example.com/master.m3u8".into(),
            mode,
            scte35_enabled: true,
            scte35_auto_insert: true,
            time_based_auto_insert: false,
            tier: 0,
            bitrate_ladder: vec![800, 1600],
            default_ad_duration_s: 30,
            vast_enabled: false,
            vast_url: None,
            vast_timeout_ms: 500,
            segment_cache_max_age_s: 6,
            manifest_cache_max_age_s: 2,
            slate_id: None,
            ad_pod_base_url: None,
            sign_host: None,
            grace_s: 2,
        }
    }

    fn ad_item(bitrate: u32, uri: &str) -> AdItem {
        let mut variants = BTreeMap::new();
        variants.insert(bitrate, uri.to_string());
        AdItem {
            ad_id: "ad-1".into(),
            duration_s: 10.0,
            variants,
        }
    }

    fn break_state(decision: AdDecision, start: DateTime<FixedOffset>) -> AdBreakState {
        AdBreakState {
            channel_id: "chan-1".into(),
            event_id: "evt-1".into(),
            source: BreakSource::Manual,
            start_time: start,
            end_time: start + chrono::Duration::seconds(10),
            duration_s: 10.0,
            decision,
            created_at: start,
            scte35: None,
        }
    }

    #[test]
    fn pdt_missing_falls_back_from_ssai_to_sgai_in_auto_mode() {
        let playlist = MediaPlaylist {
            target_duration: 6,
            segments: vec![segment(0, 6.0), segment(6, 6.0)],
            ..Default::default()
        };
        let decision = AdDecision {
            pod_id: "pod-1".into(),
            items: vec![ad_item(800, "https://ads.example.com/a/800k.m3u8")],
            multivariant_url: None,
        };
        // p0 far past the playlist window -> PdtMissing on the SSAI attempt.
        let state = break_state(decision, pdt(1000));
        let cfg = channel(DeliveryMode::Auto);

        let (rendered, served) = render_break(ServedMode::Ssai, &cfg, &state, playlist, 800).unwrap();
        assert_eq!(served, ServedMode::Sgai);
        assert!(rendered.segments.iter().any(|s| s.daterange.is_some()));
    }

    #[test]
    fn pdt_missing_serves_unmodified_origin_when_ssai_only() {
        let playlist = MediaPlaylist {
            target_duration: 6,
            segments: vec![segment(0, 6.0)],
            ..Default::default()
        };
        let decision = AdDecision {
            pod_id: "pod-1".into(),
            items: vec![ad_item(800, "https://ads.example.com/a/800k.m3u8")],
            multivariant_url: None,
        };
        let state = break_state(decision, pdt(1000));
        let cfg = channel(DeliveryMode::SsaiOnly);

        let (rendered, served) =
            render_break(ServedMode::Ssai, &cfg, &state, playlist.clone(), 800).unwrap();
        assert_eq!(served, ServedMode::Ssai);
        assert_eq!(rendered.segments.len(), playlist.segments.len());
        assert!(rendered.segments.iter().all(|s| !s.discontinuity));
    }

    #[test]
    fn no_matching_variant_falls_back_to_slate() {
        let playlist = MediaPlaylist {
            target_duration: 6,
            segments: vec![segment(0, 6.0), segment(6, 6.0)],
            ..Default::default()
        };
        // empty variants map -> NoMatchingVariant on the first attempt.
        let decision = AdDecision {
            pod_id: "pod-1".into(),
            items: vec![AdItem {
                ad_id: "ad-1".into(),
                duration_s: 10.0,
                variants: BTreeMap::new(),
            }],
            multivariant_url: None,
        };
        let state = break_state(decision, pdt(0));
        let mut cfg = channel(DeliveryMode::SsaiOnly);
        cfg.ad_pod_base_url = Some("https://slate.example.com/weather".into());
        cfg.slate_id = Some("weather".into());

        let (rendered, served) = render_break(ServedMode::Ssai, &cfg, &state, playlist, 800).unwrap();
        assert_eq!(served, ServedMode::Ssai);
        assert!(rendered
            .segments
            .iter()
            .any(|s| s.uri.contains("slate.example.com")));
    }

    #[test]
    fn no_matching_variant_without_slate_propagates_error() {
        let playlist = MediaPlaylist {
            target_duration: 6,
            segments: vec![segment(0, 6.0)],
            ..Default::default()
        };
        let decision = AdDecision {
            pod_id: "pod-1".into(),
            items: vec![AdItem {
                ad_id: "ad-1".into(),
                duration_s: 10.0,
                variants: BTreeMap::new(),
            }],
            multivariant_url: None,
        };
        let state = break_state(decision, pdt(0));
        let cfg = channel(DeliveryMode::SsaiOnly);

        let result = render_break(ServedMode::Ssai, &cfg, &state, playlist, 800);
        assert!(matches!(result, Err(GatewayError::NoMatchingVariant)));
    }

    #[test]
    fn detects_apple_user_agents() {
        let mut headers = HeaderMap::new();
        headers.insert(header::USER_AGENT, "AppleCoreMedia/1.0.0.20G75".parse().unwrap());
        assert!(is_apple_client(&headers));
    }

    #[test]
    fn android_user_agent_is_not_apple() {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::USER_AGENT,
            "Mozilla/5.0 (Linux; Android 14; Pixel 8)".parse().unwrap(),
        );
        assert!(!is_apple_client(&headers));
    }

    #[test]
    fn force_query_param_overrides_client_hint() {
        let headers = HeaderMap::new();
        assert_eq!(preferred_mode(&headers, Some("sgai")), ServedMode::Sgai);
        assert_eq!(preferred_mode(&headers, Some("ssai")), ServedMode::Ssai);
    }

    #[test]
    fn defaults_to_ssai_for_non_apple_clients() {
        let headers = HeaderMap::new();
        assert_eq!(preferred_mode(&headers, None), ServedMode::Ssai);
    }
}
