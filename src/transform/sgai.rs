//! Server-Guided Ad Insertion: signal ad breaks via `#EXT-X-DATERANGE`
//! interstitials (§4.2.1) instead of replacing content segments. The player
//! fetches the ad pod's multivariant playlist directly via `X-ASSET-URI`.

use crate::types::AdDecision;
use chrono::{DateTime, FixedOffset};
use m3u8_rs::{DateRange, MediaPlaylist, QuotedOrUnquoted};
use std::collections::HashMap;

/// Inject a single interstitial `#EXT-X-DATERANGE` for `decision` into
/// `playlist`, anchored at the first `#EXT-X-PROGRAM-DATE-TIME` that is
/// `>= start - target_duration`; falls back to the first segment if none
/// qualifies.
///
/// Idempotent on `pod_id`: re-running with the same `decision.pod_id`
/// replaces any DateRange already carrying that id rather than duplicating
/// it.
pub fn inject_interstitial(
    playlist: &mut MediaPlaylist,
    decision: &AdDecision,
    start: DateTime<FixedOffset>,
    duration_s: f32,
) {
    if decision.is_empty() {
        return;
    }
    let Some(uri) = decision.interstitial_uri() else {
        return;
    };

    remove_existing(playlist, &decision.pod_id);

    let target_duration = playlist.target_duration.max(1) as i64;
    let threshold = start - chrono::Duration::seconds(target_duration);

    let anchor = playlist
        .segments
        .iter()
        .position(|seg| matches!(seg.program_date_time, Some(pdt) if pdt >= threshold))
        .unwrap_or(0);

    if anchor >= playlist.segments.len() {
        return;
    }

    let mut x_prefixed = HashMap::new();
    x_prefixed.insert(
        "X-ASSET-URI".to_string(),
        QuotedOrUnquoted::Quoted(uri.to_string()),
    );
    x_prefixed.insert(
        "X-RESTRICT".to_string(),
        QuotedOrUnquoted::Quoted("SKIP,JUMP".to_string()),
    );
    x_prefixed.insert(
        "CUE".to_string(),
        QuotedOrUnquoted::Quoted("PRE,ONCE".to_string()),
    );

    let daterange = DateRange {
        id: decision.pod_id.clone(),
        class: Some("com.apple.hls.interstitial".to_string()),
        start_date: start,
        end_date: None,
        duration: Some(duration_s as f64),
        planned_duration: None,
        x_prefixed: Some(x_prefixed),
        end_on_next: false,
        other_attributes: None,
    };

    playlist.segments[anchor].daterange = Some(daterange);
}

fn remove_existing(playlist: &mut MediaPlaylist, pod_id: &str) {
    for seg in playlist.segments.iter_mut() {
        if matches!(&seg.daterange, Some(dr) if dr.id == pod_id) {
            seg.daterange = None;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::AdItem;
    use chrono::TimeZone;
    use m3u8_rs::MediaSegment;
    use std::collections::BTreeMap;

    fn pdt(hour: u32, min: u32, sec: u32) -> DateTime<FixedOffset> {
        FixedOffset::east_opt(0)
            .unwrap()
            .with_ymd_and_hms(2026, 1, 1, hour, min, sec)
            .unwrap()
    }

    fn segment(duration: f32, pdt: Option<DateTime<FixedOffset>>) -> MediaSegment {
        MediaSegment {
            uri: "seg.ts".to_string(),
            duration,
            program_date_time: pdt,
            ..Default::default()
        }
    }

    fn decision(pod_id: &str, uri: &str) -> AdDecision {
        let mut variants = BTreeMap::new();
        variants.insert(2000, uri.to_string());
        AdDecision {
            pod_id: pod_id.to_string(),
            items: vec![AdItem {
                ad_id: "ad-1".to_string(),
                duration_s: 30.0,
                variants,
            }],
            multivariant_url: Some(uri.to_string()),
        }
    }

    #[test]
    fn injects_daterange_with_expected_attributes() {
        let mut playlist = MediaPlaylist {
            target_duration: 6,
            segments: vec![
                segment(6.0, Some(pdt(0, 0, 0))),
                segment(6.0, Some(pdt(0, 0, 6))),
                segment(6.0, Some(pdt(0, 0, 12))),
            ],
            ..Default::default()
        };

        let decision = decision("P1", "https://ads.example.com/pod/master.m3u8");
        inject_interstitial(&mut playlist, &decision, pdt(0, 0, 12), 30.0);

        let dr = playlist.segments[2]
            .daterange
            .as_ref()
            .expect("daterange should be set on the anchor segment");
        assert_eq!(dr.id, "P1");
        assert_eq!(dr.class.as_deref(), Some("com.apple.hls.interstitial"));
        assert_eq!(dr.duration, Some(30.0));
        let x = dr.x_prefixed.as_ref().unwrap();
        assert_eq!(
            x.get("X-ASSET-URI").unwrap().as_str(),
            "https://ads.example.com/pod/master.m3u8"
        );
        assert_eq!(x.get("CUE").unwrap().as_str(), "PRE,ONCE");
    }

    #[test]
    fn anchors_on_preceding_segment_within_target_duration() {
        let mut playlist = MediaPlaylist {
            target_duration: 6,
            segments: vec![
                segment(6.0, Some(pdt(0, 0, 0))),
                segment(6.0, Some(pdt(0, 0, 6))),
            ],
            ..Default::default()
        };

        let decision = decision("P2", "https://ads.example.com/pod/master.m3u8");
        inject_interstitial(&mut playlist, &decision, pdt(0, 0, 10), 30.0);

        assert!(playlist.segments[1].daterange.is_some());
        assert!(playlist.segments[0].daterange.is_none());
    }

    #[test]
    fn idempotent_on_pod_id() {
        let mut playlist = MediaPlaylist {
            target_duration: 6,
            segments: vec![segment(6.0, Some(pdt(0, 0, 0)))],
            ..Default::default()
        };

        let decision = decision("P3", "https://ads.example.com/pod/master.m3u8");
        inject_interstitial(&mut playlist, &decision, pdt(0, 0, 0), 30.0);
        inject_interstitial(&mut playlist, &decision, pdt(0, 0, 0), 30.0);

        let tagged = playlist
            .segments
            .iter()
            .filter(|s| s.daterange.is_some())
            .count();
        assert_eq!(tagged, 1);
    }

    #[test]
    fn empty_decision_is_a_no_op() {
        let mut playlist = MediaPlaylist {
            target_duration: 6,
            segments: vec![segment(6.0, Some(pdt(0, 0, 0)))],
            ..Default::default()
        };

        inject_interstitial(&mut playlist, &AdDecision::empty("P4"), pdt(0, 0, 0), 30.0);
        assert!(playlist.segments[0].daterange.is_none());
    }
}
