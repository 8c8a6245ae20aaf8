//! Server-Side Ad Insertion: replace content segments spanning an ad break
//! with ad-pod segments, bracketed by `#EXT-X-DISCONTINUITY` (§4.2.2).

use crate::error::{GatewayError, Result};
use crate::types::AdDecision;
use chrono::{DateTime, FixedOffset};
use m3u8_rs::MediaPlaylist;

/// Splice `decision`'s ad pod into `playlist` starting at the first segment
/// whose PDT is `>= p0`.
///
/// `bitrate_kbps` selects which per-item variant URI is used (nearest match,
/// §4.2.2 bitrate selection rule). Returns `PdtMissing` if `p0` has aged out
/// of the playlist window, and `NoMatchingVariant` if an item has no variant
/// for any bitrate at all.
pub fn splice_ad_break(
    mut playlist: MediaPlaylist,
    decision: &AdDecision,
    p0: DateTime<FixedOffset>,
    bitrate_kbps: u32,
) -> Result<MediaPlaylist> {
    if decision.is_empty() {
        return Ok(playlist);
    }

    let i0 = playlist
        .segments
        .iter()
        .position(|seg| matches!(seg.program_date_time, Some(pdt) if pdt >= p0))
        .ok_or(GatewayError::PdtMissing)?;

    let pod_duration_s = decision.total_duration_s();

    let mut cumulative = 0.0_f32;
    let mut i1 = i0;
    for (offset, seg) in playlist.segments[i0..].iter().enumerate() {
        cumulative += seg.duration;
        i1 = i0 + offset;
        if cumulative >= pod_duration_s {
            break;
        }
    }
    let spans_to_end = cumulative < pod_duration_s;

    let mut ad_segments = Vec::with_capacity(decision.items.len());
    let mut elapsed_s = 0.0_f32;
    for item in &decision.items {
        let uri = item
            .variant_for_bitrate(bitrate_kbps)
            .ok_or(GatewayError::NoMatchingVariant)?;

        ad_segments.push(m3u8_rs::MediaSegment {
            uri: uri.to_string(),
            duration: item.duration_s,
            title: None,
            byte_range: None,
            discontinuity: false,
            key: None,
            map: None,
            program_date_time: Some(p0 + chrono::Duration::milliseconds((elapsed_s * 1000.0) as i64)),
            daterange: None,
            unknown_tags: Vec::new(),
        });
        elapsed_s += item.duration_s;
    }
    ad_segments[0].discontinuity = true;

    let mut new_segments = Vec::with_capacity(playlist.segments.len() + ad_segments.len());
    new_segments.extend_from_slice(&playlist.segments[..i0]);
    new_segments.append(&mut ad_segments);

    let splice_out_pdt = p0 + chrono::Duration::milliseconds((pod_duration_s * 1000.0) as i64);

    if !spans_to_end {
        let tail_start = i1 + 1;
        if tail_start < playlist.segments.len() {
            let mut first_tail = playlist.segments[tail_start].clone();
            first_tail.discontinuity = true;
            first_tail.program_date_time = Some(splice_out_pdt);
            new_segments.push(first_tail);
            new_segments.extend_from_slice(&playlist.segments[tail_start + 1..]);
        }
    }

    playlist.segments = new_segments;
    Ok(playlist)
}
