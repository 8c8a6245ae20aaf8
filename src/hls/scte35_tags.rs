use chrono::{DateTime, FixedOffset};
use m3u8_rs::MediaPlaylist;

/// A raw (still base64/hex-encoded) SCTE-35 payload found while scanning a
/// media playlist, paired with the PDT context needed to correlate it to
/// wall-clock time (§4.3, §6 "SCTE-35 payload recognition").
#[derive(Debug, Clone, PartialEq)]
pub struct RawCue {
    pub segment_index: usize,
    pub payload: String,
    pub pdt: Option<DateTime<FixedOffset>>,
}

/// Scan every segment for `#EXT-OATCLS-SCTE35` payloads and
/// `#EXT-X-DATERANGE` `SCTE35-OUT`/`SCTE35-IN` attributes.
///
/// m3u8-rs strips the `#EXT-` prefix from unknown tags, so the tag name to
/// match against is `X-OATCLS-SCTE35`, carrying the payload in `rest`.
/// `DateRange.other_attributes` carries `SCTE35-OUT`/`SCTE35-IN` as
/// unquoted hex strings per the OATCLS convention.
pub fn extract_raw_cues(playlist: &MediaPlaylist) -> Vec<RawCue> {
    let mut cues = Vec::new();

    for (index, segment) in playlist.segments.iter().enumerate() {
        for tag in &segment.unknown_tags {
            if tag.tag == "X-OATCLS-SCTE35" || tag.tag == "OATCLS-SCTE35" {
                if let Some(payload) = tag.rest.as_ref() {
                    cues.push(RawCue {
                        segment_index: index,
                        payload: payload.clone(),
                        pdt: segment.program_date_time,
                    });
                }
            }
        }

        if let Some(ref daterange) = segment.daterange {
            let attrs = daterange.other_attributes.as_ref();
            for key in ["SCTE35-OUT", "SCTE35-IN"] {
                if let Some(value) = attrs.and_then(|a| a.get(key)) {
                    cues.push(RawCue {
                        segment_index: index,
                        payload: value.as_str().to_string(),
                        pdt: segment.program_date_time,
                    });
                }
            }
        }
    }

    cues
}
