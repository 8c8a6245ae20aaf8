use crate::error::{GatewayError, Result};
use crate::types::{Cue, CueCommandType};
use chrono::{DateTime, FixedOffset};
use scte35::{parse_splice_info_section, SpliceCommand};

/// Decode a base64 or hex SCTE-35 splice_info_section into a `Cue` (§4.3).
///
/// Only `splice_insert` and `time_signal` carry a transition-relevant
/// `event_id`; `time_signal` pairs with a segmentation descriptor whose
/// `out_of_network_indicator` this crate does not yet parse, so it defaults
/// `out_of_network_indicator` to `true` — a `time_signal` with no
/// out-of-network descriptor is assumed to mark a break start, matching
/// the common OATCLS-SCTE35 encoder convention. Everything else
/// (`splice_null`, `bandwidth_reservation`, etc.) is recognised but
/// produces no cue.
///
/// `pdt` is supplied by the caller from the manifest's own
/// Program-Date-Time context at the tag's position — SCTE-35's own PTS
/// fields are relative to the stream's presentation clock, not wall time.
pub fn decode_cue(raw: &str, pdt: Option<DateTime<FixedOffset>>) -> Result<Option<Cue>> {
    let bytes = decode_payload(raw)?;
    let section = parse_splice_info_section(&bytes)
        .map_err(|e| GatewayError::InvalidScte35(format!("{e}")))?;

    let tier = section.tier;

    match section.splice_command {
        SpliceCommand::SpliceInsert(ref insert) => Ok(Some(Cue {
            event_id: insert.splice_event_id,
            command_type: CueCommandType::SpliceInsert,
            pdt,
            duration_s: insert
                .break_duration
                .as_ref()
                .map(|d| d.to_duration().as_secs_f32()),
            tier,
            out_of_network_indicator: insert.out_of_network_indicator != 0,
        })),
        SpliceCommand::TimeSignal(ref signal) => {
            // time_signal carries no event_id of its own; the accompanying
            // segmentation descriptor normally supplies one, but this
            // decoder only reads the splice command. Derive a stable
            // surrogate from the PTS so repeats of the same signal dedup.
            let event_id = signal.splice_time.pts_time.unwrap_or(0) as u32;
            Ok(Some(Cue {
                event_id,
                command_type: CueCommandType::TimeSignal,
                pdt,
                duration_s: None,
                tier,
                out_of_network_indicator: true,
            }))
        }
        _ => Ok(None),
    }
}

fn decode_payload(raw: &str) -> Result<Vec<u8>> {
    let raw = raw.trim();

    if let Some(hex) = raw.strip_prefix("0x").or_else(|| raw.strip_prefix("0X")) {
        return decode_hex(hex);
    }

    if raw.bytes().all(|b| b.is_ascii_hexdigit()) && raw.len() % 2 == 0 && raw.len() > 2 {
        return decode_hex(raw);
    }

    use base64::Engine;
    base64::engine::general_purpose::STANDARD
        .decode(raw.as_bytes())
        .map_err(|e| GatewayError::InvalidScte35(format!("invalid base64 payload: {e}")))
}

fn decode_hex(hex: &str) -> Result<Vec<u8>> {
    (0..hex.len())
        .step_by(2)
        .map(|i| {
            hex.get(i..i + 2)
                .ok_or_else(|| GatewayError::InvalidScte35("odd-length hex payload".into()))
                .and_then(|byte| {
                    u8::from_str_radix(byte, 16)
                        .map_err(|e| GatewayError::InvalidScte35(format!("invalid hex: {e}")))
                })
        })
        .collect()
}
