use crate::error::{GatewayError, Result};
use m3u8_rs::{parse_playlist_res, Playlist};
use tracing::info;

/// Parse an HLS playlist (§4.1).
///
/// Tolerates CRLF/trailing whitespace (handled by `m3u8_rs`); tags this
/// crate does not model explicitly (`#EXT-X-CUE-OUT-CONT`, vendor tags,
/// etc.) land in `unknown_tags` and are preserved verbatim on emission.
/// `#EXTM3U` missing, or an `#EXTINF` without a following URI, surfaces as
/// `MalformedManifest` from `m3u8_rs`'s own parser.
pub fn parse_hls_playlist(content: &str) -> Result<Playlist> {
    match parse_playlist_res(content.as_bytes()) {
        Ok(playlist) => Ok(playlist),
        Err(e) => Err(GatewayError::MalformedManifest(format!("{:?}", e))),
    }
}

/// Serialize a parsed playlist back to text.
///
/// Emission is stable: re-parsing the output of an unmodified parse
/// yields a structurally-equal tree (§8 round-trip property), because
/// `m3u8_rs` preserves tag order and unknown-tag content verbatim.
pub fn serialize_playlist(playlist: &Playlist) -> Result<String> {
    let mut output = Vec::new();
    playlist
        .write_to(&mut output)
        .map_err(|e| GatewayError::MalformedManifest(format!("failed to write playlist: {e}")))?;

    String::from_utf8(output)
        .map_err(|e| GatewayError::MalformedManifest(format!("non-UTF-8 playlist output: {e}")))
}

/// Rewrite multivariant-playlist variant URIs to route through this
/// gateway (§4.7: `GET /{org}/{channel}/master.m3u8` rewrites each
/// variant to `…/{variant}`).
///
/// The original (possibly relative) variant URI is resolved against
/// `origin_base` and carried forward as an `origin` query parameter so
/// the subsequent per-variant request knows where to re-fetch from; the
/// variant's `BANDWIDTH` (kbps) rides along as `bitrate` so the variant
/// handler can pick the matching ad-pod rung without parsing filenames.
pub fn rewrite_master_urls(
    mut playlist: Playlist,
    org: &str,
    channel: &str,
    base_url: &str,
    origin_base: &str,
) -> Playlist {
    if let Playlist::MasterPlaylist(ref mut master) = playlist {
        for variant in master.variants.iter_mut() {
            let absolute = resolve(&variant.uri, origin_base);
            let variant_name = basename(&variant.uri);
            let bitrate_kbps = variant.bandwidth / 1000;
            variant.uri = format!(
                "{base_url}/{org}/{channel}/{variant_name}?origin={absolute}&bitrate={bitrate_kbps}"
            );
            info!("rewrote variant {} -> {}", absolute, variant.uri);
        }

        for alt in master.alternatives.iter_mut() {
            if let Some(ref mut uri) = alt.uri {
                let absolute = resolve(uri, origin_base);
                let variant_name = basename(uri);
                *uri = format!("{base_url}/{org}/{channel}/{variant_name}?origin={absolute}");
            }
        }
    }

    playlist
}

fn resolve(uri: &str, origin_base: &str) -> String {
    if uri.starts_with("http") {
        uri.to_string()
    } else {
        format!("{origin_base}/{uri}")
    }
}

fn basename(uri: &str) -> &str {
    uri.rsplit_once('/').map(|(_, name)| name).unwrap_or(uri)
}

/// Resolve every relative segment URI in a media playlist against
/// `origin_base`, so players fetch segments straight from the origin/CDN
/// instead of through this gateway (which proxies only master and variant
/// manifests, never individual segments).
pub fn absolutize_segment_urls(playlist: &mut m3u8_rs::MediaPlaylist, origin_base: &str) {
    for segment in playlist.segments.iter_mut() {
        segment.uri = resolve(&segment.uri, origin_base);
    }
}

/// The directory a manifest URL lives in, used as the base for resolving
/// the relative URIs it contains.
pub fn origin_base_of(url: &str) -> String {
    url.rsplit_once('/').map(|(base, _)| base.to_string()).unwrap_or_else(|| url.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use m3u8_rs::{AlternativeMedia, AlternativeMediaType, MasterPlaylist, VariantStream};

    #[test]
    fn rewrites_relative_variant_uris() {
        let playlist = Playlist::MasterPlaylist(MasterPlaylist {
            variants: vec![
                VariantStream {
                    uri: "720p/playlist.m3u8".to_string(),
                    bandwidth: 2_000_000,
                    ..Default::default()
                },
                VariantStream {
                    uri: "1080p/playlist.m3u8".to_string(),
                    bandwidth: 5_000_000,
                    ..Default::default()
                },
            ],
            ..Default::default()
        });

        let result = rewrite_master_urls(
            playlist,
            "acme",
            "sports1",
            "https://gw.example.com",
            "https://cdn.example.com/stream",
        );

        if let Playlist::MasterPlaylist(master) = result {
            assert_eq!(
                master.variants[0].uri,
                "https://gw.example.com/acme/sports1/playlist.m3u8?origin=https://cdn.example.com/stream/720p/playlist.m3u8&bitrate=2000"
            );
        } else {
            panic!("expected MasterPlaylist");
        }
    }

    #[test]
    fn rewrites_alternatives() {
        let playlist = Playlist::MasterPlaylist(MasterPlaylist {
            variants: vec![VariantStream {
                uri: "video/playlist.m3u8".to_string(),
                bandwidth: 2_000_000,
                ..Default::default()
            }],
            alternatives: vec![AlternativeMedia {
                media_type: AlternativeMediaType::Audio,
                uri: Some("audio/en/playlist.m3u8".to_string()),
                group_id: "audio".to_string(),
                ..Default::default()
            }],
            ..Default::default()
        });

        let result = rewrite_master_urls(
            playlist,
            "acme",
            "sports1",
            "https://gw.example.com",
            "https://cdn.example.com/stream",
        );

        if let Playlist::MasterPlaylist(master) = result {
            assert!(master.alternatives[0]
                .uri
                .as_deref()
                .unwrap()
                .contains("origin=https://cdn.example.com/stream/audio/en/playlist.m3u8"));
        } else {
            panic!("expected MasterPlaylist");
        }
    }

    #[test]
    fn parse_emit_parse_is_stable() {
        let m3u8 = "#EXTM3U\n#EXT-X-VERSION:3\n#EXT-X-TARGETDURATION:6\n#EXTINF:6.0,\nseg0.ts\n#EXTINF:6.0,\nseg1.ts\n#EXT-X-ENDLIST\n";

        let first = parse_hls_playlist(m3u8).unwrap();
        let emitted = serialize_playlist(&first).unwrap();
        let second = parse_hls_playlist(&emitted).unwrap();

        match (first, second) {
            (Playlist::MediaPlaylist(a), Playlist::MediaPlaylist(b)) => {
                assert_eq!(a.segments.len(), b.segments.len());
                assert_eq!(a.target_duration, b.target_duration);
            }
            _ => panic!("expected media playlists"),
        }
    }

    #[test]
    fn missing_extm3u_is_malformed() {
        let result = parse_hls_playlist("#EXTINF:6.0,\nseg0.ts\n");
        assert!(matches!(result, Err(GatewayError::MalformedManifest(_))));
    }

    #[test]
    fn absolutizes_relative_segment_uris() {
        let mut playlist = m3u8_rs::MediaPlaylist {
            segments: vec![
                m3u8_rs::MediaSegment {
                    uri: "seg0.ts".to_string(),
                    duration: 6.0,
                    ..Default::default()
                },
                m3u8_rs::MediaSegment {
                    uri: "https://already.example.com/seg1.ts".to_string(),
                    duration: 6.0,
                    ..Default::default()
                },
            ],
            ..Default::default()
        };

        absolutize_segment_urls(&mut playlist, "https://cdn.example.com/sports1/1600k");
        assert_eq!(
            playlist.segments[0].uri,
            "https://cdn.example.com/sports1/1600k/seg0.ts"
        );
        assert_eq!(playlist.segments[1].uri, "https://already.example.com/seg1.ts");
    }

    #[test]
    fn origin_base_of_strips_filename() {
        assert_eq!(
            origin_base_of("https://cdn.example.com/sports1/1600k/playlist.m3u8"),
            "https://cdn.example.com/sports1/1600k"
        );
    }
}
