use crate::error::GatewayError;
use std::net::{Ipv4Addr, Ipv6Addr};
use tracing::warn;
use url::{Host, Url};

/// Validate that an origin URL is safe to fetch (SSRF protection).
///
/// Accepts only `http://` and `https://` URLs with a non-private host.
///
/// **IP literals** are checked against blocked ranges.
/// **Hostnames** are accepted without DNS resolution — DNS rebinding is a
/// known limitation accepted here; full mitigation requires async DNS lookup.
///
/// # Errors
/// Returns [`GatewayError::BadRequest`] for:
/// - Invalid or relative URLs
/// - Non-HTTP(S) schemes
/// - IPv4 addresses in private/reserved ranges
/// - IPv6 loopback or link-local/unique-local addresses
pub fn validate_origin_url(url: &str) -> Result<(), GatewayError> {
    let parsed =
        Url::parse(url).map_err(|_| GatewayError::BadRequest(format!("Invalid URL: {url}")))?;

    // Only allow HTTP(S)
    match parsed.scheme() {
        "http" | "https" => {}
        scheme => {
            return Err(GatewayError::BadRequest(format!(
                "Scheme '{scheme}' not allowed — only http/https permitted"
            )));
        }
    }

    // Require a host
    let host = parsed
        .host()
        .ok_or_else(|| GatewayError::BadRequest(format!("No host in URL: {url}")))?;

    match host {
        Host::Ipv4(ip) => {
            if is_blocked_ipv4(ip) {
                warn!("SSRF: blocked IPv4 origin {ip} from {url}");
                return Err(GatewayError::BadRequest(
                    "Origin address is not allowed".to_string(),
                ));
            }
        }
        Host::Ipv6(ip) => {
            // Check native IPv6 ranges first
            if is_blocked_ipv6(ip) {
                warn!("SSRF: blocked IPv6 origin {ip} from {url}");
                return Err(GatewayError::BadRequest(
                    "Origin address is not allowed".to_string(),
                ));
            }
            // Check for IPv4-mapped/compatible/NAT64 bypass vectors
            if let Some(embedded_v4) = extract_embedded_ipv4(ip)
                && is_blocked_ipv4(embedded_v4)
            {
                warn!(
                    "SSRF: blocked IPv4-mapped IPv6 origin {ip} (embedded {embedded_v4}) from {url}"
                );
                return Err(GatewayError::BadRequest(
                    "Origin address is not allowed".to_string(),
                ));
            }
        }
        // Hostnames are allowed — we cannot resolve them without async DNS
        Host::Domain(_) => {}
    }

    Ok(())
}

/// Returns `true` for IPv4 addresses in private or reserved ranges.
///
/// Blocked ranges:
/// - `0.0.0.0/8`       — "this" network (RFC 1122)
/// - `10.0.0.0/8`      — RFC 1918 private
/// - `100.64.0.0/10`   — RFC 6598 CGNAT (cloud-internal)
/// - `127.0.0.0/8`     — loopback
/// - `169.254.0.0/16`  — link-local / cloud-metadata (AWS, GCP, Azure)
/// - `172.16.0.0/12`   — RFC 1918 private
/// - `192.0.0.0/24`    — IETF protocol assignments (RFC 6890)
/// - `192.0.2.0/24`    — TEST-NET-1 (RFC 5737)
/// - `192.168.0.0/16`  — RFC 1918 private
/// - `198.18.0.0/15`   — benchmarking (RFC 2544)
/// - `198.51.100.0/24` — TEST-NET-2 (RFC 5737)
/// - `203.0.113.0/24`  — TEST-NET-3 (RFC 5737)
/// - `240.0.0.0/4`     — reserved / Class E (RFC 1112)
/// - `255.255.255.255`  — broadcast
fn is_blocked_ipv4(ip: Ipv4Addr) -> bool {
    let o = ip.octets();
    let (a, b, c) = (o[0], o[1], o[2]);

    a == 0                                       // 0.0.0.0/8
        || a == 10                               // 10.0.0.0/8
        || (a == 100 && (b & 0xC0) == 64)        // 100.64.0.0/10 CGNAT
        || a == 127                              // 127.0.0.0/8 loopback
        || (a == 169 && b == 254)                // 169.254.0.0/16 link-local
        || (a == 172 && (16..=31).contains(&b))  // 172.16.0.0/12
        || (a == 192 && b == 0 && c == 0)        // 192.0.0.0/24 IETF
        || (a == 192 && b == 0 && c == 2)        // 192.0.2.0/24 TEST-NET-1
        || (a == 192 && b == 168)                // 192.168.0.0/16
        || (a == 198 && (b & 0xFE) == 18)        // 198.18.0.0/15 benchmarking
        || (a == 198 && b == 51 && c == 100)     // 198.51.100.0/24 TEST-NET-2
        || (a == 203 && b == 0 && c == 113)      // 203.0.113.0/24 TEST-NET-3
        || a >= 240 // 240.0.0.0/4 reserved + broadcast
}

/// Returns `true` for IPv6 addresses in private or reserved ranges.
///
/// Blocked ranges:
/// - `::`          — unspecified (INADDR_ANY)
/// - `::1/128`     — loopback
/// - `fe80::/10`   — link-local
/// - `fc00::/7`    — unique-local (ULA)
/// - `2001:db8::/32` — documentation (RFC 3849)
///
/// IPv4-mapped/compatible/NAT64 addresses are handled separately via
/// [`extract_embedded_ipv4`].
fn is_blocked_ipv6(ip: Ipv6Addr) -> bool {
    let s = ip.segments();

    ip.is_unspecified()                  // ::
        || ip.is_loopback()              // ::1
        || (s[0] & 0xffc0) == 0xfe80    // fe80::/10 link-local
        || (s[0] & 0xfe00) == 0xfc00    // fc00::/7 unique-local
        || (s[0] == 0x2001 && s[1] == 0x0db8) // 2001:db8::/32 documentation
}

/// Extract an embedded IPv4 address from IPv6 transitional formats.
///
/// Catches bypass vectors where attackers use IPv6 notation to smuggle
/// private IPv4 addresses past the validator:
/// - `::ffff:x.x.x.x` — IPv4-mapped (RFC 4291)
/// - `::x.x.x.x`      — IPv4-compatible (deprecated, RFC 4291)
/// - `64:ff9b::/96`    — NAT64 well-known prefix (RFC 6052)
/// - `64:ff9b:1::/48`  — NAT64 local-use prefix (RFC 8215)
fn extract_embedded_ipv4(ip: Ipv6Addr) -> Option<Ipv4Addr> {
    let segs = ip.segments();
    let bytes = ip.octets();

    // ::ffff:x.x.x.x (IPv4-mapped)
    if segs[0..5] == [0; 5] && segs[5] == 0xffff {
        return Some(Ipv4Addr::new(bytes[12], bytes[13], bytes[14], bytes[15]));
    }

    // ::x.x.x.x (IPv4-compatible, deprecated) — all zeros except last 32 bits,
    // but not :: (unspecified) or ::1 (loopback) which are native IPv6.
    if segs[0..6] == [0; 6] && (segs[6] != 0 || segs[7] > 1) {
        return Some(Ipv4Addr::new(bytes[12], bytes[13], bytes[14], bytes[15]));
    }

    // 64:ff9b::/96 (NAT64 well-known) and 64:ff9b:1::/48 (NAT64 local-use)
    if segs[0] == 0x0064 && segs[1] == 0xff9b {
        return Some(Ipv4Addr::new(bytes[12], bytes[13], bytes[14], bytes[15]));
    }

    None
}
