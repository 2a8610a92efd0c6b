//! Client IP extraction from HTTP headers with trust validation
//!
//! - `Forwarded` (RFC 7239) and `X-Forwarded-For` chains are walked right to
//!   left, skipping trusted proxies
//! - `CF-Connecting-IP` is honoured in Cloudflare mode
//! - Falls back to the socket remote address when headers are absent or untrusted

use axum::http::HeaderMap;
use std::net::IpAddr;
use tracing::warn;

use crate::config::{ProxyConfig, TrustedProxyMode};

/// Extract the client IP address for a request
///
/// # Arguments
/// * `headers` - HTTP request headers
/// * `socket_addr` - The socket remote address (fallback)
/// * `config` - Proxy trust settings
pub fn extract_client_ip(headers: &HeaderMap, socket_addr: IpAddr, config: &ProxyConfig) -> IpAddr {
    match config.trusted_proxy_mode {
        TrustedProxyMode::Cloudflare => extract_cloudflare_ip(headers).unwrap_or_else(|| {
            warn!("CF-Connecting-IP header missing in Cloudflare mode, using socket address");
            socket_addr
        }),
        TrustedProxyMode::Standard => extract_standard_ip(headers, config).unwrap_or(socket_addr),
        TrustedProxyMode::None => socket_addr,
    }
}

fn extract_cloudflare_ip(headers: &HeaderMap) -> Option<IpAddr> {
    headers
        .get("cf-connecting-ip")
        .and_then(|h| h.to_str().ok())
        .and_then(|s| s.trim().parse::<IpAddr>().ok())
}

/// Prefer the RFC 7239 `Forwarded` header, fall back to `X-Forwarded-For`
fn extract_standard_ip(headers: &HeaderMap, config: &ProxyConfig) -> Option<IpAddr> {
    let forwarded = forwarded_chain(headers);
    if let Some(ip) = select_client(&forwarded, config) {
        return Some(ip);
    }

    select_client(&x_forwarded_for_chain(headers), config)
}

/// `for=` nodes of every `Forwarded` element, client first
fn forwarded_chain(headers: &HeaderMap) -> Vec<IpAddr> {
    headers
        .get_all("forwarded")
        .iter()
        .filter_map(|h| h.to_str().ok())
        .flat_map(|value| value.split(','))
        .flat_map(|element| element.split(';'))
        .filter_map(|param| {
            let (key, value) = param.trim().split_once('=')?;
            if key.eq_ignore_ascii_case("for") {
                parse_node(value)
            } else {
                None
            }
        })
        .collect()
}

fn x_forwarded_for_chain(headers: &HeaderMap) -> Vec<IpAddr> {
    headers
        .get_all("x-forwarded-for")
        .iter()
        .filter_map(|h| h.to_str().ok())
        .flat_map(|value| value.split(','))
        .filter_map(|s| s.trim().parse::<IpAddr>().ok())
        .collect()
}

/// Parse a `Forwarded` node: `192.0.2.60`, `"192.0.2.60:4711"` or `"[2001:db8::1]:4711"`
fn parse_node(value: &str) -> Option<IpAddr> {
    let value = value.trim().trim_matches('"');

    if let Some(rest) = value.strip_prefix('[') {
        let (addr, _) = rest.split_once(']')?;
        return addr.parse().ok();
    }

    if let Ok(ip) = value.parse::<IpAddr>() {
        return Some(ip);
    }

    let (addr, _port) = value.rsplit_once(':')?;
    addr.parse().ok()
}

/// Pick the client address from a proxy chain (leftmost = original client).
///
/// With `num_trusted_proxies` that many hops are skipped from the right. With
/// `trusted_proxies` the first address from the right outside every trusted
/// network wins. Without trust configuration the rightmost address is used.
fn select_client(chain: &[IpAddr], config: &ProxyConfig) -> Option<IpAddr> {
    if chain.is_empty() {
        return None;
    }

    if let Some(num_trusted) = config.num_trusted_proxies {
        if chain.len() > num_trusted {
            return Some(chain[chain.len() - num_trusted - 1]);
        }
        // Not enough hops in the chain, return the leftmost (least trusted)
        return chain.first().copied();
    }

    if !config.trusted_proxies.is_empty() {
        return chain
            .iter()
            .rev()
            .find(|ip| !config.trusted_proxies.iter().any(|net| net.contains(*ip)))
            .or_else(|| chain.first())
            .copied();
    }

    chain.last().copied()
}
