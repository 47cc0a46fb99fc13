//! Detection service endpoint parsing.

use anyhow::{anyhow, Context, Result};
use url::Url;

pub const DEFAULT_WS_PATH: &str = "/ws";

/// Resolve a configured server address into a websocket URL.
///
/// Accepted forms:
/// - `ws://host:port/path` / `wss://...`, used as-is,
/// - `http://host:port` / `https://...`, rewritten to `ws(s)` with `/ws`
///   appended when no path is given,
/// - bare `host:port`, taken as `ws://host:port/ws`.
pub fn parse_server_endpoint(addr: &str) -> Result<Url> {
    let addr = addr.trim();
    if addr.is_empty() {
        return Err(anyhow!("detection server address is empty"));
    }

    let (scheme, rest) = match addr.split_once("://") {
        Some((scheme, rest)) => (scheme.to_ascii_lowercase(), rest),
        None => ("ws".to_string(), addr),
    };
    let ws_scheme = match scheme.as_str() {
        "ws" | "http" => "ws",
        "wss" | "https" => "wss",
        other => return Err(anyhow!("unsupported detection server scheme: {}", other)),
    };

    let mut url = Url::parse(&format!("{}://{}", ws_scheme, rest))
        .with_context(|| format!("invalid detection server address {}", addr))?;
    if url.host_str().is_none() {
        return Err(anyhow!("detection server address has no host: {}", addr));
    }
    if url.path().is_empty() || url.path() == "/" {
        url.set_path(DEFAULT_WS_PATH);
    }
    Ok(url)
}

/// Whether the endpoint points at this machine.
pub fn is_loopback(url: &Url) -> bool {
    match url.host_str() {
        Some("localhost") => true,
        Some(host) => host
            .trim_start_matches('[')
            .trim_end_matches(']')
            .parse::<std::net::IpAddr>()
            .map(|ip| ip.is_loopback())
            .unwrap_or(false),
        None => false,
    }
}
