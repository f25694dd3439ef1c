use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;
use tracing::{info, warn};

use crate::utils::parse_headers_with_escapes;

/// How long idle pooled connections are kept.
const POOL_IDLE_TIMEOUT: Duration = Duration::from_secs(90);

/// TCP keepalive for pooled connections.
const TCP_KEEPALIVE: Duration = Duration::from_secs(60);

/// Configuration for building the shared HTTP client.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub request_timeout: Duration,
    pub pool_max_idle_per_host: usize,
    pub skip_tls_verify: bool,
    pub resolve_target_addr: Option<String>,
    pub custom_headers: Option<String>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(30),
            pool_max_idle_per_host: 32,
            skip_tls_verify: false,
            resolve_target_addr: None,
            custom_headers: None,
        }
    }
}

/// Builds the reqwest client every worker shares.
///
/// `reqwest::Client` is internally reference counted and safe for concurrent
/// use, so one instance serves the whole pool.
pub fn build_client(
    config: &ClientConfig,
) -> Result<reqwest::Client, Box<dyn std::error::Error + Send + Sync>> {
    let mut client_builder = reqwest::Client::builder()
        .timeout(config.request_timeout)
        .pool_max_idle_per_host(config.pool_max_idle_per_host)
        .pool_idle_timeout(POOL_IDLE_TIMEOUT)
        .tcp_keepalive(TCP_KEEPALIVE);

    if let Some(resolve_str) = config.resolve_target_addr.as_deref() {
        if resolve_str.is_empty() {
            warn!("RESOLVE_TARGET_ADDR is set but empty, no DNS override will be applied");
        } else {
            let (hostname, addr) = parse_dns_override(resolve_str)?;
            info!(hostname = %hostname, addr = %addr, "Applying DNS override");
            client_builder = client_builder.resolve(&hostname, addr);
        }
    }

    let headers = parse_custom_headers(config.custom_headers.as_deref())?;
    if !headers.is_empty() {
        info!(count = headers.len(), "Configured custom default headers");
        client_builder = client_builder.default_headers(headers);
    }

    if config.skip_tls_verify {
        warn!("Skipping TLS certificate verification");
        client_builder = client_builder
            .danger_accept_invalid_certs(true)
            .danger_accept_invalid_hostnames(true);
    }

    Ok(client_builder.build()?)
}

/// Parses a `hostname:ip:port` DNS override.
pub fn parse_dns_override(
    resolve_str: &str,
) -> Result<(String, SocketAddr), Box<dyn std::error::Error + Send + Sync>> {
    let parts: Vec<&str> = resolve_str.split(':').map(str::trim).collect();
    if parts.len() != 3 {
        return Err(format!(
            "RESOLVE_TARGET_ADDR ('{}') is not in the expected format 'hostname:ip:port'",
            resolve_str
        )
        .into());
    }

    let (hostname, ip, port) = (parts[0], parts[1], parts[2]);
    if hostname.is_empty() || ip.is_empty() || port.is_empty() {
        return Err(format!(
            "RESOLVE_TARGET_ADDR ('{}'): hostname, IP and port must all be non-empty",
            resolve_str
        )
        .into());
    }

    let port: u16 = port.parse().map_err(|e| {
        format!(
            "Failed to parse port '{}' in RESOLVE_TARGET_ADDR: {}",
            port, e
        )
    })?;
    let addr: SocketAddr = format!("{}:{}", ip, port).parse().map_err(|e| {
        format!(
            "Failed to parse IP '{}' in RESOLVE_TARGET_ADDR: {}",
            ip, e
        )
    })?;

    Ok((hostname.to_string(), addr))
}

/// Parses `Name:Value` pairs separated by commas (`\,` escapes a comma).
pub fn parse_custom_headers(
    custom_headers_str: Option<&str>,
) -> Result<HeaderMap, Box<dyn std::error::Error + Send + Sync>> {
    let mut parsed_headers = HeaderMap::new();

    let headers_str = match custom_headers_str {
        Some(s) if !s.trim().is_empty() => s,
        _ => return Ok(parsed_headers),
    };

    for pair in parse_headers_with_escapes(headers_str) {
        let pair = pair.trim();
        let (name, value) = pair.split_once(':').ok_or_else(|| {
            format!(
                "Invalid header format in CUSTOM_HEADERS: '{}'. Expected 'Name:Value'.",
                pair
            )
        })?;

        let name = name.trim();
        if name.is_empty() {
            return Err(format!("Header name cannot be empty in '{}'", pair).into());
        }

        let header_name = HeaderName::from_str(name)
            .map_err(|e| format!("Invalid header name '{}': {}", name, e))?;
        let header_value = HeaderValue::from_str(value.trim())
            .map_err(|e| format!("Invalid header value for '{}': {}", name, e))?;

        parsed_headers.insert(header_name, header_value);
    }

    Ok(parsed_headers)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_dns_override() {
        let (host, addr) = parse_dns_override("api.local:127.0.0.1:8080").unwrap();
        assert_eq!(host, "api.local");
        assert_eq!(addr, "127.0.0.1:8080".parse::<SocketAddr>().unwrap());
    }

    #[test]
    fn test_parse_dns_override_rejects_bad_input() {
        assert!(parse_dns_override("api.local:127.0.0.1").is_err());
        assert!(parse_dns_override(":127.0.0.1:80").is_err());
        assert!(parse_dns_override("api.local:127.0.0.1:http").is_err());
        assert!(parse_dns_override("api.local:not-an-ip:80").is_err());
    }

    #[test]
    fn test_parse_custom_headers() {
        let headers =
            parse_custom_headers(Some("X-Api-Key:secret,Accept:text/html\\,application/json"))
                .unwrap();
        assert_eq!(headers.len(), 2);
        assert_eq!(headers["x-api-key"], "secret");
        assert_eq!(headers["accept"], "text/html,application/json");
    }

    #[test]
    fn test_parse_custom_headers_empty_and_invalid() {
        assert!(parse_custom_headers(None).unwrap().is_empty());
        assert!(parse_custom_headers(Some("  ")).unwrap().is_empty());
        assert!(parse_custom_headers(Some("NoColonHere")).is_err());
        assert!(parse_custom_headers(Some(":value")).is_err());
    }

    #[test]
    fn test_build_default_client() {
        assert!(build_client(&ClientConfig::default()).is_ok());
    }
}
