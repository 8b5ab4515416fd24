//! User identity derivation from trusted proxy headers.
//!
//! The gateway in front of this service authenticates end users; this module
//! only binds a stable identity to each request so admission control and
//! telemetry have something to key on.

pub mod rate;

#[cfg(test)]
mod tests;

pub use rate::{Decision, RateGate};

use std::net::IpAddr;

use axum::http::HeaderMap;
use ipnet::IpNet;

use crate::hashing::hash_api_key;

/// Where an identity was derived from, in precedence order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdentityOrigin {
    /// Configured user-id header, peer inside the trusted proxy set.
    UserHeader,
    /// Configured client-id header.
    ClientHeader,
    /// Hashed Authorization token / API key.
    ApiKey,
    /// Client IP address.
    Ip,
}

impl IdentityOrigin {
    /// Stable string form for logs and telemetry.
    pub fn as_str(&self) -> &'static str {
        match self {
            IdentityOrigin::UserHeader => "user_header",
            IdentityOrigin::ClientHeader => "client_header",
            IdentityOrigin::ApiKey => "api_key",
            IdentityOrigin::Ip => "ip",
        }
    }
}

/// A resolved per-request identity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserIdentity {
    /// Stable identifier used for rate buckets and logs.
    pub user_id: String,
    /// Rate tier name.
    pub tier: String,
    /// Best-effort client IP (forwarded hop only when the peer is trusted).
    pub source_ip: IpAddr,
    /// How the identity was derived.
    pub origin: IdentityOrigin,
}

/// Header names and trust configuration for identity resolution.
#[derive(Debug, Clone)]
pub struct IdentityConfig {
    /// Whether forwarded/identity headers are honored at all.
    pub enable_proxy_headers: bool,
    /// Peers whose headers are trusted.
    pub trusted_proxy_ips: Vec<IpNet>,
    /// Header carrying the end-user id.
    pub user_id_header: String,
    /// Header carrying the client id.
    pub client_id_header: String,
    /// Header carrying the tier name.
    pub user_tier_header: String,
    /// Known tier names; unknown header values fall back to `default`.
    pub known_tiers: Vec<String>,
}

impl IdentityConfig {
    /// Builds the identity config from the service configuration.
    pub fn from_config(config: &crate::config::Config) -> Self {
        Self {
            enable_proxy_headers: config.enable_proxy_headers,
            trusted_proxy_ips: config.trusted_proxy_ips.clone(),
            user_id_header: config.user_id_header.clone(),
            client_id_header: config.client_id_header.clone(),
            user_tier_header: config.user_tier_header.clone(),
            known_tiers: config.rate_limit_tiers.keys().cloned().collect(),
        }
    }
}

/// Derives [`UserIdentity`] values from request headers and peer addresses.
#[derive(Debug)]
pub struct IdentityResolver {
    config: IdentityConfig,
}

impl IdentityResolver {
    /// Creates a resolver. Logs the trust configuration once so operators can
    /// spot a misconfigured proxy set in startup logs.
    pub fn new(config: IdentityConfig) -> Self {
        if config.enable_proxy_headers && config.trusted_proxy_ips.is_empty() {
            tracing::warn!(
                "proxy headers enabled but trusted_proxy_ips is empty; \
                 identity headers will never be honored"
            );
        }
        Self { config }
    }

    /// Returns `true` when `peer` falls inside the trusted proxy CIDR set.
    pub fn is_trusted_peer(&self, peer: IpAddr) -> bool {
        self.config.enable_proxy_headers
            && self
                .config
                .trusted_proxy_ips
                .iter()
                .any(|net| net.contains(&peer))
    }

    /// Resolves the identity for one request.
    ///
    /// Derivation order, stopping at the first non-empty source:
    /// 1. user-id header (trusted peer only)
    /// 2. client-id header
    /// 3. hashed Authorization token
    /// 4. client IP
    ///
    /// Header parse failures are non-fatal; resolution falls through to the
    /// next source.
    pub fn resolve(&self, headers: &HeaderMap, peer: IpAddr) -> UserIdentity {
        let trusted = self.is_trusted_peer(peer);
        let source_ip = self.client_ip(headers, peer, trusted);
        let tier = self.resolve_tier(headers);

        if trusted {
            if let Some(user_id) = header_value(headers, &self.config.user_id_header) {
                return UserIdentity {
                    user_id,
                    tier,
                    source_ip,
                    origin: IdentityOrigin::UserHeader,
                };
            }
        }

        if let Some(client_id) = header_value(headers, &self.config.client_id_header) {
            return UserIdentity {
                user_id: format!("client-{client_id}"),
                tier,
                source_ip,
                origin: IdentityOrigin::ClientHeader,
            };
        }

        if let Some(token) = header_value(headers, "authorization") {
            return UserIdentity {
                user_id: hash_api_key(&token),
                tier,
                source_ip,
                origin: IdentityOrigin::ApiKey,
            };
        }

        UserIdentity {
            user_id: format!("ip-{source_ip}"),
            tier,
            source_ip,
            origin: IdentityOrigin::Ip,
        }
    }

    /// Resolves the effective client IP.
    ///
    /// Forwarded headers are only honored when the peer is trusted; otherwise
    /// the raw peer address wins regardless of what the request claims.
    fn client_ip(&self, headers: &HeaderMap, peer: IpAddr, trusted: bool) -> IpAddr {
        if !trusted {
            return peer;
        }

        if let Some(forwarded) = header_value(headers, "x-forwarded-for") {
            // First hop is the original client.
            if let Some(first) = forwarded.split(',').next() {
                if let Ok(addr) = first.trim().parse::<IpAddr>() {
                    return addr;
                }
            }
        }

        if let Some(real_ip) = header_value(headers, "x-real-ip") {
            if let Ok(addr) = real_ip.trim().parse::<IpAddr>() {
                return addr;
            }
        }

        peer
    }

    fn resolve_tier(&self, headers: &HeaderMap) -> String {
        match header_value(headers, &self.config.user_tier_header) {
            Some(tier) if self.config.known_tiers.iter().any(|t| t == &tier) => tier,
            _ => "default".to_string(),
        }
    }
}

fn header_value(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}
