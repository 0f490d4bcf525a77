// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Management-token validation: JWKS-backed JWT verification plus the
//! origin allowlist for WebSocket upgrades.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use base64::Engine;
use jsonwebtoken::{decode, decode_header, Algorithm, DecodingKey, Validation};
use parking_lot::RwLock;
use serde::Deserialize;

/// How long fetched JWKS keys are served before a refetch.
const JWKS_REFRESH: Duration = Duration::from_secs(300);

/// Signature algorithms accepted from the control plane.
const ALLOWED_ALGS: &[Algorithm] = &[Algorithm::RS256, Algorithm::EdDSA];

#[derive(Debug, Clone)]
pub struct AuthSettings {
    pub jwks_url: String,
    pub issuer: String,
    pub audience: String,
}

/// Claims the gateway cares about.
#[derive(Debug, Clone, Deserialize)]
pub struct Claims {
    #[allow(dead_code)]
    pub exp: usize,
    #[serde(default, alias = "workspaceId")]
    pub workspace_id: Option<String>,
    #[serde(default, alias = "nodeId")]
    pub node_id: Option<String>,
    #[serde(default)]
    pub sub: Option<String>,
}

impl Claims {
    /// Is this token scoped to the routed workspace?
    pub fn authorizes_workspace(&self, workspace_id: &str) -> bool {
        self.workspace_id.as_deref() == Some(workspace_id)
    }

    /// Is this token scoped to this node (directly, or via any workspace)?
    pub fn authorizes_node(&self, node_id: &str) -> bool {
        self.node_id.as_deref() == Some(node_id) || self.workspace_id.is_some()
    }
}

/// JWKS document.
#[derive(Debug, Deserialize)]
struct JwksResponse {
    keys: Vec<JwkKey>,
}

#[derive(Debug, Deserialize)]
struct JwkKey {
    kty: String,
    kid: Option<String>,
    crv: Option<String>,
    x: Option<String>,
    n: Option<String>,
    e: Option<String>,
}

struct CachedKeys {
    keys: HashMap<String, DecodingKey>,
    fetched_at: Option<Instant>,
}

/// Verifier for inbound management JWTs, with a cached JWKS fetch.
pub struct JwtVerifier {
    settings: AuthSettings,
    client: reqwest::Client,
    cache: RwLock<CachedKeys>,
}

impl JwtVerifier {
    pub fn new(settings: AuthSettings) -> Self {
        Self {
            settings,
            client: reqwest::Client::new(),
            cache: RwLock::new(CachedKeys { keys: HashMap::new(), fetched_at: None }),
        }
    }

    /// Validate signature, issuer, audience, and expiry; return the claims.
    pub async fn verify(&self, token: &str) -> anyhow::Result<Claims> {
        let header = decode_header(token)?;
        if !ALLOWED_ALGS.contains(&header.alg) {
            anyhow::bail!("token algorithm {:?} not accepted", header.alg);
        }
        let kid = header.kid.ok_or_else(|| anyhow::anyhow!("token has no key id"))?;
        let key = self.key_for(&kid).await?;

        let mut validation = Validation::new(header.alg);
        validation.set_audience(&[&self.settings.audience]);
        validation.set_issuer(&[&self.settings.issuer]);
        let data = decode::<Claims>(token, &key, &validation)?;
        Ok(data.claims)
    }

    async fn key_for(&self, kid: &str) -> anyhow::Result<DecodingKey> {
        {
            let cache = self.cache.read();
            let fresh = cache.fetched_at.is_some_and(|at| at.elapsed() < JWKS_REFRESH);
            if fresh {
                if let Some(key) = cache.keys.get(kid) {
                    return Ok(key.clone());
                }
            }
        }

        self.refresh().await?;
        self.cache
            .read()
            .keys
            .get(kid)
            .cloned()
            .ok_or_else(|| anyhow::anyhow!("no JWKS key with kid {kid:?}"))
    }

    async fn refresh(&self) -> anyhow::Result<()> {
        tracing::debug!(url = %self.settings.jwks_url, "fetching JWKS");
        let response: JwksResponse = self
            .client
            .get(&self.settings.jwks_url)
            .timeout(Duration::from_secs(10))
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        let mut keys = HashMap::new();
        for key in response.keys {
            let Some(kid) = key.kid.clone() else { continue };
            match parse_key(&key) {
                Ok(Some(decoded)) => {
                    keys.insert(kid, decoded);
                }
                Ok(None) => {}
                Err(e) => tracing::warn!(kid, err = %e, "skipping unparseable JWKS key"),
            }
        }
        tracing::debug!(count = keys.len(), "JWKS keys cached");

        let mut cache = self.cache.write();
        cache.keys = keys;
        cache.fetched_at = Some(Instant::now());
        Ok(())
    }
}

fn parse_key(key: &JwkKey) -> anyhow::Result<Option<DecodingKey>> {
    match key.kty.as_str() {
        "RSA" => {
            let n = key.n.as_deref().ok_or_else(|| anyhow::anyhow!("RSA key missing n"))?;
            let e = key.e.as_deref().ok_or_else(|| anyhow::anyhow!("RSA key missing e"))?;
            Ok(Some(DecodingKey::from_rsa_components(n, e)?))
        }
        "OKP" => {
            if key.crv.as_deref() != Some("Ed25519") {
                tracing::warn!(crv = ?key.crv, "unsupported OKP curve");
                return Ok(None);
            }
            let x = key.x.as_deref().ok_or_else(|| anyhow::anyhow!("OKP key missing x"))?;
            let raw = base64::engine::general_purpose::URL_SAFE_NO_PAD.decode(x)?;
            Ok(Some(DecodingKey::from_ed_der(&raw)))
        }
        other => {
            tracing::warn!(kty = other, "unknown JWKS key type");
            Ok(None)
        }
    }
}

/// Check a WebSocket `Origin` against the allowlist. Entries are exact
/// origins or `*.domain` wildcards matched against the origin's host.
pub fn origin_allowed(origin: &str, allowed: &[String]) -> bool {
    let origin = origin.trim_end_matches('/');
    let host = origin
        .strip_prefix("https://")
        .or_else(|| origin.strip_prefix("http://"))
        .unwrap_or(origin)
        .split([':', '/'])
        .next()
        .unwrap_or_default();

    for entry in allowed {
        if let Some(domain) = entry.strip_prefix("*.") {
            if host.len() > domain.len() + 1 && host.ends_with(domain)
                && host.as_bytes()[host.len() - domain.len() - 1] == b'.'
            {
                return true;
            }
        } else if origin.eq_ignore_ascii_case(entry.trim_end_matches('/')) {
            return true;
        }
    }
    false
}

/// Constant-time string comparison to prevent timing side-channel attacks.
pub fn constant_time_eq(a: &str, b: &str) -> bool {
    let a = a.as_bytes();
    let b = b.as_bytes();
    if a.len() != b.len() {
        return false;
    }
    let mut acc = 0u8;
    for (x, y) in a.iter().zip(b.iter()) {
        acc |= x ^ y;
    }
    acc == 0
}

/// Extract a bearer token from an `Authorization` header value.
pub fn bearer(header: Option<&str>) -> Option<&str> {
    header?.strip_prefix("Bearer ")
}

#[cfg(test)]
#[path = "auth_tests.rs"]
mod tests;
