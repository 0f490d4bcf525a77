// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Test harness: a running agent router on an ephemeral port with a fake
//! JWKS endpoint and helpers for minting management JWTs.

use std::sync::Arc;

use base64::Engine;
use clap::Parser;
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use ring::signature::{Ed25519KeyPair, KeyPair};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use sam_agent::config::Config;
use sam_agent::state::AppState;
use sam_agent::store::Store;

pub const ISSUER: &str = "https://cp.invalid";
pub const AUDIENCE: &str = "workspace-terminal";
pub const NODE_ID: &str = "node-1";
const KID: &str = "spec-key-1";

/// One agent instance serving its router on a loopback port.
pub struct TestAgent {
    pub base_url: String,
    pub state: Arc<AppState>,
    signing_key: EncodingKey,
    // Held for their lifetimes.
    _jwks: MockServer,
    _state_dir: tempfile::TempDir,
}

impl TestAgent {
    pub async fn start() -> anyhow::Result<Self> {
        // Ed25519 keypair; the public half is published as JWKS.
        let rng = ring::rand::SystemRandom::new();
        let pkcs8 = Ed25519KeyPair::generate_pkcs8(&rng)
            .map_err(|_| anyhow::anyhow!("keypair generation failed"))?;
        let keypair = Ed25519KeyPair::from_pkcs8(pkcs8.as_ref())
            .map_err(|_| anyhow::anyhow!("keypair parse failed"))?;
        let public_b64 = base64::engine::general_purpose::URL_SAFE_NO_PAD
            .encode(keypair.public_key().as_ref());

        let jwks = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/jwks.json"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "keys": [{
                    "kty": "OKP",
                    "crv": "Ed25519",
                    "kid": KID,
                    "alg": "EdDSA",
                    "use": "sig",
                    "x": public_b64,
                }]
            })))
            .mount(&jwks)
            .await;

        let state_dir = tempfile::tempdir()?;
        let jwks_url = format!("{}/jwks.json", jwks.uri());
        let state_dir_arg = state_dir.path().to_string_lossy().into_owned();
        let base_dir_arg = state_dir.path().join("workspaces").to_string_lossy().into_owned();
        let config = Config::parse_from([
            "sam-agent",
            "--control-plane-url",
            ISSUER,
            "--node-id",
            NODE_ID,
            "--jwt-issuer",
            ISSUER,
            "--jwks-url",
            jwks_url.as_str(),
            "--state-dir",
            state_dir_arg.as_str(),
            "--workspace-base-dir",
            base_dir_arg.as_str(),
        ]);
        config.validate()?;

        let store = Arc::new(Store::open(&config.store_path())?);
        let state = AppState::new(config, store);
        let router = sam_agent::http::build_router(Arc::clone(&state));

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;
        tokio::spawn(async move {
            let _ = axum::serve(listener, router).await;
        });

        Ok(Self {
            base_url: format!("http://{addr}"),
            state,
            signing_key: EncodingKey::from_ed_der(pkcs8.as_ref()),
            _jwks: jwks,
            _state_dir: state_dir,
        })
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    /// Mint a management JWT scoped to a workspace.
    pub fn workspace_token(&self, workspace_id: &str) -> anyhow::Result<String> {
        self.sign(serde_json::json!({
            "iss": ISSUER,
            "aud": AUDIENCE,
            "exp": expiry(),
            "workspaceId": workspace_id,
        }))
    }

    /// Mint a management JWT scoped to the node.
    pub fn node_token(&self) -> anyhow::Result<String> {
        self.sign(serde_json::json!({
            "iss": ISSUER,
            "aud": AUDIENCE,
            "exp": expiry(),
            "nodeId": NODE_ID,
        }))
    }

    /// A structurally valid token that fails validation (wrong audience).
    pub fn wrong_audience_token(&self) -> anyhow::Result<String> {
        self.sign(serde_json::json!({
            "iss": ISSUER,
            "aud": "something-else",
            "exp": expiry(),
            "nodeId": NODE_ID,
        }))
    }

    fn sign(&self, claims: serde_json::Value) -> anyhow::Result<String> {
        let mut header = Header::new(Algorithm::EdDSA);
        header.kid = Some(KID.to_owned());
        Ok(encode(&header, &claims, &self.signing_key)?)
    }
}

fn expiry() -> u64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now().duration_since(UNIX_EPOCH).map(|d| d.as_secs()).unwrap_or_default() + 3600
}
