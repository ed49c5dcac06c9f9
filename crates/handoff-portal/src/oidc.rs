//! OpenID Connect authorization-code login against a single issuer.
//!
//! The id_token is taken straight from the token endpoint over TLS, so its claims are
//! checked (`iss`, `aud`, `exp`, `nonce`) but its signature is not.

use std::sync::Arc;
use std::time::Duration;

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use handoff_core::normalize_user_id;
use reqwest::{Client, Url};
use serde::Deserialize;
use tokio::sync::RwLock;

use crate::error::PortalError;

pub const DEFAULT_SCOPES: &str = "openid profile email";
const CLOCK_SKEW_SECS: i64 = 120;

#[derive(Debug, Clone)]
pub struct OidcConfig {
    pub issuer: String,
    pub client_id: String,
    pub client_secret: Option<String>,
    pub redirect_url: String,
    pub scopes: String,
    /// Where the provider sends the browser after sign-out.
    pub post_logout_redirect_url: String,
}

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct ProviderMetadata {
    pub issuer: String,
    pub authorization_endpoint: String,
    pub token_endpoint: String,
    #[serde(default)]
    pub end_session_endpoint: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct TokenResponse {
    #[serde(default)]
    id_token: Option<String>,
}

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(untagged)]
pub enum Audience {
    One(String),
    Many(Vec<String>),
}

impl Audience {
    pub fn contains(&self, client_id: &str) -> bool {
        match self {
            Audience::One(aud) => aud == client_id,
            Audience::Many(list) => list.iter().any(|aud| aud == client_id),
        }
    }
}

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct IdTokenClaims {
    pub iss: String,
    pub aud: Audience,
    pub exp: i64,
    #[serde(default)]
    pub nonce: Option<String>,
    #[serde(default)]
    pub preferred_username: Option<String>,
    #[serde(default)]
    pub upn: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
}

impl IdTokenClaims {
    /// First of `preferred_username`, `upn`, `email`, normalized.
    pub fn user_id(&self) -> Option<String> {
        [&self.preferred_username, &self.upn, &self.email]
            .into_iter()
            .flatten()
            .find_map(|v| normalize_user_id(v))
    }
}

fn trim_issuer(issuer: &str) -> &str {
    issuer.trim_end_matches('/')
}

pub fn decode_id_token(id_token: &str) -> Result<IdTokenClaims, PortalError> {
    let mut parts = id_token.split('.');
    let (Some(_header), Some(payload), Some(_signature)) = (parts.next(), parts.next(), parts.next())
    else {
        return Err(PortalError::InvalidToken("expected three segments".to_string()));
    };
    let bytes = URL_SAFE_NO_PAD
        .decode(payload.trim_end_matches('='))
        .map_err(|err| PortalError::InvalidToken(format!("payload is not base64url: {err}")))?;
    serde_json::from_slice(&bytes)
        .map_err(|err| PortalError::InvalidToken(format!("payload is not claims json: {err}")))
}

pub fn validate_claims(
    claims: &IdTokenClaims,
    issuer: &str,
    client_id: &str,
    nonce: &str,
    now_secs: i64,
) -> Result<(), PortalError> {
    if trim_issuer(&claims.iss) != trim_issuer(issuer) {
        return Err(PortalError::InvalidToken(format!(
            "unexpected issuer `{}`",
            claims.iss
        )));
    }
    if !claims.aud.contains(client_id) {
        return Err(PortalError::InvalidToken(
            "audience does not include this client".to_string(),
        ));
    }
    if claims.exp + CLOCK_SKEW_SECS < now_secs {
        return Err(PortalError::InvalidToken("token expired".to_string()));
    }
    if claims.nonce.as_deref() != Some(nonce) {
        return Err(PortalError::InvalidToken("nonce mismatch".to_string()));
    }
    Ok(())
}

#[derive(Clone)]
pub struct OidcClient {
    config: OidcConfig,
    http: Client,
    metadata: Arc<RwLock<Option<ProviderMetadata>>>,
}

impl OidcClient {
    pub fn new(config: OidcConfig) -> Result<Self, PortalError> {
        let http = Client::builder().timeout(Duration::from_secs(15)).build()?;
        Ok(Self {
            config,
            http,
            metadata: Arc::default(),
        })
    }

    pub fn config(&self) -> &OidcConfig {
        &self.config
    }

    pub fn discovery_url(&self) -> String {
        format!(
            "{}/.well-known/openid-configuration",
            trim_issuer(&self.config.issuer)
        )
    }

    /// Provider metadata, fetched on first use and cached.
    pub async fn metadata(&self) -> Result<ProviderMetadata, PortalError> {
        if let Some(meta) = self.metadata.read().await.clone() {
            return Ok(meta);
        }
        let resp = self.http.get(self.discovery_url()).send().await?;
        if !resp.status().is_success() {
            return Err(PortalError::Discovery(format!(
                "{} returned {}",
                self.discovery_url(),
                resp.status()
            )));
        }
        let meta: ProviderMetadata = resp
            .json()
            .await
            .map_err(|err| PortalError::Discovery(err.to_string()))?;
        if trim_issuer(&meta.issuer) != trim_issuer(&self.config.issuer) {
            return Err(PortalError::Discovery(format!(
                "metadata issuer `{}` does not match `{}`",
                meta.issuer, self.config.issuer
            )));
        }
        *self.metadata.write().await = Some(meta.clone());
        Ok(meta)
    }

    pub fn authorization_url(
        &self,
        meta: &ProviderMetadata,
        state: &str,
        nonce: &str,
    ) -> Result<Url, PortalError> {
        let mut url = Url::parse(&meta.authorization_endpoint)
            .map_err(|err| PortalError::Discovery(format!("bad authorization_endpoint: {err}")))?;
        url.query_pairs_mut()
            .append_pair("response_type", "code")
            .append_pair("client_id", &self.config.client_id)
            .append_pair("redirect_uri", &self.config.redirect_url)
            .append_pair("scope", &self.config.scopes)
            .append_pair("state", state)
            .append_pair("nonce", nonce);
        Ok(url)
    }

    pub fn end_session_url(
        &self,
        meta: &ProviderMetadata,
        id_token_hint: Option<&str>,
    ) -> Option<Url> {
        let mut url = Url::parse(meta.end_session_endpoint.as_deref()?).ok()?;
        {
            let mut pairs = url.query_pairs_mut();
            pairs
                .append_pair("client_id", &self.config.client_id)
                .append_pair(
                    "post_logout_redirect_uri",
                    &self.config.post_logout_redirect_url,
                );
            if let Some(hint) = id_token_hint {
                pairs.append_pair("id_token_hint", hint);
            }
        }
        Some(url)
    }

    /// Exchanges `code` and returns the raw id_token with its validated claims.
    pub async fn exchange_code(
        &self,
        code: &str,
        nonce: &str,
    ) -> Result<(String, IdTokenClaims), PortalError> {
        let meta = self.metadata().await?;
        let mut form = vec![
            ("grant_type", "authorization_code"),
            ("code", code),
            ("redirect_uri", self.config.redirect_url.as_str()),
            ("client_id", self.config.client_id.as_str()),
        ];
        if let Some(secret) = self.config.client_secret.as_deref() {
            form.push(("client_secret", secret));
        }
        let resp = self.http.post(&meta.token_endpoint).form(&form).send().await?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(PortalError::TokenExchange {
                status: status.as_u16(),
                body,
            });
        }
        let tokens: TokenResponse = resp.json().await?;
        let id_token = tokens
            .id_token
            .ok_or_else(|| PortalError::InvalidToken("token response has no id_token".to_string()))?;
        let claims = decode_id_token(&id_token)?;
        validate_claims(
            &claims,
            &self.config.issuer,
            &self.config.client_id,
            nonce,
            chrono::Utc::now().timestamp(),
        )?;
        Ok((id_token, claims))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn token_for(claims: serde_json::Value) -> String {
        format!(
            "{}.{}.sig",
            URL_SAFE_NO_PAD.encode(br#"{"alg":"RS256"}"#),
            URL_SAFE_NO_PAD.encode(claims.to_string())
        )
    }

    fn config() -> OidcConfig {
        OidcConfig {
            issuer: "https://login.example.com/tenant/v2.0".to_string(),
            client_id: "portal-client".to_string(),
            client_secret: Some("s3cret".to_string()),
            redirect_url: "https://portal.example.com/auth/callback".to_string(),
            scopes: DEFAULT_SCOPES.to_string(),
            post_logout_redirect_url: "https://portal.example.com/".to_string(),
        }
    }

    fn metadata() -> ProviderMetadata {
        ProviderMetadata {
            issuer: "https://login.example.com/tenant/v2.0".to_string(),
            authorization_endpoint: "https://login.example.com/tenant/oauth2/v2.0/authorize"
                .to_string(),
            token_endpoint: "https://login.example.com/tenant/oauth2/v2.0/token".to_string(),
            end_session_endpoint: Some(
                "https://login.example.com/tenant/oauth2/v2.0/logout".to_string(),
            ),
        }
    }

    #[test]
    fn authorization_url_carries_code_flow_parameters() {
        let client = OidcClient::new(config()).expect("client");
        let url = client
            .authorization_url(&metadata(), "st", "nc")
            .expect("url");
        let pairs: std::collections::HashMap<_, _> = url.query_pairs().into_owned().collect();
        assert_eq!(pairs["response_type"], "code");
        assert_eq!(pairs["client_id"], "portal-client");
        assert_eq!(pairs["redirect_uri"], "https://portal.example.com/auth/callback");
        assert_eq!(pairs["scope"], "openid profile email");
        assert_eq!(pairs["state"], "st");
        assert_eq!(pairs["nonce"], "nc");
        assert_eq!(
            client.discovery_url(),
            "https://login.example.com/tenant/v2.0/.well-known/openid-configuration"
        );
    }

    #[test]
    fn decode_and_validate_claims() {
        let token = token_for(json!({
            "iss": "https://login.example.com/tenant/v2.0/",
            "aud": ["other", "portal-client"],
            "exp": 2_000,
            "nonce": "nc",
            "preferred_username": "  Ops@Example.com ",
            "email": "ops@mail.example.com"
        }));
        let claims = decode_id_token(&token).expect("claims");
        assert_eq!(claims.user_id().as_deref(), Some("ops@example.com"));
        validate_claims(
            &claims,
            "https://login.example.com/tenant/v2.0",
            "portal-client",
            "nc",
            1_000,
        )
        .expect("valid");

        assert!(validate_claims(&claims, "https://evil.example.com", "portal-client", "nc", 1_000).is_err());
        assert!(validate_claims(&claims, &claims.iss, "someone-else", "nc", 1_000).is_err());
        assert!(validate_claims(&claims, &claims.iss, "portal-client", "other", 1_000).is_err());
        assert!(validate_claims(&claims, &claims.iss, "portal-client", "nc", 10_000).is_err());
    }

    #[test]
    fn user_id_falls_back_to_upn_then_email() {
        let claims: IdTokenClaims = serde_json::from_value(json!({
            "iss": "i", "aud": "a", "exp": 0, "email": "Mail@Example.com"
        }))
        .expect("claims");
        assert_eq!(claims.user_id().as_deref(), Some("mail@example.com"));

        let claims: IdTokenClaims = serde_json::from_value(json!({
            "iss": "i", "aud": "a", "exp": 0, "preferred_username": " ", "upn": "upn@example.com"
        }))
        .expect("claims");
        assert_eq!(claims.user_id().as_deref(), Some("upn@example.com"));
    }

    #[test]
    fn malformed_tokens_are_rejected() {
        assert!(matches!(
            decode_id_token("only.two"),
            Err(PortalError::InvalidToken(_))
        ));
        assert!(matches!(
            decode_id_token("a.!!!.c"),
            Err(PortalError::InvalidToken(_))
        ));
    }

    #[test]
    fn end_session_url_includes_hint() {
        let client = OidcClient::new(config()).expect("client");
        let url = client
            .end_session_url(&metadata(), Some("tok"))
            .expect("url");
        let pairs: std::collections::HashMap<_, _> = url.query_pairs().into_owned().collect();
        assert_eq!(pairs["id_token_hint"], "tok");
        assert_eq!(pairs["post_logout_redirect_uri"], "https://portal.example.com/");

        let mut meta = metadata();
        meta.end_session_endpoint = None;
        assert!(client.end_session_url(&meta, None).is_none());
    }
}
