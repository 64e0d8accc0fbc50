//! Pluggable request-signing strategies
//!
//! Adapters never hard-code authentication. A strategy receives the outgoing
//! request's method/path/body and returns the headers to attach, so one
//! adapter can serve vendors with very different signing schemes.

use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use rand::Rng;
use sha2::{Digest, Sha256};
use std::time::{SystemTime, UNIX_EPOCH};

use crate::error::{AppError, Result};

type HmacSha256 = Hmac<Sha256>;

/// Outgoing request details available to a signing strategy
#[derive(Debug, Clone, Default)]
pub struct SignContext<'a> {
    pub method: &'a str,
    pub path: &'a str,
    pub query: &'a str,
    pub body: &'a str,
    pub host: &'a str,
}

/// A request-signing scheme applied per provider
pub trait AuthStrategy: Send + Sync {
    /// Produce the authentication headers for one outgoing request
    fn headers(&self, ctx: &SignContext<'_>) -> Result<Vec<(String, String)>>;
}

/// Bearer token authentication (Authorization: Bearer xxx)
pub struct BearerAuth {
    token: String,
}

impl BearerAuth {
    pub fn new(token: impl Into<String>) -> Self {
        Self { token: token.into() }
    }
}

impl AuthStrategy for BearerAuth {
    fn headers(&self, _ctx: &SignContext<'_>) -> Result<Vec<(String, String)>> {
        Ok(vec![(
            "Authorization".to_string(),
            format!("Bearer {}", self.token),
        )])
    }
}

/// API key in a custom header (X-API-Key by default)
pub struct ApiKeyHeaderAuth {
    api_key: String,
    header_name: String,
}

impl ApiKeyHeaderAuth {
    pub fn new(api_key: impl Into<String>, header_name: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            header_name: header_name.into(),
        }
    }
}

impl AuthStrategy for ApiKeyHeaderAuth {
    fn headers(&self, _ctx: &SignContext<'_>) -> Result<Vec<(String, String)>> {
        Ok(vec![(self.header_name.clone(), self.api_key.clone())])
    }
}

/// HMAC-SHA256 signing over (method, path, timestamp, nonce, body)
pub struct HmacAuth {
    access_key: String,
    secret_key: String,
}

impl HmacAuth {
    pub fn new(access_key: impl Into<String>, secret_key: impl Into<String>) -> Self {
        Self {
            access_key: access_key.into(),
            secret_key: secret_key.into(),
        }
    }

    /// Sign with explicit timestamp and nonce; the trait impl fills in
    /// wall-clock time and a random nonce
    pub fn sign(
        &self,
        ctx: &SignContext<'_>,
        timestamp: &str,
        nonce: &str,
    ) -> Result<Vec<(String, String)>> {
        let sign_str = format!(
            "{}\n{}\n{}\n{}\n{}",
            ctx.method, ctx.path, timestamp, nonce, ctx.body
        );
        let mut mac = HmacSha256::new_from_slice(self.secret_key.as_bytes())
            .map_err(|e| AppError::AuthenticationFailed(format!("Invalid HMAC key: {}", e)))?;
        mac.update(sign_str.as_bytes());
        let signature = hex::encode(mac.finalize().into_bytes());

        Ok(vec![
            ("X-Access-Key".to_string(), self.access_key.clone()),
            ("X-Timestamp".to_string(), timestamp.to_string()),
            ("X-Nonce".to_string(), nonce.to_string()),
            ("X-Signature".to_string(), signature),
        ])
    }
}

impl AuthStrategy for HmacAuth {
    fn headers(&self, ctx: &SignContext<'_>) -> Result<Vec<(String, String)>> {
        let timestamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs()
            .to_string();
        let nonce: [u8; 8] = rand::thread_rng().gen();
        self.sign(ctx, &timestamp, &hex::encode(nonce))
    }
}

/// SigV4-style regional signing (canonical request hash, derived signing key,
/// credential-scope Authorization header)
pub struct SigV4Auth {
    access_key: String,
    secret_key: String,
    region: String,
    service: String,
}

const SIGV4_ALGORITHM: &str = "HMAC-SHA256";
const SIGV4_SIGNED_HEADERS: &str = "host;x-content-sha256;x-date";

impl SigV4Auth {
    pub fn new(
        access_key: impl Into<String>,
        secret_key: impl Into<String>,
        region: impl Into<String>,
        service: impl Into<String>,
    ) -> Self {
        Self {
            access_key: access_key.into(),
            secret_key: secret_key.into(),
            region: region.into(),
            service: service.into(),
        }
    }

    fn hmac(key: &[u8], msg: &str) -> Result<Vec<u8>> {
        let mut mac = HmacSha256::new_from_slice(key)
            .map_err(|e| AppError::AuthenticationFailed(format!("Invalid HMAC key: {}", e)))?;
        mac.update(msg.as_bytes());
        Ok(mac.finalize().into_bytes().to_vec())
    }

    /// Derive the signing key: secret → date → region → service → "request"
    fn signing_key(&self, date_stamp: &str) -> Result<Vec<u8>> {
        let k_date = Self::hmac(self.secret_key.as_bytes(), date_stamp)?;
        let k_region = Self::hmac(&k_date, &self.region)?;
        let k_service = Self::hmac(&k_region, &self.service)?;
        Self::hmac(&k_service, "request")
    }

    /// Sign at an explicit instant; the trait impl uses the current time
    pub fn sign_at(
        &self,
        ctx: &SignContext<'_>,
        now: DateTime<Utc>,
    ) -> Result<Vec<(String, String)>> {
        let amz_date = now.format("%Y%m%dT%H%M%SZ").to_string();
        let date_stamp = now.format("%Y%m%d").to_string();

        let payload_hash = hex::encode(Sha256::digest(ctx.body.as_bytes()));
        let canonical_headers = format!(
            "host:{}\nx-content-sha256:{}\nx-date:{}\n",
            ctx.host, payload_hash, amz_date
        );
        let canonical_request = format!(
            "{}\n{}\n{}\n{}\n{}\n{}",
            ctx.method, ctx.path, ctx.query, canonical_headers, SIGV4_SIGNED_HEADERS, payload_hash
        );

        let credential_scope = format!("{}/{}/{}/request", date_stamp, self.region, self.service);
        let string_to_sign = format!(
            "{}\n{}\n{}\n{}",
            SIGV4_ALGORITHM,
            amz_date,
            credential_scope,
            hex::encode(Sha256::digest(canonical_request.as_bytes()))
        );

        let signing_key = self.signing_key(&date_stamp)?;
        let signature = hex::encode(
            HmacSha256::new_from_slice(&signing_key)
                .map_err(|e| AppError::AuthenticationFailed(format!("Invalid HMAC key: {}", e)))?
                .chain_update(string_to_sign.as_bytes())
                .finalize()
                .into_bytes(),
        );

        let authorization = format!(
            "{} Credential={}/{}, SignedHeaders={}, Signature={}",
            SIGV4_ALGORITHM, self.access_key, credential_scope, SIGV4_SIGNED_HEADERS, signature
        );

        let mut headers = vec![
            ("X-Date".to_string(), amz_date),
            ("X-Content-Sha256".to_string(), payload_hash),
            ("Authorization".to_string(), authorization),
        ];
        if !ctx.host.is_empty() {
            headers.push(("Host".to_string(), ctx.host.to_string()));
        }
        Ok(headers)
    }
}

impl AuthStrategy for SigV4Auth {
    fn headers(&self, ctx: &SignContext<'_>) -> Result<Vec<(String, String)>> {
        self.sign_at(ctx, Utc::now())
    }
}
