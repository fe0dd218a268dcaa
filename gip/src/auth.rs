//! Per-call authentication
//!
//! Every call must carry a signed JWT in the `token` metadata entry. The
//! token is verified with the configured signing secret and must carry the
//! configured auth key in its `iptservice` claim. [`AuthGate`] runs this check
//! in front of every service (unary and streaming alike) and rejects the call
//! before the handler sees it.

use std::collections::HashMap;
use std::sync::Arc;

use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation};
use tonic::metadata::{Ascii, MetadataMap, MetadataValue};
use tonic::service::Interceptor;
use tonic::{Request, Status};
use tracing::warn;

/// Metadata key that carries the bearer token.
pub const TOKEN_METADATA_KEY: &str = "token";

/// Claim whose value must equal the configured auth key.
pub const AUTH_CLAIM: &str = "iptservice";

#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("missing token in request metadata")]
    MissingToken,

    #[error("invalid token: {0}")]
    InvalidToken(#[from] jsonwebtoken::errors::Error),

    #[error("token does not carry a valid auth key")]
    InvalidAuthKey,

    #[error("token is not valid metadata: {0}")]
    InvalidMetadata(String),
}

/// Decides whether a call may proceed, given its request metadata.
pub trait Authenticator: Send + Sync {
    fn authenticate(&self, metadata: &MetadataMap) -> Result<(), AuthError>;
}

/// HMAC-signed JWT check against a signing secret and an auth key.
pub struct JwtAuthenticator {
    auth_key: String,
    decoding_key: DecodingKey,
    validation: Validation,
}

impl JwtAuthenticator {
    pub fn new(sign_key: &str, auth_key: &str) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.algorithms = vec![Algorithm::HS256, Algorithm::HS384, Algorithm::HS512];
        // exp and nbf are still enforced when a token carries them
        validation.required_spec_claims.clear();
        validation.validate_aud = false;

        Self {
            auth_key: auth_key.to_string(),
            decoding_key: DecodingKey::from_secret(sign_key.as_bytes()),
            validation,
        }
    }
}

impl Authenticator for JwtAuthenticator {
    fn authenticate(&self, metadata: &MetadataMap) -> Result<(), AuthError> {
        let token = metadata
            .get(TOKEN_METADATA_KEY)
            .and_then(|value| value.to_str().ok())
            .filter(|token| !token.is_empty())
            .ok_or(AuthError::MissingToken)?;

        let data = jsonwebtoken::decode::<HashMap<String, serde_json::Value>>(
            token,
            &self.decoding_key,
            &self.validation,
        )?;

        match data.claims.get(AUTH_CLAIM).and_then(|value| value.as_str()) {
            Some(key) if key == self.auth_key => Ok(()),
            _ => Err(AuthError::InvalidAuthKey),
        }
    }
}

/// Issue an HS256 token that [`JwtAuthenticator`] accepts for the same keys.
pub fn issue_token(sign_key: &str, auth_key: &str) -> Result<String, AuthError> {
    let claims = HashMap::from([(AUTH_CLAIM, auth_key)]);
    Ok(jsonwebtoken::encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(sign_key.as_bytes()),
    )?)
}

/// Server-side interceptor that authenticates every call.
#[derive(Clone)]
pub struct AuthGate {
    authenticator: Arc<dyn Authenticator>,
}

impl AuthGate {
    pub fn new(authenticator: Arc<dyn Authenticator>) -> Self {
        Self { authenticator }
    }

    pub fn jwt(sign_key: &str, auth_key: &str) -> Self {
        Self::new(Arc::new(JwtAuthenticator::new(sign_key, auth_key)))
    }
}

impl Interceptor for AuthGate {
    fn call(&mut self, request: Request<()>) -> Result<Request<()>, Status> {
        match self.authenticator.authenticate(request.metadata()) {
            Ok(()) => Ok(request),
            Err(e) => {
                let peer = request
                    .remote_addr()
                    .map(|addr| addr.to_string())
                    .unwrap_or_else(|| "unknown".to_string());
                warn!(%peer, "Rejected unauthenticated call: {e}");
                Err(Status::unauthenticated(e.to_string()))
            }
        }
    }
}

/// Client-side interceptor that attaches a bearer token to every call.
#[derive(Clone)]
pub struct BearerToken {
    token: MetadataValue<Ascii>,
}

impl BearerToken {
    pub fn new(token: &str) -> Result<Self, AuthError> {
        let token = token
            .parse()
            .map_err(|e: tonic::metadata::errors::InvalidMetadataValue| {
                AuthError::InvalidMetadata(e.to_string())
            })?;
        Ok(Self { token })
    }
}

impl Interceptor for BearerToken {
    fn call(&mut self, mut request: Request<()>) -> Result<Request<()>, Status> {
        request
            .metadata_mut()
            .insert(TOKEN_METADATA_KEY, self.token.clone());
        Ok(request)
    }
}
