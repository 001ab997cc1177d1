use crate::utils::error::{RdsPoolError, Result};
use aws_config::SdkConfig;
use aws_sdk_rds::auth_token::{AuthTokenGenerator, Config as AuthTokenConfig};
use futures::future::BoxFuture;
use std::fmt;
use std::sync::Arc;
use tracing::debug;

/// Short-lived credential for one physical connection open.
///
/// Expiry is owned by the identity service; the token is used once and dropped.
#[derive(Clone)]
pub struct AuthToken {
    pub username: String,
    token: String,
}

impl AuthToken {
    pub fn new(username: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            token: token.into(),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.token
    }
}

impl fmt::Debug for AuthToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthToken")
            .field("username", &self.username)
            .field("token", &"<redacted>")
            .finish()
    }
}

/// `(username, host, port) -> token`. Called once per physical connection open.
pub type TokenProvider =
    Arc<dyn Fn(&str, &str, u16) -> BoxFuture<'static, Result<AuthToken>> + Send + Sync>;

/// Wrap a plain async function as a [`TokenProvider`].
pub fn token_provider_fn<F, Fut>(f: F) -> TokenProvider
where
    F: Fn(String, String, u16) -> Fut + Send + Sync + 'static,
    Fut: std::future::Future<Output = Result<AuthToken>> + Send + 'static,
{
    Arc::new(move |username: &str, host: &str, port: u16| {
        Box::pin(f(username.to_string(), host.to_string(), port)) as BoxFuture<'static, _>
    })
}

/// Token provider backed by RDS IAM authentication.
///
/// Every call signs a fresh token with the credentials resolved by `sdk_config`.
/// Errors from the signer are returned as-is; there is no retry and no fallback.
pub fn rds_token_provider(sdk_config: SdkConfig) -> TokenProvider {
    let sdk_config = Arc::new(sdk_config);
    token_provider_fn(move |username, host, port| {
        let sdk_config = Arc::clone(&sdk_config);
        async move { generate_rds_token(&sdk_config, &username, &host, port).await }
    })
}

async fn generate_rds_token(
    sdk_config: &SdkConfig,
    username: &str,
    host: &str,
    port: u16,
) -> Result<AuthToken> {
    let config = AuthTokenConfig::builder()
        .hostname(host)
        .port(u64::from(port))
        .username(username)
        .build()
        .map_err(|e| RdsPoolError::TokenGeneration(format!("invalid token request: {}", e)))?;

    let token = AuthTokenGenerator::new(config)
        .auth_token(sdk_config)
        .await
        .map_err(|e| RdsPoolError::TokenGeneration(e.to_string()))?;

    debug!(username, host, port, "Generated IAM auth token");
    Ok(AuthToken::new(username, token.as_str()))
}
