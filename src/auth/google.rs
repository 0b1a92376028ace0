use super::IdentityProvider;
use crate::config::{Config, GoogleConfig};
use crate::error::{AppError, Result};
use async_trait::async_trait;
use hyper_util::client::legacy::connect::HttpConnector;
use oauth2::basic::{
    BasicClient, BasicErrorResponse, BasicRevocationErrorResponse,
    BasicTokenIntrospectionResponse, BasicTokenResponse,
};
use oauth2::{
    AccessToken, Client, ClientId, ClientSecret, EndpointNotSet, EndpointSet, RevocationUrl,
    StandardRevocableToken,
};
use reqwest::redirect::Policy;
use std::fs;
use std::path::PathBuf;
use tracing::{debug, instrument};
use yup_oauth2::{
    ApplicationSecret, InstalledFlowAuthenticator, InstalledFlowReturnMethod,
    authenticator::Authenticator, hyper_rustls::HttpsConnector,
};

const GOOGLE_AUTH_URL: &str = "https://accounts.google.com/o/oauth2/auth";
const GOOGLE_TOKEN_URL: &str = "https://oauth2.googleapis.com/token";
const GOOGLE_REVOKE_URL: &str = "https://oauth2.googleapis.com/revoke";
const GOOGLE_CERT_URL: &str = "https://www.googleapis.com/oauth2/v1/certs";
const GOOGLE_REDIRECT_URI: &str = "urn:ietf:wg:oauth:2.0:oob";

// Access to spreadsheets and to files created or opened by the app
const SCOPES: &[&str] = &[
    "https://www.googleapis.com/auth/spreadsheets",
    "https://www.googleapis.com/auth/drive.file",
];

type AuthType = Authenticator<HttpsConnector<HttpConnector>>;

// Type alias for the client when only the revocation URL is set
type RevocationClient = Client<
    BasicErrorResponse,
    BasicTokenResponse,
    BasicTokenIntrospectionResponse,
    StandardRevocableToken,
    BasicRevocationErrorResponse,
    EndpointNotSet, // HasAuthUrl
    EndpointNotSet, // HasDeviceAuthUrl
    EndpointNotSet, // HasIntrospectionUrl
    EndpointSet,    // HasRevocationUrl
    EndpointNotSet, // HasTokenUrl
>;

/// Google OAuth installed-app flow.
///
/// Tokens are persisted by `yup-oauth2` in the cache directory, so a silent
/// acquisition succeeds only after an interactive sign-in has happened once.
pub struct GoogleIdentity {
    auth: AuthType,
    revocation: RevocationClient,
    http_client: reqwest::Client,
}

impl GoogleIdentity {
    pub async fn new(config: &GoogleConfig) -> Result<Self> {
        let auth = from_installed_flow(config.client_id.clone(), config.client_secret.clone()).await?;

        let revocation = BasicClient::new(ClientId::new(config.client_id.clone()))
            .set_client_secret(ClientSecret::new(config.client_secret.clone()))
            .set_revocation_url(
                RevocationUrl::new(GOOGLE_REVOKE_URL.to_string())
                    .map_err(|e| AppError::Auth(format!("Invalid revocation URL: {}", e)))?,
            );

        let http_client = reqwest::ClientBuilder::new()
            .redirect(Policy::none())
            .build()
            .map_err(|e| AppError::Auth(format!("Failed to build reqwest client: {}", e)))?;

        Ok(Self {
            auth,
            revocation,
            http_client,
        })
    }
}

#[async_trait]
impl IdentityProvider for GoogleIdentity {
    async fn acquire_token(&self, interactive: bool) -> Result<String> {
        if !interactive && !token_cache_path()?.exists() {
            return Err(AppError::Auth(
                "Not signed in. Run `account-plans auth login` first".to_string(),
            ));
        }

        let token = self
            .auth
            .token(SCOPES)
            .await
            .map_err(|e| AppError::Auth(format!("Failed to get token: {}", e)))?;

        token
            .token()
            .map(str::to_string)
            .ok_or_else(|| AppError::Auth("Token response had no access token".to_string()))
    }

    async fn refresh_token(&self) -> Result<String> {
        let token = self
            .auth
            .force_refreshed_token(SCOPES)
            .await
            .map_err(|e| AppError::Auth(format!("Failed to refresh token: {}", e)))?;

        token
            .token()
            .map(str::to_string)
            .ok_or_else(|| AppError::Auth("Token response had no access token".to_string()))
    }

    #[instrument(name = "Revoking Google token", skip_all)]
    async fn invalidate_token(&self, token: &str) -> Result<()> {
        let revocable = StandardRevocableToken::AccessToken(AccessToken::new(token.to_string()));
        let revoked = match self.revocation.revoke_token(revocable) {
            Ok(request) => request
                .request_async(&self.http_client)
                .await
                .map_err(|e| AppError::Auth(format!("Failed to revoke token: {:?}", e))),
            Err(e) => Err(AppError::Auth(format!(
                "Failed to build revocation request: {}",
                e
            ))),
        };

        // The cached refresh token must go even if Google refused the revocation
        clear_tokens()?;
        revoked
    }
}

async fn from_installed_flow(client_id: String, client_secret: String) -> Result<AuthType> {
    // Build the OAuth application secret from config values
    let secret = ApplicationSecret {
        client_id,
        client_secret,
        auth_uri: GOOGLE_AUTH_URL.to_string(),
        token_uri: GOOGLE_TOKEN_URL.to_string(),
        auth_provider_x509_cert_url: Some(GOOGLE_CERT_URL.to_string()),
        redirect_uris: vec![GOOGLE_REDIRECT_URI.to_string()],
        project_id: None,
        client_email: None,
        client_x509_cert_url: None,
    };

    let token_cache_path = token_cache_path()?;

    // Create parent directory if it doesn't exist
    if let Some(parent) = token_cache_path.parent() {
        fs::create_dir_all(parent).map_err(|e| {
            AppError::Auth(format!("Failed to create token cache directory: {}", e))
        })?;
    }

    // User will copy/paste the authorization code from the browser
    let auth = InstalledFlowAuthenticator::builder(secret, InstalledFlowReturnMethod::Interactive)
        .persist_tokens_to_disk(token_cache_path)
        .build()
        .await
        .map_err(|e| AppError::Auth(format!("Failed to build authenticator: {}", e)))?;

    Ok(auth)
}

/// Clear cached Google tokens by deleting the token cache file
#[instrument(name = "Clearing Google tokens", skip_all)]
pub fn clear_tokens() -> Result<()> {
    let token_path = token_cache_path()?;

    if !token_path.exists() {
        debug!("No Google tokens to clear");
        return Ok(());
    }

    fs::remove_file(&token_path)
        .map_err(|e| AppError::Auth(format!("Failed to delete tokens file: {}", e)))?;
    debug!("Cleared Google cached tokens");

    Ok(())
}

fn token_cache_path() -> Result<PathBuf> {
    Config::cache_file("google_tokens.json")
}
