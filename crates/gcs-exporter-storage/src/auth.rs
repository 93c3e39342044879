//! OAuth access tokens for the GCS JSON API
//!
//! Credentials are resolved once at startup: an explicit key file, then
//! `GOOGLE_APPLICATION_CREDENTIALS`, then the GCE metadata server. Tokens are
//! cached and refreshed shortly before they expire.

use std::fmt;
use std::path::Path;
use std::time::{Duration, Instant};

use chrono::Utc;
use jsonwebtoken::{Algorithm, EncodingKey, Header};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::AuthError;

/// Read-only storage scope requested for every token
pub const STORAGE_READ_SCOPE: &str = "https://www.googleapis.com/auth/devstorage.read_only";

const DEFAULT_TOKEN_URI: &str = "https://oauth2.googleapis.com/token";
const METADATA_TOKEN_URL: &str =
    "http://metadata.google.internal/computeMetadata/v1/instance/service-accounts/default/token";
const JWT_BEARER_GRANT: &str = "urn:ietf:params:oauth:grant-type:jwt-bearer";
const JWT_LIFETIME_SECS: i64 = 3600;
const DEFAULT_TOKEN_LIFETIME: Duration = Duration::from_secs(3600);
/// Cached tokens closer than this to expiry are refreshed
const EXPIRY_MARGIN: Duration = Duration::from_secs(60);

#[derive(Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum CredentialsFile {
    ServiceAccount {
        client_email: String,
        private_key: String,
        #[serde(default)]
        token_uri: Option<String>,
    },
    AuthorizedUser {
        client_id: String,
        client_secret: String,
        refresh_token: String,
        #[serde(default)]
        token_uri: Option<String>,
    },
}

/// How access tokens are obtained
#[derive(Clone)]
pub enum Credentials {
    /// No token; for emulators and public buckets
    Anonymous,
    /// Signed JWT exchanged for a token
    ServiceAccount {
        client_email: String,
        key: EncodingKey,
        token_uri: String,
    },
    /// Refresh token from `gcloud auth application-default login`
    AuthorizedUser {
        client_id: String,
        client_secret: String,
        refresh_token: String,
        token_uri: String,
    },
    /// Token of the instance's default service account
    MetadataServer,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ServiceAccount { client_email, .. } => f
                .debug_struct("ServiceAccount")
                .field("client_email", client_email)
                .finish_non_exhaustive(),
            _ => f.write_str(self.kind()),
        }
    }
}

impl Credentials {
    /// Load a service account key or authorized user file
    pub fn from_file(path: &Path) -> Result<Self, AuthError> {
        let contents = std::fs::read_to_string(path).map_err(|source| AuthError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let file: CredentialsFile =
            serde_json::from_str(&contents).map_err(|e| AuthError::invalid(path, e))?;

        Ok(match file {
            CredentialsFile::ServiceAccount {
                client_email,
                private_key,
                token_uri,
            } => Self::ServiceAccount {
                key: EncodingKey::from_rsa_pem(private_key.as_bytes())
                    .map_err(|e| AuthError::invalid(path, e))?,
                client_email,
                token_uri: token_uri.unwrap_or_else(|| DEFAULT_TOKEN_URI.to_string()),
            },
            CredentialsFile::AuthorizedUser {
                client_id,
                client_secret,
                refresh_token,
                token_uri,
            } => Self::AuthorizedUser {
                client_id,
                client_secret,
                refresh_token,
                token_uri: token_uri.unwrap_or_else(|| DEFAULT_TOKEN_URI.to_string()),
            },
        })
    }

    /// Application default credentials
    pub fn from_env() -> Result<Self, AuthError> {
        match std::env::var("GOOGLE_APPLICATION_CREDENTIALS") {
            Ok(path) if !path.is_empty() => Self::from_file(Path::new(&path)),
            _ => Ok(Self::MetadataServer),
        }
    }

    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Anonymous => "anonymous",
            Self::ServiceAccount { .. } => "service_account",
            Self::AuthorizedUser { .. } => "authorized_user",
            Self::MetadataServer => "metadata_server",
        }
    }
}

#[derive(Serialize)]
struct Claims<'a> {
    iss: &'a str,
    scope: &'a str,
    aud: &'a str,
    iat: i64,
    exp: i64,
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    expires_in: Option<u64>,
}

struct CachedToken {
    value: String,
    expires_at: Instant,
}

/// Caching access token source
pub struct TokenSource {
    credentials: Credentials,
    http: reqwest::Client,
    cached: Mutex<Option<CachedToken>>,
}

impl TokenSource {
    pub fn new(credentials: Credentials, http: reqwest::Client) -> Self {
        Self {
            credentials,
            http,
            cached: Mutex::new(None),
        }
    }

    pub const fn credentials(&self) -> &Credentials {
        &self.credentials
    }

    /// Bearer token for the next request, `None` for anonymous access
    pub async fn bearer(&self) -> Result<Option<String>, AuthError> {
        if matches!(self.credentials, Credentials::Anonymous) {
            return Ok(None);
        }
        if let Some(token) = self.cached_token() {
            return Ok(Some(token));
        }

        let response = self.fetch().await?;
        let lifetime = response
            .expires_in
            .map_or(DEFAULT_TOKEN_LIFETIME, Duration::from_secs);
        *self.cached.lock() = Some(CachedToken {
            value: response.access_token.clone(),
            expires_at: Instant::now() + lifetime,
        });
        debug!(credentials = self.credentials.kind(), ?lifetime, "Refreshed access token");
        Ok(Some(response.access_token))
    }

    fn cached_token(&self) -> Option<String> {
        self.cached
            .lock()
            .as_ref()
            .filter(|token| token.expires_at > Instant::now() + EXPIRY_MARGIN)
            .map(|token| token.value.clone())
    }

    async fn fetch(&self) -> Result<TokenResponse, AuthError> {
        let request = match &self.credentials {
            Credentials::Anonymous => {
                return Err(AuthError::Token("anonymous credentials have no token".to_string()));
            }
            Credentials::ServiceAccount {
                client_email,
                key,
                token_uri,
            } => {
                let assertion = sign_assertion(client_email, key, token_uri)?;
                self.http.post(token_uri).form(&[
                    ("grant_type", JWT_BEARER_GRANT),
                    ("assertion", assertion.as_str()),
                ])
            }
            Credentials::AuthorizedUser {
                client_id,
                client_secret,
                refresh_token,
                token_uri,
            } => self.http.post(token_uri).form(&[
                ("grant_type", "refresh_token"),
                ("client_id", client_id.as_str()),
                ("client_secret", client_secret.as_str()),
                ("refresh_token", refresh_token.as_str()),
            ]),
            Credentials::MetadataServer => self
                .http
                .get(METADATA_TOKEN_URL)
                .header("Metadata-Flavor", "Google"),
        };

        let response = request
            .send()
            .await
            .map_err(|e| AuthError::Token(e.to_string()))?;
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(AuthError::Token(format!(
                "token endpoint returned status {status}: {body}"
            )));
        }
        response
            .json()
            .await
            .map_err(|e| AuthError::Token(e.to_string()))
    }
}

fn sign_assertion(client_email: &str, key: &EncodingKey, token_uri: &str) -> Result<String, AuthError> {
    let iat = Utc::now().timestamp();
    let claims = Claims {
        iss: client_email,
        scope: STORAGE_READ_SCOPE,
        aud: token_uri,
        iat,
        exp: iat + JWT_LIFETIME_SECS,
    };
    jsonwebtoken::encode(&Header::new(Algorithm::RS256), &claims, key)
        .map_err(|e| AuthError::Token(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::sync::atomic::Ordering;

    use crate::testing::MockGcs;

    fn credentials_file(contents: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    fn authorized_user(token_uri: &str) -> String {
        format!(
            r#"{{"type":"authorized_user","client_id":"id","client_secret":"secret","refresh_token":"refresh","token_uri":"{token_uri}"}}"#
        )
    }

    #[test]
    fn test_authorized_user_file() {
        let file = credentials_file(
            r#"{"type":"authorized_user","client_id":"id","client_secret":"secret","refresh_token":"refresh"}"#,
        );
        let credentials = Credentials::from_file(file.path()).unwrap();
        assert_eq!(credentials.kind(), "authorized_user");
        match credentials {
            Credentials::AuthorizedUser { token_uri, .. } => assert_eq!(token_uri, DEFAULT_TOKEN_URI),
            other => panic!("unexpected credentials {other:?}"),
        }
    }

    #[test]
    fn test_invalid_credentials_files() {
        let bad_key = credentials_file(
            r#"{"type":"service_account","client_email":"sa@example.iam.gserviceaccount.com","private_key":"not a key"}"#,
        );
        assert!(matches!(
            Credentials::from_file(bad_key.path()),
            Err(AuthError::Invalid { .. })
        ));

        let unknown_type = credentials_file(r#"{"type":"external_account"}"#);
        assert!(matches!(
            Credentials::from_file(unknown_type.path()),
            Err(AuthError::Invalid { .. })
        ));

        assert!(matches!(
            Credentials::from_file(Path::new("/nonexistent/key.json")),
            Err(AuthError::Read { .. })
        ));
    }

    #[tokio::test]
    async fn test_anonymous_has_no_token() {
        let source = TokenSource::new(Credentials::Anonymous, reqwest::Client::new());
        assert_eq!(source.bearer().await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_token_is_cached_until_near_expiry() {
        let mock = MockGcs::start(3600).await;
        let file = credentials_file(&authorized_user(&mock.token_uri()));
        let source = TokenSource::new(
            Credentials::from_file(file.path()).unwrap(),
            reqwest::Client::new(),
        );

        assert_eq!(source.bearer().await.unwrap().as_deref(), Some("tok-1"));
        assert_eq!(source.bearer().await.unwrap().as_deref(), Some("tok-1"));
        assert_eq!(mock.state.token_requests.load(Ordering::SeqCst), 1);
        assert_eq!(
            mock.state.last_grant_type.lock().as_deref(),
            Some("refresh_token")
        );
    }

    #[tokio::test]
    async fn test_short_lived_token_is_refreshed() {
        // expires inside the refresh margin, so every call fetches
        let mock = MockGcs::start(30).await;
        let file = credentials_file(&authorized_user(&mock.token_uri()));
        let source = TokenSource::new(
            Credentials::from_file(file.path()).unwrap(),
            reqwest::Client::new(),
        );

        assert_eq!(source.bearer().await.unwrap().as_deref(), Some("tok-1"));
        assert_eq!(source.bearer().await.unwrap().as_deref(), Some("tok-2"));
        assert_eq!(mock.state.token_requests.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_token_endpoint_failure() {
        let mock = MockGcs::start(3600).await;
        let file = credentials_file(&authorized_user(&format!("{}/missing", mock.base_url)));
        let source = TokenSource::new(
            Credentials::from_file(file.path()).unwrap(),
            reqwest::Client::new(),
        );

        let err = source.bearer().await.unwrap_err();
        assert!(err.to_string().contains("404"));
    }
}
