use anyhow::{bail, Context, Result as AnyhowResult};
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use log::debug;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

/// OAuth scope granting read/write access to spreadsheets.
pub const SPREADSHEETS_SCOPE: &str = "https://www.googleapis.com/auth/spreadsheets";

const DEFAULT_TOKEN_URI: &str = "https://oauth2.googleapis.com/token";
const JWT_BEARER_GRANT: &str = "urn:ietf:params:oauth:grant-type:jwt-bearer";
/// Lifetime requested for each signed assertion; Google caps it at one hour.
const ASSERTION_LIFETIME_SECS: u64 = 3600;
/// Tokens are refreshed this long before they actually expire.
const EXPIRY_MARGIN: Duration = Duration::from_secs(60);

fn default_token_uri() -> String {
    DEFAULT_TOKEN_URI.to_string()
}

/// The fields of a Google Cloud service-account key file this crate needs.
#[derive(Clone, Deserialize)]
pub struct ServiceAccountKey {
    pub client_email: String,
    pub private_key: String,
    #[serde(default)]
    pub private_key_id: Option<String>,
    #[serde(default = "default_token_uri")]
    pub token_uri: String,
}

impl ServiceAccountKey {
    /// Reads a service-account key file (JSON format).
    pub fn from_file(path: impl AsRef<Path>) -> AnyhowResult<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read service account file {}", path.display()))?;
        serde_json::from_str(&raw)
            .with_context(|| format!("Failed to parse service account file {}", path.display()))
    }
}

impl fmt::Debug for ServiceAccountKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceAccountKey")
            .field("client_email", &self.client_email)
            .field("private_key", &"***")
            .field("private_key_id", &self.private_key_id)
            .field("token_uri", &self.token_uri)
            .finish()
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct AssertionClaims {
    iss: String,
    scope: String,
    aud: String,
    iat: u64,
    exp: u64,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: u64,
}

/// Exchanges signed JWT assertions for bearer tokens and caches them until shortly before expiry.
pub struct TokenProvider {
    key: ServiceAccountKey,
    encoding_key: EncodingKey,
    cached: Option<(String, Instant)>,
}

impl TokenProvider {
    /// Validates the key's RSA private key up front so a bad key fails at construction.
    pub fn new(key: ServiceAccountKey) -> AnyhowResult<Self> {
        let encoding_key = EncodingKey::from_rsa_pem(key.private_key.as_bytes())
            .context("Service account private key is not a valid RSA PEM key")?;
        Ok(Self {
            key,
            encoding_key,
            cached: None,
        })
    }

    pub fn client_email(&self) -> &str {
        &self.key.client_email
    }

    /// Builds the RS256-signed assertion sent to the token endpoint.
    fn assertion(&self, issued_at: u64) -> AnyhowResult<String> {
        let mut header = Header::new(Algorithm::RS256);
        header.kid = self.key.private_key_id.clone();

        let claims = AssertionClaims {
            iss: self.key.client_email.clone(),
            scope: SPREADSHEETS_SCOPE.to_string(),
            aud: self.key.token_uri.clone(),
            iat: issued_at,
            exp: issued_at + ASSERTION_LIFETIME_SECS,
        };
        encode(&header, &claims, &self.encoding_key).context("Failed to sign JWT assertion")
    }

    /// Returns a valid access token, fetching a new one when the cached token is missing or stale.
    pub async fn access_token(&mut self, http: &reqwest::Client) -> AnyhowResult<String> {
        if let Some((token, expires_at)) = &self.cached {
            if Instant::now() + EXPIRY_MARGIN < *expires_at {
                return Ok(token.clone());
            }
        }

        let issued_at = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .context("System clock is before the Unix epoch")?
            .as_secs();
        let assertion = self.assertion(issued_at)?;

        let resp = http
            .post(&self.key.token_uri)
            .form(&[("grant_type", JWT_BEARER_GRANT), ("assertion", assertion.as_str())])
            .send()
            .await
            .context("Failed to request access token")?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            bail!("Token endpoint returned {}: {}", status, body);
        }
        let token: TokenResponse = resp
            .json()
            .await
            .context("Failed to parse token response")?;

        debug!(
            "Obtained access token for {} valid for {}s",
            self.key.client_email, token.expires_in
        );
        let expires_at = Instant::now() + Duration::from_secs(token.expires_in);
        self.cached = Some((token.access_token.clone(), expires_at));
        Ok(token.access_token)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use jsonwebtoken::{decode, DecodingKey, Validation};

    const PRIVATE_KEY: &str = include_str!("../../tests/fixtures/test_key.pem");
    const PUBLIC_KEY: &str = include_str!("../../tests/fixtures/test_key.pub.pem");

    fn key() -> ServiceAccountKey {
        ServiceAccountKey {
            client_email: "exporter@project.iam.gserviceaccount.com".to_string(),
            private_key: PRIVATE_KEY.to_string(),
            private_key_id: Some("key-1".to_string()),
            token_uri: DEFAULT_TOKEN_URI.to_string(),
        }
    }

    #[test]
    fn test_assertion_is_signed_with_expected_claims() {
        let provider = TokenProvider::new(key()).unwrap();
        let issued_at = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap()
            .as_secs();
        let jwt = provider.assertion(issued_at).unwrap();

        let mut validation = Validation::new(Algorithm::RS256);
        validation.set_audience(&[DEFAULT_TOKEN_URI]);
        let decoded = decode::<AssertionClaims>(
            &jwt,
            &DecodingKey::from_rsa_pem(PUBLIC_KEY.as_bytes()).unwrap(),
            &validation,
        )
        .unwrap();

        assert_eq!(decoded.header.kid.as_deref(), Some("key-1"));
        assert_eq!(decoded.claims.iss, "exporter@project.iam.gserviceaccount.com");
        assert_eq!(decoded.claims.scope, SPREADSHEETS_SCOPE);
        assert_eq!(decoded.claims.exp - decoded.claims.iat, ASSERTION_LIFETIME_SECS);
    }

    #[test]
    fn test_invalid_private_key_is_rejected() {
        let mut bad = key();
        bad.private_key = "not a key".to_string();
        assert!(TokenProvider::new(bad).is_err());
    }

    #[test]
    fn test_key_file_defaults_token_uri() {
        let json = serde_json::json!({
            "type": "service_account",
            "client_email": "a@b.iam.gserviceaccount.com",
            "private_key": PRIVATE_KEY,
        });
        let file = tempfile::NamedTempFile::new().unwrap();
        std::fs::write(file.path(), json.to_string()).unwrap();

        let key = ServiceAccountKey::from_file(file.path()).unwrap();
        assert_eq!(key.token_uri, DEFAULT_TOKEN_URI);
        assert!(key.private_key_id.is_none());
        assert!(!format!("{:?}", key).contains("PRIVATE KEY"));
    }
}
