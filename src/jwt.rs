//! JWT credential issuing and verification.
//!
//! Three credential kinds are signed with the same HS256 secret:
//! - Access tokens: 24 hours, presented on every API call
//! - Refresh tokens: 7 days, only exchanged for a new access token
//! - API keys: 365 days, tracked in the database by JTI so they can be revoked

use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};

/// Access token duration: 24 hours
pub const ACCESS_TOKEN_DURATION_SECS: u64 = 24 * 60 * 60;

/// Refresh token duration: 7 days
pub const REFRESH_TOKEN_DURATION_SECS: u64 = 7 * 24 * 60 * 60;

/// API key duration: 365 days
pub const API_KEY_DURATION_SECS: u64 = 365 * 24 * 60 * 60;

/// Credential kind, stored in the `typ` claim.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenType {
    Access,
    Refresh,
    ApiKey,
}

impl TokenType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TokenType::Access => "access",
            TokenType::Refresh => "refresh",
            TokenType::ApiKey => "api_key",
        }
    }

    /// Lifetime in seconds.
    pub fn duration_secs(&self) -> u64 {
        match self {
            TokenType::Access => ACCESS_TOKEN_DURATION_SECS,
            TokenType::Refresh => REFRESH_TOKEN_DURATION_SECS,
            TokenType::ApiKey => API_KEY_DURATION_SECS,
        }
    }

    /// Lifetime in the short form returned to clients as `expiresIn`.
    pub fn expires_in(&self) -> &'static str {
        match self {
            TokenType::Access => "24h",
            TokenType::Refresh => "7d",
            TokenType::ApiKey => "365d",
        }
    }
}

/// JWT claims shared by every credential kind.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    /// Subject (customer UUID)
    pub sub: String,
    /// Token type
    #[serde(rename = "typ")]
    pub token_type: TokenType,
    /// JWT ID
    pub jti: String,
    /// Issued at (Unix timestamp)
    pub iat: u64,
    /// Expiration time (Unix timestamp)
    pub exp: u64,
}

/// A freshly signed credential.
#[derive(Debug, Clone)]
pub struct Credential {
    /// The JWT token string
    pub token: String,
    pub customer_id: String,
    pub token_type: TokenType,
    /// JWT ID (used as the API key identifier)
    pub jti: String,
    /// Issued at timestamp (Unix seconds)
    pub issued_at: u64,
    /// Expiration timestamp (Unix seconds)
    pub expires_at: u64,
}

/// Why a token failed verification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rejection {
    /// Signature checked out but `exp` is in the past
    Expired,
    /// Signed with a different key
    BadSignature,
    /// Not a decodable JWT with our claim layout
    Malformed,
    /// Valid token of the wrong kind (e.g. a refresh token used as access)
    WrongType { expected: TokenType, found: TokenType },
}

impl Rejection {
    pub fn is_expired(&self) -> bool {
        matches!(self, Rejection::Expired)
    }

    /// Short reason code exposed to clients.
    pub fn reason(&self) -> &'static str {
        match self {
            Rejection::Expired => "expired",
            Rejection::BadSignature | Rejection::WrongType { .. } => "invalid",
            Rejection::Malformed => "malformed",
        }
    }

    pub fn message(&self) -> &'static str {
        match self {
            Rejection::Expired => "Token has expired",
            Rejection::BadSignature => "Invalid token signature",
            Rejection::Malformed => "Malformed token",
            Rejection::WrongType { .. } => "Wrong token type",
        }
    }
}

impl From<jsonwebtoken::errors::Error> for Rejection {
    fn from(e: jsonwebtoken::errors::Error) -> Self {
        match e.kind() {
            ErrorKind::ExpiredSignature => Rejection::Expired,
            ErrorKind::InvalidSignature => Rejection::BadSignature,
            _ => Rejection::Malformed,
        }
    }
}

/// Outcome of verifying a token. Expected failures are values, not errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verification {
    Valid(Claims),
    Rejected(Rejection),
}

impl Verification {
    pub fn is_valid(&self) -> bool {
        matches!(self, Verification::Valid(_))
    }

    pub fn into_result(self) -> Result<Claims, Rejection> {
        match self {
            Verification::Valid(claims) => Ok(claims),
            Verification::Rejected(rejection) => Err(rejection),
        }
    }
}

/// Signing keys for every credential operation.
#[derive(Clone)]
pub struct JwtConfig {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
}

impl JwtConfig {
    /// Create a new JWT configuration with the given secret.
    /// An empty secret is a configuration error.
    pub fn new(secret: &[u8]) -> Result<Self, JwtError> {
        if secret.is_empty() {
            return Err(JwtError::MissingSecret);
        }
        Ok(Self {
            encoding_key: EncodingKey::from_secret(secret),
            decoding_key: DecodingKey::from_secret(secret),
        })
    }

    /// Sign a new credential of the given type for a customer.
    pub fn issue(&self, customer_id: &str, token_type: TokenType) -> Result<Credential, JwtError> {
        let now = unix_now()?;
        let exp = now + token_type.duration_secs();
        let jti = uuid::Uuid::new_v4().to_string();

        let claims = Claims {
            sub: customer_id.to_string(),
            token_type,
            jti: jti.clone(),
            iat: now,
            exp,
        };

        let token = jsonwebtoken::encode(&Header::default(), &claims, &self.encoding_key)
            .map_err(JwtError::Encoding)?;

        Ok(Credential {
            token,
            customer_id: claims.sub,
            token_type,
            jti,
            issued_at: now,
            expires_at: exp,
        })
    }

    /// Verify signature and expiry of a token of any type.
    pub fn verify(&self, token: &str) -> Verification {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;

        match jsonwebtoken::decode::<Claims>(token, &self.decoding_key, &validation) {
            Ok(data) => Verification::Valid(data.claims),
            Err(e) => Verification::Rejected(e.into()),
        }
    }

    /// Verify a token and require a specific type.
    pub fn verify_as(&self, token: &str, expected: TokenType) -> Verification {
        match self.verify(token) {
            Verification::Valid(claims) if claims.token_type != expected => {
                Verification::Rejected(Rejection::WrongType {
                    expected,
                    found: claims.token_type,
                })
            }
            other => other,
        }
    }

    /// Exchange a refresh token for a new access token for the same customer.
    pub fn refresh(&self, refresh_token: &str) -> Result<Credential, JwtError> {
        let claims = self
            .verify_as(refresh_token, TokenType::Refresh)
            .into_result()
            .map_err(JwtError::InvalidCredential)?;

        self.issue(&claims.sub, TokenType::Access)
    }
}

fn unix_now() -> Result<u64, JwtError> {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .map_err(|_| JwtError::TimeError)
}

/// Errors that can occur during JWT operations.
#[derive(Debug)]
pub enum JwtError {
    /// No signing secret configured
    MissingSecret,
    /// Error encoding the token
    Encoding(jsonwebtoken::errors::Error),
    /// System time error
    TimeError,
    /// Presented credential cannot be used for the operation
    InvalidCredential(Rejection),
}

impl std::fmt::Display for JwtError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            JwtError::MissingSecret => write!(f, "JWT signing secret is not configured"),
            JwtError::Encoding(e) => write!(f, "Failed to encode token: {}", e),
            JwtError::TimeError => write!(f, "System time error"),
            JwtError::InvalidCredential(r) => write!(f, "Invalid credential: {}", r.message()),
        }
    }
}

impl std::error::Error for JwtError {}
