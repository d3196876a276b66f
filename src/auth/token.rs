use crate::error::{Error, Result};
use chrono::Utc;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use std::fmt;
use tonic::metadata::{Ascii, MetadataValue};
use tonic::Request;
use uuid::Uuid;

use crate::proto::AUTHORIZATION_KEY;

/// Opaque bearer credential issued at registration or login.
///
/// Travels only as stream metadata, never inside a message body.
#[derive(Clone, PartialEq, Eq)]
pub struct Token(String);

impl Token {
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Attaches the token to an outgoing request as `authorization` metadata.
    pub fn attach<T>(&self, request: &mut Request<T>) -> Result<()> {
        let value: MetadataValue<Ascii> = self
            .0
            .parse()
            .map_err(|_| Error::InvalidData("token is not valid metadata".into()))?;
        request.metadata_mut().insert(AUTHORIZATION_KEY, value);
        Ok(())
    }
}

// Tokens are credentials; keep them out of debug logs.
impl fmt::Debug for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Token(..)")
    }
}

/// The identity a token was issued to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Principal {
    Sensor { id: Uuid },
    Client { login: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
enum PrincipalKind {
    Sensor,
    Client,
}

#[derive(Debug, Serialize, Deserialize)]
struct Claims {
    sub: String,
    kind: PrincipalKind,
    iat: i64,
}

/// Issues and validates HS256 tokens. No expiry is modeled.
pub struct TokenIssuer {
    encoding: EncodingKey,
    decoding: DecodingKey,
    validation: Validation,
}

impl TokenIssuer {
    pub fn new(secret: &[u8]) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = false;
        validation.required_spec_claims.clear();
        Self {
            encoding: EncodingKey::from_secret(secret),
            decoding: DecodingKey::from_secret(secret),
            validation,
        }
    }

    /// Builds an issuer from a hex secret, or a random one when none is configured.
    pub fn from_hex_secret(secret: Option<&str>) -> Result<Self> {
        match secret {
            Some(hex_secret) => {
                let bytes = hex::decode(hex_secret.trim())
                    .map_err(|e| Error::Config(format!("auth.secret is not valid hex: {}", e)))?;
                if bytes.is_empty() {
                    return Err(Error::Config("auth.secret must not be empty".into()));
                }
                Ok(Self::new(&bytes))
            }
            None => {
                let mut bytes = [0u8; 32];
                rand::thread_rng().fill_bytes(&mut bytes);
                tracing::debug!("No auth.secret configured, generated an ephemeral signing key");
                Ok(Self::new(&bytes))
            }
        }
    }

    pub fn issue(&self, principal: &Principal) -> Result<Token> {
        let (sub, kind) = match principal {
            Principal::Sensor { id } => (id.to_string(), PrincipalKind::Sensor),
            Principal::Client { login } => (login.clone(), PrincipalKind::Client),
        };
        let claims = Claims {
            sub,
            kind,
            iat: Utc::now().timestamp(),
        };
        Ok(Token(encode(&Header::default(), &claims, &self.encoding)?))
    }

    pub fn validate(&self, raw: &str) -> Result<Principal> {
        let data = decode::<Claims>(raw, &self.decoding, &self.validation)
            .map_err(|_| Error::Auth("Invalid token".into()))?;
        match data.claims.kind {
            PrincipalKind::Sensor => Uuid::parse_str(&data.claims.sub)
                .map(|id| Principal::Sensor { id })
                .map_err(|_| Error::Auth("Invalid token".into())),
            PrincipalKind::Client => Ok(Principal::Client {
                login: data.claims.sub,
            }),
        }
    }
}
