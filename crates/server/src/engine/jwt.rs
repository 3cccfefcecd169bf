//! Signed JWT artifacts.
//!
//! Tokens carry the standard `aud`/`sub`/`iat`/`exp`/`jti` claims plus an
//! `openidInfo` object holding `scope`, `role` and any claims contributed by the
//! openid-data hook. The header `kid` names the signing key, which lets a single
//! [`KeyRing`] verify both user and service tokens.

use crate::config::{ConfigError, JwtConfig};
use crate::error::JwtError;
use crate::model::Role;
use jsonwebtoken::{
    Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, decode_header, encode,
    errors::ErrorKind,
};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::sync::Arc;

pub const SCOPE_CLAIM: &str = "scope";
pub const ROLE_CLAIM: &str = "role";

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Claims {
    pub aud: String,
    pub sub: String,
    pub iat: i64,
    pub exp: i64,
    pub jti: String,
    #[serde(rename = "openidInfo", default)]
    pub openid_info: Map<String, Value>,
}

impl Claims {
    pub fn role(&self) -> Option<Role> {
        self.openid_info
            .get(ROLE_CLAIM)
            .and_then(Value::as_str)
            .and_then(|raw| raw.parse().ok())
    }

    pub fn scope(&self) -> Option<&str> {
        self.openid_info.get(SCOPE_CLAIM).and_then(Value::as_str)
    }

    /// Standard claims and `openidInfo` entries merged into one map.
    pub fn flatten(&self) -> Map<String, Value> {
        let mut out = self.openid_info.clone();
        out.insert("aud".into(), Value::from(self.aud.clone()));
        out.insert("sub".into(), Value::from(self.sub.clone()));
        out.insert("iat".into(), Value::from(self.iat));
        out.insert("exp".into(), Value::from(self.exp));
        out.insert("jti".into(), Value::from(self.jti.clone()));
        out
    }
}

/// An HMAC key plus the `kid` it is published under.
#[derive(Clone)]
pub struct SigningKey {
    pub key_id: String,
    pub algorithm: Algorithm,
    secret: Arc<[u8]>,
}

impl SigningKey {
    pub fn new(key_id: impl Into<String>, secret: &[u8], algorithm: Algorithm) -> Self {
        Self {
            key_id: key_id.into(),
            algorithm,
            secret: Arc::from(secret),
        }
    }

    pub fn sign(&self, claims: &Claims) -> Result<String, JwtError> {
        let header = Header {
            kid: Some(self.key_id.clone()),
            ..Header::new(self.algorithm)
        };
        encode(&header, claims, &EncodingKey::from_secret(&self.secret))
            .map_err(|e| JwtError::Signing(e.to_string()))
    }

    fn verify(&self, token: &str, check_expiry: bool) -> Result<Claims, JwtError> {
        let mut validation = Validation::new(self.algorithm);
        validation.validate_exp = check_expiry;
        validation.validate_aud = false;
        validation.leeway = 0;
        match decode::<Claims>(token, &DecodingKey::from_secret(&self.secret), &validation) {
            Ok(data) => Ok(data.claims),
            Err(e) if matches!(e.kind(), ErrorKind::ExpiredSignature) => Err(JwtError::Expired),
            Err(_) => Err(JwtError::Invalid),
        }
    }
}

impl fmt::Debug for SigningKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SigningKey")
            .field("key_id", &self.key_id)
            .field("algorithm", &self.algorithm)
            .finish_non_exhaustive()
    }
}

/// The per-role signing keys.
#[derive(Clone, Debug)]
pub struct KeyRing {
    user: SigningKey,
    service: SigningKey,
}

impl KeyRing {
    pub fn new(user: SigningKey, service: SigningKey) -> Self {
        Self { user, service }
    }

    pub fn from_config(config: &JwtConfig) -> Result<Self, ConfigError> {
        let algorithm = config.algorithm()?;
        Ok(Self::new(
            SigningKey::new(
                config.user.key_id.clone(),
                config.user.secret.as_bytes(),
                algorithm,
            ),
            SigningKey::new(
                config.service.key_id.clone(),
                config.service.secret.as_bytes(),
                algorithm,
            ),
        ))
    }

    pub fn signing_key(&self, role: Role) -> &SigningKey {
        match role {
            Role::User => &self.user,
            Role::ApiServer => &self.service,
        }
    }

    /// Verify signature and expiry.
    pub fn decode(&self, token: &str) -> Result<Claims, JwtError> {
        self.decode_with(token, true)
    }

    /// Verify the signature only, accepting tokens past their `exp`.
    pub fn decode_ignoring_expiry(&self, token: &str) -> Result<Claims, JwtError> {
        self.decode_with(token, false)
    }

    fn decode_with(&self, token: &str, check_expiry: bool) -> Result<Claims, JwtError> {
        let header = decode_header(token).map_err(|_| JwtError::Invalid)?;
        let kid = header.kid.ok_or(JwtError::Invalid)?;
        let key = [&self.user, &self.service]
            .into_iter()
            .find(|key| key.key_id == kid)
            .ok_or(JwtError::Invalid)?;
        if header.alg != key.algorithm {
            return Err(JwtError::Invalid);
        }
        key.verify(token, check_expiry)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::OffsetDateTime;

    fn ring() -> KeyRing {
        KeyRing::new(
            SigningKey::new("user-kid", b"user-secret-0123456789", Algorithm::HS256),
            SigningKey::new("svc-kid", b"svc-secret-0123456789", Algorithm::HS256),
        )
    }

    fn claims(exp_offset: i64) -> Claims {
        let now = OffsetDateTime::now_utc().unix_timestamp();
        let mut info = Map::new();
        info.insert(SCOPE_CLAIM.into(), Value::from("read, openid"));
        info.insert(ROLE_CLAIM.into(), Value::from("user"));
        info.insert("another".into(), Value::from("whatever"));
        Claims {
            aud: "222222".into(),
            sub: "a@b.com".into(),
            iat: now,
            exp: now + exp_offset,
            jti: uuid::Uuid::new_v4().to_string(),
            openid_info: info,
        }
    }

    #[test]
    fn signs_with_kid_and_decodes() {
        let keys = ring();
        let token = keys.signing_key(Role::User).sign(&claims(60)).unwrap();
        let header = decode_header(&token).unwrap();
        assert_eq!(header.kid.as_deref(), Some("user-kid"));

        let decoded = keys.decode(&token).unwrap();
        assert_eq!(decoded.sub, "a@b.com");
        assert_eq!(decoded.role(), Some(Role::User));
        assert_eq!(decoded.scope(), Some("read, openid"));
    }

    #[test]
    fn expired_token_only_passes_admin_decode() {
        let keys = ring();
        let token = keys.signing_key(Role::User).sign(&claims(-120)).unwrap();
        assert_eq!(keys.decode(&token), Err(JwtError::Expired));
        assert_eq!(keys.decode_ignoring_expiry(&token).unwrap().sub, "a@b.com");
    }

    #[test]
    fn foreign_secret_is_invalid_even_with_known_kid() {
        let forged = SigningKey::new("user-kid", b"not-the-real-secret!!", Algorithm::HS256)
            .sign(&claims(60))
            .unwrap();
        assert_eq!(ring().decode(&forged), Err(JwtError::Invalid));
        assert_eq!(ring().decode_ignoring_expiry(&forged), Err(JwtError::Invalid));
    }

    #[test]
    fn unknown_kid_and_garbage_are_invalid() {
        let other = SigningKey::new("other", b"user-secret-0123456789", Algorithm::HS256)
            .sign(&claims(60))
            .unwrap();
        assert_eq!(ring().decode(&other), Err(JwtError::Invalid));
        assert_eq!(ring().decode("not.a.jwt"), Err(JwtError::Invalid));
    }

    #[test]
    fn flatten_merges_openid_info() {
        let flat = claims(60).flatten();
        assert_eq!(flat["role"], "user");
        assert_eq!(flat["sub"], "a@b.com");
        assert_eq!(flat["another"], "whatever");
    }
}
