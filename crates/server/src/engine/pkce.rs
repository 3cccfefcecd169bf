//! Proof Key for Code Exchange (RFC 7636).

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use sha2::{Digest, Sha256};
use std::str::FromStr;

use crate::model::UnknownTag;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PkceMethod {
    Plain,
    S256,
}

impl PkceMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            PkceMethod::Plain => "plain",
            PkceMethod::S256 => "S256",
        }
    }

    pub fn verify(&self, challenge: &str, verifier: &str) -> bool {
        match self {
            PkceMethod::Plain => challenge == verifier,
            PkceMethod::S256 => s256_challenge(verifier) == challenge,
        }
    }
}

impl FromStr for PkceMethod {
    type Err = UnknownTag;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "plain" => Ok(PkceMethod::Plain),
            "S256" => Ok(PkceMethod::S256),
            other => Err(UnknownTag {
                kind: "code_challenge_method",
                value: other.to_string(),
            }),
        }
    }
}

/// `BASE64URL(SHA256(verifier))`
pub fn s256_challenge(verifier: &str) -> String {
    let digest = Sha256::digest(verifier.as_bytes());
    URL_SAFE_NO_PAD.encode(digest)
}

/// A fresh 43-character verifier.
pub fn generate_verifier() -> Result<String, getrandom::Error> {
    let mut bytes = [0u8; 32];
    getrandom::fill(&mut bytes)?;
    Ok(URL_SAFE_NO_PAD.encode(bytes))
}
