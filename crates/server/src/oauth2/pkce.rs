//! PKCE (Proof Key for Code Exchange, RFC 7636) verification.

use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;
use std::fmt;
use std::str::FromStr;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PkceMethod {
    S256,
    Plain,
}

impl PkceMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            PkceMethod::S256 => "S256",
            PkceMethod::Plain => "plain",
        }
    }
}

impl fmt::Display for PkceMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, PartialEq, Eq)]
pub struct UnknownPkceMethod(pub String);

impl FromStr for PkceMethod {
    type Err = UnknownPkceMethod;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "S256" => Ok(PkceMethod::S256),
            "plain" => Ok(PkceMethod::Plain),
            other => Err(UnknownPkceMethod(other.to_string())),
        }
    }
}

/// Computes the S256 code challenge: BASE64URL(SHA256(code_verifier)), unpadded.
pub fn compute_s256_challenge(code_verifier: &str) -> String {
    use base64::Engine;
    let hash = Sha256::digest(code_verifier.as_bytes());
    base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(hash)
}

/// Recomputes the challenge for `verifier` and compares it with `challenge`.
pub fn verify(verifier: &str, challenge: &str, method: PkceMethod) -> bool {
    let computed = match method {
        PkceMethod::S256 => compute_s256_challenge(verifier),
        PkceMethod::Plain => verifier.to_string(),
    };
    computed.as_bytes().ct_eq(challenge.as_bytes()).into()
}
