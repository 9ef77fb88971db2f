use crate::services::credentials::Credential;
use chrono::{DateTime, TimeZone, Utc};
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TokenClaims {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sub: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exp: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iat: Option<i64>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl TokenClaims {
    pub fn subject(&self) -> Option<&str> {
        self.sub.as_deref().filter(|sub| !sub.is_empty())
    }

    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        self.exp.and_then(|ts| Utc.timestamp_opt(ts, 0).single())
    }

    pub fn issued_at(&self) -> Option<DateTime<Utc>> {
        self.iat.and_then(|ts| Utc.timestamp_opt(ts, 0).single())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Verification {
    Valid(TokenClaims),
    Invalid(String),
}

impl Verification {
    pub fn is_valid(&self) -> bool {
        matches!(self, Verification::Valid(_))
    }

    pub fn into_result(self) -> Result<TokenClaims, String> {
        match self {
            Verification::Valid(claims) => Ok(claims),
            Verification::Invalid(reason) => Err(reason),
        }
    }
}

/// HS256 verifier with zero expiry leeway. `exp` is checked when present
/// but not required.
#[derive(Debug, Clone)]
pub struct TokenVerifier {
    validation: Validation,
}

impl TokenVerifier {
    pub fn new() -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;
        validation.required_spec_claims.clear();
        validation.validate_exp = true;
        validation.validate_nbf = true;
        Self { validation }
    }

    pub fn verify(&self, token: &str, secret: &Credential) -> Verification {
        let key = DecodingKey::from_secret(secret.expose().as_bytes());
        match decode::<TokenClaims>(token.trim(), &key, &self.validation) {
            Ok(data) => Verification::Valid(data.claims),
            Err(err) => Verification::Invalid(format!("Token verification failed: {}", err)),
        }
    }
}

impl Default for TokenVerifier {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use jsonwebtoken::{encode, EncodingKey, Header};
    use serde_json::json;

    fn mint(alg: Algorithm, secret: &str, claims: Value) -> String {
        encode(
            &Header::new(alg),
            &claims,
            &EncodingKey::from_secret(secret.as_bytes()),
        )
        .unwrap()
    }

    fn now() -> i64 {
        Utc::now().timestamp()
    }

    #[test]
    fn valid_token_exposes_claims() {
        let token = mint(
            Algorithm::HS256,
            "k1",
            json!({"sub": "alice", "iat": now(), "exp": now() + 3600, "role": "admin"}),
        );
        let claims = TokenVerifier::new()
            .verify(&token, &Credential::new("k1"))
            .into_result()
            .unwrap();
        assert_eq!(claims.subject(), Some("alice"));
        assert!(claims.expires_at().is_some());
        assert_eq!(claims.extra["role"], "admin");
    }

    #[test]
    fn expired_token_is_rejected() {
        let token = mint(
            Algorithm::HS256,
            "k1",
            json!({"sub": "alice", "exp": now() - 3600}),
        );
        let outcome = TokenVerifier::new().verify(&token, &Credential::new("k1"));
        match outcome {
            Verification::Invalid(reason) => {
                assert!(reason.starts_with("Token verification failed"));
            }
            other => panic!("expected rejection, got {:?}", other),
        }
    }

    #[test]
    fn not_yet_valid_token_is_rejected() {
        let token = mint(
            Algorithm::HS256,
            "k1",
            json!({"sub": "alice", "nbf": now() + 3600, "exp": now() + 7200}),
        );
        let outcome = TokenVerifier::new().verify(&token, &Credential::new("k1"));
        assert!(!outcome.is_valid());
        match outcome {
            Verification::Invalid(reason) => {
                assert!(reason.starts_with("Token verification failed"), "{}", reason);
            }
            other => panic!("expected rejection, got {:?}", other),
        }

        let started = mint(
            Algorithm::HS256,
            "k1",
            json!({"sub": "alice", "nbf": now() - 60, "exp": now() + 3600}),
        );
        assert!(TokenVerifier::new()
            .verify(&started, &Credential::new("k1"))
            .is_valid());
    }

    #[test]
    fn token_without_exp_is_accepted() {
        let token = mint(Algorithm::HS256, "k1", json!({"sub": "svc"}));
        assert!(TokenVerifier::new()
            .verify(&token, &Credential::new("k1"))
            .is_valid());
    }

    #[test]
    fn wrong_key_wrong_algorithm_and_garbage_fail_closed() {
        let verifier = TokenVerifier::new();
        let secret = Credential::new("k1");
        let other_key = mint(Algorithm::HS256, "k2", json!({"sub": "alice"}));
        let other_alg = mint(Algorithm::HS512, "k1", json!({"sub": "alice"}));
        assert!(!verifier.verify(&other_key, &secret).is_valid());
        assert!(!verifier.verify(&other_alg, &secret).is_valid());
        assert!(!verifier.verify("not-a-jwt", &secret).is_valid());
        assert!(!verifier.verify("", &secret).is_valid());
    }
}
