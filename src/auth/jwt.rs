use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use time::{Duration, OffsetDateTime};
use tracing::debug;
use uuid::Uuid;

use crate::auth::repo::Role;
use crate::config::JwtConfig;
use crate::error::ApiError;

/// Identity carried inside a bearer token: just enough to reconstruct the
/// caller without a store round trip. The gate still re-fetches the live
/// record, since role and verification can change after issuance.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Claims {
    pub sub: Uuid,
    pub email: String,
    pub user_name: String,
    pub role: Role,
    pub iat: usize,
    pub exp: usize,
}

#[derive(Clone)]
pub struct JwtKeys {
    encoding: EncodingKey,
    decoding: DecodingKey,
    ttl: Duration,
}

impl JwtKeys {
    pub fn from_config(cfg: &JwtConfig) -> Self {
        Self {
            encoding: EncodingKey::from_secret(cfg.secret.as_bytes()),
            decoding: DecodingKey::from_secret(cfg.secret.as_bytes()),
            ttl: Duration::days(cfg.ttl_days),
        }
    }

    pub fn sign(
        &self,
        id: Uuid,
        email: &str,
        user_name: &str,
        role: Role,
    ) -> anyhow::Result<String> {
        let now = OffsetDateTime::now_utc();
        let claims = Claims {
            sub: id,
            email: email.to_string(),
            user_name: user_name.to_string(),
            role,
            iat: now.unix_timestamp() as usize,
            exp: (now + self.ttl).unix_timestamp() as usize,
        };
        let token = encode(&Header::default(), &claims, &self.encoding)?;
        debug!(user_id = %id, "jwt signed");
        Ok(token)
    }

    pub fn verify(&self, token: &str) -> Result<Claims, ApiError> {
        let validation = Validation::default();
        let data = decode::<Claims>(token, &self.decoding, &validation).map_err(|e| {
            match e.kind() {
                jsonwebtoken::errors::ErrorKind::ExpiredSignature => ApiError::TokenExpired,
                _ => ApiError::InvalidToken,
            }
        })?;
        debug!(user_id = %data.claims.sub, "jwt verified");
        Ok(data.claims)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_keys() -> JwtKeys {
        JwtKeys::from_config(&JwtConfig {
            secret: "dev-secret".into(),
            token_prefix: "Bearer ".into(),
            ttl_days: 30,
        })
    }

    #[test]
    fn sign_and_verify_roundtrip() {
        let keys = make_keys();
        let id = Uuid::new_v4();
        let token = keys
            .sign(id, "alice@x.com", "alice", Role::User)
            .expect("sign");
        let claims = keys.verify(&token).expect("verify token");
        assert_eq!(claims.sub, id);
        assert_eq!(claims.email, "alice@x.com");
        assert_eq!(claims.user_name, "alice");
        assert_eq!(claims.role, Role::User);
        assert!(claims.exp > claims.iat);
    }

    #[test]
    fn tampering_with_the_signature_fails_verification() {
        let keys = make_keys();
        let token = keys
            .sign(Uuid::new_v4(), "alice@x.com", "alice", Role::User)
            .expect("sign");

        let dot = token.rfind('.').expect("jwt has a signature segment");
        let mut tampered: Vec<u8> = token.into_bytes();
        tampered[dot + 1] = if tampered[dot + 1] == b'a' { b'b' } else { b'a' };
        let tampered = String::from_utf8(tampered).unwrap();

        assert!(matches!(
            keys.verify(&tampered),
            Err(ApiError::InvalidToken)
        ));
    }

    #[test]
    fn garbage_fails_verification() {
        let keys = make_keys();
        assert!(matches!(
            keys.verify("not-a-token"),
            Err(ApiError::InvalidToken)
        ));
    }

    #[test]
    fn expired_token_is_reported_as_expired() {
        let keys = make_keys();
        let now = OffsetDateTime::now_utc();
        let claims = Claims {
            sub: Uuid::new_v4(),
            email: "old@x.com".into(),
            user_name: "old".into(),
            role: Role::User,
            iat: (now - Duration::hours(2)).unix_timestamp() as usize,
            exp: (now - Duration::hours(1)).unix_timestamp() as usize,
        };
        let token = encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(b"dev-secret"),
        )
        .expect("encode");

        assert!(matches!(keys.verify(&token), Err(ApiError::TokenExpired)));
    }

    #[test]
    fn verify_rejects_a_token_signed_with_another_secret() {
        let keys = make_keys();
        let other = JwtKeys::from_config(&JwtConfig {
            secret: "another-secret".into(),
            token_prefix: "Bearer ".into(),
            ttl_days: 30,
        });
        let token = other
            .sign(Uuid::new_v4(), "alice@x.com", "alice", Role::Admin)
            .expect("sign");
        assert!(matches!(keys.verify(&token), Err(ApiError::InvalidToken)));
    }
}
