//! Signed bearer tokens (HS256 JWT).

use std::fmt;

use chrono::{DateTime, Duration, TimeZone, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::config::AuthConfig;
use crate::error::ApiError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Patient,
    Doctor,
    Admin,
    SuperAdmin,
}

impl Role {
    pub fn is_admin(self) -> bool {
        matches!(self, Role::Admin | Role::SuperAdmin)
    }

    pub fn is_staff(self) -> bool {
        self != Role::Patient
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Role::Patient => "patient",
            Role::Doctor => "doctor",
            Role::Admin => "admin",
            Role::SuperAdmin => "super_admin",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Claims {
    /// Internal record id of the authenticated principal.
    pub sub: Uuid,
    pub role: Role,
    /// External identifier: patient ID, doctor ID or admin ID.
    pub ident: String,
    pub hospital: Option<Uuid>,
    pub iat: i64,
    pub exp: i64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IssuedToken {
    pub token: String,
    pub expires_at: DateTime<Utc>,
}

#[derive(Clone)]
pub struct TokenService {
    encoding: EncodingKey,
    decoding: DecodingKey,
    ttl: Duration,
}

impl TokenService {
    pub fn new(secret: &str, ttl: Duration) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            ttl,
        }
    }

    pub fn from_config(config: &AuthConfig) -> Self {
        Self::new(&config.jwt_secret, Duration::minutes(config.token_ttl_minutes))
    }

    pub fn issue(&self, subject: Uuid, role: Role, ident: &str, hospital: Option<Uuid>) -> Result<IssuedToken, ApiError> {
        self.issue_at(subject, role, ident, hospital, Utc::now())
    }

    fn issue_at(
        &self,
        subject: Uuid,
        role: Role,
        ident: &str,
        hospital: Option<Uuid>,
        now: DateTime<Utc>,
    ) -> Result<IssuedToken, ApiError> {
        let expires_at = now + self.ttl;
        let claims = Claims {
            sub: subject,
            role,
            ident: ident.to_string(),
            hospital,
            iat: now.timestamp(),
            exp: expires_at.timestamp(),
        };
        let token = encode(&Header::new(Algorithm::HS256), &claims, &self.encoding).map_err(ApiError::internal)?;
        Ok(IssuedToken {
            token,
            expires_at: Utc.timestamp_opt(claims.exp, 0).single().unwrap_or(expires_at),
        })
    }

    pub fn verify(&self, token: &str) -> Result<Claims, ApiError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;
        decode::<Claims>(token, &self.decoding, &validation)
            .map(|data| data.claims)
            .map_err(|e| {
                tracing::debug!(error = %e, "token rejected");
                ApiError::Unauthorized("invalid or expired token".into())
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn service() -> TokenService {
        TokenService::new("test-secret", Duration::minutes(30))
    }

    #[test]
    fn issued_tokens_verify() {
        let subject = Uuid::new_v4();
        let hospital = Some(Uuid::new_v4());
        let issued = service().issue(subject, Role::Doctor, "MED-CHU-MEL-0001", hospital).unwrap();
        let claims = service().verify(&issued.token).unwrap();
        assert_eq!(claims.sub, subject);
        assert_eq!(claims.role, Role::Doctor);
        assert_eq!(claims.ident, "MED-CHU-MEL-0001");
        assert_eq!(claims.hospital, hospital);
        assert_eq!(claims.exp, issued.expires_at.timestamp());
    }

    #[test]
    fn expired_tokens_are_rejected() {
        let issued = service()
            .issue_at(Uuid::new_v4(), Role::Patient, "BJ20250001", None, Utc::now() - Duration::hours(2))
            .unwrap();
        assert!(matches!(service().verify(&issued.token), Err(ApiError::Unauthorized(_))));
    }

    #[test]
    fn tokens_signed_with_another_secret_are_rejected() {
        let other = TokenService::new("other-secret", Duration::minutes(30));
        let issued = other.issue(Uuid::new_v4(), Role::Admin, "ADM-1", None).unwrap();
        assert!(service().verify(&issued.token).is_err());
        assert!(service().verify("not-a-jwt").is_err());
    }

    #[test]
    fn role_helpers() {
        assert!(Role::SuperAdmin.is_admin());
        assert!(!Role::Doctor.is_admin());
        assert!(Role::Doctor.is_staff());
        assert!(!Role::Patient.is_staff());
        assert_eq!(Role::SuperAdmin.to_string(), "super_admin");
    }
}
