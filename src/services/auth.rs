//! Выдача и проверка JWT, хеширование паролей.

use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

use crate::config::JwtConfig;
use crate::models::User;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    pub sub: i64,
    pub email: String,
    pub staff: bool,
    pub iat: i64,
    pub exp: i64,
}

#[derive(Clone)]
pub struct TokenService {
    encoding: EncodingKey,
    decoding: DecodingKey,
    expires_in_hours: i64,
}

impl TokenService {
    pub fn from_config(config: &JwtConfig) -> Self {
        Self {
            encoding: EncodingKey::from_secret(config.secret.as_bytes()),
            decoding: DecodingKey::from_secret(config.secret.as_bytes()),
            expires_in_hours: config.expires_in_hours,
        }
    }

    pub fn issue(&self, user: &User) -> Result<String, jsonwebtoken::errors::Error> {
        let now = Utc::now();
        let claims = Claims {
            sub: user.id,
            email: user.email.clone(),
            staff: user.is_staff,
            iat: now.timestamp(),
            exp: (now + Duration::hours(self.expires_in_hours)).timestamp(),
        };
        encode(&Header::default(), &claims, &self.encoding)
    }

    pub fn verify(&self, token: &str) -> Result<Claims, jsonwebtoken::errors::Error> {
        decode::<Claims>(token, &self.decoding, &Validation::default()).map(|data| data.claims)
    }
}

pub fn hash_password(password: &str) -> Result<String, bcrypt::BcryptError> {
    bcrypt::hash(password, bcrypt::DEFAULT_COST)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn service(hours: i64) -> TokenService {
        TokenService::from_config(&JwtConfig { secret: "test-secret".into(), expires_in_hours: hours })
    }

    fn user(is_staff: bool) -> User {
        User {
            id: 42,
            email: "admin@cinema.com".into(),
            password_hash: String::new(),
            first_name: "Ada".into(),
            last_name: "Admin".into(),
            is_staff,
            is_active: true,
            date_joined: NaiveDate::from_ymd_opt(2024, 1, 1)
                .and_then(|d| d.and_hms_opt(0, 0, 0))
                .unwrap(),
        }
    }

    #[test]
    fn issued_token_verifies() {
        let service = service(1);
        let token = service.issue(&user(true)).unwrap();
        let claims = service.verify(&token).unwrap();
        assert_eq!(claims.sub, 42);
        assert!(claims.staff);
    }

    #[test]
    fn expired_token_is_rejected() {
        let service = service(-2);
        let token = service.issue(&user(false)).unwrap();
        assert!(service.verify(&token).is_err());
    }

    #[test]
    fn token_from_other_secret_is_rejected() {
        let token = service(1).issue(&user(false)).unwrap();
        let other = TokenService::from_config(&JwtConfig { secret: "other".into(), expires_in_hours: 1 });
        assert!(other.verify(&token).is_err());
    }

    #[test]
    fn password_hash_verifies() {
        let mut user = user(false);
        user.password_hash = hash_password("s3cret-pass").unwrap();
        assert!(user.verify_password("s3cret-pass"));
        assert!(!user.verify_password("wrong"));
    }
}
