use axum::{
    extract::FromRequestParts,
    http::{header, request::Parts},
};
use std::sync::Arc;

use crate::error::ApiError;
use crate::models::User;

/// Аутентифицированный пользователь. Для ядра это просто доверенный `user_id`.
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub user_id: i64,
    pub email: String,
    pub is_staff: bool,
}

impl AuthUser {
    // Токен переживает деактивацию и смену прав, поэтому учётка
    // перечитывается на каждом запросе
    fn from_account(account: Option<User>) -> Result<Self, ApiError> {
        match account {
            Some(user) if user.is_active => Ok(AuthUser {
                user_id: user.id,
                email: user.email,
                is_staff: user.is_staff,
            }),
            _ => Err(ApiError::Unauthorized),
        }
    }
}

/// Пользователь с правами администратора каталога.
#[derive(Debug, Clone)]
pub struct AdminUser(pub AuthUser);

// Достаём токен из заголовка Authorization
fn bearer_token(parts: &Parts) -> Option<&str> {
    let value = parts.headers.get(header::AUTHORIZATION)?.to_str().ok()?;
    let token = value
        .strip_prefix("Bearer ")
        .or_else(|| value.strip_prefix("Token "))?
        .trim();
    (!token.is_empty()).then_some(token)
}

// Bearer/Token auth extractor
impl FromRequestParts<Arc<crate::AppState>> for AuthUser {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<crate::AppState>,
    ) -> Result<Self, Self::Rejection> {
        let token = bearer_token(parts).ok_or(ApiError::Unauthorized)?;

        let claims = state.tokens.verify(token).map_err(|e| {
            tracing::debug!("rejected token: {:?}", e);
            ApiError::Unauthorized
        })?;

        let account = User::find_by_id(claims.sub, &state.db).await?;
        AuthUser::from_account(account)
    }
}

impl FromRequestParts<Arc<crate::AppState>> for AdminUser {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<crate::AppState>,
    ) -> Result<Self, Self::Rejection> {
        let user = AuthUser::from_request_parts(parts, state).await?;
        if !user.is_staff {
            return Err(ApiError::Forbidden);
        }
        Ok(AdminUser(user))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::Request;

    fn parts(auth: Option<&str>) -> Parts {
        let mut builder = Request::builder().uri("/api/orders");
        if let Some(value) = auth {
            builder = builder.header(header::AUTHORIZATION, value);
        }
        builder.body(()).unwrap().into_parts().0
    }

    fn account(is_active: bool, is_staff: bool) -> User {
        User {
            id: 3,
            email: "viewer@cinema.test".into(),
            password_hash: String::new(),
            first_name: "Ann".into(),
            last_name: "Lee".into(),
            is_staff,
            is_active,
            date_joined: chrono::NaiveDate::from_ymd_opt(2024, 1, 1)
                .and_then(|d| d.and_hms_opt(0, 0, 0))
                .unwrap(),
        }
    }

    #[test]
    fn active_account_is_authenticated_with_current_rights() {
        let user = AuthUser::from_account(Some(account(true, false))).unwrap();
        assert_eq!(user.user_id, 3);
        assert!(!user.is_staff);
    }

    #[test]
    fn deactivated_or_deleted_account_is_rejected() {
        assert!(matches!(AuthUser::from_account(Some(account(false, true))), Err(ApiError::Unauthorized)));
        assert!(matches!(AuthUser::from_account(None), Err(ApiError::Unauthorized)));
    }

    #[test]
    fn bearer_and_token_schemes_are_accepted() {
        assert_eq!(bearer_token(&parts(Some("Bearer abc.def"))), Some("abc.def"));
        assert_eq!(bearer_token(&parts(Some("Token abc.def"))), Some("abc.def"));
    }

    #[test]
    fn other_schemes_are_rejected() {
        assert_eq!(bearer_token(&parts(None)), None);
        assert_eq!(bearer_token(&parts(Some("Basic dXNlcjpwYXNz"))), None);
        assert_eq!(bearer_token(&parts(Some("Bearer "))), None);
    }
}
