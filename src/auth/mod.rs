pub mod jwt;
pub mod password;

use axum::{async_trait, extract::FromRequestParts, http::request::Parts};
use axum_extra::headers::{authorization::Bearer, Authorization};
use axum_extra::TypedHeader;
use serde::{Deserialize, Serialize};

use crate::{
    error::{AppError, AppResult},
    policy::{can_access, landing_route, Actor, Role},
    state::AppState,
};

/// Session context for one request, rebuilt from the bearer token.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthenticatedUser {
    pub user_id: uuid::Uuid,
    pub email: String,
    pub roles: Vec<Role>,
}

impl AuthenticatedUser {
    pub fn actor(&self) -> Actor<'_> {
        Actor {
            user_id: self.user_id,
            email: &self.email,
            roles: &self.roles,
        }
    }

    pub fn has_role(&self, role: Role) -> bool {
        self.roles.contains(&role)
    }

    pub fn can_access(&self, required: &[Role]) -> bool {
        can_access(&self.roles, required)
    }

    pub fn require_any(&self, required: &[Role]) -> AppResult<()> {
        if self.can_access(required) {
            return Ok(());
        }
        tracing::debug!(
            user_id = %self.user_id,
            roles = ?self.roles,
            required = ?required,
            "role check failed"
        );
        Err(AppError::forbidden("insufficient role"))
    }

    pub fn landing_route(&self) -> &'static str {
        landing_route(&self.roles)
    }
}

#[async_trait]
impl FromRequestParts<AppState> for AuthenticatedUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let TypedHeader(Authorization(bearer)) =
            TypedHeader::<Authorization<Bearer>>::from_request_parts(parts, state)
                .await
                .map_err(|_| AppError::unauthorized())?;

        let claims = state
            .jwt
            .verify_token(bearer.token())
            .map_err(|_| AppError::unauthorized())?;

        Ok(AuthenticatedUser {
            user_id: claims.sub,
            email: claims.email,
            roles: claims.roles,
        })
    }
}
