pub mod jwt;

use axum::{async_trait, extract::FromRequestParts, http::request::Parts};
use axum_extra::headers::{authorization::Bearer, Authorization};
use axum_extra::TypedHeader;
use serde::{Deserialize, Serialize};

use crate::{error::AppError, requests::Scope, state::AppState};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Role {
    #[serde(rename = "cliente")]
    Client,
    #[serde(rename = "consultor")]
    Consultant,
    #[serde(rename = "administrador")]
    Administrator,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthenticatedUser {
    pub login: String,
    pub role: Role,
    pub cpf: Option<String>,
}

impl AuthenticatedUser {
    /// Request visibility for this caller. Administrators manage users elsewhere and have no
    /// access to exam requests.
    pub fn scope(&self) -> Result<Scope, AppError> {
        match self.role {
            Role::Client => Ok(Scope::owner(self.cpf.as_deref(), &self.login)),
            Role::Consultant => Ok(Scope::Unrestricted),
            Role::Administrator => Err(AppError::forbidden()),
        }
    }

    pub fn require_consultant(&self) -> Result<(), AppError> {
        match self.role {
            Role::Consultant => Ok(()),
            _ => Err(AppError::forbidden()),
        }
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
            login: claims.sub,
            role: claims.role,
            cpf: claims.cpf.filter(|cpf| !cpf.trim().is_empty()),
        })
    }
}
