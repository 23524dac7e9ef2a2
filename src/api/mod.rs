//! API handlers for the Libris REST endpoints

pub mod books;
pub mod circulation;
pub mod events;
pub mod health;
pub mod openapi;

use axum::{
    async_trait,
    extract::FromRequestParts,
    http::request::Parts,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{error::AppError, AppState};

/// Role claim issued by the external auth layer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    Staff,
    Patron,
}

/// Identity claims forwarded by the auth layer; trusted as given.
#[derive(Debug, Clone, Copy)]
pub struct Claims {
    pub user_id: Uuid,
    pub role: Role,
}

impl Claims {
    /// Circulation desk operations: staff and admins.
    pub fn require_staff(&self) -> Result<(), AppError> {
        match self.role {
            Role::Admin | Role::Staff => Ok(()),
            Role::Patron => Err(AppError::Authorization(
                "staff role required".to_string(),
            )),
        }
    }

    /// Operator-only actions such as inventory reconciliation.
    pub fn require_admin(&self) -> Result<(), AppError> {
        match self.role {
            Role::Admin => Ok(()),
            _ => Err(AppError::Authorization("admin role required".to_string())),
        }
    }

    /// Patrons may read their own records; staff may read anyone's.
    pub fn require_self_or_staff(&self, user_id: Uuid) -> Result<(), AppError> {
        if self.user_id == user_id {
            return Ok(());
        }
        self.require_staff()
    }
}

/// Extractor for the identity claims set by the upstream auth service
pub struct Identity(pub Claims);

#[async_trait]
impl FromRequestParts<AppState> for Identity {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &AppState) -> Result<Self, Self::Rejection> {
        let user_id = parts
            .headers
            .get("x-auth-user-id")
            .and_then(|value| value.to_str().ok())
            .ok_or_else(|| AppError::Authentication("Missing identity claim".to_string()))?;

        let user_id = Uuid::parse_str(user_id)
            .map_err(|_| AppError::Authentication("Malformed identity claim".to_string()))?;

        let role = parts
            .headers
            .get("x-auth-role")
            .and_then(|value| value.to_str().ok())
            .ok_or_else(|| AppError::Authentication("Missing role claim".to_string()))?;

        let role = match role {
            "admin" => Role::Admin,
            "staff" => Role::Staff,
            "patron" => Role::Patron,
            _ => {
                return Err(AppError::Authentication(format!(
                    "Unknown role claim: {}",
                    role
                )))
            }
        };

        Ok(Identity(Claims { user_id, role }))
    }
}
