//! Extractors shared by the billing handlers.

use crate::errors::BillingError;
use axum::{async_trait, extract::FromRequestParts, http::request::Parts};
use serde::Deserialize;
use utoipa::IntoParams;
use uuid::Uuid;

pub const TENANT_HEADER: &str = "x-tenant-id";
pub const ACTOR_HEADER: &str = "x-actor-id";

/// Tenant scoping for every billing route. The gateway in front of this
/// service resolves authentication and injects the tenant id as a header.
#[derive(Debug, Clone, Copy)]
pub struct TenantId(pub Uuid);

#[async_trait]
impl<S> FromRequestParts<S> for TenantId
where
    S: Send + Sync,
{
    type Rejection = BillingError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let raw = parts
            .headers
            .get(TENANT_HEADER)
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| {
                BillingError::Validation(format!("missing {} header", TENANT_HEADER))
            })?;
        let id = Uuid::parse_str(raw).map_err(|_| {
            BillingError::Validation(format!("{} header is not a valid uuid", TENANT_HEADER))
        })?;
        Ok(TenantId(id))
    }
}

/// Optional acting-user id, recorded in the audit trail when present.
#[derive(Debug, Clone, Copy)]
pub struct Actor(pub Option<Uuid>);

#[async_trait]
impl<S> FromRequestParts<S> for Actor
where
    S: Send + Sync,
{
    type Rejection = BillingError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        match parts.headers.get(ACTOR_HEADER) {
            None => Ok(Actor(None)),
            Some(v) => {
                let raw = v.to_str().map_err(|_| {
                    BillingError::Validation(format!("{} header is not valid", ACTOR_HEADER))
                })?;
                let id = Uuid::parse_str(raw).map_err(|_| {
                    BillingError::Validation(format!(
                        "{} header is not a valid uuid",
                        ACTOR_HEADER
                    ))
                })?;
                Ok(Actor(Some(id)))
            }
        }
    }
}

#[derive(Debug, Deserialize, IntoParams)]
pub struct PaginationParams {
    /// 1-based page number
    pub page: Option<u64>,
    pub per_page: Option<u64>,
}

impl PaginationParams {
    pub fn page(&self) -> u64 {
        self.page.unwrap_or(1).max(1)
    }

    pub fn per_page(&self) -> u64 {
        self.per_page.unwrap_or(25).clamp(1, 100)
    }
}
