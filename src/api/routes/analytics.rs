use axum::{extract::State, Json};
use serde::Deserialize;

use super::bookstores::owned_store;
use crate::api::{ApiQuery, AuthUser};
use crate::db::{
    self,
    analytics::{PlatformOverview, Sales},
    Pool,
};
use crate::error::Result;
use crate::model::Role;

const DEFAULT_DAYS: u32 = 30;
const MAX_DAYS: u32 = 365;

#[derive(Debug, Deserialize)]
pub struct Window {
    pub days: Option<u32>,
}

impl Window {
    fn days(&self) -> u32 {
        self.days.unwrap_or(DEFAULT_DAYS).clamp(1, MAX_DAYS)
    }
}

/// GET /api/admin/analytics
pub async fn platform(
    State(pool): State<Pool>,
    user: AuthUser,
    ApiQuery(window): ApiQuery<Window>,
) -> Result<Json<PlatformOverview>> {
    user.require(&[Role::Admin])?;
    Ok(Json(db::analytics::platform(&pool, window.days()).await?))
}

/// GET /api/bookstores/mine/analytics
pub async fn bookstore(
    State(pool): State<Pool>,
    user: AuthUser,
    ApiQuery(window): ApiQuery<Window>,
) -> Result<Json<Sales>> {
    let store = owned_store(&pool, &user).await?;
    Ok(Json(
        db::analytics::for_bookstore(&pool, store.id, window.days()).await?,
    ))
}
