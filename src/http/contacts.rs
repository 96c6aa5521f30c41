//! Protected contact endpoints backed by guarded downstream calls.

use axum::{
    extract::{Query, State},
    response::{IntoResponse, Response},
    Extension, Json,
};
use serde::Deserialize;

use super::server::AppState;
use crate::auth::AuthenticatedUser;

pub const CONTACTS_PATH: &str = "/api/contacts";
pub const SEARCH_PATH: &str = "/api/contacts/search";

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SearchParams {
    #[serde(default)]
    pub query: String,
}

/// `GET /api/contacts`: the caller's contacts, or a 503 fallback.
pub async fn list_contacts(
    State(state): State<AppState>,
    Extension(user): Extension<AuthenticatedUser>,
) -> Response {
    match state.contacts.contacts_for(&user.username).await {
        Ok(contacts) => Json(contacts).into_response(),
        Err(unavailable) => unavailable.into_response(),
    }
}

/// `GET /api/contacts/search?query=`.
pub async fn search_contacts(
    State(state): State<AppState>,
    Extension(user): Extension<AuthenticatedUser>,
    Query(params): Query<SearchParams>,
) -> Response {
    match state.contacts.search(&user.username, &params.query).await {
        Ok(contacts) => Json(contacts).into_response(),
        Err(unavailable) => unavailable.into_response(),
    }
}
