pub mod health;
pub mod saved_search;

use axum::Router;

use crate::state::AppState;

/// Build the `/api/v1` route tree.
///
/// ```text
/// /saved-searches/                        list, create
/// /saved-searches/{id}/                   get, update (PATCH), delete
/// /saved-searches/{id}/matches/           current matches, paginated
/// /saved-searches/{id}/toggle-active/     flip enabled (POST)
/// ```
///
/// Every route requires a Bearer token.
pub fn api_routes() -> Router<AppState> {
    Router::new().merge(saved_search::router())
}
