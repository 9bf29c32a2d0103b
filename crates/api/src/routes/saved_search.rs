//! Route definitions for saved searches.
//!
//! Paths carry the full `/saved-searches` prefix so the list route keeps
//! its trailing slash.
//!
//! ```text
//! GET    /saved-searches/                        list
//! POST   /saved-searches/                        create
//! GET    /saved-searches/{id}/                   get
//! PATCH  /saved-searches/{id}/                   update
//! DELETE /saved-searches/{id}/                   delete
//! GET    /saved-searches/{id}/matches/           matches
//! POST   /saved-searches/{id}/toggle-active/     toggle_active
//! ```

use axum::routing::{get, post};
use axum::Router;

use crate::handlers::saved_search;
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/saved-searches/", get(saved_search::list).post(saved_search::create))
        .route(
            "/saved-searches/{id}/",
            get(saved_search::get)
                .patch(saved_search::update)
                .delete(saved_search::delete),
        )
        .route("/saved-searches/{id}/matches/", get(saved_search::matches))
        .route("/saved-searches/{id}/toggle-active/", post(saved_search::toggle_active))
}
