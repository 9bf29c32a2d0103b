//! Handlers for the saved-search predicate store.
//!
//! Every handler is scoped to the authenticated owner: a saved search that
//! exists but belongs to someone else is reported as 404, same as a missing
//! one. Owner-side writes never touch `last_notified_at`.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use serde::Serialize;

use autobridge_core::saved_search::CreatedWindow;
use autobridge_core::types::DbId;
use autobridge_db::models::saved_search::{CreateSavedSearch, SavedSearch, UpdateSavedSearch};
use autobridge_db::models::vehicle::Vehicle;
use autobridge_db::repositories::{SavedSearchRepo, VehicleRepo};

use crate::error::{AppError, AppResult};
use crate::extract::{AppJson, AppQuery};
use crate::middleware::auth::AuthUser;
use crate::query::{ListSavedSearchParams, PageParams};
use crate::state::AppState;

const ENTITY: &str = "SavedSearch";

/// Response body for `GET /saved-searches/{id}/matches/`.
#[derive(Debug, Serialize)]
pub struct MatchesPage {
    /// Size of the full, unpaged match set.
    pub count: i64,
    pub results: Vec<Vehicle>,
    pub page: i64,
    pub page_size: i64,
}

/// Load a saved search owned by `owner_id`, or 404.
async fn ensure_owned(state: &AppState, id: DbId, owner_id: DbId) -> AppResult<SavedSearch> {
    SavedSearchRepo::find_for_owner(&state.pool, id, owner_id)
        .await?
        .ok_or_else(|| AppError::not_found(ENTITY, id))
}

// ---------------------------------------------------------------------------
// GET /saved-searches/
// ---------------------------------------------------------------------------

/// List the caller's saved searches, newest first.
pub async fn list(
    auth: AuthUser,
    State(state): State<AppState>,
    AppQuery(params): AppQuery<ListSavedSearchParams>,
) -> AppResult<impl IntoResponse> {
    let filter = params.filter()?;
    let items = SavedSearchRepo::list_for_owner(
        &state.pool,
        auth.user_id,
        filter,
        params.page_request(),
    )
    .await?;
    tracing::debug!(user_id = auth.user_id, count = items.len(), "Listed saved searches");
    Ok(Json(items))
}

// ---------------------------------------------------------------------------
// POST /saved-searches/
// ---------------------------------------------------------------------------

/// Create a saved search. `match_count` starts at the size of the current
/// unbounded match set; `last_notified_at` starts empty.
pub async fn create(
    auth: AuthUser,
    State(state): State<AppState>,
    AppJson(input): AppJson<CreateSavedSearch>,
) -> AppResult<impl IntoResponse> {
    let fields = input.into_fields()?;
    let match_count =
        VehicleRepo::count_matching(&state.pool, &fields.criteria, CreatedWindow::ANY).await?;

    let created = SavedSearchRepo::create(&state.pool, auth.user_id, &fields, match_count).await?;
    tracing::info!(
        search_id = created.id,
        user_id = auth.user_id,
        frequency = %created.frequency,
        match_count,
        "Saved search created",
    );
    Ok((StatusCode::CREATED, Json(created)))
}

// ---------------------------------------------------------------------------
// GET /saved-searches/{id}/
// ---------------------------------------------------------------------------

pub async fn get(
    auth: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<DbId>,
) -> AppResult<impl IntoResponse> {
    let search = ensure_owned(&state, id, auth.user_id).await?;
    Ok(Json(search))
}

// ---------------------------------------------------------------------------
// PATCH /saved-searches/{id}/
// ---------------------------------------------------------------------------

/// Partially update a saved search. The merged record is validated as a
/// whole and `match_count` is recomputed; the watermark is preserved.
///
/// The row stays locked from read to write, so fields the patch leaves out
/// keep whatever a concurrent toggle or update wrote.
pub async fn update(
    auth: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<DbId>,
    AppJson(input): AppJson<UpdateSavedSearch>,
) -> AppResult<impl IntoResponse> {
    let mut tx = state.pool.begin().await?;
    let current = SavedSearchRepo::lock_for_owner(&mut *tx, id, auth.user_id)
        .await?
        .ok_or_else(|| AppError::not_found(ENTITY, id))?;
    let fields = input.merge_into(&current)?;
    let match_count =
        VehicleRepo::count_matching(&state.pool, &fields.criteria, CreatedWindow::ANY).await?;

    let updated = SavedSearchRepo::update_fields(&mut *tx, id, auth.user_id, &fields, match_count)
        .await?
        .ok_or_else(|| AppError::not_found(ENTITY, id))?;
    tx.commit().await?;
    tracing::info!(search_id = id, user_id = auth.user_id, match_count, "Saved search updated");
    Ok(Json(updated))
}

// ---------------------------------------------------------------------------
// DELETE /saved-searches/{id}/
// ---------------------------------------------------------------------------

pub async fn delete(
    auth: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<DbId>,
) -> AppResult<StatusCode> {
    let deleted = SavedSearchRepo::delete_for_owner(&state.pool, id, auth.user_id).await?;
    if !deleted {
        return Err(AppError::not_found(ENTITY, id));
    }
    tracing::info!(search_id = id, user_id = auth.user_id, "Saved search deleted");
    Ok(StatusCode::NO_CONTENT)
}

// ---------------------------------------------------------------------------
// GET /saved-searches/{id}/matches/
// ---------------------------------------------------------------------------

/// Current matches for a saved search, ignoring the watermark. This is the
/// owner's on-demand view and always reflects the live listing table.
pub async fn matches(
    auth: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<DbId>,
    AppQuery(params): AppQuery<PageParams>,
) -> AppResult<impl IntoResponse> {
    let search = ensure_owned(&state, id, auth.user_id).await?;
    let criteria = search.criteria()?;
    let page = params.page_request();

    let count = VehicleRepo::count_matching(&state.pool, &criteria, CreatedWindow::ANY).await?;
    let results = VehicleRepo::find_matching(
        &state.pool,
        &criteria,
        CreatedWindow::ANY,
        Some(page.page_size),
        page.offset(),
    )
    .await?;

    Ok(Json(MatchesPage {
        count,
        results,
        page: page.page,
        page_size: page.page_size,
    }))
}

// ---------------------------------------------------------------------------
// POST /saved-searches/{id}/toggle-active/
// ---------------------------------------------------------------------------

/// Flip `enabled`. Bookkeeping is left as is and switching on stamps
/// `enabled_at`, so turning a search back on replays neither listings it
/// already reported nor listings added while it was off.
pub async fn toggle_active(
    auth: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<DbId>,
) -> AppResult<impl IntoResponse> {
    let toggled = SavedSearchRepo::toggle_enabled(&state.pool, id, auth.user_id)
        .await?
        .ok_or_else(|| AppError::not_found(ENTITY, id))?;
    tracing::info!(
        search_id = id,
        user_id = auth.user_id,
        enabled = toggled.enabled,
        "Saved search toggled",
    );
    Ok(Json(toggled))
}
