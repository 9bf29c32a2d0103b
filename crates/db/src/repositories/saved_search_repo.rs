//! Repository for the `saved_searches` table.
//!
//! Owner-side writes touch the predicate fields only; the dispatcher's
//! [`SavedSearchRepo::commit_notification`] touches the bookkeeping fields
//! only. Neither ever rewrites the whole row.

use autobridge_core::saved_search::Frequency;
use autobridge_core::types::{DbId, PageRequest, Timestamp};
use sqlx::{PgConnection, PgPool};

use crate::models::saved_search::{DueSavedSearch, SavedSearch, SavedSearchFields};

/// Column list for `saved_searches` queries.
const COLUMNS: &str = "id, owner_id, name, make, model, year_min, year_max, \
    price_min, price_max, condition, mileage_max, enabled, enabled_at, frequency, \
    last_notified_at, match_count, created_at, updated_at";

/// Same columns qualified with the `s` alias, for joins.
const JOINED_COLUMNS: &str = "s.id, s.owner_id, s.name, s.make, s.model, s.year_min, s.year_max, \
    s.price_min, s.price_max, s.condition, s.mileage_max, s.enabled, s.enabled_at, s.frequency, \
    s.last_notified_at, s.match_count, s.created_at, s.updated_at";

/// Optional narrowing for an owner's list.
#[derive(Debug, Clone, Copy, Default)]
pub struct SavedSearchFilter {
    pub enabled: Option<bool>,
    pub frequency: Option<Frequency>,
}

/// Provides owner-scoped CRUD plus dispatcher selection and commit.
pub struct SavedSearchRepo;

impl SavedSearchRepo {
    /// Insert a new saved search with its initial `match_count`.
    /// `last_notified_at` starts out null.
    pub async fn create(
        pool: &PgPool,
        owner_id: DbId,
        fields: &SavedSearchFields,
        match_count: i64,
    ) -> Result<SavedSearch, sqlx::Error> {
        let c = &fields.criteria;
        let query = format!(
            "INSERT INTO saved_searches \
                (owner_id, name, make, model, year_min, year_max, price_min, price_max, \
                 condition, mileage_max, enabled, frequency, match_count) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13) \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, SavedSearch>(&query)
            .bind(owner_id)
            .bind(&fields.name)
            .bind(&c.make)
            .bind(&c.model)
            .bind(c.year_min)
            .bind(c.year_max)
            .bind(c.price_min)
            .bind(c.price_max)
            .bind(c.condition.map(|cond| cond.as_str()))
            .bind(c.mileage_max)
            .bind(fields.enabled)
            .bind(fields.frequency.as_str())
            .bind(match_count)
            .fetch_one(pool)
            .await
    }

    /// Find a saved search by ID, regardless of owner.
    pub async fn find_by_id(pool: &PgPool, id: DbId) -> Result<Option<SavedSearch>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM saved_searches WHERE id = $1");
        sqlx::query_as::<_, SavedSearch>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    /// Find a saved search by ID only if `owner_id` owns it.
    pub async fn find_for_owner(
        pool: &PgPool,
        id: DbId,
        owner_id: DbId,
    ) -> Result<Option<SavedSearch>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM saved_searches WHERE id = $1 AND owner_id = $2");
        sqlx::query_as::<_, SavedSearch>(&query)
            .bind(id)
            .bind(owner_id)
            .fetch_optional(pool)
            .await
    }

    /// List an owner's saved searches, newest first.
    pub async fn list_for_owner(
        pool: &PgPool,
        owner_id: DbId,
        filter: SavedSearchFilter,
        page: PageRequest,
    ) -> Result<Vec<SavedSearch>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM saved_searches \
             WHERE owner_id = $1 \
               AND ($2::BOOLEAN IS NULL OR enabled = $2) \
               AND ($3::TEXT IS NULL OR frequency = $3) \
             ORDER BY created_at DESC, id DESC \
             LIMIT $4 OFFSET $5"
        );
        sqlx::query_as::<_, SavedSearch>(&query)
            .bind(owner_id)
            .bind(filter.enabled)
            .bind(filter.frequency.map(Frequency::as_str))
            .bind(page.page_size)
            .bind(page.offset())
            .fetch_all(pool)
            .await
    }

    /// Load an owner's saved search and hold its row lock until the
    /// surrounding transaction ends, so a read-merge-write cannot interleave
    /// with a toggle or another update.
    pub async fn lock_for_owner(
        conn: &mut PgConnection,
        id: DbId,
        owner_id: DbId,
    ) -> Result<Option<SavedSearch>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM saved_searches WHERE id = $1 AND owner_id = $2 FOR UPDATE"
        );
        sqlx::query_as::<_, SavedSearch>(&query)
            .bind(id)
            .bind(owner_id)
            .fetch_optional(conn)
            .await
    }

    /// Overwrite the owner-editable fields and the cached `match_count`.
    ///
    /// Run it in the transaction that took [`lock_for_owner`](Self::lock_for_owner)
    /// on the row `fields` were merged from. `last_notified_at` is never
    /// written here; switching `enabled` on stamps `enabled_at`. Returns
    /// `None` if the row does not exist for this owner.
    pub async fn update_fields(
        conn: &mut PgConnection,
        id: DbId,
        owner_id: DbId,
        fields: &SavedSearchFields,
        match_count: i64,
    ) -> Result<Option<SavedSearch>, sqlx::Error> {
        let c = &fields.criteria;
        let query = format!(
            "UPDATE saved_searches SET \
                name = $3, make = $4, model = $5, year_min = $6, year_max = $7, \
                price_min = $8, price_max = $9, condition = $10, mileage_max = $11, \
                enabled_at = CASE WHEN $12 AND NOT enabled THEN NOW() ELSE enabled_at END, \
                enabled = $12, frequency = $13, match_count = $14, updated_at = NOW() \
             WHERE id = $1 AND owner_id = $2 \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, SavedSearch>(&query)
            .bind(id)
            .bind(owner_id)
            .bind(&fields.name)
            .bind(&c.make)
            .bind(&c.model)
            .bind(c.year_min)
            .bind(c.year_max)
            .bind(c.price_min)
            .bind(c.price_max)
            .bind(c.condition.map(|cond| cond.as_str()))
            .bind(c.mileage_max)
            .bind(fields.enabled)
            .bind(fields.frequency.as_str())
            .bind(match_count)
            .fetch_optional(conn)
            .await
    }

    /// Flip `enabled`, stamping `enabled_at` when it goes on. Bookkeeping
    /// columns are left alone.
    pub async fn toggle_enabled(
        pool: &PgPool,
        id: DbId,
        owner_id: DbId,
    ) -> Result<Option<SavedSearch>, sqlx::Error> {
        let query = format!(
            "UPDATE saved_searches SET \
                enabled_at = CASE WHEN enabled THEN enabled_at ELSE NOW() END, \
                enabled = NOT enabled, updated_at = NOW() \
             WHERE id = $1 AND owner_id = $2 \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, SavedSearch>(&query)
            .bind(id)
            .bind(owner_id)
            .fetch_optional(pool)
            .await
    }

    /// Delete a saved search. Returns `true` if a row owned by `owner_id`
    /// was removed.
    pub async fn delete_for_owner(
        pool: &PgPool,
        id: DbId,
        owner_id: DbId,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM saved_searches WHERE id = $1 AND owner_id = $2")
            .bind(id)
            .bind(owner_id)
            .execute(pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Enabled saved searches of one frequency, joined with their owner's
    /// address, ordered by owner then id.
    ///
    /// With `require_email_opt_in`, owners who turned email notifications
    /// off are excluded.
    pub async fn list_due(
        pool: &PgPool,
        frequency: Frequency,
        require_email_opt_in: bool,
    ) -> Result<Vec<DueSavedSearch>, sqlx::Error> {
        let query = format!(
            "SELECT {JOINED_COLUMNS}, u.email AS owner_email, u.display_name AS owner_name \
             FROM saved_searches s \
             JOIN users u ON u.id = s.owner_id \
             WHERE s.enabled = true AND s.frequency = $1 \
               AND ($2 = false OR u.email_notifications = true) \
             ORDER BY s.owner_id, s.id"
        );
        sqlx::query_as::<_, DueSavedSearch>(&query)
            .bind(frequency.as_str())
            .bind(require_email_opt_in)
            .fetch_all(pool)
            .await
    }

    /// Record a delivered notification in one atomic statement.
    ///
    /// The watermark only moves forward, and a saved search disabled since
    /// it was selected is left untouched. Returns `true` if the row was
    /// written.
    pub async fn commit_notification(
        pool: &PgPool,
        id: DbId,
        notified_at: Timestamp,
        match_count: i64,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE saved_searches SET \
                last_notified_at = GREATEST(COALESCE(last_notified_at, $2), $2), \
                match_count = $3 \
             WHERE id = $1 AND enabled = true",
        )
        .bind(id)
        .bind(notified_at)
        .bind(match_count)
        .execute(pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }
}
