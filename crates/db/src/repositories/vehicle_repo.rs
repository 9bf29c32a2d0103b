//! Repository for the `vehicles` table, including the saved-search matcher
//! query.

use autobridge_core::saved_search::{CreatedWindow, SearchCriteria, VEHICLE_STATUS_AVAILABLE};
use autobridge_core::types::DbId;
use sqlx::{FromRow, PgPool, Postgres, QueryBuilder};

use crate::models::vehicle::{CreateVehicle, Vehicle};

/// Column list for `vehicles` queries.
const COLUMNS: &str = "id, make, model, year, price, condition, mileage, status, created_at";

/// Newest first; `id` breaks ties so pages are stable across runs.
const MATCH_ORDER: &str = " ORDER BY created_at DESC, id ASC";

/// A matcher row carrying the size of the whole result set.
#[derive(FromRow)]
struct CountedVehicle {
    #[sqlx(flatten)]
    vehicle: Vehicle,
    total_count: i64,
}

/// Provides listing reads and the matcher used by saved searches.
pub struct VehicleRepo;

impl VehicleRepo {
    /// Insert a listing, returning the created row.
    pub async fn create(pool: &PgPool, input: &CreateVehicle) -> Result<Vehicle, sqlx::Error> {
        let query = format!(
            "INSERT INTO vehicles (make, model, year, price, condition, mileage, status, created_at) \
             VALUES ($1, $2, $3, $4, $5, $6, COALESCE($7, '{VEHICLE_STATUS_AVAILABLE}'), \
                     COALESCE($8, NOW())) \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, Vehicle>(&query)
            .bind(&input.make)
            .bind(&input.model)
            .bind(input.year)
            .bind(input.price)
            .bind(&input.condition)
            .bind(input.mileage)
            .bind(&input.status)
            .bind(input.created_at)
            .fetch_one(pool)
            .await
    }

    /// Find a listing by ID.
    pub async fn find_by_id(pool: &PgPool, id: DbId) -> Result<Option<Vehicle>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM vehicles WHERE id = $1");
        sqlx::query_as::<_, Vehicle>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    /// Available listings matching `criteria` inside `window`, newest first.
    /// `limit` of `None` returns the full result set.
    pub async fn find_matching(
        pool: &PgPool,
        criteria: &SearchCriteria,
        window: CreatedWindow,
        limit: Option<i64>,
        offset: i64,
    ) -> Result<Vec<Vehicle>, sqlx::Error> {
        let mut builder = matcher_query(&format!("SELECT {COLUMNS}"), criteria, window);
        builder.push(MATCH_ORDER);
        if let Some(limit) = limit {
            builder.push(" LIMIT ").push_bind(limit);
        }
        if offset > 0 {
            builder.push(" OFFSET ").push_bind(offset);
        }
        builder.build_query_as::<Vehicle>().fetch_all(pool).await
    }

    /// Size of the result set [`find_matching`](Self::find_matching) would
    /// return without a limit.
    pub async fn count_matching(
        pool: &PgPool,
        criteria: &SearchCriteria,
        window: CreatedWindow,
    ) -> Result<i64, sqlx::Error> {
        let mut builder = matcher_query("SELECT COUNT(*)", criteria, window);
        builder.build_query_scalar::<i64>().fetch_one(pool).await
    }

    /// The newest `limit` matches together with the size of the full set,
    /// read in one statement so the two always agree. `limit` must be
    /// positive.
    pub async fn find_matching_with_total(
        pool: &PgPool,
        criteria: &SearchCriteria,
        window: CreatedWindow,
        limit: i64,
    ) -> Result<(i64, Vec<Vehicle>), sqlx::Error> {
        let mut builder = matcher_query(
            &format!("SELECT {COLUMNS}, COUNT(*) OVER () AS total_count"),
            criteria,
            window,
        );
        builder.push(MATCH_ORDER);
        builder.push(" LIMIT ").push_bind(limit);

        let rows = builder
            .build_query_as::<CountedVehicle>()
            .fetch_all(pool)
            .await?;
        let total = rows.first().map_or(0, |row| row.total_count);
        Ok((total, rows.into_iter().map(|row| row.vehicle).collect()))
    }
}

/// Compile a predicate into `<select> FROM vehicles WHERE ...`.
///
/// Every filter the matcher applies lives here: available status, one
/// conjunct per set criteria field, and the `created_at` window. The
/// caller appends ordering and paging.
pub fn matcher_query<'a>(
    select: &str,
    criteria: &'a SearchCriteria,
    window: CreatedWindow,
) -> QueryBuilder<'a, Postgres> {
    let mut builder = QueryBuilder::new(select);
    builder
        .push(" FROM vehicles WHERE status = ")
        .push_bind(VEHICLE_STATUS_AVAILABLE);

    if let Some(make) = &criteria.make {
        builder
            .push(" AND LOWER(make) = LOWER(")
            .push_bind(make)
            .push(")");
    }
    if let Some(model) = &criteria.model {
        builder
            .push(" AND POSITION(LOWER(")
            .push_bind(model)
            .push(") IN LOWER(model)) > 0");
    }
    if let Some(year_min) = criteria.year_min {
        builder.push(" AND year >= ").push_bind(year_min);
    }
    if let Some(year_max) = criteria.year_max {
        builder.push(" AND year <= ").push_bind(year_max);
    }
    if let Some(price_min) = criteria.price_min {
        builder.push(" AND price >= ").push_bind(price_min);
    }
    if let Some(price_max) = criteria.price_max {
        builder.push(" AND price <= ").push_bind(price_max);
    }
    if let Some(condition) = criteria.condition {
        builder.push(" AND condition = ").push_bind(condition.as_str());
    }
    if let Some(mileage_max) = criteria.mileage_max {
        builder.push(" AND mileage <= ").push_bind(mileage_max);
    }
    if let Some(since) = window.since {
        builder.push(" AND created_at > ").push_bind(since);
    }
    if let Some(until) = window.until {
        builder.push(" AND created_at <= ").push_bind(until);
    }

    builder
}
