//! Saved-search entity model and DTOs.

use autobridge_core::error::CoreError;
use autobridge_core::saved_search::{
    sanitize_name, validate_criteria, Frequency, SearchCriteria, VehicleCondition,
};
use autobridge_core::types::{DbId, Timestamp};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use super::double_option;

/// Frequency used when a create request does not pick one.
pub const DEFAULT_FREQUENCY: Frequency = Frequency::Daily;

/// A row from the `saved_searches` table.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct SavedSearch {
    pub id: DbId,
    pub owner_id: DbId,
    pub name: String,
    pub make: Option<String>,
    pub model: Option<String>,
    pub year_min: Option<i32>,
    pub year_max: Option<i32>,
    pub price_min: Option<Decimal>,
    pub price_max: Option<Decimal>,
    pub condition: Option<String>,
    pub mileage_max: Option<i32>,
    pub enabled: bool,
    /// Last time `enabled` went from false to true. Null until then.
    pub enabled_at: Option<Timestamp>,
    pub frequency: String,
    /// Watermark: lower bound on `created_at` for the next evaluation.
    /// Written only by the dispatcher.
    pub last_notified_at: Option<Timestamp>,
    /// Size of the unbounded match set at the last evaluation.
    pub match_count: i64,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl SavedSearch {
    /// Rebuild the typed criteria from the stored columns.
    pub fn criteria(&self) -> Result<SearchCriteria, CoreError> {
        Ok(SearchCriteria {
            make: self.make.clone(),
            model: self.model.clone(),
            year_min: self.year_min,
            year_max: self.year_max,
            price_min: self.price_min,
            price_max: self.price_max,
            condition: self
                .condition
                .as_deref()
                .map(str::parse::<VehicleCondition>)
                .transpose()?,
            mileage_max: self.mileage_max,
        })
    }

    pub fn frequency(&self) -> Result<Frequency, CoreError> {
        self.frequency.parse()
    }
}

/// A saved search selected for dispatch, joined with its owner's contact
/// details.
#[derive(Debug, Clone, FromRow)]
pub struct DueSavedSearch {
    #[sqlx(flatten)]
    pub search: SavedSearch,
    pub owner_email: String,
    pub owner_name: Option<String>,
}

/// Owner-editable fields after sanitising and validation. This is the only
/// shape the repository accepts for inserts and owner-side updates.
#[derive(Debug, Clone, PartialEq)]
pub struct SavedSearchFields {
    pub name: String,
    pub criteria: SearchCriteria,
    pub enabled: bool,
    pub frequency: Frequency,
}

/// DTO for creating a saved search.
#[derive(Debug, Clone, Deserialize)]
pub struct CreateSavedSearch {
    pub name: String,
    pub make: Option<String>,
    pub model: Option<String>,
    pub year_min: Option<i32>,
    pub year_max: Option<i32>,
    pub price_min: Option<Decimal>,
    pub price_max: Option<Decimal>,
    pub condition: Option<String>,
    pub mileage_max: Option<i32>,
    /// Defaults to `true` if omitted.
    pub enabled: Option<bool>,
    /// Defaults to [`DEFAULT_FREQUENCY`] if omitted.
    pub frequency: Option<String>,
}

impl CreateSavedSearch {
    /// Sanitise and validate the request into persistable fields.
    pub fn into_fields(self) -> Result<SavedSearchFields, CoreError> {
        let name = sanitize_name(&self.name)?;
        let criteria = SearchCriteria {
            make: self.make,
            model: self.model,
            year_min: self.year_min,
            year_max: self.year_max,
            price_min: self.price_min,
            price_max: self.price_max,
            condition: parse_condition(self.condition.as_deref())?,
            mileage_max: self.mileage_max,
        }
        .normalized();
        validate_criteria(&criteria)?;

        let frequency = match self.frequency.as_deref() {
            Some(f) => f.parse()?,
            None => DEFAULT_FREQUENCY,
        };

        Ok(SavedSearchFields {
            name,
            criteria,
            enabled: self.enabled.unwrap_or(true),
            frequency,
        })
    }
}

/// DTO for a partial update. A missing key leaves the field as is; an
/// explicit `null` clears a filter.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateSavedSearch {
    pub name: Option<String>,
    #[serde(default, deserialize_with = "double_option")]
    pub make: Option<Option<String>>,
    #[serde(default, deserialize_with = "double_option")]
    pub model: Option<Option<String>>,
    #[serde(default, deserialize_with = "double_option")]
    pub year_min: Option<Option<i32>>,
    #[serde(default, deserialize_with = "double_option")]
    pub year_max: Option<Option<i32>>,
    #[serde(default, deserialize_with = "double_option")]
    pub price_min: Option<Option<Decimal>>,
    #[serde(default, deserialize_with = "double_option")]
    pub price_max: Option<Option<Decimal>>,
    #[serde(default, deserialize_with = "double_option")]
    pub condition: Option<Option<String>>,
    #[serde(default, deserialize_with = "double_option")]
    pub mileage_max: Option<Option<i32>>,
    pub enabled: Option<bool>,
    pub frequency: Option<String>,
}

impl UpdateSavedSearch {
    /// Apply the patch on top of `current` and validate the merged result.
    ///
    /// Bounds are checked against the merged record, so lowering only
    /// `year_max` below an existing `year_min` is rejected. Bookkeeping
    /// columns are not part of the result and can never be reset here.
    pub fn merge_into(self, current: &SavedSearch) -> Result<SavedSearchFields, CoreError> {
        let mut criteria = current.criteria()?;

        if let Some(make) = self.make {
            criteria.make = make;
        }
        if let Some(model) = self.model {
            criteria.model = model;
        }
        if let Some(year_min) = self.year_min {
            criteria.year_min = year_min;
        }
        if let Some(year_max) = self.year_max {
            criteria.year_max = year_max;
        }
        if let Some(price_min) = self.price_min {
            criteria.price_min = price_min;
        }
        if let Some(price_max) = self.price_max {
            criteria.price_max = price_max;
        }
        if let Some(condition) = self.condition {
            criteria.condition = parse_condition(condition.as_deref())?;
        }
        if let Some(mileage_max) = self.mileage_max {
            criteria.mileage_max = mileage_max;
        }

        let criteria = criteria.normalized();
        validate_criteria(&criteria)?;

        let name = match self.name {
            Some(name) => sanitize_name(&name)?,
            None => current.name.clone(),
        };
        let frequency = match self.frequency.as_deref() {
            Some(f) => f.parse()?,
            None => current.frequency()?,
        };

        Ok(SavedSearchFields {
            name,
            criteria,
            enabled: self.enabled.unwrap_or(current.enabled),
            frequency,
        })
    }
}

/// Blank strings mean "no condition filter".
fn parse_condition(raw: Option<&str>) -> Result<Option<VehicleCondition>, CoreError> {
    raw.map(str::trim)
        .filter(|c| !c.is_empty())
        .map(str::parse)
        .transpose()
}
