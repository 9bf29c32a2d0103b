//! Saved-search predicates: criteria, validation, cadence rules and the
//! human-readable criteria summary used in notification emails.
//!
//! Everything here is pure. The SQL rendition of the match rules lives in
//! the repository layer; [`SearchCriteria::matches`] is the in-memory
//! rendition and the two must agree field for field.

use std::fmt;
use std::str::FromStr;
use std::sync::OnceLock;

use chrono::Duration;
use regex::Regex;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use validator::{Validate, ValidationErrors};

use crate::error::CoreError;
use crate::types::Timestamp;

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

/// Lowest model year a predicate may reference.
pub const YEAR_LOWER_BOUND: i32 = 1900;

/// Highest model year a predicate may reference.
pub const YEAR_UPPER_BOUND: i32 = 2100;

/// Maximum length of a saved-search name after sanitising.
pub const MAX_NAME_LEN: usize = 100;

/// The only vehicle status the matcher ever returns.
pub const VEHICLE_STATUS_AVAILABLE: &str = "available";

/// Vehicles shown in an immediate email before collapsing into "+N more".
pub const IMMEDIATE_EMAIL_CAP: usize = 10;

/// Vehicles shown per saved search in a daily or weekly digest.
pub const DIGEST_PER_SEARCH_CAP: usize = 5;

/// Email template for single-search immediate notifications.
pub const TEMPLATE_NOTIFICATION: &str = "saved_search_notification";

/// Email template for aggregated daily / weekly digests.
pub const TEMPLATE_DIGEST: &str = "saved_search_digest";

/// Scheduler job names. These are process-wide identifiers and double as
/// advisory-lock keys, so they must never change once deployed.
pub const JOB_IMMEDIATE: &str = "saved-search.immediate";
pub const JOB_DAILY: &str = "saved-search.daily";
pub const JOB_WEEKLY: &str = "saved-search.weekly";

// ---------------------------------------------------------------------------
// Frequency
// ---------------------------------------------------------------------------

/// Notification cadence chosen by the owner of a saved search.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Frequency {
    Immediate,
    Daily,
    Weekly,
}

impl Frequency {
    pub const ALL: [Frequency; 3] = [Frequency::Immediate, Frequency::Daily, Frequency::Weekly];

    /// Value stored in `saved_searches.frequency`.
    pub fn as_str(self) -> &'static str {
        match self {
            Frequency::Immediate => "immediate",
            Frequency::Daily => "daily",
            Frequency::Weekly => "weekly",
        }
    }

    /// Nominal interval between two runs. Bounds the first-ever evaluation
    /// window for digests; zero for immediate.
    pub fn window(self) -> Duration {
        match self {
            Frequency::Immediate => Duration::zero(),
            Frequency::Daily => Duration::days(1),
            Frequency::Weekly => Duration::days(7),
        }
    }

    pub fn job_name(self) -> &'static str {
        match self {
            Frequency::Immediate => JOB_IMMEDIATE,
            Frequency::Daily => JOB_DAILY,
            Frequency::Weekly => JOB_WEEKLY,
        }
    }

    pub fn template_name(self) -> &'static str {
        match self {
            Frequency::Immediate => TEMPLATE_NOTIFICATION,
            Frequency::Daily | Frequency::Weekly => TEMPLATE_DIGEST,
        }
    }

    /// How many vehicles each saved search may show in one email.
    pub fn display_cap(self) -> usize {
        match self {
            Frequency::Immediate => IMMEDIATE_EMAIL_CAP,
            Frequency::Daily | Frequency::Weekly => DIGEST_PER_SEARCH_CAP,
        }
    }

    /// Immediate runs send one email per saved search; digests send one
    /// per user.
    pub fn groups_by_user(self) -> bool {
        !matches!(self, Frequency::Immediate)
    }
}

impl fmt::Display for Frequency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Frequency {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "immediate" => Ok(Frequency::Immediate),
            "daily" => Ok(Frequency::Daily),
            "weekly" => Ok(Frequency::Weekly),
            other => Err(CoreError::validation(format!(
                "Invalid frequency '{other}'. Must be one of: immediate, daily, weekly"
            ))),
        }
    }
}

// ---------------------------------------------------------------------------
// VehicleCondition
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VehicleCondition {
    Excellent,
    Good,
    Fair,
    Salvage,
}

impl VehicleCondition {
    /// Value stored in `vehicles.condition` and `saved_searches.condition`.
    pub fn as_str(self) -> &'static str {
        match self {
            VehicleCondition::Excellent => "excellent",
            VehicleCondition::Good => "good",
            VehicleCondition::Fair => "fair",
            VehicleCondition::Salvage => "salvage",
        }
    }

    /// Capitalised label for email summaries.
    pub fn label(self) -> &'static str {
        match self {
            VehicleCondition::Excellent => "Excellent",
            VehicleCondition::Good => "Good",
            VehicleCondition::Fair => "Fair",
            VehicleCondition::Salvage => "Salvage",
        }
    }
}

impl FromStr for VehicleCondition {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "excellent" => Ok(VehicleCondition::Excellent),
            "good" => Ok(VehicleCondition::Good),
            "fair" => Ok(VehicleCondition::Fair),
            "salvage" => Ok(VehicleCondition::Salvage),
            other => Err(CoreError::validation(format!(
                "Invalid condition '{other}'. Must be one of: excellent, good, fair, salvage"
            ))),
        }
    }
}

// ---------------------------------------------------------------------------
// SearchCriteria
// ---------------------------------------------------------------------------

/// The conjunctive filter of a saved search. Every `Some` field narrows the
/// result set; `None` fields are ignored.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, Validate)]
pub struct SearchCriteria {
    #[validate(length(max = 100, message = "make must be at most 100 characters"))]
    pub make: Option<String>,
    #[validate(length(max = 100, message = "model must be at most 100 characters"))]
    pub model: Option<String>,
    #[validate(range(min = 1900, max = 2100, message = "year_min must be between 1900 and 2100"))]
    pub year_min: Option<i32>,
    #[validate(range(min = 1900, max = 2100, message = "year_max must be between 1900 and 2100"))]
    pub year_max: Option<i32>,
    pub price_min: Option<Decimal>,
    pub price_max: Option<Decimal>,
    pub condition: Option<VehicleCondition>,
    #[validate(range(min = 0, message = "mileage_max must not be negative"))]
    pub mileage_max: Option<i32>,
}

/// Borrowed view of the vehicle fields a predicate can test.
#[derive(Debug, Clone, Copy)]
pub struct VehicleAttributes<'a> {
    pub make: &'a str,
    pub model: &'a str,
    pub year: i32,
    pub price: Decimal,
    pub condition: &'a str,
    pub mileage: i32,
    pub status: &'a str,
    pub created_at: Timestamp,
}

impl SearchCriteria {
    /// Trim text filters and turn blank strings into "not set".
    pub fn normalized(mut self) -> Self {
        self.make = normalize_text(self.make);
        self.model = normalize_text(self.model);
        self
    }

    /// `true` when no filter field is set, i.e. the predicate would match
    /// every available vehicle.
    pub fn is_empty(&self) -> bool {
        self.make.is_none()
            && self.model.is_none()
            && self.year_min.is_none()
            && self.year_max.is_none()
            && self.price_min.is_none()
            && self.price_max.is_none()
            && self.condition.is_none()
            && self.mileage_max.is_none()
    }

    /// Field filters only; status and the time bound are applied by
    /// [`is_new_match`].
    pub fn matches(&self, vehicle: &VehicleAttributes<'_>) -> bool {
        if let Some(make) = &self.make {
            if make.to_lowercase() != vehicle.make.to_lowercase() {
                return false;
            }
        }
        if let Some(model) = &self.model {
            if !vehicle.model.to_lowercase().contains(&model.to_lowercase()) {
                return false;
            }
        }
        if self.year_min.is_some_and(|min| vehicle.year < min) {
            return false;
        }
        if self.year_max.is_some_and(|max| vehicle.year > max) {
            return false;
        }
        if self.price_min.is_some_and(|min| vehicle.price < min) {
            return false;
        }
        if self.price_max.is_some_and(|max| vehicle.price > max) {
            return false;
        }
        if let Some(condition) = self.condition {
            if condition.as_str() != vehicle.condition {
                return false;
            }
        }
        if self.mileage_max.is_some_and(|max| vehicle.mileage > max) {
            return false;
        }
        true
    }
}

/// Bounds on a listing's `created_at`. `since` is exclusive and `until`
/// inclusive; an unset side is open.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CreatedWindow {
    pub since: Option<Timestamp>,
    pub until: Option<Timestamp>,
}

impl CreatedWindow {
    /// No time bound at all.
    pub const ANY: Self = Self {
        since: None,
        until: None,
    };

    pub fn after(since: Timestamp) -> Self {
        Self {
            since: Some(since),
            until: None,
        }
    }

    /// Listings created in `(since, until]`.
    pub fn between(since: Timestamp, until: Timestamp) -> Self {
        Self {
            since: Some(since),
            until: Some(until),
        }
    }

    pub fn contains(&self, created_at: Timestamp) -> bool {
        self.since.map_or(true, |since| created_at > since)
            && self.until.map_or(true, |until| created_at <= until)
    }
}

/// Full matcher contract for one vehicle: available, passes every field
/// filter and was listed inside `window`.
pub fn is_new_match(
    criteria: &SearchCriteria,
    vehicle: &VehicleAttributes<'_>,
    window: CreatedWindow,
) -> bool {
    vehicle.status == VEHICLE_STATUS_AVAILABLE
        && window.contains(vehicle.created_at)
        && criteria.matches(vehicle)
}

fn normalize_text(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

/// Validate a (normalized) criteria set.
///
/// Rejects empty predicates, out-of-range field values and inverted
/// bounds. Field-level ranges come from the `Validate` derive; the
/// cross-field rules are checked here.
pub fn validate_criteria(criteria: &SearchCriteria) -> Result<(), CoreError> {
    if criteria.is_empty() {
        return Err(CoreError::validation(
            "At least one search filter must be set",
        ));
    }

    criteria
        .validate()
        .map_err(|errors| CoreError::Validation(first_message(&errors)))?;

    if let (Some(min), Some(max)) = (criteria.year_min, criteria.year_max) {
        if min > max {
            return Err(CoreError::validation(format!(
                "year_min ({min}) must not be greater than year_max ({max})"
            )));
        }
    }

    for (field, value) in [
        ("price_min", criteria.price_min),
        ("price_max", criteria.price_max),
    ] {
        if value.is_some_and(|v| v.is_sign_negative() && !v.is_zero()) {
            return Err(CoreError::validation(format!(
                "{field} must not be negative"
            )));
        }
    }

    if let (Some(min), Some(max)) = (criteria.price_min, criteria.price_max) {
        if min > max {
            return Err(CoreError::validation(format!(
                "price_min ({min}) must not be greater than price_max ({max})"
            )));
        }
    }

    Ok(())
}

/// Pick one deterministic message out of a `validator` error set.
fn first_message(errors: &ValidationErrors) -> String {
    let mut fields: Vec<_> = errors.field_errors().into_iter().collect();
    fields.sort_by(|a, b| a.0.cmp(&b.0));

    fields
        .into_iter()
        .find_map(|(field, errs)| {
            errs.first().map(|e| {
                e.message
                    .as_ref()
                    .map(|m| m.to_string())
                    .unwrap_or_else(|| format!("{field} is invalid"))
            })
        })
        .unwrap_or_else(|| "Invalid search criteria".to_string())
}

fn markup_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"<[^>]*>").expect("static regex is valid"))
}

/// Strip markup from a saved-search name and validate what remains.
///
/// Tags are removed, whitespace runs collapse to one space, and the result
/// must be non-empty and at most [`MAX_NAME_LEN`] characters.
pub fn sanitize_name(raw: &str) -> Result<String, CoreError> {
    let stripped = markup_pattern().replace_all(raw, "");
    let cleaned = stripped
        .replace(['<', '>'], "")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ");

    if cleaned.is_empty() {
        return Err(CoreError::validation("Saved search name must not be empty"));
    }
    let len = cleaned.chars().count();
    if len > MAX_NAME_LEN {
        return Err(CoreError::validation(format!(
            "Saved search name too long: {len} chars (max {MAX_NAME_LEN})"
        )));
    }
    Ok(cleaned)
}

// ---------------------------------------------------------------------------
// Evaluation window
// ---------------------------------------------------------------------------

/// Lower bound (exclusive) on `created_at` for a dispatch evaluation.
///
/// The watermark wins when present. Otherwise immediate searches start at
/// their own creation time, and digests start at whichever is later of
/// creation time and one nominal window before `now`. A search re-enabled
/// after that point starts at `enabled_at` instead, so listings added while
/// it was off are never reported.
pub fn evaluation_since(
    frequency: Frequency,
    last_notified_at: Option<Timestamp>,
    enabled_at: Option<Timestamp>,
    created_at: Timestamp,
    now: Timestamp,
) -> Timestamp {
    let base = match last_notified_at {
        Some(watermark) => watermark,
        None => match frequency {
            Frequency::Immediate => created_at,
            Frequency::Daily | Frequency::Weekly => created_at.max(now - frequency.window()),
        },
    };
    enabled_at.map_or(base, |enabled_at| base.max(enabled_at))
}

// ---------------------------------------------------------------------------
// Criteria summary
// ---------------------------------------------------------------------------

/// Render the one-line summary shown next to each saved search in emails.
///
/// Field order is Make, Model, Year, Price, Condition, Mileage; unset
/// fields are omitted. `{make: "Toyota", price_max: 15000}` renders as
/// `Make: Toyota, Price: up to $15,000`.
pub fn criteria_summary(criteria: &SearchCriteria) -> String {
    let mut parts: Vec<String> = Vec::new();

    if let Some(make) = &criteria.make {
        parts.push(format!("Make: {make}"));
    }
    if let Some(model) = &criteria.model {
        parts.push(format!("Model: {model}"));
    }
    match (criteria.year_min, criteria.year_max) {
        (Some(min), Some(max)) => parts.push(format!("Year: {min}-{max}")),
        (Some(min), None) => parts.push(format!("Year: {min}+")),
        (None, Some(max)) => parts.push(format!("Year: up to {max}")),
        (None, None) => {}
    }
    match (criteria.price_min, criteria.price_max) {
        (Some(min), Some(max)) => parts.push(format!(
            "Price: {} - {}",
            format_price(min),
            format_price(max)
        )),
        (Some(min), None) => parts.push(format!("Price: {}+", format_price(min))),
        (None, Some(max)) => parts.push(format!("Price: up to {}", format_price(max))),
        (None, None) => {}
    }
    if let Some(condition) = criteria.condition {
        parts.push(format!("Condition: {}", condition.label()));
    }
    if let Some(mileage) = criteria.mileage_max {
        parts.push(format!(
            "Mileage: up to {} km",
            format_thousands(i64::from(mileage))
        ));
    }

    parts.join(", ")
}

/// Group an integer's digits in threes: `1234567` -> `1,234,567`.
pub fn format_thousands(value: i64) -> String {
    let digits = value.unsigned_abs().to_string();
    let mut grouped = String::with_capacity(digits.len() + digits.len() / 3 + 1);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(ch);
    }
    if value < 0 {
        format!("-{grouped}")
    } else {
        grouped
    }
}

/// Dollar amount with thousands separators. Whole amounts drop the cents:
/// `15000` -> `$15,000`, `15000.5` -> `$15,000.50`.
pub fn format_price(value: Decimal) -> String {
    let rounded = value.round_dp(2);
    let whole = rounded.trunc();
    let cents = ((rounded - whole).abs() * Decimal::ONE_HUNDRED).to_i64();

    match (whole.to_i64(), cents) {
        (Some(w), Some(0)) => format!("${}", format_thousands(w)),
        (Some(w), Some(c)) => format!("${}.{c:02}", format_thousands(w)),
        _ => format!("${rounded}"),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
