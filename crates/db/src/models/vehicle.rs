//! Vehicle listing model.
//!
//! Listings are owned by the listing service. The alerting pipeline only
//! reads them; [`CreateVehicle`] exists for seeding and tests.

use autobridge_core::saved_search::VehicleAttributes;
use autobridge_core::types::{DbId, Timestamp};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// A row from the `vehicles` table.
#[derive(Debug, Clone, PartialEq, FromRow, Serialize)]
pub struct Vehicle {
    pub id: DbId,
    pub make: String,
    pub model: String,
    pub year: i32,
    pub price: Decimal,
    pub condition: String,
    pub mileage: i32,
    pub status: String,
    pub created_at: Timestamp,
}

impl Vehicle {
    /// Borrow the fields a saved-search predicate can test.
    pub fn attributes(&self) -> VehicleAttributes<'_> {
        VehicleAttributes {
            make: &self.make,
            model: &self.model,
            year: self.year,
            price: self.price,
            condition: &self.condition,
            mileage: self.mileage,
            status: &self.status,
            created_at: self.created_at,
        }
    }
}

/// DTO for inserting a listing.
#[derive(Debug, Clone, Deserialize)]
pub struct CreateVehicle {
    pub make: String,
    pub model: String,
    pub year: i32,
    pub price: Decimal,
    pub condition: String,
    pub mileage: i32,
    /// Defaults to `available` if omitted.
    pub status: Option<String>,
    /// Defaults to `NOW()` if omitted.
    pub created_at: Option<Timestamp>,
}
