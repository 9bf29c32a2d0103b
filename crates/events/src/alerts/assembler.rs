//! Notification assembly: turns one recipient's evaluated saved searches
//! into a single email (subject, template and context).

use autobridge_core::saved_search::{
    criteria_summary, format_price, format_thousands, Frequency, VehicleCondition,
};
use autobridge_db::models::vehicle::Vehicle;
use serde_json::{json, Value};

use super::ports::{DuePredicate, MatchBatch};
use super::AlertError;

/// One saved search and the new vehicles found for it in this run.
#[derive(Debug, Clone)]
pub struct PredicateMatches {
    pub predicate: DuePredicate,
    pub batch: MatchBatch,
}

/// Everything the transport needs for one send.
#[derive(Debug, Clone, PartialEq)]
pub struct AssembledEmail {
    pub to: String,
    pub subject: String,
    pub template_name: &'static str,
    pub context: Value,
}

/// Build the email for one recipient.
///
/// Immediate runs pass exactly one section; digests pass every section of
/// the user. Each section shows at most `frequency.display_cap()` vehicles
/// (the batch is expected to be truncated already) and reports how many
/// more were matched.
///
/// Fails with [`AlertError::Format`] rather than produce a mail with
/// missing context: no recipient address, no sections, a nameless saved
/// search or a section without vehicles.
pub fn assemble(
    frequency: Frequency,
    sections: &[PredicateMatches],
) -> Result<AssembledEmail, AlertError> {
    let first = sections
        .first()
        .ok_or_else(|| AlertError::Format("no saved searches to notify about".into()))?;
    let to = first.predicate.owner_email.trim();
    if to.is_empty() {
        return Err(AlertError::Format(format!(
            "owner {} has no email address",
            first.predicate.owner_id
        )));
    }
    if let Some(other) = sections
        .iter()
        .find(|s| s.predicate.owner_id != first.predicate.owner_id)
    {
        return Err(AlertError::Format(format!(
            "saved search {} belongs to a different recipient",
            other.predicate.id
        )));
    }

    let cap = frequency.display_cap();
    let mut searches = Vec::with_capacity(sections.len());
    let mut total: i64 = 0;
    let mut more_total: i64 = 0;

    for section in sections {
        let predicate = &section.predicate;
        if predicate.name.trim().is_empty() {
            return Err(AlertError::Format(format!(
                "saved search {} has no name",
                predicate.id
            )));
        }
        if section.batch.vehicles.is_empty() {
            return Err(AlertError::Format(format!(
                "saved search {} has no vehicles to show",
                predicate.id
            )));
        }

        let shown: Vec<Value> = section.batch.vehicles.iter().take(cap).map(vehicle_row).collect();
        let more = (section.batch.total - shown.len() as i64).max(0);
        total += section.batch.total;
        more_total += more;

        searches.push(json!({
            "id": predicate.id,
            "name": predicate.name,
            "criteria_summary": criteria_summary(&predicate.criteria),
            "match_count": section.batch.total,
            "vehicles": shown,
            "more_count": more,
        }));
    }

    let recipient_name = first
        .predicate
        .owner_name
        .as_deref()
        .map(str::trim)
        .filter(|n| !n.is_empty())
        .unwrap_or(to);

    let subject = match frequency {
        Frequency::Immediate => format!(
            "{total} new {} for \"{}\"",
            vehicle_noun(total),
            first.predicate.name
        ),
        Frequency::Daily => format!("Daily saved search digest: {total} new {}", vehicle_noun(total)),
        Frequency::Weekly => format!("Weekly saved search digest: {total} new {}", vehicle_noun(total)),
    };

    Ok(AssembledEmail {
        to: to.to_string(),
        subject,
        template_name: frequency.template_name(),
        context: json!({
            "recipient_name": recipient_name,
            "frequency": frequency.as_str(),
            "total_count": total,
            "searches": searches,
            "more_count": more_total,
        }),
    })
}

fn vehicle_noun(count: i64) -> &'static str {
    if count == 1 {
        "vehicle"
    } else {
        "vehicles"
    }
}

fn vehicle_row(vehicle: &Vehicle) -> Value {
    let condition = vehicle
        .condition
        .parse::<VehicleCondition>()
        .map(|c| c.label().to_string())
        .unwrap_or_else(|_| vehicle.condition.clone());

    json!({
        "id": vehicle.id,
        "make": vehicle.make,
        "model": vehicle.model,
        "year": vehicle.year,
        "price": vehicle.price.to_string(),
        "price_display": format_price(vehicle.price),
        "condition": condition,
        "mileage": vehicle.mileage,
        "mileage_display": format_thousands(i64::from(vehicle.mileage)),
        "created_at": vehicle.created_at,
    })
}
