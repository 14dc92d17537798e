//! Activity implementations grouped by the workflow shape that schedules
//! them. Each activity converts its own failure modes into the shared
//! [`meridian_durable::ActivityError`] taxonomy at its boundary, per the
//! error handling design.

pub mod analysis;
pub mod custom;
pub mod deployment;
pub mod execution;
pub mod intent;
pub mod review;

/// Extract a required string field from an activity's JSON input, or a
/// `validation` error naming the missing field.
pub(crate) fn require_str<'a>(input: &'a serde_json::Value, field: &str) -> Result<&'a str, meridian_durable::ActivityError> {
    input
        .get(field)
        .and_then(|v| v.as_str())
        .ok_or_else(|| meridian_durable::ActivityError::validation(format!("missing required field `{field}`")))
}
