//! Field validation shared by the entities.

use super::error::SchedulingError;

/// Upper bound (in characters) for every display name.
pub const MAX_NAME_CHARS: usize = 255;

/// Trim and bound-check a required display name.
pub(crate) fn validate_name(field: &'static str, value: &str) -> Result<String, SchedulingError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(SchedulingError::validation(field, "must not be empty"));
    }
    let chars = trimmed.chars().count();
    if chars > MAX_NAME_CHARS {
        return Err(SchedulingError::validation(
            field,
            format!("must be at most {MAX_NAME_CHARS} characters, got {chars}"),
        ));
    }
    Ok(trimmed.to_string())
}

/// Re-check a name loaded from storage. A bad row is an inconsistent record,
/// not caller input.
pub(crate) fn check_stored_name(entity: &'static str, id: impl ToString, field: &'static str, value: &str) -> Result<(), SchedulingError> {
    validate_name(field, value).map(|_| ()).map_err(|err| SchedulingError::InconsistentRecord {
        entity,
        id: id.to_string(),
        message: err.to_string(),
    })
}

/// Require `value >= min`.
pub(crate) fn validate_min(field: &'static str, value: i32, min: i32) -> Result<i32, SchedulingError> {
    if value < min {
        return Err(SchedulingError::validation(
            field,
            format!("must be >= {min}, got {value}"),
        ));
    }
    Ok(value)
}
