//! Custom validation functions for configuration.

use std::path::PathBuf;

use validator::ValidationError;

/// Validate that a default alignment is 0 or a power of two up to 64.
pub fn check_alignment(alignment: usize) -> Result<(), String> {
    if alignment == 0 || (alignment <= 64 && alignment.is_power_of_two()) {
        Ok(())
    } else {
        Err(format!(
            "arena.alignment must be 0 or a power of two no larger than 64, got {alignment}"
        ))
    }
}

/// Validate a tracing level name.
pub fn validate_log_level(level: &str) -> Result<(), ValidationError> {
    let re = regex::Regex::new("^(trace|debug|info|warn|error)$")
        .map_err(|_| ValidationError::new("invalid_regex"))?;
    if re.is_match(&level.to_lowercase()) {
        Ok(())
    } else {
        Err(ValidationError::new("invalid_log_level"))
    }
}

/// Validate that a path is absolute.
pub fn validate_absolute_path(path: &PathBuf) -> Result<(), ValidationError> {
    if path.is_absolute() {
        Ok(())
    } else {
        Err(ValidationError::new("must_be_absolute"))
    }
}
