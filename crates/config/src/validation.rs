use crate::{ConfigError, ConfigResult};

/// Trait for configuration validation
pub trait ConfigValidator {
    fn validate(&self) -> ConfigResult<()>;
}

/// General validation utilities
pub struct ValidationUtils;

impl ValidationUtils {
    /// Validate that a string is not empty
    pub fn validate_not_empty(value: &str, field_name: &str) -> ConfigResult<()> {
        if value.trim().is_empty() {
            return Err(ConfigError::Validation(format!(
                "{field_name} cannot be empty"
            )));
        }
        Ok(())
    }

    /// Validate that a millisecond interval is positive and below one hour
    pub fn validate_interval_ms(value: u64, field_name: &str) -> ConfigResult<()> {
        if value == 0 {
            return Err(ConfigError::Validation(format!(
                "{field_name} must be greater than 0"
            )));
        }
        if value > 3_600_000 {
            return Err(ConfigError::Validation(format!(
                "{field_name} must be less than or equal to 3600000"
            )));
        }
        Ok(())
    }

    /// Validate that a count is within `1..=max`
    pub fn validate_count(count: usize, field_name: &str, max: usize) -> ConfigResult<()> {
        if count == 0 {
            return Err(ConfigError::Validation(format!(
                "{field_name} must be greater than 0"
            )));
        }
        if count > max {
            return Err(ConfigError::Validation(format!(
                "{field_name} must be less than or equal to {max}"
            )));
        }
        Ok(())
    }

    /// Validate that a fraction lies strictly between 0 and 1
    pub fn validate_fraction(value: f64, field_name: &str) -> ConfigResult<()> {
        if !value.is_finite() || value <= 0.0 || value >= 1.0 {
            return Err(ConfigError::Validation(format!(
                "{field_name} must be within (0, 1), got {value}"
            )));
        }
        Ok(())
    }

    /// Validate that a float is finite and strictly positive
    pub fn validate_positive(value: f64, field_name: &str) -> ConfigResult<()> {
        if !value.is_finite() || value <= 0.0 {
            return Err(ConfigError::Validation(format!(
                "{field_name} must be a positive number, got {value}"
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_not_empty() {
        assert!(ValidationUtils::validate_not_empty("n00dles", "field").is_ok());
        assert!(ValidationUtils::validate_not_empty("", "field").is_err());
        assert!(ValidationUtils::validate_not_empty("   ", "field").is_err());
    }

    #[test]
    fn test_validate_interval_ms() {
        assert!(ValidationUtils::validate_interval_ms(100, "tick").is_ok());
        assert!(ValidationUtils::validate_interval_ms(3_600_000, "tick").is_ok());
        assert!(ValidationUtils::validate_interval_ms(0, "tick").is_err());
        assert!(ValidationUtils::validate_interval_ms(3_600_001, "tick").is_err());
    }

    #[test]
    fn test_validate_count() {
        assert!(ValidationUtils::validate_count(1, "batches", 10).is_ok());
        assert!(ValidationUtils::validate_count(10, "batches", 10).is_ok());
        assert!(ValidationUtils::validate_count(0, "batches", 10).is_err());
        assert!(ValidationUtils::validate_count(11, "batches", 10).is_err());
    }

    #[test]
    fn test_validate_fraction() {
        assert!(ValidationUtils::validate_fraction(0.25, "intensity").is_ok());
        assert!(ValidationUtils::validate_fraction(0.0, "intensity").is_err());
        assert!(ValidationUtils::validate_fraction(1.0, "intensity").is_err());
        assert!(ValidationUtils::validate_fraction(f64::NAN, "intensity").is_err());
    }
}
