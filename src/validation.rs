use crate::errors::{DomainError, DomainResult, ValidationError};

/// A trait that entities should implement for validation.
pub trait Validate {
    /// Validates the entity and returns an error if validation fails.
    fn validate(&self) -> DomainResult<()>;
}

/// Struct for configuring validations in a fluent style
#[derive(Default)]
pub struct ValidationBuilder<T> {
    field_name: String,
    value: Option<T>,
    errors: Vec<ValidationError>,
}

/// Generic validation implementations
impl<T> ValidationBuilder<T> {
    pub fn new(field_name: &str, value: Option<T>) -> Self {
        Self {
            field_name: field_name.to_string(),
            value,
            errors: Vec::new(),
        }
    }

    pub fn required(mut self) -> Self
    where
        T: Default + PartialEq,
    {
        if self.value.is_none() || self.value == Some(T::default()) {
            self.errors.push(ValidationError::required(&self.field_name));
        }
        self
    }

    pub fn validate_with<F>(mut self, validator: F) -> Self
    where
        F: FnOnce(&T) -> Result<(), ValidationError>,
    {
        if let Some(value) = &self.value {
            if let Err(err) = validator(value) {
                self.errors.push(err);
            }
        }
        self
    }

    /// Complete validation and return result
    pub fn validate(self) -> DomainResult<()> {
        if self.errors.is_empty() {
            Ok(())
        } else {
            // Return the first error for simplicity
            Err(DomainError::Validation(self.errors[0].clone()))
        }
    }
}

/// String-specific validations
impl ValidationBuilder<String> {
    /// Required, and not blank after trimming.
    pub fn not_blank(mut self) -> Self {
        match &self.value {
            Some(value) if !value.trim().is_empty() => {}
            _ => self.errors.push(ValidationError::required(&self.field_name)),
        }
        self
    }

    pub fn min_length(mut self, min: usize) -> Self {
        if let Some(value) = &self.value {
            if value.len() < min {
                self.errors
                    .push(ValidationError::min_length(&self.field_name, min));
            }
        }
        self
    }

    pub fn max_length(mut self, max: usize) -> Self {
        if let Some(value) = &self.value {
            if value.len() > max {
                self.errors
                    .push(ValidationError::max_length(&self.field_name, max));
            }
        }
        self
    }

}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_required_rejects_missing_and_default() {
        assert!(ValidationBuilder::<String>::new("account_id", None)
            .required()
            .validate()
            .is_err());
        assert!(ValidationBuilder::new("account_id", Some(String::new()))
            .required()
            .validate()
            .is_err());
        assert!(ValidationBuilder::new("account_id", Some("AC-1".to_string()))
            .required()
            .validate()
            .is_ok());
    }

    #[test]
    fn test_not_blank_trims_whitespace() {
        assert!(ValidationBuilder::new("serial", Some("   ".to_string()))
            .not_blank()
            .validate()
            .is_err());
        assert!(ValidationBuilder::new("serial", Some(" SN1 ".to_string()))
            .not_blank()
            .validate()
            .is_ok());
    }

    #[test]
    fn test_length_bounds() {
        assert!(ValidationBuilder::new("name", Some("ab".to_string()))
            .min_length(3)
            .validate()
            .is_err());
        assert!(ValidationBuilder::new("name", Some("abcd".to_string()))
            .min_length(3)
            .max_length(10)
            .validate()
            .is_ok());
        assert!(ValidationBuilder::new("name", Some("abcdefghijk".to_string()))
            .max_length(10)
            .validate()
            .is_err());
    }
}
