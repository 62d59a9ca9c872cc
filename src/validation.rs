use crate::config_validator::ConfigValidator;
use crate::error::ThrottlerError;
use crate::key_generator::Identifiers;

/// Longest identifier accepted from callers.
const MAX_IDENTIFIER_LEN: usize = 2048;

/// Request validation utilities
pub struct RequestValidator;

impl RequestValidator {
    /// Validates a route name received from a caller
    pub fn validate_route(route: Option<&str>) -> Result<String, ThrottlerError> {
        let route = route
            .ok_or_else(|| ThrottlerError::ValidationError("Missing 'route' parameter".to_string()))?
            .trim();

        if route.is_empty() {
            return Err(ThrottlerError::ValidationError(
                "Route cannot be empty".to_string(),
            ));
        }

        if !ConfigValidator::is_key_segment(route) {
            return Err(ThrottlerError::ValidationError(
                "Route must be at most 128 characters and contain no whitespace".to_string(),
            ));
        }

        Ok(route.to_string())
    }

    /// Validates identifying values before they are hashed into keys
    pub fn validate_identifiers(identifiers: &Identifiers) -> Result<(), ThrottlerError> {
        let fields = [
            ("ip", &identifiers.ip),
            ("email", &identifiers.email),
            ("accessToken", &identifiers.access_token),
            ("oktaIdentifier", &identifiers.okta_identifier),
        ];

        for (name, value) in fields {
            if value.as_ref().is_some_and(|v| v.len() > MAX_IDENTIFIER_LEN) {
                return Err(ThrottlerError::ValidationError(format!(
                    "'{}' exceeds {} bytes",
                    name, MAX_IDENTIFIER_LEN
                )));
            }
        }

        Ok(())
    }
}
