use garde::Validate;
use serde::Deserialize;
use serde_json::Value;

use crate::crypto::ids::is_long_id;
use crate::error::{AppError, Result};

/// The request payload for sign-up.
#[derive(Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct SignUpRequest {
    #[garde(length(min = 3, max = 64), custom(display_name_charset))]
    pub display_name: String,
    #[garde(email, length(max = 254))]
    pub email_address: String,
    #[garde(length(min = 6, max = 128))]
    pub password: String,
}

/// The request payload for sign-in. `identifier` is a display name, user id
/// or email address.
#[derive(Deserialize, Validate)]
pub struct SignInRequest {
    #[garde(length(min = 1, max = 254))]
    pub identifier: String,
    #[garde(length(min = 6, max = 128))]
    pub password: String,
}

/// The request payload for card creation.
#[derive(Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreateCardRequest {
    #[garde(length(max = 128))]
    pub name: Option<String>,
    #[garde(custom(is_object))]
    pub card_props: Value,
}

fn display_name_charset(value: &str, _: &()) -> garde::Result {
    // Sign-in and lookups accept either a user id or a display name.
    if is_long_id(value) {
        return Err(garde::Error::new("cannot have the shape of a user id"));
    }

    if value
        .chars()
        .all(|c| c.is_alphanumeric() || c == '_' || c == '-' || c == '.')
    {
        Ok(())
    } else {
        Err(garde::Error::new(
            "can only contain letters, numbers, dots, underscores and hyphens",
        ))
    }
}

fn is_object(value: &Value, _: &()) -> garde::Result {
    if value.is_object() {
        Ok(())
    } else {
        Err(garde::Error::new("must be an object"))
    }
}

/// Runs the garde rules of a request payload.
///
/// # Arguments
///
/// * `payload` - The deserialized request.
///
/// # Returns
///
/// A `Result<()>` carrying every violation in one validation error.
pub fn validate_request<T: Validate<Context = ()>>(payload: &T) -> Result<()> {
    payload.validate().map_err(|report| {
        tracing::debug!("Rejected payload: {}", report);
        AppError::Validation("One or more required fields are missing on request".to_string())
    })
}

/// Trims and lower-cases an email address.
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sign_up_rules() {
        let ok = SignUpRequest {
            display_name: "ana_m".into(),
            email_address: "ana@example.com".into(),
            password: "hunter22".into(),
        };
        assert!(validate_request(&ok).is_ok());

        let bad = SignUpRequest {
            display_name: "a b".into(),
            email_address: "not-an-email".into(),
            password: "123".into(),
        };
        assert!(matches!(validate_request(&bad), Err(AppError::Validation(_))));
    }

    #[test]
    fn display_names_cannot_shadow_user_ids() {
        let req = SignUpRequest {
            display_name: crate::crypto::ids::generate_id(crate::crypto::ids::IdKind::Long),
            email_address: "mallory@example.com".into(),
            password: "hunter22".into(),
        };
        assert!(matches!(validate_request(&req), Err(AppError::Validation(_))));

        let req = SignUpRequest {
            display_name: "a".repeat(49),
            ..req
        };
        assert!(validate_request(&req).is_ok());
    }

    #[test]
    fn card_props_must_be_an_object() {
        let req = CreateCardRequest {
            name: None,
            card_props: Value::from(3),
        };
        assert!(validate_request(&req).is_err());
    }

    #[test]
    fn emails_are_normalized() {
        assert_eq!(normalize_email("  Ana@Example.COM "), "ana@example.com");
    }
}
