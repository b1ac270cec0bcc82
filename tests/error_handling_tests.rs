//! Tests for the typed error handling system
//!
//! These tests verify that:
//! - Every error maps to a stable code
//! - Path-related errors carry the offending path
//! - Error responses serialize cleanly
//! - External errors convert into configuration errors

use crm::core::error::{ConfigError, ErrorResponse};
use crm::prelude::*;

// =============================================================================
// Error Code Tests
// =============================================================================

mod error_code_tests {
    use super::*;

    #[test]
    fn test_validation_error_codes() {
        let cases: Vec<(ApiError, &str)> = vec![
            (
                ValidationError::MalformedPath {
                    path: "a..b".to_string(),
                    message: "empty segment".to_string(),
                }
                .into(),
                "MALFORMED_PATH",
            ),
            (
                ValidationError::UnknownOperator {
                    path: "first_name".to_string(),
                    operator: "~=".to_string(),
                }
                .into(),
                "UNKNOWN_OPERATOR",
            ),
            (
                ValidationError::InvalidOption {
                    path: "Extra.Color".to_string(),
                    value: "purple".to_string(),
                }
                .into(),
                "INVALID_OPTION",
            ),
            (
                ValidationError::MissingRequired {
                    path: "contact_type".to_string(),
                }
                .into(),
                "MISSING_REQUIRED",
            ),
            (
                ValidationError::ReadOnly {
                    path: "Extra.Color.label".to_string(),
                }
                .into(),
                "READ_ONLY",
            ),
        ];
        for (err, code) in cases {
            assert_eq!(err.error_code(), code, "{}", err);
        }
    }

    #[test]
    fn test_not_found_error_codes() {
        let err: ApiError = NotFoundError::Entity {
            entity: "Spaceship".to_string(),
        }
        .into();
        assert_eq!(err.error_code(), "UNKNOWN_ENTITY_TYPE");
        assert_eq!(err.field_path(), None);

        let err: ApiError = NotFoundError::Group {
            path: "Extra.Color".to_string(),
            entity: "Contact".to_string(),
            group: "Extra".to_string(),
        }
        .into();
        assert_eq!(err.error_code(), "CUSTOM_GROUP_NOT_FOUND");
        assert_eq!(err.field_path(), Some("Extra.Color"));

        let err: ApiError = NotFoundError::Field {
            path: "Extra.Shade".to_string(),
            group: "Extra".to_string(),
            field: "Shade".to_string(),
        }
        .into();
        assert_eq!(err.error_code(), "CUSTOM_FIELD_NOT_FOUND");
    }

    #[test]
    fn test_other_error_codes() {
        let unsupported = ApiError::unsupported("Extra.Note.label", "label", "no option list");
        assert_eq!(unsupported.error_code(), "UNSUPPORTED");
        assert_eq!(unsupported.field_path(), Some("Extra.Note.label"));

        let denied = ApiError::PermissionDenied {
            entity: "Contact".to_string(),
            action: "get".to_string(),
        };
        assert_eq!(denied.error_code(), "PERMISSION_DENIED");

        let rejected = ApiError::rejected("audit", "closed for maintenance");
        assert_eq!(rejected.error_code(), "ACTION_REJECTED");

        let storage: ApiError = StorageError::TransactionError {
            message: "no transaction".to_string(),
        }
        .into();
        assert_eq!(storage.error_code(), "STORAGE_ERROR");
    }
}

// =============================================================================
// Error Response Tests
// =============================================================================

mod error_response_tests {
    use super::*;

    #[test]
    fn test_response_carries_field_path() {
        let err: ApiError = ValidationError::InvalidOption {
            path: "Extra.Color".to_string(),
            value: "purple".to_string(),
        }
        .into();
        let response: ErrorResponse = err.to_response();

        assert_eq!(response.code, "INVALID_OPTION");
        assert_eq!(response.field.as_deref(), Some("Extra.Color"));
        assert!(response.message.contains("purple"));
    }

    #[test]
    fn test_response_omits_missing_field() {
        let err = ApiError::Internal("boom".to_string());
        let json = serde_json::to_value(err.to_response()).unwrap();

        assert_eq!(json["code"], "INTERNAL_ERROR");
        assert!(json.get("field").is_none());
    }
}

// =============================================================================
// Conversion Tests
// =============================================================================

mod conversion_tests {
    use super::*;

    #[test]
    fn test_yaml_error_becomes_config_error() {
        let err = ApiConfig::from_yaml_str("entities: [").unwrap_err();
        assert_eq!(err.error_code(), "CONFIG_ERROR");
        assert!(matches!(
            err,
            ApiError::Config(ConfigError::ParseError { .. })
        ));
    }

    #[test]
    fn test_missing_config_file_becomes_io_error() {
        let err = ApiConfig::from_yaml_file("/nonexistent/crm.yaml").unwrap_err();
        assert!(matches!(err, ApiError::Config(ConfigError::IoError { .. })));
    }
}
