use thiserror::Error;
use uuid::Uuid;

/// Errors raised by the alert-type and backend registries.
///
/// Both are configuration mistakes: `DuplicateId` is fatal at startup and
/// `NotFound` means a record or alert type names something that was never
/// registered in this process.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    #[error("{kind} id '{id}' is already registered")]
    DuplicateId { kind: &'static str, id: String },

    #[error("{kind} '{id}' is not registered")]
    NotFound { kind: &'static str, id: String },
}

/// Errors raised by a delivery backend while sending one record.
#[derive(Debug, Error)]
pub enum DeliveryError {
    #[error("could not deliver: {0}")]
    CouldNotDeliver(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Errors raised by alert/preference storage.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("alert record {0} not found")]
    NotFound(Uuid),

    #[error("claim on alert record {0} is no longer held")]
    ClaimLost(Uuid),

    #[error("store lock poisoned: {0}")]
    Poisoned(String),
}

/// Common error type returned by the factory and dispatch entry points.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Registry error: {0}")]
    Registry(#[from] RegistryError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registry_error_messages() {
        let dup = RegistryError::DuplicateId {
            kind: "backend",
            id: "EmailBackend".to_string(),
        };
        assert_eq!(dup.to_string(), "backend id 'EmailBackend' is already registered");

        let missing = RegistryError::NotFound {
            kind: "alert type",
            id: "Nope".to_string(),
        };
        assert_eq!(missing.to_string(), "alert type 'Nope' is not registered");
    }

    #[test]
    fn test_app_error_wraps_registry_error() {
        let err: AppError = RegistryError::NotFound {
            kind: "backend",
            id: "Gone".to_string(),
        }
        .into();
        assert!(matches!(err, AppError::Registry(RegistryError::NotFound { .. })));
    }

    #[test]
    fn test_delivery_error_from_anyhow() {
        let err: DeliveryError = anyhow::anyhow!("socket closed").into();
        assert_eq!(err.to_string(), "socket closed");
    }
}
