//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (timeouts > 0, status codes, addresses)
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: ShedConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::net::SocketAddr;

use crate::config::schema::ShedConfig;

/// A single semantic problem in a configuration.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("{field}: invalid socket address {value:?}")]
    InvalidAddress { field: &'static str, value: String },

    #[error("propagation.shed_status: {0} is not a 4xx or 5xx status")]
    InvalidShedStatus(u16),

    #[error("{0}: must be greater than zero")]
    ZeroDuration(&'static str),

    #[error("upstream.url: unsupported scheme {0:?}")]
    UnsupportedScheme(String),

    #[error("upstream.max_body_bytes: must be greater than zero")]
    ZeroBodyLimit,

    #[error("database.prepared_statement_retries: {0} exceeds the single retry allowed")]
    TooManyRetries(u32),
}

pub fn validate_config(config: &ShedConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.listener.bind_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::InvalidAddress {
            field: "listener.bind_address",
            value: config.listener.bind_address.clone(),
        });
    }

    if config.observability.metrics_enabled
        && config.observability.metrics_address.parse::<SocketAddr>().is_err()
    {
        errors.push(ValidationError::InvalidAddress {
            field: "observability.metrics_address",
            value: config.observability.metrics_address.clone(),
        });
    }

    if !(400..=599).contains(&config.propagation.shed_status) {
        errors.push(ValidationError::InvalidShedStatus(config.propagation.shed_status));
    }

    if config.propagation.default_timeout_ms == Some(0) {
        errors.push(ValidationError::ZeroDuration("propagation.default_timeout_ms"));
    }

    if config.upstream.max_timeout_ms == Some(0) {
        errors.push(ValidationError::ZeroDuration("upstream.max_timeout_ms"));
    }

    if let Some(url) = &config.upstream.url {
        if !matches!(url.scheme(), "http" | "https") {
            errors.push(ValidationError::UnsupportedScheme(url.scheme().to_string()));
        }
    }

    if config.upstream.max_body_bytes == 0 {
        errors.push(ValidationError::ZeroBodyLimit);
    }

    if config.database.prepared_statement_retries > 1 {
        errors.push(ValidationError::TooManyRetries(
            config.database.prepared_statement_retries,
        ));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        assert_eq!(validate_config(&ShedConfig::default()), Ok(()));
    }

    #[test]
    fn reports_every_error() {
        let mut config = ShedConfig::default();
        config.listener.bind_address = "not-an-address".into();
        config.propagation.shed_status = 200;
        config.propagation.default_timeout_ms = Some(0);
        config.upstream.url = Some("ftp://example.com".parse().unwrap());

        let errors = validate_config(&config).unwrap_err();
        assert_eq!(errors.len(), 4);
        assert!(errors.contains(&ValidationError::InvalidShedStatus(200)));
        assert!(errors.contains(&ValidationError::UnsupportedScheme("ftp".into())));
    }

    #[test]
    fn metrics_address_only_checked_when_enabled() {
        let mut config = ShedConfig::default();
        config.observability.metrics_address = "nope".into();
        assert!(validate_config(&config).is_ok());

        config.observability.metrics_enabled = true;
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn at_most_one_prepared_statement_retry() {
        let mut config = ShedConfig::default();
        config.database.prepared_statement_retries = 0;
        assert!(validate_config(&config).is_ok());

        config.database.prepared_statement_retries = 5;
        assert_eq!(
            validate_config(&config),
            Err(vec![ValidationError::TooManyRetries(5)])
        );
    }
}
