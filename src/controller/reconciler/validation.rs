//! # Declaration Validation
//!
//! Validates ManagedSecret declarations before any backend is contacted.
//! Everything rejected here is a configuration error: retrying cannot help
//! until the declaration changes.

use crate::constants;
use crate::controller::reconciler::types::ReconcilerError;
use crate::crd::ManagedSecret;
use crate::provider::SecretsClient;
use anyhow::Result;
use regex::Regex;
use std::time::Duration;

/// Parse a Kubernetes duration string into `std::time::Duration`
/// Supports formats: "30s", "1m", "5m", "1h", "2h", "1d"
///
/// # Errors
///
/// Fails when the string is empty, malformed, zero, or uses an unknown unit.
pub fn parse_kubernetes_duration(duration_str: &str) -> Result<Duration> {
    let trimmed = duration_str.trim();
    if trimmed.is_empty() {
        return Err(anyhow::anyhow!("duration string cannot be empty"));
    }

    let pattern = Regex::new(r"^(?P<number>\d+)(?P<unit>[smhd])$")
        .map_err(|e| anyhow::anyhow!("failed to compile duration regex: {e}"))?;
    let lower = trimmed.to_lowercase();
    let captures = pattern.captures(&lower).ok_or_else(|| {
        anyhow::anyhow!(
            "invalid duration format '{trimmed}'. Expected <number><unit> (e.g. '5m', '1h')"
        )
    })?;

    let number: u64 = captures
        .name("number")
        .map_or("", |m| m.as_str())
        .parse()
        .map_err(|e| anyhow::anyhow!("invalid duration number in '{trimmed}': {e}"))?;
    if number == 0 {
        return Err(anyhow::anyhow!(
            "duration must be greater than zero, got '{trimmed}'"
        ));
    }

    let seconds = match captures.name("unit").map_or("", |m| m.as_str()) {
        "s" => number,
        "m" => number * 60,
        "h" => number * 3600,
        "d" => number * 86400,
        unit => {
            return Err(anyhow::anyhow!(
                "invalid unit '{unit}' in duration '{trimmed}'. Expected s, m, h, or d"
            ));
        }
    };

    Ok(Duration::from_secs(seconds))
}

/// Validate a duration field against the Kubernetes format and a minimum
///
/// # Errors
///
/// Fails with a descriptive message naming `field_name` when the value is
/// malformed or below `min_seconds`.
pub fn validate_duration_interval(interval: &str, field_name: &str, min_seconds: u64) -> Result<()> {
    let trimmed = interval.trim();
    if trimmed.is_empty() {
        return Err(anyhow::anyhow!("{field_name} cannot be empty"));
    }

    let duration = parse_kubernetes_duration(trimmed)?;
    if duration.as_secs() < min_seconds {
        return Err(anyhow::anyhow!(
            "{field_name} '{trimmed}' must be at least {min_seconds} seconds (got {} seconds)",
            duration.as_secs()
        ));
    }
    Ok(())
}

/// RFC 1123 subdomain check for the output Secret name
fn validate_target_name(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(anyhow::anyhow!("target.name cannot be empty"));
    }
    if name.len() > 253 {
        return Err(anyhow::anyhow!(
            "target.name '{name}' exceeds 253 characters"
        ));
    }
    let pattern = Regex::new(r"^[a-z0-9]([-a-z0-9.]*[a-z0-9])?$")
        .map_err(|e| anyhow::anyhow!("failed to compile name regex: {e}"))?;
    if !pattern.is_match(name) {
        return Err(anyhow::anyhow!(
            "target.name '{name}' is not a valid RFC 1123 subdomain name"
        ));
    }
    Ok(())
}

/// Comprehensive structural validation of a declaration.
///
/// # Errors
///
/// Fails on the first rule violated; the message names the offending field.
pub fn validate_managed_secret(resource: &ManagedSecret) -> Result<()> {
    let spec = &resource.spec;

    if spec.provider_ref.name.trim().is_empty() {
        return Err(anyhow::anyhow!("providerRef.name cannot be empty"));
    }

    if spec.data.is_empty() && spec.data_from.is_empty() {
        return Err(anyhow::anyhow!(
            "declaration must list at least one entry in 'data' or 'dataFrom'"
        ));
    }

    for (index, reference) in spec.data.iter().enumerate() {
        if reference.key.trim().is_empty() {
            return Err(anyhow::anyhow!("data[{index}].key cannot be empty"));
        }
    }
    for (index, selector) in spec.data_from.iter().enumerate() {
        if selector.prefix.trim().is_empty() {
            return Err(anyhow::anyhow!("dataFrom[{index}].prefix cannot be empty"));
        }
    }

    validate_target_name(&spec.target.name)?;

    validate_duration_interval(
        &spec.refresh_interval,
        "refreshInterval",
        constants::MIN_REFRESH_INTERVAL_SECS,
    )?;

    if let Some(push) = &spec.push {
        if push.key.trim().is_empty() {
            return Err(anyhow::anyhow!("push.key cannot be empty"));
        }
    }

    Ok(())
}

/// Capability checks that need the resolved provider handle.
///
/// A declaration asking for capabilities its provider does not offer is a
/// configuration error, surfaced before any fetch - never a runtime panic.
///
/// # Errors
///
/// Returns [`ReconcilerError::Config`] when the declaration requests push
/// against a read-only provider or selector fetches against a provider
/// without selector support.
pub fn validate_capabilities(
    resource: &ManagedSecret,
    client: &dyn SecretsClient,
) -> Result<(), ReconcilerError> {
    let spec = &resource.spec;

    if spec.push.is_some() && client.pusher().is_none() {
        return Err(ReconcilerError::Config(format!(
            "declaration requests push semantics but provider '{}' is read-only",
            spec.provider_ref.name
        )));
    }

    if !spec.data_from.is_empty() && !client.supports_selector() {
        return Err(ReconcilerError::Config(format!(
            "declaration uses dataFrom but provider '{}' does not support selector fetches",
            spec.provider_ref.name
        )));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_kubernetes_duration_units() {
        assert_eq!(
            parse_kubernetes_duration("30s").unwrap(),
            Duration::from_secs(30)
        );
        assert_eq!(
            parse_kubernetes_duration("5m").unwrap(),
            Duration::from_secs(300)
        );
        assert_eq!(
            parse_kubernetes_duration("2h").unwrap(),
            Duration::from_secs(7200)
        );
        assert_eq!(
            parse_kubernetes_duration("1d").unwrap(),
            Duration::from_secs(86400)
        );
    }

    #[test]
    fn test_parse_kubernetes_duration_rejects_garbage() {
        assert!(parse_kubernetes_duration("").is_err());
        assert!(parse_kubernetes_duration("5").is_err());
        assert!(parse_kubernetes_duration("m5").is_err());
        assert!(parse_kubernetes_duration("5w").is_err());
        assert!(parse_kubernetes_duration("0m").is_err());
        assert!(parse_kubernetes_duration("1h30m").is_err());
    }

    #[test]
    fn test_validate_duration_interval_enforces_minimum() {
        assert!(validate_duration_interval("5m", "refreshInterval", 60).is_ok());
        let err = validate_duration_interval("30s", "refreshInterval", 60).unwrap_err();
        assert!(err.to_string().contains("refreshInterval"));
        assert!(err.to_string().contains("at least 60"));
    }

    #[test]
    fn test_validate_target_name_rules() {
        assert!(validate_target_name("payments-db").is_ok());
        assert!(validate_target_name("a").is_ok());
        assert!(validate_target_name("").is_err());
        assert!(validate_target_name("Payments").is_err());
        assert!(validate_target_name("-leading").is_err());
        assert!(validate_target_name("trailing-").is_err());
        assert!(validate_target_name(&"x".repeat(254)).is_err());
    }
}
