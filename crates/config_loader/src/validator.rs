//! Configuration validation
//!
//! Rules:
//! - account email is set
//! - rate ceiling and every interval > 0
//! - nap_duration_secs >= nap_check_secs
//! - streaming columns non-empty and unique
//! - aux kinds unique
//! - at least one sink, names non-empty and unique
//! - network sinks carry `addr`

use std::collections::HashSet;

use contracts::{AcquisitionConfig, ContractError, SinkType};

/// Validate an AcquisitionConfig
///
/// Returns the first error encountered, or Ok(()).
pub fn validate(config: &AcquisitionConfig) -> Result<(), ContractError> {
    validate_account(config)?;
    validate_rates(config)?;
    validate_columns(config)?;
    validate_aux_kinds(config)?;
    validate_sinks(config)?;
    Ok(())
}

fn validate_account(config: &AcquisitionConfig) -> Result<(), ContractError> {
    if config.account.email.trim().is_empty() {
        return Err(ContractError::config_validation(
            "account.email",
            "email cannot be empty",
        ));
    }
    Ok(())
}

fn validate_rates(config: &AcquisitionConfig) -> Result<(), ContractError> {
    let acq = &config.acquisition;

    if acq.max_requests_per_minute == 0 {
        return Err(ContractError::config_validation(
            "acquisition.max_requests_per_minute",
            "max_requests_per_minute must be > 0",
        ));
    }

    let intervals = [
        ("acquisition.poll_interval_secs", acq.poll_interval_secs),
        ("acquisition.nap_check_secs", acq.nap_check_secs),
        ("acquisition.sleep_check_secs", acq.sleep_check_secs),
        ("acquisition.nap_duration_secs", acq.nap_duration_secs),
    ];
    for (field, value) in intervals {
        if value == 0 {
            return Err(ContractError::config_validation(
                field,
                "interval must be > 0",
            ));
        }
    }

    if acq.nap_duration_secs < acq.nap_check_secs {
        return Err(ContractError::config_validation(
            "acquisition.nap_duration_secs / acquisition.nap_check_secs",
            format!(
                "nap_duration_secs ({}) must be >= nap_check_secs ({})",
                acq.nap_duration_secs, acq.nap_check_secs
            ),
        ));
    }

    Ok(())
}

fn validate_columns(config: &AcquisitionConfig) -> Result<(), ContractError> {
    let columns = &config.acquisition.columns;
    if columns.is_empty() {
        return Err(ContractError::config_validation(
            "acquisition.columns",
            "at least one streaming column is required",
        ));
    }

    let mut seen = HashSet::new();
    for (idx, column) in columns.iter().enumerate() {
        if column.trim().is_empty() {
            return Err(ContractError::config_validation(
                format!("acquisition.columns[{idx}]"),
                "column name cannot be empty",
            ));
        }
        if !seen.insert(column.as_str()) {
            return Err(ContractError::config_validation(
                format!("acquisition.columns[{idx}]"),
                format!("duplicate column '{column}'"),
            ));
        }
    }
    Ok(())
}

fn validate_aux_kinds(config: &AcquisitionConfig) -> Result<(), ContractError> {
    let mut seen = HashSet::new();
    for (idx, kind) in config.acquisition.aux_kinds.iter().enumerate() {
        if !seen.insert(*kind) {
            return Err(ContractError::config_validation(
                format!("acquisition.aux_kinds[{idx}]"),
                format!("duplicate aux kind '{kind}'"),
            ));
        }
    }
    Ok(())
}

fn validate_sinks(config: &AcquisitionConfig) -> Result<(), ContractError> {
    if config.sinks.is_empty() {
        return Err(ContractError::config_validation(
            "sinks",
            "no outputs configured; at least one sink is required",
        ));
    }

    let mut seen = HashSet::new();
    for (idx, sink) in config.sinks.iter().enumerate() {
        if sink.name.is_empty() {
            return Err(ContractError::config_validation(
                format!("sinks[{idx}].name"),
                "sink name cannot be empty",
            ));
        }
        if !seen.insert(sink.name.as_str()) {
            return Err(ContractError::config_validation(
                format!("sinks[name={}]", sink.name),
                "duplicate sink name",
            ));
        }
        if sink.sink_type == SinkType::Network && !sink.params.contains_key("addr") {
            return Err(ContractError::config_validation(
                format!("sinks[{}].params.addr", sink.name),
                "network sink requires 'addr'",
            ));
        }
    }
    Ok(())
}
