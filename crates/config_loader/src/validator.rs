//! Configuration validation
//!
//! Two layers:
//! - numeric ranges declared with `#[validate(...)]` on the contract structs
//! - cross-field rules checked here:
//!   - at least one record kind, kind names unique
//!   - column names unique per kind, system columns not remapped
//!   - live endpoint sensors and bind addresses unique
//!   - projected kinds have a sensor and declared reference positions
//!   - sink parameters present

use std::collections::HashSet;

use ::validator::{Validate, ValidationErrors};
use contracts::{columns, ContractError, RunConfig, SinkType, SourceConfig};

/// Validate a parsed run configuration.
///
/// Returns the first error encountered, or Ok(()).
pub fn validate(config: &RunConfig) -> Result<(), ContractError> {
    validate_ranges(config)?;
    validate_record_kinds(config)?;
    validate_live_endpoints(config)?;
    validate_projection(config)?;
    validate_sink(config)?;
    Ok(())
}

fn validate_ranges(config: &RunConfig) -> Result<(), ContractError> {
    check("backpressure", config.backpressure.validate())?;
    check("postprocess", config.postprocess.validate())?;
    match &config.source {
        SourceConfig::File(file) => check("source", file.validate())?,
        SourceConfig::Live(live) => check("source", live.validate())?,
    }
    for (idx, sensor) in config.sensors.iter().enumerate() {
        check(&format!("sensors[{idx}]"), sensor.validate())?;
    }
    Ok(())
}

/// Turn the first derive-level violation into a field-scoped error
fn check(prefix: &str, result: Result<(), ValidationErrors>) -> Result<(), ContractError> {
    let Err(errors) = result else {
        return Ok(());
    };
    let mut fields: Vec<_> = errors.field_errors().into_iter().collect();
    fields.sort_by(|a, b| a.0.cmp(&b.0));
    match fields.first() {
        Some((field, violations)) => {
            let detail = violations
                .iter()
                .map(|v| v.to_string())
                .collect::<Vec<_>>()
                .join("; ");
            Err(ContractError::config_validation(
                format!("{prefix}.{field}"),
                detail,
            ))
        }
        None => Err(ContractError::config_validation(prefix, errors.to_string())),
    }
}

fn validate_record_kinds(config: &RunConfig) -> Result<(), ContractError> {
    if config.record_kinds.is_empty() {
        return Err(ContractError::config_validation(
            "record_kinds",
            "at least one record kind is required",
        ));
    }

    let mut kinds = HashSet::new();
    for kind in &config.record_kinds {
        if kind.name.is_empty() {
            return Err(ContractError::config_validation(
                "record_kinds[].name",
                "record kind name cannot be empty",
            ));
        }
        if !kinds.insert(kind.name.as_str()) {
            return Err(ContractError::config_validation(
                format!("record_kinds[name={}]", kind.name),
                "duplicate record kind",
            ));
        }
        if kind.tod_path.trim().is_empty() {
            return Err(ContractError::config_validation(
                format!("record_kinds[{}].tod_path", kind.name),
                "tod_path cannot be empty",
            ));
        }

        let mut names: HashSet<&str> = HashSet::new();
        for mapping in &kind.columns {
            let field = format!("record_kinds[{}].columns[{}]", kind.name, mapping.column);
            if mapping.path.trim().is_empty() || mapping.column.is_empty() {
                return Err(ContractError::config_validation(
                    field,
                    "column path and name cannot be empty",
                ));
            }
            if columns::SYSTEM.contains(&mapping.column.as_str())
                || mapping.column == columns::TIMESTAMP
            {
                return Err(ContractError::config_validation(
                    field,
                    format!("'{}' is a reserved column", mapping.column),
                ));
            }
            if kind.sensor_path.is_some() && mapping.column == columns::SENSOR_ID {
                return Err(ContractError::config_validation(
                    field,
                    "sensor_id is already mapped through sensor_path",
                ));
            }
            if !names.insert(mapping.column.as_str()) {
                return Err(ContractError::config_validation(field, "duplicate column"));
            }
        }
    }
    Ok(())
}

fn validate_live_endpoints(config: &RunConfig) -> Result<(), ContractError> {
    let SourceConfig::Live(live) = &config.source else {
        return Ok(());
    };

    let mut sensors = HashSet::new();
    let mut binds = HashSet::new();
    for endpoint in &live.endpoints {
        if !sensors.insert(endpoint.sensor.as_str()) {
            return Err(ContractError::config_validation(
                format!("source.endpoints[sensor={}]", endpoint.sensor),
                "duplicate endpoint sensor",
            ));
        }
        if !binds.insert(endpoint.bind) {
            return Err(ContractError::config_validation(
                format!("source.endpoints[sensor={}].bind", endpoint.sensor),
                format!("bind address {} used twice", endpoint.bind),
            ));
        }
        if endpoint.line == 0 {
            return Err(ContractError::config_validation(
                format!("source.endpoints[sensor={}].line", endpoint.sensor),
                "capture lines are numbered from 1",
            ));
        }
    }
    Ok(())
}

fn validate_projection(config: &RunConfig) -> Result<(), ContractError> {
    let mut declared = HashSet::new();
    for sensor in &config.sensors {
        if !declared.insert(sensor.sensor.as_str()) {
            return Err(ContractError::config_validation(
                format!("sensors[sensor={}]", sensor.sensor),
                "duplicate sensor position",
            ));
        }
    }

    for kind in &config.record_kinds {
        let maps = |name: &str| kind.columns.iter().any(|c| c.column == name);
        if !(maps(columns::BEARING_DEG) && maps(columns::RANGE_M)) {
            continue;
        }
        if kind.sensor_path.is_none() && !config.is_live() {
            return Err(ContractError::config_validation(
                format!("record_kinds[{}].sensor_path", kind.name),
                "polar columns need a sensor_path to select the reference position",
            ));
        }
        if config.sensors.is_empty() {
            return Err(ContractError::config_validation(
                "sensors",
                format!(
                    "record kind '{}' maps polar columns but no sensor positions are declared",
                    kind.name
                ),
            ));
        }
    }
    Ok(())
}

fn validate_sink(config: &RunConfig) -> Result<(), ContractError> {
    let sink = &config.sink;
    if let Some(name) = &sink.name {
        if name.is_empty() {
            return Err(ContractError::config_validation(
                "sink.name",
                "sink name cannot be empty",
            ));
        }
    }
    if sink.sink_type == SinkType::File && !sink.params.contains_key("path") {
        return Err(ContractError::config_validation(
            "sink.params.path",
            "file sink requires a 'path' parameter",
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse_toml;

    const BASE: &str = r#"
[source]
type = "file"
path = "plots.jsonl"

[[record_kinds]]
name = "plot"
tod_path = "tod"
sensor_path = "sensor"
columns = [
    { path = "rho", column = "range_m", kind = "f64" },
    { path = "theta", column = "bearing_deg", kind = "f64" },
]

[[sensors]]
sensor = "psr_north"
latitude = 50.03
longitude = 8.57
"#;

    fn load(extra: &str) -> Result<(), ContractError> {
        let config = parse_toml(&format!("{BASE}{extra}")).unwrap();
        validate(&config)
    }

    fn field_of(err: ContractError) -> String {
        match err {
            ContractError::ConfigValidation { field, .. } => field,
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn test_valid_config() {
        assert!(load("").is_ok());
    }

    #[test]
    fn test_duplicate_record_kind() {
        let err = load("[[record_kinds]]\nname = \"plot\"\ntod_path = \"t\"\n").unwrap_err();
        assert!(err.to_string().contains("duplicate record kind"));
    }

    #[test]
    fn test_reserved_column() {
        let err = load(
            "[[record_kinds]]\nname = \"track\"\ntod_path = \"t\"\n\
             columns = [{ path = \"t\", column = \"tod\", kind = \"f64\" }]\n",
        )
        .unwrap_err();
        assert!(err.to_string().contains("reserved"));
    }

    #[test]
    fn test_range_violation_is_field_scoped() {
        let err = load("[backpressure]\nfile_max_in_flight = 0\n").unwrap_err();
        assert_eq!(field_of(err), "backpressure.file_max_in_flight");

        let err = load("[postprocess]\nfuture_slack_secs = -1.0\n").unwrap_err();
        assert_eq!(field_of(err), "postprocess.future_slack_secs");
    }

    #[test]
    fn test_sensor_position_range() {
        let err = load("[[sensors]]\nsensor = \"bad\"\nlatitude = 91.0\nlongitude = 0.0\n")
            .unwrap_err();
        assert_eq!(field_of(err), "sensors[1].latitude");
    }

    #[test]
    fn test_file_sink_requires_path() {
        let err = load("[sink]\ntype = \"file\"\n").unwrap_err();
        assert_eq!(field_of(err), "sink.params.path");
        assert!(load("[sink]\ntype = \"file\"\nparams = { path = \"out.jsonl\" }\n").is_ok());
    }

    #[test]
    fn test_projection_needs_positions() {
        let config = parse_toml(
            r#"
[source]
type = "file"
path = "plots.jsonl"

[[record_kinds]]
name = "plot"
tod_path = "tod"
sensor_path = "sensor"
columns = [
    { path = "rho", column = "range_m", kind = "f64" },
    { path = "theta", column = "bearing_deg", kind = "f64" },
]
"#,
        )
        .unwrap();
        assert_eq!(field_of(validate(&config).unwrap_err()), "sensors");
    }

    #[test]
    fn test_live_duplicate_endpoint() {
        let config = parse_toml(
            r#"
[source]
type = "live"
endpoints = [
    { sensor = "psr_north", bind = "127.0.0.1:30001" },
    { sensor = "psr_north", bind = "127.0.0.1:30002" },
]

[[record_kinds]]
name = "plot"
tod_path = "tod"
"#,
        )
        .unwrap();
        let err = validate(&config).unwrap_err();
        assert!(err.to_string().contains("duplicate endpoint sensor"));
    }

    #[test]
    fn test_live_requires_endpoints() {
        let config = parse_toml(
            r#"
[source]
type = "live"
endpoints = []

[[record_kinds]]
name = "plot"
tod_path = "tod"
"#,
        )
        .unwrap();
        assert_eq!(field_of(validate(&config).unwrap_err()), "source.endpoints");
    }
}
