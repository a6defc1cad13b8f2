//! Sensor reading types and boundary validation

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// A malformed or out-of-domain reading, rejected before any state is touched.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    #[error("missing required field: {0}")]
    MissingField(&'static str),

    #[error("sensor_id must not be empty")]
    EmptySensorId,

    #[error("unknown parameter: '{0}' (expected temperature, pressure or flow)")]
    UnknownParameter(String),

    #[error("{parameter} value must be a finite number, got {value}")]
    NonFiniteValue { parameter: Parameter, value: f64 },
}

/// Monitored physical quantity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Parameter {
    Temperature,
    Pressure,
    Flow,
}

impl Parameter {
    /// All parameters in a stable order
    pub const ALL: [Parameter; 3] = [Parameter::Temperature, Parameter::Pressure, Parameter::Flow];

    pub fn as_str(self) -> &'static str {
        match self {
            Parameter::Temperature => "temperature",
            Parameter::Pressure => "pressure",
            Parameter::Flow => "flow",
        }
    }

    /// Engineering unit used in anomaly messages
    pub fn unit(self) -> &'static str {
        match self {
            Parameter::Temperature => "°C",
            Parameter::Pressure => "bar",
            Parameter::Flow => "L/min",
        }
    }

    /// Capitalized label for human-readable messages
    pub fn label(self) -> &'static str {
        match self {
            Parameter::Temperature => "Temperature",
            Parameter::Pressure => "Pressure",
            Parameter::Flow => "Flow",
        }
    }
}

impl fmt::Display for Parameter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Parameter {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "temperature" => Ok(Parameter::Temperature),
            "pressure" => Ok(Parameter::Pressure),
            "flow" => Ok(Parameter::Flow),
            _ => Err(ValidationError::UnknownParameter(s.to_string())),
        }
    }
}

/// A single validated telemetry sample.
///
/// Construct directly for trusted in-process producers, or through
/// `TryFrom<RawReading>` for anything arriving over the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SensorReading {
    pub sensor_id: String,
    pub parameter: Parameter,
    pub value: f64,
    pub timestamp: DateTime<Utc>,
}

impl SensorReading {
    pub fn new(
        sensor_id: impl Into<String>,
        parameter: Parameter,
        value: f64,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            sensor_id: sensor_id.into(),
            parameter,
            value,
            timestamp,
        }
    }

    /// Check the invariants a typed reading can still violate.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.sensor_id.trim().is_empty() {
            return Err(ValidationError::EmptySensorId);
        }
        if !self.value.is_finite() {
            return Err(ValidationError::NonFiniteValue {
                parameter: self.parameter,
                value: self.value,
            });
        }
        Ok(())
    }
}

/// Untrusted reading as it arrives from a producer: every field optional,
/// parameter still a free-form string.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RawReading {
    #[serde(default)]
    pub sensor_id: Option<String>,
    #[serde(default)]
    pub parameter: Option<String>,
    #[serde(default)]
    pub value: Option<f64>,
    #[serde(default)]
    pub timestamp: Option<DateTime<Utc>>,
}

impl TryFrom<RawReading> for SensorReading {
    type Error = ValidationError;

    fn try_from(raw: RawReading) -> Result<Self, Self::Error> {
        let sensor_id = raw.sensor_id.ok_or(ValidationError::MissingField("sensor_id"))?;
        let parameter: Parameter = raw
            .parameter
            .ok_or(ValidationError::MissingField("parameter"))?
            .parse()?;
        let value = raw.value.ok_or(ValidationError::MissingField("value"))?;
        let timestamp = raw.timestamp.ok_or(ValidationError::MissingField("timestamp"))?;

        let reading = SensorReading {
            sensor_id,
            parameter,
            value,
            timestamp,
        };
        reading.validate()?;
        Ok(reading)
    }
}

/// Combined sample emitted by a pipe sensor: all three parameters at once.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SensorFrame {
    pub sensor_id: String,
    pub timestamp: DateTime<Utc>,
    pub temperature: f64,
    pub pressure: f64,
    pub flow: f64,
}

impl SensorFrame {
    /// Split into one reading per parameter, validating every reading first
    /// so a bad frame is rejected as a whole.
    pub fn into_readings(self) -> Result<Vec<SensorReading>, ValidationError> {
        let readings: Vec<SensorReading> = [
            (Parameter::Temperature, self.temperature),
            (Parameter::Pressure, self.pressure),
            (Parameter::Flow, self.flow),
        ]
        .into_iter()
        .map(|(parameter, value)| {
            SensorReading::new(self.sensor_id.clone(), parameter, value, self.timestamp)
        })
        .collect();

        for reading in &readings {
            reading.validate()?;
        }
        Ok(readings)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw(parameter: &str, value: f64) -> RawReading {
        RawReading {
            sensor_id: Some("S1".to_string()),
            parameter: Some(parameter.to_string()),
            value: Some(value),
            timestamp: Some(Utc::now()),
        }
    }

    #[test]
    fn test_parameter_parse_is_case_insensitive() {
        assert_eq!("Temperature".parse::<Parameter>(), Ok(Parameter::Temperature));
        assert_eq!(" flow ".parse::<Parameter>(), Ok(Parameter::Flow));
    }

    #[test]
    fn test_unknown_parameter_rejected() {
        let err = SensorReading::try_from(raw("humidity", 1.0)).unwrap_err();
        assert_eq!(err, ValidationError::UnknownParameter("humidity".to_string()));
    }

    #[test]
    fn test_nan_and_infinity_rejected() {
        assert!(matches!(
            SensorReading::try_from(raw("pressure", f64::NAN)),
            Err(ValidationError::NonFiniteValue { .. })
        ));
        assert!(matches!(
            SensorReading::try_from(raw("pressure", f64::INFINITY)),
            Err(ValidationError::NonFiniteValue { .. })
        ));
    }

    #[test]
    fn test_missing_fields_reported_by_name() {
        let mut r = raw("flow", 1.0);
        r.timestamp = None;
        assert_eq!(
            SensorReading::try_from(r).unwrap_err(),
            ValidationError::MissingField("timestamp")
        );

        let r = RawReading::default();
        assert_eq!(
            SensorReading::try_from(r).unwrap_err(),
            ValidationError::MissingField("sensor_id")
        );
    }

    #[test]
    fn test_blank_sensor_id_rejected() {
        let mut r = raw("flow", 1.0);
        r.sensor_id = Some("  ".to_string());
        assert_eq!(SensorReading::try_from(r).unwrap_err(), ValidationError::EmptySensorId);
    }

    #[test]
    fn test_frame_splits_into_three_readings() {
        let frame = SensorFrame {
            sensor_id: "wtf-pipe-1".to_string(),
            timestamp: Utc::now(),
            temperature: 22.0,
            pressure: 2.0,
            flow: 50.0,
        };
        let readings = frame.into_readings().unwrap();
        assert_eq!(readings.len(), 3);
        assert_eq!(readings[1].parameter, Parameter::Pressure);
        assert_eq!(readings[2].value, 50.0);
    }

    #[test]
    fn test_frame_with_nan_rejected_whole() {
        let frame = SensorFrame {
            sensor_id: "wtf-pipe-1".to_string(),
            timestamp: Utc::now(),
            temperature: 22.0,
            pressure: f64::NAN,
            flow: 50.0,
        };
        assert!(frame.into_readings().is_err());
    }

    #[test]
    fn test_raw_reading_deserializes_with_missing_fields() {
        let r: RawReading = serde_json::from_str(r#"{"sensor_id":"S1","value":3.0}"#).unwrap();
        assert!(r.parameter.is_none());
        assert_eq!(r.value, Some(3.0));
    }
}
