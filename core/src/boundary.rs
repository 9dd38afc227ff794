use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// A single enforceable numeric limit on a named operational parameter.
///
/// Boundaries are immutable once loaded into a catalog. A re-sync replaces the
/// whole catalog, never individual fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Boundary {
    /// Parameter name, unique within a catalog (e.g. "velocity_max")
    pub name: String,
    /// Lower limit (inclusive)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min: Option<f64>,
    /// Upper limit (inclusive)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max: Option<f64>,
    /// Display unit appended to violation messages (e.g. "mph")
    #[serde(default)]
    pub unit: String,
    /// Symmetric slack added below min and above max
    #[serde(default)]
    pub tolerance: f64,
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum BoundaryError {
    #[error("boundary name must not be empty")]
    EmptyName,
    #[error("boundary '{name}' declares neither min nor max")]
    Unbounded { name: String },
    #[error("boundary '{name}' has min {min} greater than max {max}")]
    InvertedRange { name: String, min: f64, max: f64 },
    #[error("boundary '{name}' has a non-finite limit")]
    NonFiniteLimit { name: String },
    #[error("boundary '{name}' has invalid tolerance {tolerance}")]
    InvalidTolerance { name: String, tolerance: f64 },
    #[error("boundary '{name}' is declared more than once")]
    Duplicate { name: String },
    #[error("malformed boundary payload: {0}")]
    Malformed(String),
}

impl Boundary {
    pub fn new(
        name: impl Into<String>,
        min: Option<f64>,
        max: Option<f64>,
        unit: impl Into<String>,
        tolerance: f64,
    ) -> Result<Self, BoundaryError> {
        let boundary = Self {
            name: name.into(),
            min,
            max,
            unit: unit.into(),
            tolerance,
        };
        boundary.validate()?;
        Ok(boundary)
    }

    pub fn validate(&self) -> Result<(), BoundaryError> {
        if self.name.trim().is_empty() {
            return Err(BoundaryError::EmptyName);
        }
        if self.min.is_none() && self.max.is_none() {
            return Err(BoundaryError::Unbounded {
                name: self.name.clone(),
            });
        }
        if self.min.is_some_and(|v| !v.is_finite()) || self.max.is_some_and(|v| !v.is_finite()) {
            return Err(BoundaryError::NonFiniteLimit {
                name: self.name.clone(),
            });
        }
        if let (Some(min), Some(max)) = (self.min, self.max)
            && min > max
        {
            return Err(BoundaryError::InvertedRange {
                name: self.name.clone(),
                min,
                max,
            });
        }
        if !self.tolerance.is_finite() || self.tolerance < 0.0 {
            return Err(BoundaryError::InvalidTolerance {
                name: self.name.clone(),
                tolerance: self.tolerance,
            });
        }
        Ok(())
    }

    /// Evaluate one value against this boundary.
    ///
    /// A value exactly at `max + tolerance` (or `min - tolerance`) passes.
    /// Non-finite values never pass: an unreadable sensor is not in-envelope.
    pub fn check(&self, value: f64) -> CheckOutcome {
        if !value.is_finite() {
            return CheckOutcome::violated(format!("{}: {value} is not a finite value", self.name));
        }
        if let Some(min) = self.min
            && value < min - self.tolerance
        {
            return CheckOutcome::violated(format!(
                "{}: {value} below min {min}{}",
                self.name, self.unit
            ));
        }
        if let Some(max) = self.max
            && value > max + self.tolerance
        {
            return CheckOutcome::violated(format!(
                "{}: {value} exceeds max {max}{}",
                self.name, self.unit
            ));
        }
        CheckOutcome::passed()
    }
}

/// Result of evaluating a single parameter.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CheckOutcome {
    pub passed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl CheckOutcome {
    pub fn passed() -> Self {
        Self {
            passed: true,
            message: None,
        }
    }

    pub fn violated(message: String) -> Self {
        Self {
            passed: false,
            message: Some(message),
        }
    }
}

/// The set of boundaries enforced for one session, keyed by parameter name.
#[derive(Debug, Clone, Default)]
pub struct BoundaryCatalog {
    boundaries: BTreeMap<String, Boundary>,
}

impl BoundaryCatalog {
    pub fn new(boundaries: Vec<Boundary>) -> Result<Self, BoundaryError> {
        let mut catalog = Self::default();
        catalog.load(boundaries)?;
        Ok(catalog)
    }

    /// Replace the whole catalog. On error the previous contents are kept.
    pub fn load(&mut self, boundaries: Vec<Boundary>) -> Result<(), BoundaryError> {
        let mut next = BTreeMap::new();
        for boundary in boundaries {
            boundary.validate()?;
            if next.contains_key(&boundary.name) {
                return Err(BoundaryError::Duplicate {
                    name: boundary.name,
                });
            }
            next.insert(boundary.name.clone(), boundary);
        }
        self.boundaries = next;
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&Boundary> {
        self.boundaries.get(name)
    }

    /// Untracked parameters pass: only declared boundaries are enforced.
    pub fn check(&self, name: &str, value: f64) -> CheckOutcome {
        match self.get(name) {
            Some(boundary) => boundary.check(value),
            None => CheckOutcome::passed(),
        }
    }

    pub fn len(&self) -> usize {
        self.boundaries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.boundaries.is_empty()
    }

    pub fn snapshot(&self) -> Vec<Boundary> {
        self.boundaries.values().cloned().collect()
    }
}

/// Parse a boundary list from either `{"boundaries": [...]}` or a bare array.
///
/// Every entry is validated; one bad entry rejects the whole payload.
pub fn parse_boundary_payload(payload: &Value) -> Result<Vec<Boundary>, BoundaryError> {
    let list = match payload {
        Value::Array(_) => payload,
        Value::Object(map) => map
            .get("boundaries")
            .ok_or_else(|| BoundaryError::Malformed("missing 'boundaries' field".to_string()))?,
        other => {
            return Err(BoundaryError::Malformed(format!(
                "expected object or array, got {}",
                json_kind(other)
            )));
        }
    };
    let boundaries: Vec<Boundary> = serde_json::from_value(list.clone())
        .map_err(|e| BoundaryError::Malformed(e.to_string()))?;
    for boundary in &boundaries {
        boundary.validate()?;
    }
    Ok(boundaries)
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn velocity() -> Boundary {
        Boundary::new("velocity_max", None, Some(35.0), "mph", 0.0).expect("valid boundary")
    }

    #[test]
    fn max_is_inclusive_at_limit_plus_tolerance() {
        let b = Boundary::new("speed", None, Some(10.0), "m/s", 0.5).unwrap();
        assert!(b.check(10.5).passed);
        assert!(!b.check(10.5 + 1e-9).passed);
        assert!(!b.check(11.0).passed);
    }

    #[test]
    fn min_is_inclusive_at_limit_minus_tolerance() {
        let b = Boundary::new("altitude", Some(100.0), None, "ft", 2.0).unwrap();
        assert!(b.check(98.0).passed);
        assert!(!b.check(98.0 - 1e-9).passed);
        let outcome = b.check(90.0);
        assert_eq!(outcome.message.as_deref(), Some("altitude: 90 below min 100ft"));
    }

    #[test]
    fn exceeding_max_reports_unit_and_limit() {
        let outcome = velocity().check(40.0);
        assert!(!outcome.passed);
        assert_eq!(
            outcome.message.as_deref(),
            Some("velocity_max: 40 exceeds max 35mph")
        );
        assert!(velocity().check(35.0).passed);
    }

    #[test]
    fn non_finite_values_never_pass() {
        assert!(!velocity().check(f64::NAN).passed);
        assert!(!velocity().check(f64::INFINITY).passed);
    }

    #[test]
    fn untracked_parameters_pass() {
        let catalog = BoundaryCatalog::new(vec![velocity()]).unwrap();
        let outcome = catalog.check("cabin_temp", 1.0e9);
        assert!(outcome.passed);
        assert!(outcome.message.is_none());
    }

    #[test]
    fn validation_rejects_bad_boundaries() {
        assert_eq!(
            Boundary::new("x", None, None, "", 0.0),
            Err(BoundaryError::Unbounded {
                name: "x".to_string()
            })
        );
        assert!(matches!(
            Boundary::new("x", Some(5.0), Some(1.0), "", 0.0),
            Err(BoundaryError::InvertedRange { .. })
        ));
        assert!(matches!(
            Boundary::new("x", None, Some(1.0), "", -0.1),
            Err(BoundaryError::InvalidTolerance { .. })
        ));
        assert_eq!(
            Boundary::new("  ", None, Some(1.0), "", 0.0),
            Err(BoundaryError::EmptyName)
        );
    }

    #[test]
    fn load_replaces_wholesale_and_keeps_previous_on_error() {
        let mut catalog = BoundaryCatalog::new(vec![velocity()]).unwrap();
        let replacement = Boundary::new("payload_kg", None, Some(20.0), "kg", 0.0).unwrap();
        catalog.load(vec![replacement]).unwrap();
        assert!(catalog.get("velocity_max").is_none());
        assert!(catalog.get("payload_kg").is_some());

        let err = catalog
            .load(vec![velocity(), velocity()])
            .expect_err("duplicate should fail");
        assert!(matches!(err, BoundaryError::Duplicate { .. }));
        assert_eq!(catalog.len(), 1);
        assert!(catalog.get("payload_kg").is_some());
    }

    #[test]
    fn parse_payload_accepts_object_and_array_forms() {
        let wrapped = json!({
            "boundaries": [
                {"name": "velocity_max", "max": 35, "unit": "mph", "tolerance": 0},
                {"name": "battery_pct", "min": 15, "unit": "%"}
            ]
        });
        let parsed = parse_boundary_payload(&wrapped).unwrap();
        assert_eq!(parsed.len(), 2);
        assert_eq!(parsed[1].tolerance, 0.0);

        let bare = json!([{"name": "velocity_max", "max": 35}]);
        assert_eq!(parse_boundary_payload(&bare).unwrap().len(), 1);
    }

    #[test]
    fn parse_payload_rejects_malformed_input() {
        assert!(matches!(
            parse_boundary_payload(&json!({"items": []})),
            Err(BoundaryError::Malformed(_))
        ));
        assert!(matches!(
            parse_boundary_payload(&json!("nope")),
            Err(BoundaryError::Malformed(_))
        ));
        assert!(matches!(
            parse_boundary_payload(&json!([{"name": "x", "max": "fast"}])),
            Err(BoundaryError::Malformed(_))
        ));
        assert!(matches!(
            parse_boundary_payload(&json!([{"name": "x"}])),
            Err(BoundaryError::Unbounded { .. })
        ));
    }
}
