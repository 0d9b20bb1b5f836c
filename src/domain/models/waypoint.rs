use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::domain::errors::DomainError;

/// Category of a waypoint along the route
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WaypointCategory {
    Historical,
    Cultural,
    Natural,
    Religious,
    Entertainment,
}

impl fmt::Display for WaypointCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Historical => write!(f, "historical"),
            Self::Cultural => write!(f, "cultural"),
            Self::Natural => write!(f, "natural"),
            Self::Religious => write!(f, "religious"),
            Self::Entertainment => write!(f, "entertainment"),
        }
    }
}

impl FromStr for WaypointCategory {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "historical" => Ok(Self::Historical),
            "cultural" => Ok(Self::Cultural),
            "natural" => Ok(Self::Natural),
            "religious" => Ok(Self::Religious),
            "entertainment" => Ok(Self::Entertainment),
            _ => Err(DomainError::ValidationFailed(format!(
                "Invalid waypoint category: {s}"
            ))),
        }
    }
}

/// Geographic position in decimal degrees
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
    pub lat: f64,
    pub lon: f64,
}

impl Coordinates {
    pub const fn new(lat: f64, lon: f64) -> Self {
        Self { lat, lon }
    }
}

impl fmt::Display for Coordinates {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.4}, {:.4}", self.lat, self.lon)
    }
}

/// A point of interest along the route that content is curated for
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Waypoint {
    /// Display name
    pub name: String,

    /// Position of the waypoint
    pub coordinates: Coordinates,

    /// Waypoint category
    pub category: WaypointCategory,

    /// Free-text description (usually two or three sentences)
    #[serde(default)]
    pub description: String,

    /// Distance from the start of the route in kilometres
    #[serde(default)]
    pub distance_from_start_km: f64,
}

impl Waypoint {
    pub fn new(
        name: impl Into<String>,
        coordinates: Coordinates,
        category: WaypointCategory,
        description: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            coordinates,
            category,
            description: description.into(),
            distance_from_start_km: 0.0,
        }
    }

    #[must_use]
    pub const fn with_distance(mut self, distance_from_start_km: f64) -> Self {
        self.distance_from_start_km = distance_from_start_km;
        self
    }

    /// Check coordinate ranges, distance and name
    pub fn validate(&self) -> Result<(), DomainError> {
        if self.name.trim().is_empty() {
            return Err(DomainError::ValidationFailed(
                "Waypoint name cannot be empty".to_string(),
            ));
        }

        if !(-90.0..=90.0).contains(&self.coordinates.lat) {
            return Err(DomainError::ValidationFailed(format!(
                "Invalid latitude for '{}': {}. Must be between -90 and 90",
                self.name, self.coordinates.lat
            )));
        }

        if !(-180.0..=180.0).contains(&self.coordinates.lon) {
            return Err(DomainError::ValidationFailed(format!(
                "Invalid longitude for '{}': {}. Must be between -180 and 180",
                self.name, self.coordinates.lon
            )));
        }

        if self.distance_from_start_km < 0.0 || self.distance_from_start_km.is_nan() {
            return Err(DomainError::ValidationFailed(format!(
                "Invalid distance for '{}': {}. Must be >= 0",
                self.name, self.distance_from_start_km
            )));
        }

        Ok(())
    }
}

/// Identifier of a work unit; the waypoint's position in the submitted route
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WorkUnitId(pub u32);

impl WorkUnitId {
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for WorkUnitId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "wp-{:03}", self.0)
    }
}

/// One waypoint's worth of generation work, shared read-only by every worker kind
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkUnit {
    pub id: WorkUnitId,
    pub waypoint: Waypoint,
}

impl WorkUnit {
    pub const fn new(id: WorkUnitId, waypoint: Waypoint) -> Self {
        Self { id, waypoint }
    }

    pub fn name(&self) -> &str {
        &self.waypoint.name
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn masada() -> Waypoint {
        Waypoint::new(
            "Masada",
            Coordinates::new(31.3159, 35.3539),
            WaypointCategory::Historical,
            "Ancient fortress overlooking the Dead Sea",
        )
    }

    #[test]
    fn test_valid_waypoint() {
        assert!(masada().validate().is_ok());
        assert!(masada().with_distance(92.5).validate().is_ok());
    }

    #[test]
    fn test_invalid_latitude() {
        let mut waypoint = masada();
        waypoint.coordinates.lat = 91.0;
        let err = waypoint.validate().unwrap_err();
        assert!(err.to_string().contains("latitude"));
    }

    #[test]
    fn test_invalid_longitude() {
        let mut waypoint = masada();
        waypoint.coordinates.lon = -180.5;
        assert!(waypoint.validate().is_err());
    }

    #[test]
    fn test_negative_distance() {
        assert!(masada().with_distance(-1.0).validate().is_err());
    }

    #[test]
    fn test_empty_name() {
        let mut waypoint = masada();
        waypoint.name = "  ".to_string();
        assert!(waypoint.validate().is_err());
    }

    #[test]
    fn test_category_from_str() {
        assert_eq!(
            "Religious".parse::<WaypointCategory>().unwrap(),
            WaypointCategory::Religious
        );
        assert!("volcanic".parse::<WaypointCategory>().is_err());
        assert_eq!(WaypointCategory::Natural.to_string(), "natural");
    }

    #[test]
    fn test_unit_id_display() {
        assert_eq!(WorkUnitId(7).to_string(), "wp-007");
        assert_eq!(WorkUnitId(7).index(), 7);
    }

    #[test]
    fn test_waypoint_deserializes_with_defaults() {
        let json = r#"{"name":"Jaffa Port","coordinates":{"lat":32.0543,"lon":34.7516},"category":"cultural"}"#;
        let waypoint: Waypoint = serde_json::from_str(json).unwrap();
        assert_eq!(waypoint.name, "Jaffa Port");
        assert!(waypoint.description.is_empty());
        assert!(waypoint.distance_from_start_km.abs() < f64::EPSILON);
    }
}
