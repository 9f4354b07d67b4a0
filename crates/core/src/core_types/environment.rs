//! Scenario inputs: weather, terrain, vegetation layout and ignition points
//!
//! [`Scenario`] is the inbound description a caller hands to the manager. It is
//! validated once into [`EnvironmentParameters`] plus typed [`IgnitionPoint`]s,
//! which stay immutable for the life of the simulation.

use crate::core_types::fuel::VegetationType;
use crate::core_types::units::{Celsius, Degrees, MetersPerSecond, Percent, Seconds};
use crate::error::{FireSpreadError, Result};
use crate::physics::fuel_moisture::equilibrium_moisture;
use serde::{Deserialize, Serialize};

/// WGS84 latitude/longitude in decimal degrees
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoCoordinate {
    pub latitude: f64,
    pub longitude: f64,
}

impl GeoCoordinate {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
        }
    }

    fn validate(&self) -> Result<()> {
        if !self.latitude.is_finite() || !(-90.0..=90.0).contains(&self.latitude) {
            return Err(FireSpreadError::invalid(
                "latitude",
                format!("{} is outside [-90, 90]", self.latitude),
            ));
        }
        if !self.longitude.is_finite() || !(-180.0..=180.0).contains(&self.longitude) {
            return Err(FireSpreadError::invalid(
                "longitude",
                format!("{} is outside [-180, 180]", self.longitude),
            ));
        }
        Ok(())
    }
}

/// A point where fire is introduced, at a simulated time offset from run start
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IgnitionPoint {
    pub id: String,
    pub location: GeoCoordinate,
    #[serde(default)]
    pub timestamp: Seconds,
}

impl IgnitionPoint {
    pub fn new(id: impl Into<String>, location: GeoCoordinate, timestamp: Seconds) -> Self {
        Self {
            id: id.into(),
            location,
            timestamp,
        }
    }

    fn validate(&self) -> Result<()> {
        self.location.validate()?;
        if !self.timestamp.is_finite() || *self.timestamp < 0.0 {
            return Err(FireSpreadError::invalid(
                "ignition_timestamp",
                format!("ignition '{}' has timestamp {}", self.id, *self.timestamp),
            ));
        }
        Ok(())
    }
}

/// Row-major vegetation raster covering the simulation extent
///
/// Resampled onto the simulation grid by nearest neighbour, so its resolution
/// is independent of the grid's.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VegetationMap {
    pub rows: usize,
    pub cols: usize,
    pub classes: Vec<VegetationType>,
}

impl VegetationMap {
    /// `None` outside the raster
    pub fn class_at(&self, row: usize, col: usize) -> Option<VegetationType> {
        if row >= self.rows || col >= self.cols {
            return None;
        }
        self.classes.get(row * self.cols + col).copied()
    }

    /// Dimensions must be non-zero and match the class count
    pub fn validate(&self) -> Result<()> {
        check_map_shape(self.rows, self.cols, self.classes.len())
    }
}

fn check_map_shape(rows: usize, cols: usize, len: usize) -> Result<()> {
    let expected = rows.checked_mul(cols);
    if rows == 0 || cols == 0 || expected != Some(len) {
        return Err(FireSpreadError::invalid(
            "vegetation",
            match expected {
                Some(expected) => {
                    format!("map of {rows}x{cols} needs {expected} classes, got {len}")
                }
                None => format!("map of {rows}x{cols} is too large"),
            },
        ));
    }
    Ok(())
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VegetationLayout {
    Uniform(VegetationType),
    Map(VegetationMap),
}

/// Vegetation as supplied by a caller, using catalog keys
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum VegetationInput {
    Uniform(String),
    Map {
        rows: usize,
        cols: usize,
        classes: Vec<String>,
    },
}

impl VegetationInput {
    fn resolve(&self) -> Result<VegetationLayout> {
        match self {
            VegetationInput::Uniform(key) => Ok(VegetationLayout::Uniform(key.parse()?)),
            VegetationInput::Map {
                rows,
                cols,
                classes,
            } => {
                check_map_shape(*rows, *cols, classes.len())?;
                let classes = classes
                    .iter()
                    .map(|key| key.parse())
                    .collect::<Result<Vec<VegetationType>>>()?;
                Ok(VegetationLayout::Map(VegetationMap {
                    rows: *rows,
                    cols: *cols,
                    classes,
                }))
            }
        }
    }
}

/// Validated weather, terrain and fuel inputs for one simulation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnvironmentParameters {
    pub wind_speed: MetersPerSecond,
    /// Direction the wind blows FROM, clockwise from north
    pub wind_direction: Degrees,
    pub relative_humidity: Percent,
    /// Terrain slope as rise over run, in percent
    pub slope: Percent,
    /// Azimuth the terrain rises toward
    pub upslope_direction: Degrees,
    pub air_temperature: Celsius,
    /// Explicit dead-fuel moisture; derived from weather when absent
    pub fuel_moisture_override: Option<Percent>,
    pub vegetation: VegetationLayout,
}

impl EnvironmentParameters {
    /// Uniform environment with default temperature and upslope direction.
    pub fn new(
        vegetation: VegetationLayout,
        wind_speed: MetersPerSecond,
        wind_direction: Degrees,
        relative_humidity: Percent,
        slope: Percent,
    ) -> Self {
        Self {
            wind_speed,
            wind_direction,
            relative_humidity,
            slope,
            upslope_direction: Degrees::new(0.0),
            air_temperature: Celsius::new(DEFAULT_AIR_TEMPERATURE),
            fuel_moisture_override: None,
            vegetation,
        }
    }

    /// Dead fine fuel moisture content used by the calculator
    pub fn fuel_moisture(&self) -> Percent {
        self.fuel_moisture_override.unwrap_or_else(|| {
            equilibrium_moisture(self.air_temperature, self.relative_humidity).to_percent()
        })
    }

    pub fn validate(&self) -> Result<()> {
        let finite = |parameter: &'static str, value: f64| {
            if value.is_finite() {
                Ok(())
            } else {
                Err(FireSpreadError::invalid(parameter, "must be finite"))
            }
        };
        finite("wind_speed", *self.wind_speed)?;
        finite("wind_direction", *self.wind_direction)?;
        finite("humidity", *self.relative_humidity)?;
        finite("slope", *self.slope)?;
        finite("upslope_direction", *self.upslope_direction)?;
        finite("temperature", *self.air_temperature)?;

        if *self.wind_speed < 0.0 {
            return Err(FireSpreadError::invalid(
                "wind_speed",
                format!("{} is negative", self.wind_speed),
            ));
        }
        if !(0.0..=100.0).contains(&*self.relative_humidity) {
            return Err(FireSpreadError::invalid(
                "humidity",
                format!("{} is outside [0, 100]", self.relative_humidity),
            ));
        }
        if !(0.0..=100.0).contains(&*self.slope) {
            return Err(FireSpreadError::invalid(
                "slope",
                format!("{} is outside [0, 100]", self.slope),
            ));
        }
        if let Some(moisture) = self.fuel_moisture_override {
            finite("fuel_moisture", *moisture)?;
            if *moisture < 0.0 {
                return Err(FireSpreadError::invalid("fuel_moisture", "must not be negative"));
            }
        }
        if let VegetationLayout::Map(map) = &self.vegetation {
            map.validate()?;
        }
        Ok(())
    }
}

const DEFAULT_AIR_TEMPERATURE: f64 = 25.0;

fn default_temperature() -> f64 {
    DEFAULT_AIR_TEMPERATURE
}

/// Inbound scenario description
///
/// Raw caller input; nothing here is trusted until [`Scenario::validate`] runs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Scenario {
    /// Caller-chosen simulation id; generated when absent
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    pub vegetation: VegetationInput,
    /// m/s
    pub wind_speed: f64,
    /// Degrees clockwise from north, direction the wind comes from
    pub wind_direction: f64,
    /// Percent
    pub humidity: f64,
    /// Percent
    #[serde(default)]
    pub slope: f64,
    #[serde(default)]
    pub upslope_direction: f64,
    /// °C
    #[serde(default = "default_temperature")]
    pub temperature: f64,
    /// Percent; overrides the humidity-derived moisture
    #[serde(default)]
    pub fuel_moisture: Option<f64>,
    pub ignition_points: Vec<IgnitionPoint>,
}

impl Scenario {
    /// Scenario with a single vegetation class and no ignitions yet
    pub fn uniform(vegetation: &str, wind_speed: f64, wind_direction: f64, humidity: f64) -> Self {
        Self {
            id: None,
            name: None,
            vegetation: VegetationInput::Uniform(vegetation.to_string()),
            wind_speed,
            wind_direction,
            humidity,
            slope: 0.0,
            upslope_direction: 0.0,
            temperature: DEFAULT_AIR_TEMPERATURE,
            fuel_moisture: None,
            ignition_points: Vec::new(),
        }
    }

    pub fn with_ignition(mut self, latitude: f64, longitude: f64, timestamp: f64) -> Self {
        let id = format!("ignition-{}", self.ignition_points.len() + 1);
        self.ignition_points.push(IgnitionPoint::new(
            id,
            GeoCoordinate::new(latitude, longitude),
            Seconds::new(timestamp),
        ));
        self
    }

    pub fn with_slope(mut self, slope: f64, upslope_direction: f64) -> Self {
        self.slope = slope;
        self.upslope_direction = upslope_direction;
        self
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    /// Validate every field and resolve fuel keys
    pub fn validate(&self) -> Result<(EnvironmentParameters, Vec<IgnitionPoint>)> {
        let environment = EnvironmentParameters {
            wind_speed: MetersPerSecond::new(self.wind_speed),
            wind_direction: Degrees::new(self.wind_direction),
            relative_humidity: Percent::new(self.humidity),
            slope: Percent::new(self.slope),
            upslope_direction: Degrees::new(self.upslope_direction),
            air_temperature: Celsius::new(self.temperature),
            fuel_moisture_override: self.fuel_moisture.map(Percent::new),
            vegetation: self.vegetation.resolve()?,
        };
        environment.validate()?;

        if self.ignition_points.is_empty() {
            return Err(FireSpreadError::invalid(
                "ignition_points",
                "at least one ignition point is required",
            ));
        }
        for point in &self.ignition_points {
            point.validate()?;
        }
        if let Some(id) = &self.id {
            if id.trim().is_empty() {
                return Err(FireSpreadError::invalid("id", "must not be blank"));
            }
        }

        Ok((environment, self.ignition_points.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn grass() -> Scenario {
        Scenario::uniform("grassland", 5.0, 270.0, 20.0).with_ignition(-33.86, 151.2, 0.0)
    }

    #[test]
    fn test_valid_scenario_resolves_vegetation() {
        let (environment, ignitions) = grass().validate().unwrap();
        assert_eq!(
            environment.vegetation,
            VegetationLayout::Uniform(VegetationType::Grassland)
        );
        assert_eq!(ignitions.len(), 1);
    }

    #[test]
    fn test_rejects_out_of_range_weather() {
        let mut scenario = grass();
        scenario.humidity = 120.0;
        assert!(matches!(
            scenario.validate(),
            Err(FireSpreadError::InvalidParameters { parameter: "humidity", .. })
        ));

        let mut scenario = grass();
        scenario.wind_speed = -1.0;
        assert!(matches!(
            scenario.validate(),
            Err(FireSpreadError::InvalidParameters { parameter: "wind_speed", .. })
        ));

        let mut scenario = grass();
        scenario.slope = f64::NAN;
        assert!(matches!(
            scenario.validate(),
            Err(FireSpreadError::InvalidParameters { parameter: "slope", .. })
        ));
    }

    #[test]
    fn test_rejects_unknown_fuel_and_bad_coordinates() {
        let mut scenario = grass();
        scenario.vegetation = VegetationInput::Uniform("lava".into());
        assert_eq!(
            scenario.validate(),
            Err(FireSpreadError::UnknownFuelType("lava".into()))
        );

        let scenario = Scenario::uniform("forest", 0.0, 0.0, 30.0).with_ignition(95.0, 0.0, 0.0);
        assert!(matches!(
            scenario.validate(),
            Err(FireSpreadError::InvalidParameters { parameter: "latitude", .. })
        ));
    }

    #[test]
    fn test_requires_an_ignition_point() {
        let scenario = Scenario::uniform("forest", 0.0, 0.0, 30.0);
        assert!(matches!(
            scenario.validate(),
            Err(FireSpreadError::InvalidParameters { parameter: "ignition_points", .. })
        ));
    }

    #[test]
    fn test_vegetation_map_must_match_dimensions() {
        let mut scenario = grass();
        scenario.vegetation = VegetationInput::Map {
            rows: 2,
            cols: 2,
            classes: vec!["forest".into(); 3],
        };
        assert!(scenario.validate().is_err());
    }

    #[test]
    fn test_environment_rejects_mismatched_map() {
        let (mut environment, _) = grass().validate().unwrap();
        let map = VegetationMap {
            rows: 2,
            cols: 2,
            classes: vec![VegetationType::Forest],
        };
        assert_eq!(map.class_at(0, 1), None);
        assert_eq!(map.class_at(0, 0), Some(VegetationType::Forest));

        environment.vegetation = VegetationLayout::Map(map);
        assert!(matches!(
            environment.validate(),
            Err(FireSpreadError::InvalidParameters { parameter: "vegetation", .. })
        ));

        environment.vegetation = VegetationLayout::Map(VegetationMap {
            rows: usize::MAX,
            cols: 2,
            classes: vec![VegetationType::Forest],
        });
        assert!(environment.validate().is_err());
    }

    #[test]
    fn test_fuel_moisture_override_wins() {
        let mut scenario = grass();
        scenario.fuel_moisture = Some(7.5);
        let (environment, _) = scenario.validate().unwrap();
        assert_relative_eq!(*environment.fuel_moisture(), 7.5);

        let (environment, _) = grass().validate().unwrap();
        assert_relative_eq!(*environment.fuel_moisture(), 4.195, epsilon = 1e-3);
    }
}
