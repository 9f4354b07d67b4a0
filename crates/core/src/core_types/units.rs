//! Semantic unit types for type-safe physical quantity handling
//!
//! Newtype wrappers keep spread rates, distances and times from being mixed up
//! as they flow between the fuel catalog, the Rothermel calculator and the
//! propagation engine.
//!
//! # Design Philosophy
//! - All quantities wrap `f64`; arrival times accumulate over thousands of
//!   relaxations and must not drift
//! - Total ordering via `Ord` (NaN sorts greater than all values)
//! - `Deref` to the raw value for arithmetic inside formulas
//! - Serde serializes each type as its bare number
//!
//! # Usage
//! ```
//! use fire_spread_core::core_types::units::{Meters, MetersPerMinute, Seconds};
//!
//! let rate = MetersPerMinute::new(6.0);
//! let t: Seconds = Meters::new(30.0) / rate.to_meters_per_second();
//! assert!((*t - 300.0).abs() < 1e-9);
//! ```

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::ops::{Add, AddAssign, Deref, DerefMut, Div, Mul, Sub};

// ============================================================================
// HELPER FUNCTIONS FOR TOTAL ORDERING
// ============================================================================

/// Compare f64 values with total ordering using Rust's built-in `total_cmp`
#[inline]
fn f64_total_cmp(a: f64, b: f64) -> Ordering {
    a.total_cmp(&b)
}

/// Shared boilerplate for every unit: ordering, deref, raw conversions, display.
macro_rules! unit_newtype {
    ($(#[$meta:meta])* $name:ident, $display:literal) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
        #[repr(transparent)]
        pub struct $name(f64);

        impl Eq for $name {}

        impl PartialOrd for $name {
            fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
                Some(self.cmp(other))
            }
        }

        impl Ord for $name {
            fn cmp(&self, other: &Self) -> Ordering {
                f64_total_cmp(self.0, other.0)
            }
        }

        impl Deref for $name {
            type Target = f64;
            #[inline]
            fn deref(&self) -> &f64 {
                &self.0
            }
        }

        impl DerefMut for $name {
            #[inline]
            fn deref_mut(&mut self) -> &mut f64 {
                &mut self.0
            }
        }

        impl $name {
            #[inline]
            #[must_use]
            pub const fn new(value: f64) -> Self {
                $name(value)
            }

            /// Get the raw f64 value
            #[inline]
            #[must_use]
            pub fn value(self) -> f64 {
                self.0
            }
        }

        impl From<f64> for $name {
            fn from(v: f64) -> Self {
                $name(v)
            }
        }

        impl From<$name> for f64 {
            fn from(v: $name) -> f64 {
                v.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, $display, self.0)
            }
        }
    };
}

// ============================================================================
// DISTANCE / TIME
// ============================================================================

unit_newtype!(
    /// Distance in meters
    Meters,
    "{:.2} m"
);

unit_newtype!(
    /// Simulated time in seconds
    ///
    /// Unburned cells carry [`Seconds::INFINITY`] as their arrival time.
    Seconds,
    "{:.1} s"
);

impl Seconds {
    pub const ZERO: Seconds = Seconds(0.0);

    /// Arrival time of a cell the fire has not reached
    pub const INFINITY: Seconds = Seconds(f64::INFINITY);

    #[inline]
    #[must_use]
    pub fn is_finite(self) -> bool {
        self.0.is_finite()
    }

    #[inline]
    #[must_use]
    pub fn to_minutes(self) -> f64 {
        self.0 / 60.0
    }
}

impl Add for Seconds {
    type Output = Seconds;
    fn add(self, rhs: Seconds) -> Seconds {
        Seconds(self.0 + rhs.0)
    }
}

impl AddAssign for Seconds {
    fn add_assign(&mut self, rhs: Seconds) {
        self.0 += rhs.0;
    }
}

impl Sub for Seconds {
    type Output = Seconds;
    fn sub(self, rhs: Seconds) -> Seconds {
        Seconds(self.0 - rhs.0)
    }
}

impl Mul<f64> for Seconds {
    type Output = Seconds;
    fn mul(self, rhs: f64) -> Seconds {
        Seconds(self.0 * rhs)
    }
}

impl Add for Meters {
    type Output = Meters;
    fn add(self, rhs: Meters) -> Meters {
        Meters(self.0 + rhs.0)
    }
}

impl Mul<f64> for Meters {
    type Output = Meters;
    fn mul(self, rhs: f64) -> Meters {
        Meters(self.0 * rhs)
    }
}

// Cross-type operation: distance / velocity = time
impl Div<MetersPerSecond> for Meters {
    type Output = Seconds;
    fn div(self, rhs: MetersPerSecond) -> Seconds {
        if rhs.0 <= 0.0 {
            Seconds::INFINITY
        } else {
            Seconds(self.0 / rhs.0)
        }
    }
}

// ============================================================================
// VELOCITY
// ============================================================================

unit_newtype!(
    /// Wind speed or spread velocity in meters per second
    MetersPerSecond,
    "{:.2} m/s"
);

unit_newtype!(
    /// Fire spread rate in meters per minute
    MetersPerMinute,
    "{:.2} m/min"
);

impl MetersPerSecond {
    /// Conversion factor: meters per second to feet per minute
    const TO_FT_PER_MIN: f64 = 196.850_393_7;

    #[inline]
    #[must_use]
    pub fn to_feet_per_minute(self) -> f64 {
        self.0 * Self::TO_FT_PER_MIN
    }

    #[inline]
    #[must_use]
    pub fn to_meters_per_minute(self) -> MetersPerMinute {
        MetersPerMinute(self.0 * 60.0)
    }
}

impl MetersPerMinute {
    pub const ZERO: MetersPerMinute = MetersPerMinute(0.0);

    /// Conversion factor: feet per minute to meters per minute
    const FROM_FT_PER_MIN: f64 = 0.3048;

    /// Convert a rate expressed in feet per minute
    #[inline]
    #[must_use]
    pub fn from_feet_per_minute(ft_per_min: f64) -> Self {
        MetersPerMinute(ft_per_min * Self::FROM_FT_PER_MIN)
    }

    #[inline]
    #[must_use]
    pub fn to_meters_per_second(self) -> MetersPerSecond {
        MetersPerSecond(self.0 / 60.0)
    }
}

impl Mul<f64> for MetersPerMinute {
    type Output = MetersPerMinute;
    fn mul(self, rhs: f64) -> MetersPerMinute {
        MetersPerMinute(self.0 * rhs)
    }
}

// ============================================================================
// FUEL BED PROPERTIES
// ============================================================================

unit_newtype!(
    /// Areal fuel load in kg/m²
    KilogramsPerSquareMeter,
    "{:.3} kg/m²"
);

unit_newtype!(
    /// Density in kg/m³
    KgPerCubicMeter,
    "{:.2} kg/m³"
);

unit_newtype!(
    /// Heat content in kJ/kg
    KjPerKg,
    "{:.0} kJ/kg"
);

unit_newtype!(
    /// Surface-area-to-volume ratio in 1/m
    SurfaceAreaToVolume,
    "{:.0} m⁻¹"
);

impl KilogramsPerSquareMeter {
    /// Conversion factor: kg/m² to lb/ft²
    const TO_LB_PER_FT2: f64 = 0.204_816;

    #[inline]
    #[must_use]
    pub fn to_pounds_per_square_foot(self) -> f64 {
        self.0 * Self::TO_LB_PER_FT2
    }
}

impl KgPerCubicMeter {
    /// Conversion factor: kg/m³ to lb/ft³
    const TO_LB_PER_FT3: f64 = 0.062_428;

    #[inline]
    #[must_use]
    pub fn to_pounds_per_cubic_foot(self) -> f64 {
        self.0 * Self::TO_LB_PER_FT3
    }
}

impl Div<KgPerCubicMeter> for KilogramsPerSquareMeter {
    type Output = Meters;
    fn div(self, rhs: KgPerCubicMeter) -> Meters {
        Meters(self.0 / rhs.0)
    }
}

impl KjPerKg {
    /// Conversion factor: kJ/kg to Btu/lb
    const TO_BTU_PER_LB: f64 = 1.0 / 2.326;

    #[inline]
    #[must_use]
    pub fn to_btu_per_pound(self) -> f64 {
        self.0 * Self::TO_BTU_PER_LB
    }
}

impl SurfaceAreaToVolume {
    /// Conversion factor: 1/m to 1/ft
    const TO_PER_FOOT: f64 = 0.3048;

    #[inline]
    #[must_use]
    pub fn to_per_foot(self) -> f64 {
        self.0 * Self::TO_PER_FOOT
    }
}

// ============================================================================
// FIRE BEHAVIOUR OUTPUTS
// ============================================================================

unit_newtype!(
    /// Reaction intensity in kW/m²
    KilowattsPerSquareMeter,
    "{:.1} kW/m²"
);

unit_newtype!(
    /// Byram fireline intensity in kW/m
    KilowattsPerMeter,
    "{:.1} kW/m"
);

impl KilowattsPerSquareMeter {
    /// Conversion factor: Btu/ft²/min to kW/m²
    const FROM_BTU_PER_FT2_MIN: f64 = 0.189_27;

    #[inline]
    #[must_use]
    pub fn from_btu_per_square_foot_minute(btu: f64) -> Self {
        KilowattsPerSquareMeter(btu * Self::FROM_BTU_PER_FT2_MIN)
    }
}

// ============================================================================
// DIMENSIONLESS / ANGLES / TEMPERATURE
// ============================================================================

unit_newtype!(
    /// Percentage (0-100 for humidity and slope; moisture may exceed 100)
    Percent,
    "{:.1}%"
);

unit_newtype!(
    /// Fraction in [0, 1]
    Fraction,
    "{:.4}"
);

unit_newtype!(
    /// Angle in degrees, clockwise from north for azimuths
    Degrees,
    "{:.1}°"
);

unit_newtype!(
    /// Air temperature in degrees Celsius
    Celsius,
    "{:.1}°C"
);

impl Percent {
    #[inline]
    #[must_use]
    pub fn to_fraction(self) -> Fraction {
        Fraction(self.0 / 100.0)
    }
}

impl Fraction {
    pub const ZERO: Fraction = Fraction(0.0);
    pub const ONE: Fraction = Fraction(1.0);

    /// Clamp into [0, 1]
    #[inline]
    #[must_use]
    pub fn clamped(value: f64) -> Self {
        Fraction(value.clamp(0.0, 1.0))
    }

    #[inline]
    #[must_use]
    pub fn to_percent(self) -> Percent {
        Percent(self.0 * 100.0)
    }
}

impl Degrees {
    /// Normalize into [0, 360)
    #[inline]
    #[must_use]
    pub fn normalized(self) -> Degrees {
        Degrees(self.0.rem_euclid(360.0))
    }
}
