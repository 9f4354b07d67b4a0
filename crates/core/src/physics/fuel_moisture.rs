//! Dead fine fuel moisture from ambient weather
//!
//! The calculator needs a dead-fuel moisture content. Scenarios usually
//! only describe humidity and air temperature, so the moisture is taken as the
//! equilibrium moisture content of fine dead fuel that is drying out.
//!
//! # Scientific References
//! - Simard, A.J. (1968). "The moisture content of forest fuels"
//!   Canadian Department of Forestry and Rural Development, FF-X-14
//! - Nelson, R.M. (2000). "Prediction of diurnal change in 10-h fuel stick moisture content"
//!   Canadian Journal of Forest Research, 30(7), 1071-1087

use crate::core_types::units::{Celsius, Fraction, Percent};

/// Lowest moisture a fine dead fuel settles at
const MIN_EQUILIBRIUM_MOISTURE: f64 = 0.01;

/// Upper bound; beyond fibre saturation the equation no longer applies
const MAX_EQUILIBRIUM_MOISTURE: f64 = 0.40;

/// Calculate equilibrium moisture content based on temperature and humidity
///
/// Simard (1968) empirical equation with desorption coefficients:
/// EMC = b×H + c×T + d×H×T
///
/// # Arguments
/// * `temperature` - Air temperature (°C)
/// * `humidity` - Relative humidity (%)
///
/// # Returns
/// Equilibrium moisture content as a fraction, clamped to [0.01, 0.40]
pub fn equilibrium_moisture(temperature: Celsius, humidity: Percent) -> Fraction {
    // Desorption (fuel losing moisture)
    let (b, c, d) = (0.00282, -0.000176, -0.0000201);
    let h = *humidity;
    let t = *temperature;

    let emc = b * h + c * t + d * h * t;
    Fraction::new(emc.clamp(MIN_EQUILIBRIUM_MOISTURE, MAX_EQUILIBRIUM_MOISTURE))
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_dry_afternoon_moisture() {
        let emc = equilibrium_moisture(Celsius::new(25.0), Percent::new(20.0));
        assert_relative_eq!(*emc, 0.04195, epsilon = 1e-5);
    }

    #[test]
    fn test_moisture_rises_with_humidity() {
        let t = Celsius::new(25.0);
        let dry = equilibrium_moisture(t, Percent::new(20.0));
        let humid = equilibrium_moisture(t, Percent::new(60.0));
        assert!(humid > dry);
    }

    #[test]
    fn test_moisture_is_clamped() {
        let bone_dry = equilibrium_moisture(Celsius::new(45.0), Percent::new(0.0));
        assert_relative_eq!(*bone_dry, MIN_EQUILIBRIUM_MOISTURE);

        let saturated = equilibrium_moisture(Celsius::new(-40.0), Percent::new(100.0));
        assert_relative_eq!(*saturated, MAX_EQUILIBRIUM_MOISTURE);
    }
}
