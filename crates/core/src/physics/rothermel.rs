//! Rothermel Fire Spread Model (1972)
//!
//! Surface head-fire spread with the Albini (1976) revisions, combined wind
//! and slope vectors, and an elliptical spread shape for directional rates.
//! All correlations are evaluated in the model's native customary units
//! (ft, lb, Btu, min) and converted back to SI at the boundary.
//!
//! # References
//! - Rothermel, R.C. (1972). "A mathematical model for predicting fire spread in wildland fuels."
//!   USDA Forest Service Research Paper INT-115.
//! - Albini, F.A. (1976). "Estimating wildfire behavior and effects."
//!   USDA Forest Service General Technical Report INT-30.
//! - Anderson, H.E. (1983). "Predicting wind-driven wild land fire size and shape."
//!   USDA Forest Service Research Paper INT-305.
//! - Byram, G.M. (1959). "Combustion of forest fuels." In: Forest Fire: Control and Use.

use crate::core_types::environment::EnvironmentParameters;
use crate::core_types::fuel::FuelModel;
use crate::core_types::units::{
    Degrees, KilogramsPerSquareMeter, KilowattsPerMeter, KilowattsPerSquareMeter, KjPerKg,
    Meters, MetersPerMinute, Percent, Seconds,
};
use crate::error::{FireSpreadError, Result};
use nalgebra::Vector2;
use serde::{Deserialize, Serialize};

/// Feet per minute in one mile per hour
const FT_PER_MIN_PER_MPH: f64 = 88.0;

/// Longest fire ellipse the shape correlation is trusted for
const MAX_LENGTH_TO_BREADTH: f64 = 8.0;

/// Resultant factors below this are treated as calm, flat ground
const CALM_THRESHOLD: f64 = 1e-9;

/// Bounds applied by the calculator
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CalculatorLimits {
    /// Upper bound on the wind factor φ_w
    pub max_wind_factor: f64,
}

impl Default for CalculatorLimits {
    fn default() -> Self {
        Self {
            max_wind_factor: 40.0,
        }
    }
}

impl CalculatorLimits {
    pub fn validate(&self) -> Result<()> {
        if !self.max_wind_factor.is_finite() || self.max_wind_factor < 0.0 {
            return Err(FireSpreadError::invalid(
                "max_wind_factor",
                format!("{} must be finite and non-negative", self.max_wind_factor),
            ));
        }
        Ok(())
    }
}

/// Direction-independent fire behaviour for one fuel under one environment
///
/// Built once per vegetation class; [`SpreadProfile::rate_toward`] then
/// evaluates the elliptical spread rate for any azimuth.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SpreadProfile {
    /// No-wind, no-slope rate R0
    pub base_rate: MetersPerMinute,
    /// Head-fire rate R0(1 + φ_e)
    pub head_rate: MetersPerMinute,
    /// Azimuth of maximum spread, clockwise from north
    pub max_spread_direction: Degrees,
    /// Combined wind and slope factor φ_e
    pub effective_wind_factor: f64,
    pub length_to_breadth: f64,
    pub eccentricity: f64,
    pub reaction_intensity: KilowattsPerSquareMeter,
    /// Flaming residence time w_n·h / I_R; infinite when I_R is zero
    pub residence_time: Seconds,
    net_fuel_load: KilogramsPerSquareMeter,
    heat_content: KjPerKg,
}

impl SpreadProfile {
    /// Evaluate the Rothermel model for `fuel` under `environment`
    ///
    /// # Errors
    /// `InvalidParameters` when the environment is out of range or non-finite.
    pub fn new(
        fuel: &FuelModel,
        environment: &EnvironmentParameters,
        limits: &CalculatorLimits,
    ) -> Result<Self> {
        environment.validate()?;

        // Customary units
        let sigma = fuel.surface_area_to_volume.to_per_foot();
        let beta = fuel.packing_ratio;
        let bulk_density = fuel.bulk_density().to_pounds_per_cubic_foot();
        let net_load = fuel.net_fuel_load();
        let heat_btu = fuel.heat_content.to_btu_per_pound();
        let moisture = environment.fuel_moisture().to_fraction();

        let beta_ratio = beta / optimum_packing_ratio(sigma);

        let reaction_intensity = calculate_reaction_intensity(
            fuel,
            sigma,
            beta_ratio,
            net_load.to_pounds_per_square_foot(),
            heat_btu,
            *moisture,
        );
        let propagating_flux = calculate_propagating_flux(sigma, beta);
        let heat_sink = bulk_density * effective_heating_number(sigma) * heat_of_preignition(*moisture);

        let base_rate_ft = if heat_sink > 0.0 {
            (reaction_intensity * propagating_flux / heat_sink).max(0.0)
        } else {
            0.0
        };

        let wind = WindCoefficients::new(sigma, beta_ratio);
        let wind_factor = wind
            .factor(environment.wind_speed.to_feet_per_minute())
            .min(limits.max_wind_factor);
        let slope_factor = calculate_slope_factor(beta, environment.slope);

        // Wind pushes toward where it blows to; slope pushes upslope
        let wind_heading = (*environment.wind_direction + 180.0).to_radians();
        let upslope = environment.upslope_direction.to_radians();
        let resultant = Vector2::new(wind_heading.sin(), wind_heading.cos()) * wind_factor
            + Vector2::new(upslope.sin(), upslope.cos()) * slope_factor;

        let effective_wind_factor = resultant.norm();
        let max_spread_direction = if effective_wind_factor > CALM_THRESHOLD {
            Degrees::new(resultant.x.atan2(resultant.y).to_degrees()).normalized()
        } else {
            Degrees::new(0.0)
        };

        let effective_wind_mph = wind.effective_wind_speed(effective_wind_factor) / FT_PER_MIN_PER_MPH;
        let length_to_breadth = calculate_length_to_breadth(effective_wind_mph);
        let eccentricity = (length_to_breadth * length_to_breadth - 1.0).sqrt() / length_to_breadth;

        let base_rate = MetersPerMinute::from_feet_per_minute(base_rate_ft);
        let reaction_intensity = KilowattsPerSquareMeter::from_btu_per_square_foot_minute(reaction_intensity);
        let residence_time = if *reaction_intensity > 0.0 {
            Seconds::new(*net_load * *fuel.heat_content / *reaction_intensity)
        } else {
            Seconds::INFINITY
        };

        Ok(Self {
            base_rate,
            head_rate: base_rate * (1.0 + effective_wind_factor),
            max_spread_direction,
            effective_wind_factor,
            length_to_breadth,
            eccentricity,
            reaction_intensity,
            residence_time,
            net_fuel_load: net_load,
            heat_content: fuel.heat_content,
        })
    }

    /// Whether this fuel carries a fire at all
    pub fn can_spread(&self) -> bool {
        *self.head_rate > 0.0
    }

    /// Spread rate toward `direction` (azimuth, clockwise from north)
    ///
    /// # Formula
    /// ```text
    /// R(θ) = R_max × (1 - e) / (1 - e × cos(θ - θ_max))
    /// ```
    pub fn rate_toward(&self, direction: Degrees) -> MetersPerMinute {
        if !self.can_spread() {
            return MetersPerMinute::ZERO;
        }
        let divergence = (*direction - *self.max_spread_direction).to_radians();
        let e = self.eccentricity;
        let rate = *self.head_rate * (1.0 - e) / (1.0 - e * divergence.cos());
        MetersPerMinute::new(rate.max(0.0))
    }

    /// Backing-fire rate, opposite the direction of maximum spread
    pub fn backing_rate(&self) -> MetersPerMinute {
        self.rate_toward(Degrees::new(*self.max_spread_direction + 180.0))
    }

    /// Byram fireline intensity of the head fire
    ///
    /// # Formula
    /// ```text
    /// I_B = h × w_n × R
    /// ```
    /// with h in kJ/kg, w_n in kg/m² and R in m/s.
    pub fn fireline_intensity(&self) -> KilowattsPerMeter {
        KilowattsPerMeter::new(
            *self.heat_content * *self.net_fuel_load * *self.head_rate.to_meters_per_second(),
        )
    }

    /// Byram flame length of the head fire, L = 0.0775 × I_B^0.46
    pub fn flame_length(&self) -> Meters {
        Meters::new(0.0775 * self.fireline_intensity().value().max(0.0).powf(0.46))
    }

    /// Time for a cell to burn out, residence time clamped to `[min, max]`
    pub fn burn_duration(&self, min: Seconds, max: Seconds) -> Seconds {
        self.residence_time.clamp(min, max)
    }
}

/// Directional spread rate of `fuel` under `environment`
///
/// Uses the default [`CalculatorLimits`]. Callers evaluating many directions
/// should build a [`SpreadProfile`] once instead.
///
/// # Example
/// ```
/// use fire_spread_core::core_types::{EnvironmentParameters, VegetationLayout, VegetationType};
/// use fire_spread_core::core_types::units::{Degrees, MetersPerSecond, Percent};
/// use fire_spread_core::physics::spread_rate;
///
/// let environment = EnvironmentParameters::new(
///     VegetationLayout::Uniform(VegetationType::Grassland),
///     MetersPerSecond::new(0.0),
///     Degrees::new(0.0),
///     Percent::new(20.0),
///     Percent::new(0.0),
/// );
/// let rate = spread_rate(VegetationType::Grassland.fuel(), &environment, Degrees::new(90.0)).unwrap();
/// assert!(*rate > 1.0 && *rate < 3.0);
/// ```
pub fn spread_rate(
    fuel: &FuelModel,
    environment: &EnvironmentParameters,
    direction: Degrees,
) -> Result<MetersPerMinute> {
    if !direction.is_finite() {
        return Err(FireSpreadError::invalid("direction", "must be finite"));
    }
    let profile = SpreadProfile::new(fuel, environment, &CalculatorLimits::default())?;
    Ok(profile.rate_toward(direction))
}

/// Optimum packing ratio β_op = 3.348 × σ^-0.8189
fn optimum_packing_ratio(sigma: f64) -> f64 {
    3.348 * sigma.powf(-0.8189)
}

/// Calculate reaction intensity (Btu/ft²/min)
///
/// # Formula
/// ```text
/// I_R = Γ' × w_n × h × η_M × η_s
/// Γ'_max = σ^1.5 / (495 + 0.0594 × σ^1.5)
/// A = 133 × σ^-0.7913
/// Γ' = Γ'_max × (β/β_op)^A × exp(A × (1 - β/β_op))
/// ```
fn calculate_reaction_intensity(
    fuel: &FuelModel,
    sigma: f64,
    beta_ratio: f64,
    net_load: f64,
    heat_content: f64,
    moisture: f64,
) -> f64 {
    let sigma_15 = sigma.powf(1.5);
    let gamma_max = sigma_15 / (495.0 + 0.0594 * sigma_15);
    let a = 133.0 * sigma.powf(-0.7913);
    let gamma = gamma_max * beta_ratio.powf(a) * (a * (1.0 - beta_ratio)).exp();

    let moisture_damping =
        calculate_moisture_damping(moisture, *fuel.moisture_of_extinction.to_fraction());
    let mineral_damping = calculate_mineral_damping(*fuel.effective_mineral_content);

    gamma * net_load * heat_content * moisture_damping * mineral_damping
}

/// Calculate moisture damping coefficient (η_M)
///
/// # Formula
/// ```text
/// η_M = 1 - 2.59×(M_f/M_x) + 5.11×(M_f/M_x)² - 3.52×(M_f/M_x)³
/// ```
/// Zero once M_f reaches M_x.
fn calculate_moisture_damping(moisture: f64, moisture_extinction: f64) -> f64 {
    if moisture_extinction <= 0.0 || moisture >= moisture_extinction {
        return 0.0;
    }

    let ratio = moisture / moisture_extinction;
    let damping = 1.0 - 2.59 * ratio + 5.11 * ratio.powi(2) - 3.52 * ratio.powi(3);

    damping.clamp(0.0, 1.0)
}

/// Mineral damping η_s = 0.174 × S_e^-0.19, capped at 1
fn calculate_mineral_damping(effective_mineral: f64) -> f64 {
    if effective_mineral <= 0.0 {
        return 1.0;
    }
    (0.174 * effective_mineral.powf(-0.19)).min(1.0)
}

/// Calculate propagating flux ratio (ξ)
///
/// # Formula
/// ```text
/// ξ = exp((0.792 + 0.681×σ^0.5) × (β + 0.1)) / (192 + 0.2595×σ)
/// ```
fn calculate_propagating_flux(sigma: f64, beta: f64) -> f64 {
    let numerator = ((0.792 + 0.681 * sigma.sqrt()) * (beta + 0.1)).exp();
    let denominator = 192.0 + 0.2595 * sigma;

    numerator / denominator
}

/// Effective heating number ε = exp(-138/σ)
fn effective_heating_number(sigma: f64) -> f64 {
    (-138.0 / sigma).exp()
}

/// Heat of pre-ignition Q_ig = 250 + 1116 × M_f (Btu/lb)
fn heat_of_preignition(moisture: f64) -> f64 {
    250.0 + 1116.0 * moisture
}

/// Wind correlation coefficients, functions of σ and β/β_op
///
/// # Formula
/// ```text
/// C = 7.47 × exp(-0.133 × σ^0.55)
/// B = 0.02526 × σ^0.54
/// E = 0.715 × exp(-3.59×10⁻⁴ × σ)
/// Φ_w = C × U^B × (β/β_op)^-E
/// ```
struct WindCoefficients {
    b: f64,
    /// C × (β/β_op)^-E
    scale: f64,
}

impl WindCoefficients {
    fn new(sigma: f64, beta_ratio: f64) -> Self {
        let c = 7.47 * (-0.133 * sigma.powf(0.55)).exp();
        let b = 0.02526 * sigma.powf(0.54);
        let e = 0.715 * (-3.59e-4 * sigma).exp();
        Self {
            b,
            scale: c * beta_ratio.powf(-e),
        }
    }

    /// Φ_w for a midflame wind in ft/min
    fn factor(&self, wind_ft_per_min: f64) -> f64 {
        if wind_ft_per_min <= 0.0 {
            return 0.0;
        }
        self.scale * wind_ft_per_min.powf(self.b)
    }

    /// Wind speed (ft/min) that alone would produce factor `phi`
    fn effective_wind_speed(&self, phi: f64) -> f64 {
        if phi <= CALM_THRESHOLD || self.scale <= 0.0 {
            return 0.0;
        }
        (phi / self.scale).powf(1.0 / self.b)
    }
}

/// Calculate slope factor (Φ_s)
///
/// # Formula
/// ```text
/// Φ_s = 5.275 × β^(-0.3) × tan²(slope)
/// ```
/// where tan(slope) is the percent slope divided by 100.
fn calculate_slope_factor(beta: f64, slope: Percent) -> f64 {
    let tan_slope = *slope / 100.0;
    if tan_slope <= 0.0 {
        return 0.0;
    }
    5.275 * beta.powf(-0.3) * tan_slope.powi(2)
}

/// Anderson (1983) length-to-breadth ratio from effective midflame wind (mph)
///
/// # Formula
/// ```text
/// LB = 0.936 × e^(0.2566 U) + 0.461 × e^(-0.1548 U) - 0.397
/// ```
fn calculate_length_to_breadth(effective_wind_mph: f64) -> f64 {
    let u = effective_wind_mph.max(0.0);
    let lb = 0.936 * (0.2566 * u).exp() + 0.461 * (-0.1548 * u).exp() - 0.397;
    lb.clamp(1.0, MAX_LENGTH_TO_BREADTH)
}
