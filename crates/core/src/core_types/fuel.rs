//! Static fuel catalog
//!
//! Five vegetation classes, each with the surface fuel-bed properties the
//! Rothermel model needs. The table is process-wide and immutable; cells hold a
//! `&'static FuelModel` resolved once when the grid is built.

use crate::core_types::units::{
    Fraction, KgPerCubicMeter, KilogramsPerSquareMeter, KjPerKg, Meters, Percent,
    SurfaceAreaToVolume,
};
use crate::error::{FireSpreadError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Vegetation class of a cell
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[repr(u8)]
pub enum VegetationType {
    Forest = 0,
    Grassland = 1,
    Shrubland = 2,
    Agricultural = 3,
    Urban = 4,
}

impl VegetationType {
    pub const ALL: [VegetationType; 5] = [
        VegetationType::Forest,
        VegetationType::Grassland,
        VegetationType::Shrubland,
        VegetationType::Agricultural,
        VegetationType::Urban,
    ];

    /// Catalog key, also used for parsing
    pub fn key(self) -> &'static str {
        match self {
            VegetationType::Forest => "forest",
            VegetationType::Grassland => "grassland",
            VegetationType::Shrubland => "shrubland",
            VegetationType::Agricultural => "agricultural",
            VegetationType::Urban => "urban",
        }
    }

    /// Fuel model for this class
    pub fn fuel(self) -> &'static FuelModel {
        &FUEL_CATALOG[self as usize]
    }
}

impl fmt::Display for VegetationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

impl FromStr for VegetationType {
    type Err = FireSpreadError;

    fn from_str(s: &str) -> Result<Self> {
        let key = s.trim();
        VegetationType::ALL
            .into_iter()
            .find(|v| v.key().eq_ignore_ascii_case(key))
            .ok_or_else(|| FireSpreadError::UnknownFuelType(s.to_string()))
    }
}

/// Surface fuel-bed properties for one vegetation class
///
/// Stored in SI; the calculator converts to the model's customary units.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FuelModel {
    pub vegetation: VegetationType,
    pub name: &'static str,

    /// Oven-dry fine fuel load
    pub fuel_load: KilogramsPerSquareMeter,
    /// Characteristic surface-area-to-volume ratio σ
    pub surface_area_to_volume: SurfaceAreaToVolume,
    /// Low heat content h
    pub heat_content: KjPerKg,
    /// Dead-fuel moisture at which the fire no longer spreads (Mx)
    pub moisture_of_extinction: Percent,
    /// Packing ratio β (bulk density / particle density)
    pub packing_ratio: f64,
    /// Oven-dry particle density ρ_p
    pub particle_density: KgPerCubicMeter,
    /// Total mineral content S_T
    pub total_mineral_content: Fraction,
    /// Effective (silica-free) mineral content S_e
    pub effective_mineral_content: Fraction,
}

/// ρ_p = 32 lb/ft³ expressed in SI
const PARTICLE_DENSITY: KgPerCubicMeter = KgPerCubicMeter::new(512.0);
const TOTAL_MINERAL: Fraction = Fraction::new(0.0555);
const EFFECTIVE_MINERAL: Fraction = Fraction::new(0.01);

impl FuelModel {
    /// Ovendry bulk density ρ_b = β·ρ_p
    pub fn bulk_density(&self) -> KgPerCubicMeter {
        KgPerCubicMeter::new(self.packing_ratio * *self.particle_density)
    }

    /// Fuel-bed depth δ = w0 / ρ_b
    pub fn fuel_bed_depth(&self) -> Meters {
        self.fuel_load / self.bulk_density()
    }

    /// Net fuel load after removing minerals, w_n = w0(1 - S_T)
    pub fn net_fuel_load(&self) -> KilogramsPerSquareMeter {
        KilogramsPerSquareMeter::new(*self.fuel_load * (1.0 - *self.total_mineral_content))
    }
}

/// Process-wide fuel table, indexed by `VegetationType as usize`
pub static FUEL_CATALOG: [FuelModel; 5] = [
    // Timber litter under closed canopy
    FuelModel {
        vegetation: VegetationType::Forest,
        name: "Forest litter",
        fuel_load: KilogramsPerSquareMeter::new(0.654),
        surface_area_to_volume: SurfaceAreaToVolume::new(8202.0),
        heat_content: KjPerKg::new(18622.0),
        moisture_of_extinction: Percent::new(25.0),
        packing_ratio: 0.0209,
        particle_density: PARTICLE_DENSITY,
        total_mineral_content: TOTAL_MINERAL,
        effective_mineral_content: EFFECTIVE_MINERAL,
    },
    // Short, continuous cured grass
    FuelModel {
        vegetation: VegetationType::Grassland,
        name: "Short grass",
        fuel_load: KilogramsPerSquareMeter::new(0.166),
        surface_area_to_volume: SurfaceAreaToVolume::new(11483.0),
        heat_content: KjPerKg::new(18608.0),
        moisture_of_extinction: Percent::new(15.0),
        packing_ratio: 0.00106,
        particle_density: PARTICLE_DENSITY,
        total_mineral_content: TOTAL_MINERAL,
        effective_mineral_content: EFFECTIVE_MINERAL,
    },
    FuelModel {
        vegetation: VegetationType::Shrubland,
        name: "Brush",
        fuel_load: KilogramsPerSquareMeter::new(0.40),
        surface_area_to_volume: SurfaceAreaToVolume::new(6562.0),
        heat_content: KjPerKg::new(18622.0),
        moisture_of_extinction: Percent::new(20.0),
        packing_ratio: 0.00128,
        particle_density: PARTICLE_DENSITY,
        total_mineral_content: TOTAL_MINERAL,
        effective_mineral_content: EFFECTIVE_MINERAL,
    },
    // Stubble and crop residue
    FuelModel {
        vegetation: VegetationType::Agricultural,
        name: "Crop residue",
        fuel_load: KilogramsPerSquareMeter::new(0.25),
        surface_area_to_volume: SurfaceAreaToVolume::new(4921.0),
        heat_content: KjPerKg::new(18622.0),
        moisture_of_extinction: Percent::new(12.0),
        packing_ratio: 0.00122,
        particle_density: PARTICLE_DENSITY,
        total_mineral_content: TOTAL_MINERAL,
        effective_mineral_content: EFFECTIVE_MINERAL,
    },
    // Sparse ornamental fuels between structures
    FuelModel {
        vegetation: VegetationType::Urban,
        name: "Urban interface",
        fuel_load: KilogramsPerSquareMeter::new(0.05),
        surface_area_to_volume: SurfaceAreaToVolume::new(4921.0),
        heat_content: KjPerKg::new(20000.0),
        moisture_of_extinction: Percent::new(10.0),
        packing_ratio: 0.00098,
        particle_density: PARTICLE_DENSITY,
        total_mineral_content: TOTAL_MINERAL,
        effective_mineral_content: EFFECTIVE_MINERAL,
    },
];

/// Look up a fuel model by case-insensitive class key
pub fn lookup(key: &str) -> Result<&'static FuelModel> {
    key.parse::<VegetationType>().map(VegetationType::fuel)
}
