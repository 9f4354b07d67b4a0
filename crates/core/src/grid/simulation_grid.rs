//! 2D fire grid over a local metric plane
//!
//! Ignition points are projected onto an equirectangular plane centred on
//! their centroid. The grid covers their bounding box plus a padding margin.
//! Row 0 is the northern edge and column 0 the western edge; the cell at
//! (row, col) is centred at `x = min_x + col·res`, `y = max_y - row·res`.

use crate::core_types::environment::{GeoCoordinate, IgnitionPoint, VegetationLayout};
use crate::core_types::fuel::{FuelModel, VegetationType};
use crate::core_types::units::{Fraction, Meters, Seconds};
use crate::error::{FireSpreadError, Result};
use serde::{Deserialize, Serialize};

/// Mean Earth radius used by the local projection (m)
const EARTH_RADIUS: f64 = 6_371_000.0;

/// Grid and burn-out settings applied to every simulation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GridConfig {
    /// Cell edge length
    pub resolution: Meters,
    /// Margin added around the ignition bounding box on every side
    pub padding: Meters,
    /// Largest allowed row or column count
    pub max_dimension: usize,
    /// Neighbour stencil half-width in cells (2 = 5×5)
    pub propagation_radius: usize,
    pub min_burn_duration: Seconds,
    pub max_burn_duration: Seconds,
}

impl Default for GridConfig {
    fn default() -> Self {
        Self {
            resolution: Meters::new(10.0),
            padding: Meters::new(500.0),
            max_dimension: 1000,
            propagation_radius: 2,
            min_burn_duration: Seconds::new(60.0),
            max_burn_duration: Seconds::new(3600.0),
        }
    }
}

impl GridConfig {
    pub fn validate(&self) -> Result<()> {
        if !self.resolution.is_finite() || *self.resolution <= 0.0 {
            return Err(FireSpreadError::invalid("resolution", "must be positive"));
        }
        if !self.padding.is_finite() || *self.padding < 0.0 {
            return Err(FireSpreadError::invalid("padding", "must not be negative"));
        }
        if self.max_dimension == 0 {
            return Err(FireSpreadError::invalid("max_dimension", "must be at least 1"));
        }
        if !(1..=MAX_PROPAGATION_RADIUS).contains(&self.propagation_radius) {
            return Err(FireSpreadError::invalid(
                "propagation_radius",
                format!("must be within [1, {MAX_PROPAGATION_RADIUS}]"),
            ));
        }
        if !self.min_burn_duration.is_finite()
            || *self.min_burn_duration <= 0.0
            || !self.max_burn_duration.is_finite()
            || self.min_burn_duration > self.max_burn_duration
        {
            return Err(FireSpreadError::invalid(
                "burn_duration",
                "bounds must be positive, finite and ordered",
            ));
        }
        Ok(())
    }
}

/// Larger stencils stop paying for themselves on angular accuracy
pub const MAX_PROPAGATION_RADIUS: usize = 4;

/// Fire state of one cell
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CellState {
    Unburned,
    Burning,
    Burned,
}

/// One grid cell
#[derive(Debug, Clone)]
pub struct GridCell {
    pub row: usize,
    pub col: usize,
    pub vegetation: VegetationType,
    pub fuel: &'static FuelModel,
    pub state: CellState,
    /// Time the fire arrived; infinite while unburned
    pub arrival: Seconds,
    /// Fraction of the fuel load still to burn
    pub fuel_remaining: Fraction,
}

impl GridCell {
    fn new(row: usize, col: usize, vegetation: VegetationType) -> Self {
        Self {
            row,
            col,
            vegetation,
            fuel: vegetation.fuel(),
            state: CellState::Unburned,
            arrival: Seconds::INFINITY,
            fuel_remaining: Fraction::ONE,
        }
    }
}

/// Serializable view of a cell, with its centre in geographic coordinates
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CellSnapshot {
    pub row: usize,
    pub col: usize,
    pub latitude: f64,
    pub longitude: f64,
    pub vegetation: VegetationType,
    pub state: CellState,
    pub arrival: Option<Seconds>,
    pub fuel_remaining: Fraction,
}

/// Fixed-size fire grid owned by one simulation
#[derive(Debug, Clone)]
pub struct Grid {
    rows: usize,
    cols: usize,
    resolution: Meters,
    /// Projection centre (centroid of the ignition points)
    origin: GeoCoordinate,
    min_x: f64,
    max_y: f64,
    /// Row-major: `row * cols + col`
    cells: Vec<GridCell>,
}

impl Grid {
    /// Build the grid covering `ignitions`
    ///
    /// # Errors
    /// `InvalidParameters` when there are no ignitions or the padded extent
    /// would exceed `max_dimension` cells on either axis.
    pub fn new(
        config: &GridConfig,
        ignitions: &[IgnitionPoint],
        vegetation: &VegetationLayout,
    ) -> Result<Self> {
        if ignitions.is_empty() {
            return Err(FireSpreadError::invalid(
                "ignition_points",
                "at least one ignition point is required",
            ));
        }

        let count = ignitions.len() as f64;
        let origin = GeoCoordinate::new(
            ignitions.iter().map(|p| p.location.latitude).sum::<f64>() / count,
            ignitions.iter().map(|p| p.location.longitude).sum::<f64>() / count,
        );

        let (mut min_x, mut max_x) = (f64::INFINITY, f64::NEG_INFINITY);
        let (mut min_y, mut max_y) = (f64::INFINITY, f64::NEG_INFINITY);
        for point in ignitions {
            let (x, y) = project(&origin, &point.location);
            min_x = min_x.min(x);
            max_x = max_x.max(x);
            min_y = min_y.min(y);
            max_y = max_y.max(y);
        }

        let padding = *config.padding;
        let res = *config.resolution;
        min_x -= padding;
        max_x += padding;
        min_y -= padding;
        max_y += padding;

        let (Some(cols), Some(rows)) = (
            cell_count(max_x - min_x, res, config.max_dimension),
            cell_count(max_y - min_y, res, config.max_dimension),
        ) else {
            return Err(FireSpreadError::invalid(
                "grid",
                format!(
                    "extent of {:.0}x{:.0} m at {res} m cells exceeds the maximum dimension of {}",
                    max_y - min_y,
                    max_x - min_x,
                    config.max_dimension
                ),
            ));
        };

        if let VegetationLayout::Map(map) = vegetation {
            map.validate()?;
        }

        let mut cells = Vec::with_capacity(rows * cols);
        for row in 0..rows {
            for col in 0..cols {
                let vegetation = match vegetation {
                    VegetationLayout::Uniform(class) => *class,
                    VegetationLayout::Map(map) => {
                        let map_row = resample(row, rows, map.rows);
                        let map_col = resample(col, cols, map.cols);
                        map.class_at(map_row, map_col).ok_or_else(|| {
                            FireSpreadError::invalid(
                                "vegetation",
                                format!("no class at raster cell ({map_row}, {map_col})"),
                            )
                        })?
                    }
                };
                cells.push(GridCell::new(row, col, vegetation));
            }
        }

        Ok(Self {
            rows,
            cols,
            resolution: config.resolution,
            origin,
            min_x,
            max_y,
            cells,
        })
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    pub fn resolution(&self) -> Meters {
        self.resolution
    }

    pub fn origin(&self) -> GeoCoordinate {
        self.origin
    }

    #[inline]
    pub fn index(&self, row: usize, col: usize) -> usize {
        row * self.cols + col
    }

    pub fn cell(&self, row: usize, col: usize) -> Option<&GridCell> {
        if row < self.rows && col < self.cols {
            Some(&self.cells[self.index(row, col)])
        } else {
            None
        }
    }

    pub(crate) fn cell_at_index(&self, index: usize) -> &GridCell {
        &self.cells[index]
    }

    pub(crate) fn cell_at_index_mut(&mut self, index: usize) -> &mut GridCell {
        &mut self.cells[index]
    }

    pub fn cells(&self) -> &[GridCell] {
        &self.cells
    }

    /// Apply a row/column offset, `None` when it leaves the grid
    #[inline]
    pub fn offset(&self, row: usize, col: usize, dr: isize, dc: isize) -> Option<(usize, usize)> {
        let r = row.checked_add_signed(dr)?;
        let c = col.checked_add_signed(dc)?;
        (r < self.rows && c < self.cols).then_some((r, c))
    }

    /// Cell containing `location`, if it lies on the grid
    pub fn locate(&self, location: &GeoCoordinate) -> Option<(usize, usize)> {
        let (x, y) = project(&self.origin, location);
        let res = *self.resolution;
        let col = ((x - self.min_x) / res).round();
        let row = ((self.max_y - y) / res).round();
        if col < 0.0 || row < 0.0 {
            return None;
        }
        let (row, col) = (row as usize, col as usize);
        (row < self.rows && col < self.cols).then_some((row, col))
    }

    /// Local-plane centre of a cell (x east, y north)
    pub fn cell_center(&self, row: usize, col: usize) -> (f64, f64) {
        let res = *self.resolution;
        (self.min_x + col as f64 * res, self.max_y - row as f64 * res)
    }

    /// Geographic centre of a cell
    pub fn cell_center_geo(&self, row: usize, col: usize) -> GeoCoordinate {
        let (x, y) = self.cell_center(row, col);
        unproject(&self.origin, x, y)
    }

    pub fn count(&self, state: CellState) -> usize {
        self.cells.iter().filter(|c| c.state == state).count()
    }

    pub fn snapshot_cell(&self, cell: &GridCell) -> CellSnapshot {
        let center = self.cell_center_geo(cell.row, cell.col);
        CellSnapshot {
            row: cell.row,
            col: cell.col,
            latitude: center.latitude,
            longitude: center.longitude,
            vegetation: cell.vegetation,
            state: cell.state,
            arrival: cell.arrival.is_finite().then_some(cell.arrival),
            fuel_remaining: cell.fuel_remaining,
        }
    }
}

/// Equirectangular projection about `origin`, in meters
fn project(origin: &GeoCoordinate, location: &GeoCoordinate) -> (f64, f64) {
    let lat0 = origin.latitude.to_radians();
    let x = EARTH_RADIUS * (location.longitude - origin.longitude).to_radians() * lat0.cos();
    let y = EARTH_RADIUS * (location.latitude - origin.latitude).to_radians();
    (x, y)
}

fn unproject(origin: &GeoCoordinate, x: f64, y: f64) -> GeoCoordinate {
    let lat0 = origin.latitude.to_radians();
    let latitude = origin.latitude + (y / EARTH_RADIUS).to_degrees();
    let longitude = if lat0.cos().abs() > f64::EPSILON {
        origin.longitude + (x / (EARTH_RADIUS * lat0.cos())).to_degrees()
    } else {
        origin.longitude
    };
    GeoCoordinate::new(latitude, longitude)
}

/// Cells needed to span `extent` metres, or `None` past `max_dimension`
///
/// Checked in floating point before the cast so absurd extents cannot wrap.
fn cell_count(extent: f64, resolution: f64, max_dimension: usize) -> Option<usize> {
    let spans = (extent / resolution).round();
    if !spans.is_finite() || spans < 0.0 || spans >= max_dimension as f64 {
        return None;
    }
    (spans as usize).checked_add(1)
}

/// Nearest-neighbour index into a raster of `source` cells for grid index `i` of `target`
fn resample(i: usize, target: usize, source: usize) -> usize {
    let scaled = ((i as f64 + 0.5) * source as f64 / target as f64).floor() as usize;
    scaled.min(source - 1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core_types::environment::VegetationMap;
    use approx::assert_relative_eq;

    fn ignition(latitude: f64, longitude: f64) -> IgnitionPoint {
        IgnitionPoint::new("ig", GeoCoordinate::new(latitude, longitude), Seconds::ZERO)
    }

    fn grass() -> VegetationLayout {
        VegetationLayout::Uniform(VegetationType::Grassland)
    }

    #[test]
    fn test_single_ignition_grid_is_centred() {
        let config = GridConfig {
            padding: Meters::new(100.0),
            ..GridConfig::default()
        };
        let point = ignition(-35.0, 149.0);
        let grid = Grid::new(&config, &[point.clone()], &grass()).unwrap();

        assert_eq!(grid.rows(), 21);
        assert_eq!(grid.cols(), 21);
        assert_eq!(grid.locate(&point.location), Some((10, 10)));
    }

    #[test]
    fn test_row_zero_is_north() {
        let config = GridConfig::default();
        let grid = Grid::new(&config, &[ignition(10.0, 20.0)], &grass()).unwrap();
        let north = grid.cell_center_geo(0, 0);
        let south = grid.cell_center_geo(grid.rows() - 1, 0);
        assert!(north.latitude > south.latitude);

        let west = grid.cell_center_geo(0, 0);
        let east = grid.cell_center_geo(0, grid.cols() - 1);
        assert!(east.longitude > west.longitude);
    }

    #[test]
    fn test_projection_round_trips_cell_centres() {
        let config = GridConfig::default();
        let grid = Grid::new(&config, &[ignition(-33.9, 151.2)], &grass()).unwrap();
        let center = grid.cell_center_geo(17, 42);
        assert_eq!(grid.locate(&center), Some((17, 42)));
    }

    #[test]
    fn test_extent_covers_all_ignitions() {
        let config = GridConfig::default();
        let points = [ignition(0.0, 0.0), ignition(0.01, 0.01)];
        let grid = Grid::new(&config, &points, &grass()).unwrap();
        for point in &points {
            assert!(grid.locate(&point.location).is_some());
        }
        // ~1.1 km between points plus 500 m each side at 10 m cells
        assert!(grid.rows() > 200 && grid.rows() < 225);
    }

    #[test]
    fn test_oversized_extent_is_rejected() {
        let config = GridConfig {
            max_dimension: 50,
            ..GridConfig::default()
        };
        let err = Grid::new(&config, &[ignition(0.0, 0.0)], &grass()).unwrap_err();
        assert!(matches!(err, FireSpreadError::InvalidParameters { parameter: "grid", .. }));
    }

    #[test]
    fn test_extreme_extent_is_rejected_without_overflow() {
        let config = GridConfig {
            padding: Meters::new(1.0e300),
            ..GridConfig::default()
        };
        let err = Grid::new(&config, &[ignition(0.0, 0.0)], &grass()).unwrap_err();
        assert!(matches!(err, FireSpreadError::InvalidParameters { parameter: "grid", .. }));

        assert_eq!(cell_count(f64::INFINITY, 10.0, 1000), None);
        assert_eq!(cell_count(f64::NAN, 10.0, 1000), None);
        assert_eq!(cell_count(9990.0, 10.0, 1000), Some(1000));
        assert_eq!(cell_count(10000.0, 10.0, 1000), None);
    }

    #[test]
    fn test_mismatched_vegetation_map_is_an_error() {
        let map = VegetationLayout::Map(VegetationMap {
            rows: 3,
            cols: 3,
            classes: vec![VegetationType::Forest; 4],
        });
        let err = Grid::new(&GridConfig::default(), &[ignition(0.0, 0.0)], &map).unwrap_err();
        assert!(matches!(
            err,
            FireSpreadError::InvalidParameters { parameter: "vegetation", .. }
        ));

        let empty = VegetationLayout::Map(VegetationMap {
            rows: 0,
            cols: 0,
            classes: Vec::new(),
        });
        assert!(Grid::new(&GridConfig::default(), &[ignition(0.0, 0.0)], &empty).is_err());
    }

    #[test]
    fn test_vegetation_map_is_resampled() {
        let config = GridConfig {
            padding: Meters::new(50.0),
            ..GridConfig::default()
        };
        let map = VegetationLayout::Map(VegetationMap {
            rows: 1,
            cols: 2,
            classes: vec![VegetationType::Forest, VegetationType::Urban],
        });
        let grid = Grid::new(&config, &[ignition(0.0, 0.0)], &map).unwrap();
        assert_eq!(grid.cell(0, 0).unwrap().vegetation, VegetationType::Forest);
        assert_eq!(
            grid.cell(grid.rows() - 1, grid.cols() - 1).unwrap().vegetation,
            VegetationType::Urban
        );
    }

    #[test]
    fn test_offsets_respect_bounds() {
        let config = GridConfig {
            padding: Meters::new(20.0),
            ..GridConfig::default()
        };
        let grid = Grid::new(&config, &[ignition(0.0, 0.0)], &grass()).unwrap();
        assert_eq!(grid.offset(0, 0, -1, 0), None);
        assert_eq!(grid.offset(0, 0, 1, 2), Some((1, 2)));
        assert_eq!(grid.offset(grid.rows() - 1, 0, 1, 0), None);
    }

    #[test]
    fn test_new_cells_are_unburned() {
        let grid = Grid::new(&GridConfig::default(), &[ignition(0.0, 0.0)], &grass()).unwrap();
        assert_eq!(grid.count(CellState::Unburned), grid.rows() * grid.cols());
        let cell = grid.cell(3, 3).unwrap();
        assert!(!cell.arrival.is_finite());
        assert_relative_eq!(*cell.fuel_remaining, 1.0);
    }
}
