//! Trajectory binning into (ky, kz) cells.
//!
//! Each sample's weight row is split over the four integer cells around its
//! coordinate with the raised-cosine kernel and appended to each cell until the
//! cell holds `max_meas` rows. Later rows for a saturated cell are dropped, in
//! trajectory order.
//!
//! With Hermitian symmetry enabled, samples with `ky < 0` are folded onto
//! `(-ky, -kz)` with their row conjugated, so only `ky >= 0` is tracked. A
//! sample exactly at the origin also deposits its unscaled conjugate (a
//! "mirror" row): on the symmetry axis the signal is real, and the mirror makes
//! the cell behave as a single real degree of freedom.

use num_complex::Complex64;

use crate::domain::{KPoint, NoiseConfig, Trajectory};
use crate::error::AppError;
use crate::math::split_weights;

/// Cell layout of the k-space grid.
///
/// - non-folded ky axis: `nky` cells, index `ky + nky/2`
/// - folded ky axis: `nky/2 + 1` cells, index `ky`
/// - kz axis: `nkz` cells, index `kz + nkz/2`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GridGeometry {
    pub nky: usize,
    pub nkz: usize,
    pub symmetry: bool,
    pub cyclic: bool,
}

impl GridGeometry {
    pub fn from_config(config: &NoiseConfig) -> Self {
        Self {
            nky: config.nky,
            nkz: config.nkz,
            symmetry: config.symmetry,
            cyclic: config.cyclic,
        }
    }

    pub fn ky_cells(&self) -> usize {
        if self.symmetry { self.nky / 2 + 1 } else { self.nky }
    }

    pub fn kz_cells(&self) -> usize {
        self.nkz
    }

    pub fn cell_count(&self) -> usize {
        self.ky_cells() * self.kz_cells()
    }

    fn ky_offset(&self) -> i64 {
        if self.symmetry { 0 } else { (self.nky / 2) as i64 }
    }

    fn kz_offset(&self) -> i64 {
        (self.nkz / 2) as i64
    }

    /// Cell holding `(ky, kz) = (0, 0)`.
    pub fn centre(&self) -> (usize, usize) {
        (self.ky_offset() as usize, self.kz_offset() as usize)
    }

    /// Signed distance (cells) of a cell from the grid centre.
    pub fn offset_from_centre(&self, iy: usize, iz: usize) -> (f64, f64) {
        (
            iy as f64 - self.ky_offset() as f64,
            iz as f64 - self.kz_offset() as f64,
        )
    }

    pub fn flat_index(&self, iy: usize, iz: usize) -> usize {
        iy * self.kz_cells() + iz
    }

    pub fn cell_coords(&self, flat: usize) -> (usize, usize) {
        (flat / self.kz_cells(), flat % self.kz_cells())
    }

    fn resolve_ky(&self, ky_floor: i64) -> Option<usize> {
        resolve_axis(ky_floor + self.ky_offset(), self.ky_cells(), self.cyclic && !self.symmetry)
    }

    fn resolve_kz(&self, kz_floor: i64) -> Option<usize> {
        resolve_axis(kz_floor + self.kz_offset(), self.kz_cells(), self.cyclic)
    }
}

fn resolve_axis(index: i64, len: usize, wrap: bool) -> Option<usize> {
    let len = len as i64;
    if (0..len).contains(&index) {
        Some(index as usize)
    } else if wrap {
        Some(index.rem_euclid(len) as usize)
    } else {
        None
    }
}

/// One stored row of a cell.
#[derive(Debug, Clone, PartialEq)]
pub struct CellRow {
    pub values: Vec<Complex64>,
    /// Repetition the row came from.
    pub repetition: usize,
    /// Conjugate duplicate inserted at the origin under symmetry.
    pub mirror: bool,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Cell {
    rows: Vec<CellRow>,
}

impl Cell {
    pub fn occupancy(&self) -> usize {
        self.rows.len()
    }

    pub fn rows(&self) -> &[CellRow] {
        &self.rows
    }

    /// Rows that come from measurements, without symmetry mirrors.
    pub fn measured_rows(&self) -> impl Iterator<Item = &CellRow> {
        self.rows.iter().filter(|r| !r.mirror)
    }
}

/// Binned trajectory.
#[derive(Debug, Clone)]
pub struct KSpaceGrid {
    geometry: GridGeometry,
    max_meas: usize,
    cells: Vec<Cell>,
    binned: usize,
    saturated: usize,
    outside: usize,
}

impl KSpaceGrid {
    pub fn new(geometry: GridGeometry, max_meas: usize) -> Self {
        Self {
            geometry,
            max_meas,
            cells: vec![Cell::default(); geometry.cell_count()],
            binned: 0,
            saturated: 0,
            outside: 0,
        }
    }

    pub fn geometry(&self) -> GridGeometry {
        self.geometry
    }

    pub fn max_meas(&self) -> usize {
        self.max_meas
    }

    pub fn cell(&self, iy: usize, iz: usize) -> &Cell {
        &self.cells[self.geometry.flat_index(iy, iz)]
    }

    pub fn centre_cell(&self) -> &Cell {
        let (iy, iz) = self.geometry.centre();
        self.cell(iy, iz)
    }

    /// Cells in flat (ky-major) order.
    pub fn cells(&self) -> &[Cell] {
        &self.cells
    }

    /// Occupancy per cell in flat order.
    pub fn occupancy_map(&self) -> Vec<usize> {
        self.cells.iter().map(Cell::occupancy).collect()
    }

    /// Rows stored across all cells.
    pub fn rows_binned(&self) -> usize {
        self.binned
    }

    /// Rows dropped because their cell was full.
    pub fn rows_saturated(&self) -> usize {
        self.saturated
    }

    /// Rows dropped because their cell lies outside the grid.
    pub fn rows_outside(&self) -> usize {
        self.outside
    }

    fn push(&mut self, iy: usize, iz: usize, row: CellRow) {
        let idx = self.geometry.flat_index(iy, iz);
        let cell = &mut self.cells[idx];
        if cell.rows.len() < self.max_meas {
            cell.rows.push(row);
            self.binned += 1;
        } else {
            self.saturated += 1;
        }
    }
}

/// Apply the Hermitian fold to a sample. Returns the (possibly mirrored)
/// coordinate and whether the row must be conjugated.
pub fn fold(point: KPoint, symmetry: bool) -> (KPoint, bool) {
    if symmetry && point.ky < 0.0 {
        (point.mirrored(), true)
    } else {
        (point, false)
    }
}

/// Bin every sample of `trajectory`; `rows[n]` is the weight row of
/// repetition `n`.
pub fn bin_trajectory(
    trajectory: &Trajectory,
    rows: &[Vec<Complex64>],
    geometry: GridGeometry,
    max_meas: usize,
) -> Result<KSpaceGrid, AppError> {
    if rows.len() != trajectory.repetitions() {
        return Err(AppError::new(
            2,
            format!(
                "Trajectory has {} repetitions but {} weight rows were supplied.",
                trajectory.repetitions(),
                rows.len()
            ),
        ));
    }
    if max_meas == 0 {
        return Err(AppError::new(2, "max_meas must be >= 1."));
    }

    let mut grid = KSpaceGrid::new(geometry, max_meas);

    for (repetition, samples) in trajectory.iter().enumerate() {
        for &sample in samples {
            if !(sample.ky.is_finite() && sample.kz.is_finite()) {
                return Err(AppError::new(
                    2,
                    format!("Non-finite trajectory sample in repetition {repetition}."),
                ));
            }
            let (point, conjugate) = fold(sample, geometry.symmetry);
            let row: Vec<Complex64> = if conjugate {
                rows[repetition].iter().map(|v| v.conj()).collect()
            } else {
                rows[repetition].clone()
            };

            deposit(&mut grid, point, &row, repetition);

            if geometry.symmetry && point.ky == 0.0 && point.kz == 0.0 {
                let (iy, iz) = geometry.centre();
                grid.push(
                    iy,
                    iz,
                    CellRow {
                        values: row.iter().map(|v| v.conj()).collect(),
                        repetition,
                        mirror: true,
                    },
                );
            }
        }
    }

    Ok(grid)
}

fn deposit(grid: &mut KSpaceGrid, point: KPoint, row: &[Complex64], repetition: usize) {
    let geometry = grid.geometry;
    let (y0, wy0, wy1) = split_weights(point.ky);
    let (z0, wz0, wz1) = split_weights(point.kz);

    for (dy, wy) in [(0, wy0), (1, wy1)] {
        for (dz, wz) in [(0, wz0), (1, wz1)] {
            let weight = wy * wz;
            if weight == 0.0 {
                continue;
            }
            let (Some(iy), Some(iz)) = (geometry.resolve_ky(y0 + dy), geometry.resolve_kz(z0 + dz)) else {
                grid.outside += 1;
                continue;
            };
            grid.push(
                iy,
                iz,
                CellRow {
                    values: row.iter().map(|&v| v * weight).collect(),
                    repetition,
                    mirror: false,
                },
            );
        }
    }
}
