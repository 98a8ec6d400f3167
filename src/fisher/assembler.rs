//! Per-cell Fisher matrices and their aggregate.
//!
//! For every cell of a binned grid:
//!
//! ```text
//! F_cell = inverse(WᴴW + R)
//! ```
//!
//! where `W` stacks the cell's rows (active columns only) and `R` is the
//! diagonal regularization. The aggregate is the sum of `F_cell`, each
//! optionally scaled by the low-frequency emphasis. The per-cell diagonals of
//! rho/T1/T2 are kept (before emphasis) for the information metric.
//!
//! Cells are inverted independently in parallel and merged in cell order, so
//! the result does not depend on scheduling.

use num_complex::Complex64;
use rayon::prelude::*;

use crate::domain::PRIMARY_PARAMS;
use crate::error::AppError;
use crate::fisher::binner::{GridGeometry, KSpaceGrid};
use crate::math::{CMatrix, emphasis, gram, regularized_inverse, rows_to_matrix};

/// Fisher matrices of one binned grid.
#[derive(Debug, Clone)]
pub struct FisherField {
    geometry: GridGeometry,
    params: usize,
    cells: Vec<CMatrix>,
    total: CMatrix,
    diagonals: Vec<[f64; PRIMARY_PARAMS]>,
}

impl FisherField {
    pub fn geometry(&self) -> GridGeometry {
        self.geometry
    }

    /// Active parameter count (size of every Fisher matrix).
    pub fn params(&self) -> usize {
        self.params
    }

    /// Per-cell Fisher matrices in flat cell order.
    pub fn cells(&self) -> &[CMatrix] {
        &self.cells
    }

    /// Sum over cells (with emphasis when enabled).
    pub fn total(&self) -> &CMatrix {
        &self.total
    }

    /// `|F_cell[p, p]|` for rho, T1, T2, per cell in flat order.
    pub fn diagonals(&self) -> &[[f64; PRIMARY_PARAMS]] {
        &self.diagonals
    }
}

/// Build the Fisher field of `grid`.
///
/// `regularization` holds one entry per active column; its length fixes the
/// active parameter count.
pub fn assemble(grid: &KSpaceGrid, regularization: &[f64], with_emphasis: bool) -> Result<FisherField, AppError> {
    let params = regularization.len();
    if params < PRIMARY_PARAMS {
        return Err(AppError::new(
            2,
            format!("Regularization needs at least {PRIMARY_PARAMS} entries, got {params}."),
        ));
    }
    let geometry = grid.geometry();

    let cells: Vec<CMatrix> = grid
        .cells()
        .par_iter()
        .map(|cell| {
            let w = rows_to_matrix(cell.rows().iter().map(|r| r.values.as_slice()), params);
            regularized_inverse(&gram(&w), regularization)
        })
        .collect::<Result<_, _>>()?;

    let mut total = CMatrix::zeros(params, params);
    let mut diagonals = Vec::with_capacity(cells.len());
    for (flat, fisher) in cells.iter().enumerate() {
        if with_emphasis {
            let (iy, iz) = geometry.cell_coords(flat);
            let (ky_norm, kz_norm) = geometry.offset_from_centre(iy, iz);
            total += fisher * Complex64::new(emphasis(ky_norm, kz_norm), 0.0);
        } else {
            total += fisher;
        }
        let mut diag = [0.0; PRIMARY_PARAMS];
        for (p, d) in diag.iter_mut().enumerate() {
            *d = fisher[(p, p)].norm();
        }
        diagonals.push(diag);
    }

    Ok(FisherField {
        geometry,
        params,
        cells,
        total,
        diagonals,
    })
}
