//! Padded Eulerian grid.
//!
//! The field `fG` is stored over an extended node range so that every
//! kernel stencil addresses valid memory without wrap arithmetic:
//!
//! - x and y are periodic and carry `pad` ghost nodes on each side
//! - z is either uniform (periodic, padded like x/y) or non-uniform
//!   (bounded, given by explicit node coordinates, unpadded)
//!
//! Node `(i, j, k)` of the padded grid lives at flat index
//! `i + nxeff * (j + nyeff * k)`, with `dof` components interleaved.

use std::ops::Range;

use serde::{Deserialize, Serialize};

use crate::column_index::ColumnIndex;
use crate::constants::GHOST_MARGIN;
use crate::error::SetupError;
use crate::particle::stencil_width;
use crate::transfer::footprint;

/// Node spacing along z.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AxialSpacing {
    /// Constant spacing, periodic.
    Uniform {
        /// Spacing.
        hz: f64,
    },
    /// Explicit node coordinates with quadrature weights, bounded.
    NonUniform {
        /// Strictly increasing node coordinates.
        zpts: Vec<f64>,
        /// Quadrature weight of each node.
        zwts: Vec<f64>,
    },
}

impl AxialSpacing {
    /// True for constant spacing.
    pub fn is_uniform(&self) -> bool {
        matches!(self, AxialSpacing::Uniform { .. })
    }
}

/// Grid description, loadable from JSON.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct GridConfig {
    /// Physical nodes along x.
    pub nx: usize,
    /// Physical nodes along y.
    pub ny: usize,
    /// Physical nodes along z (ignored for non-uniform spacing).
    pub nz: usize,
    /// Spacing along x.
    pub hx: f64,
    /// Spacing along y.
    pub hy: f64,
    /// Spacing along z.
    pub axial: AxialSpacing,
    /// Components carried per node.
    pub dof: usize,
    /// Largest support radius the padding must accommodate.
    pub max_alphaf: f64,
}

impl GridConfig {
    /// Uniform, triply periodic grid.
    pub fn uniform(n: [usize; 3], h: [f64; 3], dof: usize, max_alphaf: f64) -> Self {
        Self {
            nx: n[0],
            ny: n[1],
            nz: n[2],
            hx: h[0],
            hy: h[1],
            axial: AxialSpacing::Uniform { hz: h[2] },
            dof,
            max_alphaf,
        }
    }

    /// Periodic in x/y, bounded with explicit nodes in z.
    pub fn non_uniform(
        n: [usize; 2],
        h: [f64; 2],
        zpts: Vec<f64>,
        zwts: Vec<f64>,
        dof: usize,
        max_alphaf: f64,
    ) -> Self {
        let nz = zpts.len();
        Self {
            nx: n[0],
            ny: n[1],
            nz,
            hx: h[0],
            hy: h[1],
            axial: AxialSpacing::NonUniform { zpts, zwts },
            dof,
            max_alphaf,
        }
    }

    /// Parse from a JSON document.
    pub fn from_json(json: &str) -> Result<Self, SetupError> {
        serde_json::from_str(json).map_err(|e| SetupError::Config(e.to_string()))
    }

    /// Serialize to pretty JSON.
    pub fn to_json(&self) -> Result<String, SetupError> {
        serde_json::to_string_pretty(self).map_err(|e| SetupError::Config(e.to_string()))
    }
}

/// Ghost layers needed on a padded axis for support radius `alphaf`.
pub(crate) fn ghost_layers(alphaf: f64, h: f64) -> usize {
    let w = (2.0 * alphaf / h).round() as usize;
    w.div_ceil(2) + GHOST_MARGIN
}

/// The padded grid, its field buffer and the particle column index.
#[derive(Clone, Debug)]
pub struct Grid {
    config: GridConfig,
    /// Padded extents.
    pub(crate) nxeff: usize,
    pub(crate) nyeff: usize,
    pub(crate) nzeff: usize,
    /// Ghost layers per axis.
    pub(crate) pad: [usize; 3],
    /// Field values, `nxeff * nyeff * nzeff * dof`.
    pub(crate) field: Vec<f64>,
    /// Particle membership per (x, y) column.
    pub(crate) columns: ColumnIndex,
    /// Stamp of the last [`ParticleList::locate`](crate::ParticleList::locate)
    /// that built `columns`.
    pub(crate) stamp: Option<u64>,
}

impl Grid {
    /// Validate `config` and allocate a zeroed field.
    pub fn new(config: GridConfig) -> Result<Self, SetupError> {
        if config.dof == 0 {
            return Err(SetupError::ZeroDof);
        }
        SetupError::check_positive("hx", config.hx)?;
        SetupError::check_positive("hy", config.hy)?;
        SetupError::check_positive("max_alphaf", config.max_alphaf)?;
        if config.nx == 0 || config.ny == 0 {
            return Err(SetupError::LengthMismatch {
                name: "nx/ny",
                expected: 1,
                got: 0,
            });
        }

        let pad_x = ghost_layers(config.max_alphaf, config.hx);
        let pad_y = ghost_layers(config.max_alphaf, config.hy);
        let (pad_z, nzeff) = match &config.axial {
            AxialSpacing::Uniform { hz } => {
                SetupError::check_positive("hz", *hz)?;
                if config.nz == 0 {
                    return Err(SetupError::LengthMismatch {
                        name: "nz",
                        expected: 1,
                        got: 0,
                    });
                }
                let pad_z = ghost_layers(config.max_alphaf, *hz);
                (pad_z, config.nz + 2 * pad_z)
            }
            AxialSpacing::NonUniform { zpts, zwts } => {
                if zpts.is_empty() || zpts.windows(2).any(|w| w[1] <= w[0]) {
                    return Err(SetupError::AxialNodes);
                }
                SetupError::check_len("zwts", zpts.len(), zwts.len())?;
                (0, zpts.len())
            }
        };

        let nxeff = config.nx + 2 * pad_x;
        let nyeff = config.ny + 2 * pad_y;
        let field = vec![0.0; nxeff * nyeff * nzeff * config.dof];

        Ok(Self {
            nxeff,
            nyeff,
            nzeff,
            pad: [pad_x, pad_y, pad_z],
            field,
            columns: ColumnIndex::empty(nxeff * nyeff),
            stamp: None,
            config,
        })
    }

    /// The configuration this grid was built from.
    pub fn config(&self) -> &GridConfig {
        &self.config
    }

    /// Spacing along x.
    pub fn hx(&self) -> f64 {
        self.config.hx
    }

    /// Spacing along y.
    pub fn hy(&self) -> f64 {
        self.config.hy
    }

    /// Axial spacing.
    pub fn axial(&self) -> &AxialSpacing {
        &self.config.axial
    }

    /// True when z spacing is constant.
    pub fn unif_z(&self) -> bool {
        self.config.axial.is_uniform()
    }

    /// Components per node.
    pub fn dof(&self) -> usize {
        self.config.dof
    }

    /// Padded extents `(nxeff, nyeff, nzeff)`.
    pub fn extents(&self) -> (usize, usize, usize) {
        (self.nxeff, self.nyeff, self.nzeff)
    }

    /// Ghost layers on each axis.
    pub fn padding(&self) -> [usize; 3] {
        self.pad
    }

    /// Total padded node count.
    pub fn node_count(&self) -> usize {
        self.nxeff * self.nyeff * self.nzeff
    }

    /// Flat node index of padded node `(i, j, k)`.
    #[inline]
    pub fn node_index(&self, i: usize, j: usize, k: usize) -> usize {
        i + self.nxeff * (j + self.nyeff * k)
    }

    /// Column id of padded column `(i, j)`.
    #[inline]
    pub fn column_id(&self, i: usize, j: usize) -> usize {
        j + i * self.nyeff
    }

    /// Physical x coordinate of padded node `i` (negative in the low ghosts).
    #[inline]
    pub fn x_coord(&self, i: usize) -> f64 {
        (i as f64 - self.pad[0] as f64) * self.config.hx
    }

    /// Physical y coordinate of padded node `j`.
    #[inline]
    pub fn y_coord(&self, j: usize) -> f64 {
        (j as f64 - self.pad[1] as f64) * self.config.hy
    }

    /// Physical z coordinate of padded node `k`.
    #[inline]
    pub fn z_coord(&self, k: usize) -> f64 {
        match &self.config.axial {
            AxialSpacing::Uniform { hz } => (k as f64 - self.pad[2] as f64) * hz,
            AxialSpacing::NonUniform { zpts, .. } => zpts[k],
        }
    }

    /// Periodic lengths `(Lx, Ly)`.
    pub fn periods(&self) -> (f64, f64) {
        (
            self.config.nx as f64 * self.config.hx,
            self.config.ny as f64 * self.config.hy,
        )
    }

    /// Volume of a uniform cell, `None` for non-uniform z.
    pub fn cell_volume(&self) -> Option<f64> {
        match &self.config.axial {
            AxialSpacing::Uniform { hz } => Some(self.config.hx * self.config.hy * hz),
            AxialSpacing::NonUniform { .. } => None,
        }
    }

    // ========== Field accessors ==========

    /// Field values (padded, interleaved components).
    pub fn field(&self) -> &[f64] {
        &self.field
    }

    /// Mutable field values.
    pub fn field_mut(&mut self) -> &mut [f64] {
        &mut self.field
    }

    /// Zero the whole field including ghosts.
    pub fn clear_field(&mut self) {
        self.field.fill(0.0);
    }

    /// Fill every node (ghosts included) from its physical coordinate.
    pub fn set_field_from_fn<F>(&mut self, f: F)
    where
        F: Fn(f64, f64, f64, usize) -> f64,
    {
        let dof = self.config.dof;
        for k in 0..self.nzeff {
            let z = self.z_coord(k);
            for j in 0..self.nyeff {
                let y = self.y_coord(j);
                for i in 0..self.nxeff {
                    let x = self.x_coord(i);
                    let base = self.node_index(i, j, k) * dof;
                    for d in 0..dof {
                        self.field[base + d] = f(x, y, z, d);
                    }
                }
            }
        }
    }

    /// Sum of each component over all padded nodes.
    pub fn component_sums(&self) -> Vec<f64> {
        let dof = self.config.dof;
        let mut sums = vec![0.0; dof];
        for node in self.field.chunks_exact(dof) {
            for (s, v) in sums.iter_mut().zip(node) {
                *s += v;
            }
        }
        sums
    }

    /// Particle column index.
    pub fn columns(&self) -> &ColumnIndex {
        &self.columns
    }

    /// Install a column index built elsewhere.
    ///
    /// Every occupied column must keep the widest stencil the padding allows
    /// inside the padded grid. The index must bucket the particles of the
    /// list last located on this grid, which stays valid for transfers.
    pub fn set_columns(&mut self, columns: ColumnIndex) -> Result<(), SetupError> {
        SetupError::check_len("columns", self.nxeff * self.nyeff, columns.columns())?;
        let wx = stencil_width(self.config.max_alphaf, self.config.hx);
        let wy = stencil_width(self.config.max_alphaf, self.config.hy);
        let inside = |span: Range<isize>, n: usize| span.start >= 0 && span.end <= n as isize;
        for col in (0..columns.columns()).filter(|&c| columns.number(c) > 0) {
            let (ii, jj) = (col / self.nyeff, col % self.nyeff);
            if !inside(footprint(ii, wx), self.nxeff) || !inside(footprint(jj, wy), self.nyeff) {
                return Err(SetupError::ColumnIndex(format!(
                    "column ({}, {}) is occupied but its {}x{} stencil leaves the {}x{} grid",
                    ii,
                    jj,
                    wx,
                    wy,
                    self.nxeff,
                    self.nyeff
                )));
            }
        }
        self.columns = columns;
        Ok(())
    }
}
