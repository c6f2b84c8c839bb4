//! Lagrangian particles and their placement on the grid.
//!
//! Particle data is stored as flat per-field buffers so the transfer engine
//! can gather any subset of particles into contiguous scratch.

use std::sync::atomic::{AtomicU64, Ordering};

use glam::DVec3;

use crate::column_index::ColumnIndex;
use crate::constants::EsPreset;
use crate::error::SetupError;
use crate::grid::{AxialSpacing, Grid};
use crate::kernel::{EsKernel, KernelShape, ShapeParams};

/// Kernel assignment of one particle.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct KernelParams {
    /// Nominal width class.
    pub width: u16,
    /// Shape factor.
    pub beta: f64,
    /// Support radius.
    pub alphaf: f64,
}

impl KernelParams {
    /// Kernel from a tabulated preset on spacing `h`.
    pub fn from_preset(preset: EsPreset, h: f64) -> Self {
        Self {
            width: preset.width,
            beta: preset.beta,
            alphaf: preset.alpha(h),
        }
    }

    fn shape(&self) -> ShapeParams {
        ShapeParams {
            width: self.width,
            beta: self.beta,
            alpha: self.alphaf,
        }
    }
}

/// Window of one particle along one periodic axis.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct AxisWindow {
    /// Padded index of the column/plane the particle is bucketed in.
    pub anchor: usize,
    /// Padded index of the first window node.
    pub first: usize,
}

/// Place a window of `w` nodes around coordinate `x` (already wrapped into
/// `[0, L)`) on an axis with spacing `h` and `pad` ghost layers.
///
/// Even widths anchor on `floor(x/h)`, odd widths on `round(x/h)`, so the
/// centred stencil `anchor - w/2 + even .. anchor + w/2 + even` covers the
/// `w` nodes nearest `x`.
pub(crate) fn axis_window(x: f64, h: f64, w: usize, pad: usize) -> AxisWindow {
    let even = 1 - w % 2;
    let s = x / h;
    let cell = if even == 1 { s.floor() } else { s.round() } as i64;
    let anchor = (cell + pad as i64) as usize;
    AxisWindow {
        anchor,
        first: anchor + even - w / 2,
    }
}

/// Source of location stamps; each [`ParticleList::locate`] draws a fresh one.
static NEXT_STAMP: AtomicU64 = AtomicU64::new(1);

/// Integer stencil width for support radius `alphaf` on spacing `h`.
#[inline]
pub fn stencil_width(alphaf: f64, h: f64) -> usize {
    (2.0 * alphaf / h).round() as usize
}

/// A set of particles with kernel parameters and a quantity buffer.
#[derive(Clone, Debug)]
pub struct ParticleList {
    pub(crate) dof: usize,
    pub(crate) positions: Vec<DVec3>,
    /// Quantity buffer `fP`, `dof` components per particle.
    pub(crate) quantities: Vec<f64>,
    pub(crate) alphaf: Vec<f64>,
    pub(crate) betaf: Vec<f64>,
    pub(crate) normf: Vec<f64>,
    pub(crate) wf: Vec<u16>,
    /// Distinct support radii, ascending.
    pub(crate) unique_alphaf: Vec<f64>,

    // ===== Locator output =====
    /// Offset strides (widest window per axis).
    pub(crate) w_max: [usize; 3],
    pub(crate) xunwrap: Vec<f64>,
    pub(crate) yunwrap: Vec<f64>,
    pub(crate) zunwrap: Vec<f64>,
    /// First padded z index of each particle's axial window.
    pub(crate) zoffset: Vec<usize>,
    /// Axial width of each particle's window.
    pub(crate) wfz: Vec<u16>,
    /// Axial quadrature weights, stride `w_max[2]` (non-uniform z only).
    pub(crate) pt_wts: Vec<f64>,
    /// Stamp shared with the grid whose column index this list last built.
    pub(crate) located: Option<u64>,
}

impl ParticleList {
    /// Build a particle list normalized for the exponential-of-semicircle kernel.
    pub fn new(
        positions: Vec<DVec3>,
        quantities: Vec<f64>,
        kernels: Vec<KernelParams>,
        dof: usize,
    ) -> Result<Self, SetupError> {
        Self::with_kernel(&EsKernel, positions, quantities, kernels, dof)
    }

    /// Build a particle list normalized for `kernel`.
    pub fn with_kernel<K: KernelShape + ?Sized>(
        kernel: &K,
        positions: Vec<DVec3>,
        quantities: Vec<f64>,
        kernels: Vec<KernelParams>,
        dof: usize,
    ) -> Result<Self, SetupError> {
        if dof == 0 {
            return Err(SetupError::ZeroDof);
        }
        let n = positions.len();
        SetupError::check_len("quantities", n * dof, quantities.len())?;
        SetupError::check_len("kernels", n, kernels.len())?;
        for k in &kernels {
            SetupError::check_positive("alphaf", k.alphaf)?;
            SetupError::check_positive("beta", k.beta)?;
        }

        let alphaf: Vec<f64> = kernels.iter().map(|k| k.alphaf).collect();
        let mut unique_alphaf = alphaf.clone();
        unique_alphaf.sort_by(f64::total_cmp);
        unique_alphaf.dedup();

        Ok(Self {
            dof,
            quantities,
            normf: kernels.iter().map(|k| kernel.normalization(&k.shape())).collect(),
            betaf: kernels.iter().map(|k| k.beta).collect(),
            wf: kernels.iter().map(|k| k.width).collect(),
            alphaf,
            unique_alphaf,
            positions,
            w_max: [0; 3],
            xunwrap: Vec::new(),
            yunwrap: Vec::new(),
            zunwrap: Vec::new(),
            zoffset: Vec::new(),
            wfz: Vec::new(),
            pt_wts: Vec::new(),
            located: None,
        })
    }

    /// Number of particles.
    pub fn len(&self) -> usize {
        self.positions.len()
    }

    /// Check if empty.
    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }

    /// Components per particle.
    pub fn dof(&self) -> usize {
        self.dof
    }

    /// Particle positions.
    pub fn positions(&self) -> &[DVec3] {
        &self.positions
    }

    /// Quantity buffer (`dof` components per particle).
    pub fn quantities(&self) -> &[f64] {
        &self.quantities
    }

    /// Mutable quantity buffer.
    pub fn quantities_mut(&mut self) -> &mut [f64] {
        &mut self.quantities
    }

    /// Quantity of particle `p`.
    pub fn quantity(&self, p: usize) -> &[f64] {
        &self.quantities[p * self.dof..(p + 1) * self.dof]
    }

    /// Support radius of every particle.
    pub fn alphaf(&self) -> &[f64] {
        &self.alphaf
    }

    /// Distinct support radii, ascending.
    pub fn unique_alphaf(&self) -> &[f64] {
        &self.unique_alphaf
    }

    /// Kernel normalization of every particle.
    pub fn normf(&self) -> &[f64] {
        &self.normf
    }

    /// Widest window on each axis, set by [`ParticleList::locate`].
    pub fn max_widths(&self) -> [usize; 3] {
        self.w_max
    }

    /// First padded z index of each particle's axial window.
    pub fn zoffset(&self) -> &[usize] {
        &self.zoffset
    }

    /// Axial window width of each particle.
    pub fn axial_widths(&self) -> &[u16] {
        &self.wfz
    }

    /// Move particles; the list must be located again before the next transfer.
    pub fn set_positions(&mut self, positions: Vec<DVec3>) -> Result<(), SetupError> {
        SetupError::check_len("positions", self.len(), positions.len())?;
        self.positions = positions;
        self.located = None;
        Ok(())
    }

    /// True when `grid`'s column index was built by this list's latest
    /// [`ParticleList::locate`] and no other list has located on it since.
    pub fn is_located_on(&self, grid: &Grid) -> bool {
        self.located.is_some() && self.located == grid.stamp
    }

    /// Compute every particle's unwrapped kernel offsets, axial window and
    /// quadrature weights, and rebuild `grid`'s column index.
    pub fn locate(&mut self, grid: &mut Grid) -> Result<(), SetupError> {
        let n = self.len();
        let (hx, hy) = (grid.hx(), grid.hy());
        let (lx, ly) = grid.periods();
        let [pad_x, pad_y, pad_z] = grid.padding();
        let max_alphaf = grid.config().max_alphaf;

        // Widths per class, checked once
        for &alphaf in &self.unique_alphaf {
            if alphaf > max_alphaf {
                return Err(SetupError::SupportTooWide { alphaf, max_alphaf });
            }
            for (axis, h) in [('x', hx), ('y', hy)] {
                if stencil_width(alphaf, h) == 0 {
                    return Err(SetupError::ZeroWidth { alphaf, axis, h });
                }
            }
            if let AxialSpacing::Uniform { hz } = grid.axial() {
                if stencil_width(alphaf, *hz) == 0 {
                    return Err(SetupError::ZeroWidth {
                        alphaf,
                        axis: 'z',
                        h: *hz,
                    });
                }
            }
        }

        let wx_max = self.widest(hx);
        let wy_max = self.widest(hy);

        // Axial windows first: non-uniform widths size the z stride
        let mut zoffset = vec![0usize; n];
        let mut wfz = vec![0u16; n];
        match grid.axial() {
            AxialSpacing::Uniform { hz } => {
                let lz = grid.config().nz as f64 * hz;
                for p in 0..n {
                    let w = stencil_width(self.alphaf[p], *hz);
                    let z = self.positions[p].z.rem_euclid(lz);
                    zoffset[p] = axis_window(z, *hz, w, pad_z).first;
                    wfz[p] = w as u16;
                }
            }
            AxialSpacing::NonUniform { zpts, .. } => {
                let (lo, hi) = (zpts[0], zpts[zpts.len() - 1]);
                for p in 0..n {
                    let z = self.positions[p].z;
                    if !(lo..=hi).contains(&z) {
                        return Err(SetupError::OutOfDomain { index: p, z, lo, hi });
                    }
                    let a = self.alphaf[p];
                    let first = zpts.partition_point(|&zk| zk < z - a);
                    let end = zpts.partition_point(|&zk| zk <= z + a);
                    if end == first {
                        // No node within reach; `first` is interior since z is in range
                        return Err(SetupError::ZeroWidth {
                            alphaf: a,
                            axis: 'z',
                            h: zpts[first] - zpts[first - 1],
                        });
                    }
                    zoffset[p] = first;
                    wfz[p] = (end - first) as u16;
                }
            }
        }
        let wz_max = wfz.iter().map(|&w| w as usize).max().unwrap_or(0);

        let mut xunwrap = vec![0.0; n * wx_max];
        let mut yunwrap = vec![0.0; n * wy_max];
        let mut zunwrap = vec![0.0; n * wz_max];
        let mut pt_wts = match grid.axial() {
            AxialSpacing::Uniform { .. } => Vec::new(),
            AxialSpacing::NonUniform { .. } => vec![0.0; n * wz_max],
        };
        let mut particle_columns = vec![0usize; n];

        for p in 0..n {
            let pos = self.positions[p];
            let x = pos.x.rem_euclid(lx);
            let y = pos.y.rem_euclid(ly);
            let wx = stencil_width(self.alphaf[p], hx);
            let wy = stencil_width(self.alphaf[p], hy);

            let win_x = axis_window(x, hx, wx, pad_x);
            for i in 0..wx {
                xunwrap[p * wx_max + i] = grid.x_coord(win_x.first + i) - x;
            }
            let win_y = axis_window(y, hy, wy, pad_y);
            for j in 0..wy {
                yunwrap[p * wy_max + j] = grid.y_coord(win_y.first + j) - y;
            }
            particle_columns[p] = grid.column_id(win_x.anchor, win_y.anchor);

            let z = match grid.axial() {
                AxialSpacing::Uniform { hz } => pos.z.rem_euclid(grid.config().nz as f64 * hz),
                AxialSpacing::NonUniform { .. } => pos.z,
            };
            for k in 0..wfz[p] as usize {
                let node = zoffset[p] + k;
                zunwrap[p * wz_max + k] = grid.z_coord(node) - z;
                if let AxialSpacing::NonUniform { zwts, .. } = grid.axial() {
                    pt_wts[p * wz_max + k] = zwts[node];
                }
            }
        }

        let (nxeff, nyeff, _) = grid.extents();
        grid.columns = ColumnIndex::from_columns(nxeff * nyeff, &particle_columns);

        self.w_max = [wx_max, wy_max, wz_max];
        self.xunwrap = xunwrap;
        self.yunwrap = yunwrap;
        self.zunwrap = zunwrap;
        self.zoffset = zoffset;
        self.wfz = wfz;
        self.pt_wts = pt_wts;
        let stamp = NEXT_STAMP.fetch_add(1, Ordering::Relaxed);
        self.located = Some(stamp);
        grid.stamp = Some(stamp);

        log::info!(
            "located {} particles over {} columns (max window {}x{}x{})",
            n,
            nxeff * nyeff,
            wx_max,
            wy_max,
            wz_max
        );
        Ok(())
    }

    fn widest(&self, h: f64) -> usize {
        self.unique_alphaf
            .iter()
            .map(|&a| stencil_width(a, h))
            .max()
            .unwrap_or(0)
    }
}
