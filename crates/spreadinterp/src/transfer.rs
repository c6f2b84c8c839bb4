//! Particle-grid transfer: spreading and interpolation.
//!
//! For each distinct support radius the engine walks the grid columns in
//! `wx * wy` phase classes. Columns of one phase are `wx` (resp. `wy`) apart,
//! so their `wx * wy * nzeff` stencil footprints are disjoint and the column
//! tasks of a phase run in parallel without locks. Phases, and width
//! classes, run one after another.
//!
//! Per column:
//! 1. collect the column's particles of the active class
//! 2. build the global node indices of the footprint subarray
//! 3. gather the particles' kernel inputs into task-local buffers
//! 4. evaluate the weight tensor
//! 5. spread: accumulate into a zeroed local subarray, scatter-add to the grid;
//!    interpolate: gather the subarray, contract with the weights, overwrite
//!    the particles' quantities

use std::ops::Range;

use rayon::prelude::*;

use crate::column_index::ColumnIndex;
use crate::gather::{gather, DisjointSlice};
use crate::grid::{AxialSpacing, Grid};
use crate::kernel::{evaluate_column, KernelInputs, KernelShape};
use crate::particle::{stencil_width, ParticleList};

/// How the axial stencil is sized and weighted for one width class.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum AxialMode {
    /// One axial width for every particle; interpolation weights by cell volume.
    Uniform {
        /// Axial width.
        wz: usize,
        /// `hx * hy * hz`.
        cell_volume: f64,
    },
    /// Per-particle axial width; interpolation weights by `hx * hy * pt_wts`.
    PerParticle {
        /// `hx * hy`.
        area: f64,
    },
}

/// Stencil geometry of one support radius on one grid.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct WidthClass {
    /// Support radius.
    pub alphaf: f64,
    /// Width along x.
    pub wx: usize,
    /// Width along y.
    pub wy: usize,
    /// Axial sizing.
    pub axial: AxialMode,
}

impl WidthClass {
    /// Widths for `alphaf`, or `None` when any axis rounds to zero.
    pub fn new(alphaf: f64, grid: &Grid) -> Option<Self> {
        let wx = stencil_width(alphaf, grid.hx());
        let wy = stencil_width(alphaf, grid.hy());
        let axial = match grid.axial() {
            AxialSpacing::Uniform { hz } => AxialMode::Uniform {
                wz: stencil_width(alphaf, *hz),
                cell_volume: grid.hx() * grid.hy() * hz,
            },
            AxialSpacing::NonUniform { .. } => AxialMode::PerParticle {
                area: grid.hx() * grid.hy(),
            },
        };
        let wz_ok = !matches!(axial, AxialMode::Uniform { wz: 0, .. });
        if wx == 0 || wy == 0 || !wz_ok {
            log::warn!(
                "support radius {} rounds to a zero-width stencil, skipping",
                alphaf
            );
            return None;
        }
        Some(Self {
            alphaf,
            wx,
            wy,
            axial,
        })
    }
}

/// Padded node range covered by a width-`w` stencil centred on column
/// coordinate `c`: `c - w/2 + even .. c + w/2 + even`, `even = 1 - w % 2`.
#[inline]
pub fn footprint(c: usize, w: usize) -> Range<isize> {
    let start = c as isize - (w / 2) as isize + (1 - w % 2) as isize;
    start..start + w as isize
}

/// Phase classes `(izero, jzero)` of a `wx * wy` stencil, in execution order.
pub fn phases(wx: usize, wy: usize) -> impl Iterator<Item = (usize, usize)> {
    (0..wx).flat_map(move |izero| (0..wy).map(move |jzero| (izero, jzero)))
}

/// Columns `(ii, jj)` of phase class `(izero, jzero)`, as the parallel
/// iterator the transfer runs on. Any two of them are at least `wx` apart
/// in x or `wy` apart in y.
pub fn phase_columns(
    izero: usize,
    jzero: usize,
    wx: usize,
    wy: usize,
    nxeff: usize,
    nyeff: usize,
) -> impl ParallelIterator<Item = (usize, usize)> {
    (izero..nxeff)
        .into_par_iter()
        .step_by(wx)
        .flat_map_iter(move |ii| (jzero..nyeff).step_by(wy).map(move |jj| (ii, jj)))
}

/// Read-only view of the particle fields the engine gathers from.
struct ParticleView<'a> {
    alphaf: &'a [f64],
    betaf: &'a [f64],
    normf: &'a [f64],
    wf: &'a [u16],
    xunwrap: &'a [f64],
    yunwrap: &'a [f64],
    zunwrap: &'a [f64],
    zoffset: &'a [usize],
    wfz: &'a [u16],
    pt_wts: &'a [f64],
    w_max: [usize; 3],
}

impl<'a> ParticleView<'a> {
    fn of(particles: &'a ParticleList) -> Self {
        Self {
            alphaf: &particles.alphaf,
            betaf: &particles.betaf,
            normf: &particles.normf,
            wf: &particles.wf,
            xunwrap: &particles.xunwrap,
            yunwrap: &particles.yunwrap,
            zunwrap: &particles.zunwrap,
            zoffset: &particles.zoffset,
            wfz: &particles.wfz,
            pt_wts: &particles.pt_wts,
            w_max: particles.w_max,
        }
    }
}

/// Padded grid extents and components.
#[derive(Clone, Copy)]
struct Dims {
    nxeff: usize,
    nyeff: usize,
    nzeff: usize,
    dof: usize,
}

impl Dims {
    fn of(grid: &Grid) -> Self {
        let (nxeff, nyeff, nzeff) = grid.extents();
        Self {
            nxeff,
            nyeff,
            nzeff,
            dof: grid.dof(),
        }
    }
}

/// Task-local scratch for one column. Dropped when the task ends.
struct ColumnWork {
    /// Matching particle indices.
    indices: Vec<usize>,
    /// Global node index of every subarray node, `wx * wy * nzeff`.
    subarray: Vec<usize>,
    /// First padded z index of each particle's window.
    zoffset: Vec<usize>,
    /// Axial width of each particle's window.
    wz: Vec<usize>,
    /// Axial quadrature weights, stride `w_max[2]` (per-particle mode only).
    pt_wts: Vec<f64>,
    /// Weight tensors, `kersz` per particle.
    delta: Vec<f64>,
    kersz: usize,
}

fn prepare_column<K: KernelShape + ?Sized>(
    kernel: &K,
    class: &WidthClass,
    view: &ParticleView<'_>,
    members: &[usize],
    dims: Dims,
    ii: usize,
    jj: usize,
) -> Option<ColumnWork> {
    let indices: Vec<usize> = members
        .iter()
        .copied()
        .filter(|&p| view.alphaf[p] == class.alphaf)
        .collect();
    if indices.is_empty() {
        return None;
    }
    let npts = indices.len();
    let (wx, wy) = (class.wx, class.wy);
    let w2 = wx * wy;

    // Footprint subarray, inner x, then y, outer z
    let xs = footprint(ii, wx);
    let ys = footprint(jj, wy);
    let mut subarray = Vec::with_capacity(w2 * dims.nzeff);
    debug_assert!(xs.start >= 0 && xs.end as usize <= dims.nxeff);
    debug_assert!(ys.start >= 0 && ys.end as usize <= dims.nyeff);
    for k in 0..dims.nzeff {
        for j3d in ys.clone() {
            for i3d in xs.clone() {
                let (i, j) = (i3d as usize, j3d as usize);
                subarray.push(i + dims.nxeff * (j + dims.nyeff * k));
            }
        }
    }

    let [sx, sy, sz] = view.w_max;
    let mut beta = vec![0.0; npts];
    let mut width = vec![0u16; npts];
    let mut norm = vec![0.0; npts];
    let mut xunwrap = vec![0.0; npts * sx];
    let mut yunwrap = vec![0.0; npts * sy];
    let mut zunwrap = vec![0.0; npts * sz];
    let mut zoffset = vec![0usize; npts];
    gather(&mut beta, view.betaf, &indices, 1);
    gather(&mut width, view.wf, &indices, 1);
    gather(&mut norm, view.normf, &indices, 1);
    gather(&mut xunwrap, view.xunwrap, &indices, sx);
    gather(&mut yunwrap, view.yunwrap, &indices, sy);
    gather(&mut zunwrap, view.zunwrap, &indices, sz);
    gather(&mut zoffset, view.zoffset, &indices, 1);

    let (wz, pt_wts) = match class.axial {
        AxialMode::Uniform { wz, .. } => (vec![wz; npts], Vec::new()),
        AxialMode::PerParticle { .. } => {
            let mut wfz = vec![0u16; npts];
            let mut pt_wts = vec![0.0; npts * sz];
            gather(&mut wfz, view.wfz, &indices, 1);
            gather(&mut pt_wts, view.pt_wts, &indices, sz);
            (wfz.into_iter().map(usize::from).collect(), pt_wts)
        }
    };
    let wz_max = wz.iter().copied().max().unwrap_or(0);
    let kersz = w2 * wz_max;

    let mut delta = vec![0.0; kersz * npts];
    let inputs = KernelInputs {
        beta: &beta,
        width: &width,
        norm: &norm,
        xunwrap: &xunwrap,
        yunwrap: &yunwrap,
        zunwrap: &zunwrap,
        strides: [sx, sy, sz],
    };
    evaluate_column(kernel, &mut delta, &inputs, class.alphaf, wx, wy, &wz, kersz);

    Some(ColumnWork {
        indices,
        subarray,
        zoffset,
        wz,
        pt_wts,
        delta,
        kersz,
    })
}

/// Run `task` on every non-empty column of `class`, phase by phase.
fn for_each_column<K, F>(
    kernel: &K,
    class: &WidthClass,
    view: &ParticleView<'_>,
    columns: &ColumnIndex,
    dims: Dims,
    task: F,
) where
    K: KernelShape + ?Sized,
    F: Fn(ColumnWork) + Sync,
{
    let (wx, wy) = (class.wx, class.wy);
    for (izero, jzero) in phases(wx, wy) {
        log::trace!("alphaf {} phase ({}, {})", class.alphaf, izero, jzero);
        phase_columns(izero, jzero, wx, wy, dims.nxeff, dims.nyeff).for_each(|(ii, jj)| {
            let members = columns.particles(jj + ii * dims.nyeff);
            if members.is_empty() {
                return;
            }
            if let Some(work) = prepare_column(kernel, class, view, members, dims, ii, jj) {
                task(work);
            }
        });
    }
}

/// Accumulate `quantity * weight` into the local subarray.
fn spread_col(local: &mut [f64], work: &ColumnWork, fp: &[f64], w2: usize, dof: usize) {
    for p in 0..work.indices.len() {
        let ker = &work.delta[p * work.kersz..(p + 1) * work.kersz];
        let f = &fp[p * dof..(p + 1) * dof];
        for k in 0..work.wz[p] {
            let plane = (work.zoffset[p] + k) * w2;
            for ij in 0..w2 {
                let weight = ker[k * w2 + ij];
                let node = &mut local[(plane + ij) * dof..(plane + ij + 1) * dof];
                for (g, &q) in node.iter_mut().zip(f) {
                    *g += q * weight;
                }
            }
        }
    }
}

/// Contract the local subarray with the weights into per-particle values.
fn interp_col(
    out: &mut [f64],
    local: &[f64],
    work: &ColumnWork,
    axial: AxialMode,
    wz_stride: usize,
    w2: usize,
    dof: usize,
) {
    for p in 0..work.indices.len() {
        let ker = &work.delta[p * work.kersz..(p + 1) * work.kersz];
        let u = &mut out[p * dof..(p + 1) * dof];
        for k in 0..work.wz[p] {
            let quad = match axial {
                AxialMode::Uniform { cell_volume, .. } => cell_volume,
                AxialMode::PerParticle { area } => area * work.pt_wts[p * wz_stride + k],
            };
            let plane = (work.zoffset[p] + k) * w2;
            for ij in 0..w2 {
                let weight = ker[k * w2 + ij] * quad;
                let node = &local[(plane + ij) * dof..(plane + ij + 1) * dof];
                for (v, &g) in u.iter_mut().zip(node) {
                    *v += g * weight;
                }
            }
        }
    }
}

/// Spread every particle's quantity onto `grid`, accumulating into the field.
pub(crate) fn spread_classes<K: KernelShape + ?Sized>(
    kernel: &K,
    particles: &ParticleList,
    grid: &mut Grid,
) {
    let dims = Dims::of(grid);
    let view = ParticleView::of(particles);
    let quantities = &particles.quantities;

    for &alphaf in &particles.unique_alphaf {
        let Some(class) = WidthClass::new(alphaf, grid) else {
            continue;
        };
        log::debug!(
            "spread alphaf {} with {}x{} stencil ({:?})",
            alphaf,
            class.wx,
            class.wy,
            class.axial
        );
        let w2 = class.wx * class.wy;
        let subsz = w2 * dims.nzeff;
        let columns = &grid.columns;
        let field = DisjointSlice::new(&mut grid.field);

        for_each_column(kernel, &class, &view, columns, dims, |work| {
            let mut fp = vec![0.0; work.indices.len() * dims.dof];
            gather(&mut fp, quantities, &work.indices, dims.dof);

            let mut local = vec![0.0; subsz * dims.dof];
            spread_col(&mut local, &work, &fp, w2, dims.dof);

            // Safety: footprints of columns in one phase class are disjoint,
            // and phases are separated by the end of the parallel loop.
            unsafe { field.scatter_add(&local, &work.subarray, dims.dof) };
        });
    }
}

/// Overwrite every particle's quantity with the kernel-weighted grid values.
pub(crate) fn interpolate_classes<K: KernelShape + ?Sized>(
    kernel: &K,
    particles: &mut ParticleList,
    grid: &Grid,
) {
    let dims = Dims::of(grid);
    // The quantity buffer is written while every other field is read
    let mut quantities = std::mem::take(&mut particles.quantities);
    {
        let view = ParticleView::of(particles);
        let out = DisjointSlice::new(&mut quantities);
        let wz_stride = view.w_max[2];

        for &alphaf in &particles.unique_alphaf {
            let Some(class) = WidthClass::new(alphaf, grid) else {
                continue;
            };
            log::debug!(
                "interpolate alphaf {} with {}x{} stencil ({:?})",
                alphaf,
                class.wx,
                class.wy,
                class.axial
            );
            let w2 = class.wx * class.wy;
            let subsz = w2 * dims.nzeff;

            for_each_column(kernel, &class, &view, &grid.columns, dims, |work| {
                let mut local = vec![0.0; subsz * dims.dof];
                gather(&mut local, &grid.field, &work.subarray, dims.dof);

                let mut fp = vec![0.0; work.indices.len() * dims.dof];
                interp_col(&mut fp, &local, &work, class.axial, wz_stride, w2, dims.dof);

                // Safety: each particle sits in exactly one column and one class.
                unsafe { out.scatter(&fp, &work.indices, dims.dof) };
            });
        }
    }
    particles.quantities = quantities;
}

/// Spread with one axial width per class (uniform z).
pub fn spread_unif_z<K: KernelShape + ?Sized>(
    kernel: &K,
    particles: &ParticleList,
    grid: &mut Grid,
) {
    debug_assert!(grid.unif_z());
    spread_classes(kernel, particles, grid);
}

/// Spread with per-particle axial widths (non-uniform z).
pub fn spread_non_unif_z<K: KernelShape + ?Sized>(
    kernel: &K,
    particles: &ParticleList,
    grid: &mut Grid,
) {
    debug_assert!(!grid.unif_z());
    spread_classes(kernel, particles, grid);
}

/// Interpolate weighting by the uniform cell volume.
pub fn interp_unif_z<K: KernelShape + ?Sized>(
    kernel: &K,
    particles: &mut ParticleList,
    grid: &Grid,
) {
    debug_assert!(grid.unif_z());
    interpolate_classes(kernel, particles, grid);
}

/// Interpolate weighting by per-particle axial quadrature weights.
pub fn interp_non_unif_z<K: KernelShape + ?Sized>(
    kernel: &K,
    particles: &mut ParticleList,
    grid: &Grid,
) {
    debug_assert!(!grid.unif_z());
    interpolate_classes(kernel, particles, grid);
}
