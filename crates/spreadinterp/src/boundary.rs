//! Periodic ghost-node exchange.
//!
//! Spreading writes into the ghost layers around the physical domain.
//! [`fold_periodic`] moves those contributions onto their periodic images;
//! [`fill_periodic`] does the reverse copy so interpolation stencils near the
//! domain edge read the wrapped field. A bounded (non-uniform) z axis is
//! left alone.

use crate::grid::Grid;

/// Physical index a padded index maps to on a periodic axis of `n` nodes.
#[inline]
fn image(c: usize, pad: usize, n: usize) -> usize {
    pad + (c as isize - pad as isize).rem_euclid(n as isize) as usize
}

/// Periodic axes of `grid` as `(axis, pad, n)`.
fn periodic_axes(grid: &Grid) -> Vec<(usize, usize, usize)> {
    let cfg = grid.config();
    let pad = grid.padding();
    let mut axes = vec![(0, pad[0], cfg.nx), (1, pad[1], cfg.ny)];
    if grid.unif_z() {
        axes.push((2, pad[2], cfg.nz));
    }
    axes
}

/// Visit every padded node whose coordinate on `axis` is a ghost, with its
/// flat index and the flat index of its image.
fn for_each_ghost<F>(grid: &Grid, axis: usize, pad: usize, n: usize, mut f: F)
where
    F: FnMut(usize, usize),
{
    let (nxeff, nyeff, nzeff) = grid.extents();
    let stride = [1, nxeff, nxeff * nyeff][axis];
    for k in 0..nzeff {
        for j in 0..nyeff {
            for i in 0..nxeff {
                let c = [i, j, k][axis];
                if c >= pad && c < pad + n {
                    continue;
                }
                let node = grid.node_index(i, j, k);
                let target = node - c * stride + image(c, pad, n) * stride;
                f(node, target);
            }
        }
    }
}

/// Add every ghost node into its periodic image and zero the ghosts.
pub fn fold_periodic(grid: &mut Grid) {
    let dof = grid.dof();
    for (axis, pad, n) in periodic_axes(grid) {
        let mut moves = Vec::new();
        for_each_ghost(grid, axis, pad, n, |node, target| moves.push((node, target)));
        let field = grid.field_mut();
        for (node, target) in moves {
            for d in 0..dof {
                let v = std::mem::take(&mut field[node * dof + d]);
                field[target * dof + d] += v;
            }
        }
    }
    log::trace!("folded ghost layers");
}

/// Overwrite every ghost node with its periodic image.
pub fn fill_periodic(grid: &mut Grid) {
    let dof = grid.dof();
    for (axis, pad, n) in periodic_axes(grid) {
        let mut copies = Vec::new();
        for_each_ghost(grid, axis, pad, n, |node, source| copies.push((node, source)));
        let field = grid.field_mut();
        for (node, source) in copies {
            field.copy_within(source * dof..(source + 1) * dof, node * dof);
        }
    }
    log::trace!("filled ghost layers");
}
