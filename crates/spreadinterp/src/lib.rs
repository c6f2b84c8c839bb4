//! Kernel spreading and interpolation between Lagrangian particles and a
//! padded Eulerian grid.
//!
//! - [`spread`]: accumulate each particle's quantity onto nearby grid nodes
//!   through a compact-support kernel
//! - [`interpolate`]: the adjoint, overwriting each particle's quantity with
//!   the kernel-weighted, quadrature-weighted sum of grid values
//!
//! The grid is periodic in x and y. Along z it is either uniform and
//! periodic, or given by explicit node coordinates and bounded.
//!
//! Column tasks run on the rayon pool. Within a phase class no two tasks
//! touch the same grid node, so the grid is written without locks.
//!
//! ```
//! use spreadinterp::{
//!     boundary, constants::ES_W6, interpolate, spread, DVec3, Grid, GridConfig, KernelParams,
//!     ParticleList,
//! };
//!
//! let h = 0.25;
//! let mut grid = Grid::new(GridConfig::uniform([16, 16, 16], [h; 3], 1, ES_W6.alpha(h)))?;
//! let kernel = KernelParams::from_preset(ES_W6, h);
//! let mut particles = ParticleList::new(
//!     vec![DVec3::new(1.1, 2.2, 3.3), DVec3::new(0.4, 3.9, 2.0)],
//!     vec![1.0, 2.0],
//!     vec![kernel; 2],
//!     1,
//! )?;
//! particles.locate(&mut grid)?;
//!
//! spread(&particles, &mut grid)?;
//! boundary::fold_periodic(&mut grid);
//! let mass: f64 = grid.component_sums()[0] * h * h * h;
//! assert!((mass - 3.0).abs() < 0.05);
//!
//! boundary::fill_periodic(&mut grid);
//! interpolate(&mut particles, &grid)?;
//! # Ok::<(), spreadinterp::SetupError>(())
//! ```

pub mod boundary;
pub mod column_index;
pub mod constants;
pub mod error;
pub mod gather;
pub mod grid;
pub mod kernel;
pub mod particle;
pub mod transfer;

pub use column_index::ColumnIndex;
pub use error::SetupError;
pub use glam::DVec3;
pub use grid::{AxialSpacing, Grid, GridConfig};
pub use kernel::{EsKernel, KernelShape};
pub use particle::{KernelParams, ParticleList};

/// Preconditions shared by both transfer directions.
fn check_ready(particles: &ParticleList, grid: &Grid) -> Result<(), SetupError> {
    if particles.dof() != grid.dof() {
        return Err(SetupError::DofMismatch {
            particles: particles.dof(),
            grid: grid.dof(),
        });
    }
    if !particles.is_located_on(grid) || grid.columns().particle_count() != particles.len() {
        return Err(SetupError::NotLocated);
    }
    Ok(())
}

/// Spread particle quantities onto the grid with the exponential-of-semicircle
/// kernel. Contributions are added to the field as it stands.
pub fn spread(particles: &ParticleList, grid: &mut Grid) -> Result<(), SetupError> {
    spread_with(&EsKernel, particles, grid)
}

/// Spread with a caller-supplied kernel shape.
pub fn spread_with<K: KernelShape + ?Sized>(
    kernel: &K,
    particles: &ParticleList,
    grid: &mut Grid,
) -> Result<(), SetupError> {
    check_ready(particles, grid)?;
    if grid.unif_z() {
        transfer::spread_unif_z(kernel, particles, grid);
    } else {
        transfer::spread_non_unif_z(kernel, particles, grid);
    }
    Ok(())
}

/// Interpolate grid values onto the particles with the
/// exponential-of-semicircle kernel, overwriting their quantities.
pub fn interpolate(particles: &mut ParticleList, grid: &Grid) -> Result<(), SetupError> {
    interpolate_with(&EsKernel, particles, grid)
}

/// Interpolate with a caller-supplied kernel shape.
pub fn interpolate_with<K: KernelShape + ?Sized>(
    kernel: &K,
    particles: &mut ParticleList,
    grid: &Grid,
) -> Result<(), SetupError> {
    check_ready(particles, grid)?;
    if grid.unif_z() {
        transfer::interp_unif_z(kernel, particles, grid);
    } else {
        transfer::interp_non_unif_z(kernel, particles, grid);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::ES_W4;

    fn grid_and_particle(dof: usize) -> (Grid, ParticleList) {
        let grid = Grid::new(GridConfig::uniform([8, 8, 8], [1.0; 3], 1, 2.0)).unwrap();
        let list = ParticleList::new(
            vec![DVec3::splat(3.3)],
            vec![1.0; dof],
            vec![KernelParams::from_preset(ES_W4, 1.0)],
            dof,
        )
        .unwrap();
        (grid, list)
    }

    #[test]
    fn test_spread_requires_locate() {
        let (mut grid, list) = grid_and_particle(1);
        assert_eq!(spread(&list, &mut grid), Err(SetupError::NotLocated));
    }

    #[test]
    fn test_dof_mismatch() {
        let (mut grid, mut list) = grid_and_particle(2);
        list.locate(&mut grid).unwrap();
        assert!(matches!(
            interpolate(&mut list, &grid),
            Err(SetupError::DofMismatch {
                particles: 2,
                grid: 1
            })
        ));
    }

    #[test]
    fn test_stale_location_after_regrid() {
        let (mut grid, mut list) = grid_and_particle(1);
        list.locate(&mut grid).unwrap();
        let mut other = Grid::new(GridConfig::uniform([8, 8, 8], [1.0; 3], 1, 2.0)).unwrap();
        // Same extents but the other grid never indexed these particles
        assert_eq!(spread(&list, &mut other), Err(SetupError::NotLocated));
    }

    #[test]
    fn test_spread_leaves_particles_untouched() {
        let (mut grid, mut list) = grid_and_particle(1);
        list.locate(&mut grid).unwrap();
        let before = list.clone();
        spread(&list, &mut grid).unwrap();
        assert_eq!(list.quantities(), before.quantities());
        assert!(grid.component_sums()[0] > 0.0);
    }

    #[test]
    fn test_locating_another_list_invalidates_transfer() {
        let (mut grid, mut first) = grid_and_particle(1);
        let (_, mut second) = grid_and_particle(1);
        second.set_positions(vec![DVec3::splat(6.5)]).unwrap();
        first.locate(&mut grid).unwrap();
        second.locate(&mut grid).unwrap();

        // The grid now buckets the second list; the first must not reuse it
        assert_eq!(spread(&first, &mut grid), Err(SetupError::NotLocated));
        assert_eq!(interpolate(&mut first, &grid), Err(SetupError::NotLocated));
        spread(&second, &mut grid).unwrap();
    }

    #[test]
    fn test_imported_column_index_is_checked_against_padding() {
        let (mut grid, mut list) = grid_and_particle(1);
        list.locate(&mut grid).unwrap();
        let (firstn, nextn, number) = grid.columns().to_linked_lists();

        // Move the particle's bucket to the padded corner column
        let corner = grid.column_id(0, 0);
        let mut heads = vec![crate::constants::EMPTY; firstn.len()];
        let mut counts = vec![0; number.len()];
        heads[corner] = 0;
        counts[corner] = 1;
        let bad = ColumnIndex::from_linked_lists(&heads, &nextn, &counts).unwrap();
        assert!(matches!(grid.set_columns(bad), Err(SetupError::ColumnIndex(_))));

        // The located index survives and a faithful re-import is accepted
        let good = ColumnIndex::from_linked_lists(&firstn, &nextn, &number).unwrap();
        grid.set_columns(good).unwrap();
        spread(&list, &mut grid).unwrap();
        assert!(grid.field().iter().all(|v| v.is_finite()));
        assert!(grid.component_sums()[0] > 0.0);
    }
}
