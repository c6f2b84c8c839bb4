//! Spread a random particle cloud onto a grid, fold the ghosts, then
//! interpolate a smooth field back onto the particles.
//!
//! Run with: RUST_LOG=debug cargo run --example spread_interp_demo
//! Optional first argument: path to a JSON grid config.

use std::time::Instant;

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use spreadinterp::boundary::{fill_periodic, fold_periodic};
use spreadinterp::constants::{ES_W4, ES_W6};
use spreadinterp::{interpolate, spread, DVec3, Grid, GridConfig, KernelParams, ParticleList};

const PARTICLES: usize = 20_000;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    let h = 1.0 / 64.0;
    let config = match std::env::args().nth(1) {
        Some(path) => GridConfig::from_json(&std::fs::read_to_string(path)?)?,
        None => GridConfig::uniform([64; 3], [h; 3], 3, ES_W6.alpha(h)),
    };
    log::info!("grid config:\n{}", config.to_json()?);
    let mut grid = Grid::new(config)?;

    let lx = grid.config().nx as f64 * grid.hx();
    let ly = grid.config().ny as f64 * grid.hy();
    let (z_lo, z_hi) = match grid.axial() {
        spreadinterp::AxialSpacing::Uniform { hz } => (0.0, grid.config().nz as f64 * hz),
        spreadinterp::AxialSpacing::NonUniform { zpts, .. } => (zpts[0], zpts[zpts.len() - 1]),
    };

    let mut rng = ChaCha8Rng::seed_from_u64(2024);
    let positions: Vec<DVec3> = (0..PARTICLES)
        .map(|_| {
            DVec3::new(
                rng.gen_range(0.0..lx),
                rng.gen_range(0.0..ly),
                rng.gen_range(z_lo..z_hi),
            )
        })
        .collect();
    let dof = grid.dof();
    let quantities: Vec<f64> = (0..PARTICLES * dof).map(|_| rng.gen_range(0.0..1.0)).collect();
    let kernels: Vec<KernelParams> = (0..PARTICLES)
        .map(|p| {
            let preset = if p % 2 == 0 { ES_W4 } else { ES_W6 };
            KernelParams::from_preset(preset, grid.hx())
        })
        .collect();

    let mut particles = ParticleList::new(positions, quantities, kernels, dof)?;
    particles.locate(&mut grid)?;

    let start = Instant::now();
    spread(&particles, &mut grid)?;
    fold_periodic(&mut grid);
    log::info!("spread {} particles in {:?}", PARTICLES, start.elapsed());

    if let Some(cell) = grid.cell_volume() {
        let mass: Vec<f64> = grid.component_sums().iter().map(|s| s * cell).collect();
        log::info!("grid mass per component: {:?}", mass);
    }

    let wave = std::f64::consts::TAU / lx;
    grid.set_field_from_fn(|x, _, _, d| (wave * x).sin() + d as f64);
    fill_periodic(&mut grid);

    let start = Instant::now();
    interpolate(&mut particles, &grid)?;
    log::info!("interpolated onto {} particles in {:?}", PARTICLES, start.elapsed());

    for p in 0..3 {
        println!(
            "particle {} at {:?}: {:?}",
            p,
            particles.positions()[p],
            particles.quantity(p)
        );
    }
    Ok(())
}
