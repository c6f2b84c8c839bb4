//! Property-based tests for the phase-class column schedule using proptest
//!
//! These tests verify the invariants the lock-free transfer relies on:
//! - Columns of one phase class have pairwise disjoint stencil footprints
//! - Every column belongs to exactly one phase class
//! - Parallel spreading matches a single-threaded run bit for bit

use proptest::prelude::*;
use rayon::prelude::*;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use spreadinterp::transfer::{footprint, phase_columns, phases};
use spreadinterp::{spread, DVec3, Grid, GridConfig, KernelParams, ParticleList};

fn overlaps(a: &std::ops::Range<isize>, b: &std::ops::Range<isize>) -> bool {
    a.start < b.end && b.start < a.end
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn same_phase_footprints_are_disjoint(
        nxeff in 4usize..40,
        nyeff in 4usize..40,
        wx in 1usize..9,
        wy in 1usize..9,
        izero_seed in 0usize..64,
        jzero_seed in 0usize..64,
    ) {
        let (izero, jzero) = (izero_seed % wx, jzero_seed % wy);
        let cols: Vec<(usize, usize)> =
            phase_columns(izero, jzero, wx, wy, nxeff, nyeff).collect();
        for (a, &(ia, ja)) in cols.iter().enumerate() {
            for &(ib, jb) in &cols[a + 1..] {
                let x_hit = overlaps(&footprint(ia, wx), &footprint(ib, wx));
                let y_hit = overlaps(&footprint(ja, wy), &footprint(jb, wy));
                prop_assert!(
                    !(x_hit && y_hit),
                    "columns ({}, {}) and ({}, {}) share nodes with w = ({}, {})",
                    ia, ja, ib, jb, wx, wy
                );
            }
        }
    }

    #[test]
    fn phase_classes_cover_each_column_once(
        nxeff in 1usize..30,
        nyeff in 1usize..30,
        wx in 1usize..8,
        wy in 1usize..8,
    ) {
        let mut hits = vec![0u8; nxeff * nyeff];
        for (izero, jzero) in phases(wx, wy) {
            let cols: Vec<(usize, usize)> =
                phase_columns(izero, jzero, wx, wy, nxeff, nyeff).collect();
            for (ii, jj) in cols {
                hits[jj + ii * nyeff] += 1;
            }
        }
        prop_assert!(hits.iter().all(|&h| h == 1));
    }

    #[test]
    fn footprint_has_stencil_width(c in 8usize..100, w in 1usize..12) {
        let range = footprint(c, w);
        prop_assert_eq!((range.end - range.start) as usize, w);
        // Even stencils lean right of the anchor node, odd ones are centred
        prop_assert!(range.contains(&(c as isize)));
        prop_assert_eq!(c as isize - range.start, (w / 2) as isize - (1 - w % 2) as isize);
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(8))]

    #[test]
    fn parallel_spread_matches_single_thread(
        seed in any::<u64>(),
        count in 1usize..120,
        width in 3u16..7,
    ) {
        let h = 0.25;
        let n = 12;
        let kernel = KernelParams { width, beta: 1.8, alphaf: 0.5 * width as f64 * h };
        let mut grid = Grid::new(GridConfig::uniform([n; 3], [h; 3], 2, kernel.alphaf)).unwrap();

        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        let l = n as f64 * h;
        let positions: Vec<DVec3> = (0..count)
            .map(|_| {
                DVec3::new(rng.gen_range(0.0..l), rng.gen_range(0.0..l), rng.gen_range(0.0..l))
            })
            .collect();
        let quantities: Vec<f64> = (0..count * 2).map(|_| rng.gen_range(-1.0..1.0)).collect();
        let mut particles =
            ParticleList::new(positions, quantities, vec![kernel; count], 2).unwrap();
        particles.locate(&mut grid).unwrap();

        let mut serial = grid.clone();
        let pool = rayon::ThreadPoolBuilder::new().num_threads(1).build().unwrap();
        pool.install(|| spread(&particles, &mut serial)).unwrap();
        spread(&particles, &mut grid).unwrap();

        prop_assert_eq!(grid.field(), serial.field());
    }
}
