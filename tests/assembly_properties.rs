mod util;

use proptest::prelude::*;
use tile_combine::prelude::*;
use util::*;

/// Global shape plus a per-axis part count that fits it.
fn grid() -> impl Strategy<Value = (Shape3, Shape3)> {
    prop::array::uniform3(1usize..7).prop_flat_map(|shape| {
        let parts = (1..=shape[0], 1..=shape[1], 1..=shape[2]);
        (Just(shape), parts.prop_map(|(a, b, c)| [a, b, c]))
    })
}

fn cut(
    shape: Shape3,
    parts: Shape3,
    ghost: usize,
    fill: GhostFill,
) -> (ndarray::Array3<f64>, TilePlan, Vec<Vec<f64>>) {
    let global = ramp(shape, -3.0);
    let tiles = block_decomposition(shape, parts, ghost).unwrap();
    let buffers = tiles
        .iter()
        .map(|(rank, d)| pad_tile(rank, global.view(), d, fill).unwrap())
        .collect();
    (global, TilePlan::new(shape, tiles).unwrap(), buffers)
}

proptest! {
    #[test]
    fn decomposition_round_trips((shape, parts) in grid(), ghost in 0usize..3) {
        let fill = GhostFill::Neighbours { outside: f64::NAN };
        let (global, plan, buffers) = cut(shape, parts, ghost, fill);
        let field = GridAssembler::new(&plan).assemble_field(&buffers).unwrap();
        prop_assert_eq!(field.into_array(), global);
    }

    #[test]
    fn ghost_values_never_leak((shape, parts) in grid(), ghost in 0usize..4) {
        let (_, plan, buffers) = cut(shape, parts, ghost, GhostFill::Constant(9.5e9));
        let field = GridAssembler::new(&plan).assemble_field(&buffers).unwrap();
        prop_assert!(field.view().iter().all(|&v| v != 9.5e9));
    }

    #[test]
    fn parallel_copy_matches_serial((shape, parts) in grid(), ghost in 0usize..3) {
        let (_, plan, buffers) = cut(shape, parts, ghost, GhostFill::Constant(0.0));
        let serial = GridAssembler::new(&plan).assemble_field(&buffers).unwrap();
        let parallel = GridAssembler::new(&plan)
            .with_parallel_copy(true)
            .assemble_field(&buffers)
            .unwrap();
        prop_assert_eq!(serial, parallel);
    }

    #[test]
    fn dropping_a_tile_is_a_gap((shape, parts) in grid(), pick in any::<prop::sample::Index>()) {
        prop_assume!(parts.iter().product::<usize>() > 1);
        let mut tiles = block_decomposition(shape, parts, 1).unwrap();
        let (_, missing) = tiles.remove(pick.index(tiles.len()));
        match TilePlan::new(shape, tiles) {
            Err(CombineError::IncompleteCoverage { region, unwritten }) => {
                prop_assert_eq!(unwritten, missing.global_window().volume());
                prop_assert_eq!(region, missing.global_window());
            }
            other => prop_assert!(false, "expected a gap, got {:?}", other),
        }
    }
}
