#![allow(dead_code)]
use ndarray::{Array3, s};
use std::path::Path;
use tile_combine::prelude::*;

pub fn rid(name: &str) -> RankId {
    RankId::from(name)
}

/// Global field whose cells all hold distinct values.
pub fn ramp(shape: Shape3, offset: f64) -> Array3<f64> {
    Array3::from_shape_fn(shape, |(i, j, k)| {
        offset + (i * shape[1] * shape[2] + j * shape[2] + k) as f64
    })
}

/// Write one `<rank>.json` file per tile holding every given field.
pub fn write_rank_files(
    dir: &Path,
    tiles: &[(RankId, TileDescriptor)],
    fields: &[(&str, &Array3<f64>)],
    fill: GhostFill,
) {
    let axes = Axes::uniform(tiles[0].1.global_shape(), [0.25, 0.5, 1.0]);
    for (rank, descriptor) in tiles {
        let mut file = RankFile::new(descriptor, &axes);
        for (name, global) in fields {
            file = file.with_field(*name, pad_tile(rank, global.view(), descriptor, fill).unwrap());
        }
        file.write_to(dir.join(format!("{rank}.json"))).unwrap();
    }
}

/// Two ranks with `ng = 1` and (2,2,2) interiors at (0,0,0) and (2,0,0) in a
/// (4,2,2) grid. Interiors hold 1.0 and 2.0, every ghost cell holds 9.0.
pub fn write_two_rank_ghost_fixture(dir: &Path) {
    let global = [4, 2, 2];
    let axes = Axes::uniform(global, [1.0; 3]);
    for (n, (offset, value)) in [([0, 0, 0], 1.0), ([2, 0, 0], 2.0)].into_iter().enumerate() {
        let rank = rid(&n.to_string());
        let d = TileDescriptor::new(&rank, [2, 2, 2], 1, offset, global).unwrap();
        let mut padded = Array3::from_elem(d.padded_shape(), 9.0);
        padded.slice_mut(s![1..3, 1..3, 1..3]).fill(value);
        RankFile::new(&d, &axes)
            .with_field("T", padded.into_raw_vec())
            .write_to(dir.join(format!("{n}.json")))
            .unwrap();
    }
}

/// Combine `fields_dir` into `out_dir` with JSON rank files and output.
pub fn combine_json(
    fields_dir: &Path,
    out_dir: &Path,
    config: CombineConfig,
) -> Result<CombineReport, CombineError> {
    FieldCombiner::new(JsonRankSource::new(fields_dir), JsonSink::new(), config).combine(out_dir)
}
