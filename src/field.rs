//! Assembled global arrays and the coordinate axes they live on.

use crate::combine_error::CombineError;
use crate::rank::RankId;
use crate::tile::Shape3;
use ndarray::{Array1, Array3, ArrayView3};

/// Cell-centre coordinates of the global grid, one vector per axis.
#[derive(Clone, Debug, Default, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Axes {
    pub x: Vec<f64>,
    pub y: Vec<f64>,
    pub z: Vec<f64>,
}

impl Axes {
    pub fn new(x: Vec<f64>, y: Vec<f64>, z: Vec<f64>) -> Self {
        Axes { x, y, z }
    }

    /// Evenly spaced cell centres `(i + 0.5) * spacing` for a grid of `shape`.
    pub fn uniform(shape: Shape3, spacing: [f64; 3]) -> Self {
        let centres = |n: usize, dx: f64| -> Vec<f64> {
            Array1::range(0.0, n as f64, 1.0)
                .mapv(|i| (i + 0.5) * dx)
                .to_vec()
        };
        Axes {
            x: centres(shape[0], spacing[0]),
            y: centres(shape[1], spacing[1]),
            z: centres(shape[2], spacing[2]),
        }
    }

    /// Lengths of the three axes.
    #[inline]
    pub fn shape(&self) -> Shape3 {
        [self.x.len(), self.y.len(), self.z.len()]
    }

    /// Check that the axes span a grid of `shape`.
    pub fn check_shape(&self, rank: &RankId, shape: Shape3) -> Result<(), CombineError> {
        if self.shape() != shape {
            return Err(CombineError::ShapeMismatch {
                rank: rank.clone(),
                expected: shape.to_vec(),
                found: self.shape().to_vec(),
            });
        }
        Ok(())
    }
}

/// One field's fully assembled global array (row-major `f64`).
#[derive(Clone, Debug, PartialEq)]
pub struct GlobalField {
    data: Array3<f64>,
}

impl GlobalField {
    /// Zero-initialised field of `shape`.
    pub(crate) fn zeros(shape: Shape3) -> Self {
        GlobalField {
            data: Array3::zeros(shape),
        }
    }

    /// Wraps an existing array, e.g. one read back from an output container.
    pub fn from_array(data: Array3<f64>) -> Self {
        GlobalField { data }
    }

    /// Build from a flat row-major vector.
    ///
    /// # Errors
    /// `SinkWriteFailure` if `values.len()` does not match `shape`.
    pub fn from_shape_vec(shape: Shape3, values: Vec<f64>) -> Result<Self, CombineError> {
        Array3::from_shape_vec(shape, values)
            .map(|data| GlobalField { data })
            .map_err(|e| CombineError::sink_write(None, e))
    }

    #[inline]
    pub fn shape(&self) -> Shape3 {
        let s = self.data.shape();
        [s[0], s[1], s[2]]
    }

    #[inline]
    pub fn view(&self) -> ArrayView3<'_, f64> {
        self.data.view()
    }

    #[inline]
    pub(crate) fn array_mut(&mut self) -> &mut Array3<f64> {
        &mut self.data
    }

    pub fn into_array(self) -> Array3<f64> {
        self.data
    }

    /// Value at global cell `(i, j, k)`.
    #[inline]
    pub fn get(&self, cell: Shape3) -> Option<f64> {
        self.data.get(cell).copied()
    }

    /// Values in row-major order, as written to output containers.
    pub fn to_row_major_vec(&self) -> Vec<f64> {
        self.data.iter().copied().collect()
    }
}

static_assertions::assert_impl_all!(GlobalField: Send, Sync);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn uniform_axes_are_cell_centred() {
        let axes = Axes::uniform([2, 3, 1], [1.0, 0.5, 2.0]);
        assert_eq!(axes.x, vec![0.5, 1.5]);
        assert_eq!(axes.y, vec![0.25, 0.75, 1.25]);
        assert_eq!(axes.z, vec![1.0]);
        assert_eq!(axes.shape(), [2, 3, 1]);
    }

    #[test]
    fn axes_shape_mismatch_names_rank() {
        let axes = Axes::uniform([2, 2, 2], [1.0; 3]);
        let err = axes.check_shape(&RankId::from("0"), [2, 2, 3]).unwrap_err();
        assert_eq!(err.rank(), Some(&RankId::from("0")));
    }

    #[test]
    fn row_major_order_is_last_axis_fastest() {
        let f = GlobalField::from_shape_vec([1, 2, 2], vec![0.0, 1.0, 2.0, 3.0]).unwrap();
        assert_eq!(f.get([0, 1, 0]), Some(2.0));
        assert_eq!(f.to_row_major_vec(), vec![0.0, 1.0, 2.0, 3.0]);
        assert!(GlobalField::from_shape_vec([2, 2, 2], vec![0.0; 3]).is_err());
    }
}
