use rand::Rng;
use rand_distr::{Normal, Distribution};
use rayon::prelude::*;
use serde::{Serialize, Deserialize};

/// Row-major 2D matrix of `f32`, `shape = [rows, cols]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tensor {
    pub shape: [usize; 2],
    data: Vec<f32>,
}

impl Tensor {
    pub fn zeros(rows: usize, cols: usize) -> Self {
        Self {
            shape: [rows, cols],
            data: vec![0.0; rows * cols],
        }
    }

    /// He-normal initialization, `std = sqrt(2 / fan_in)` with `fan_in = rows`.
    pub fn he_normal<R: Rng + ?Sized>(rows: usize, cols: usize, rng: &mut R) -> Self {
        let std = (2.0 / rows.max(1) as f32).sqrt();
        let normal = Normal::new(0.0, std).expect("std is finite and positive");
        let data = (0..rows * cols).map(|_| normal.sample(&mut *rng)).collect();
        Self {
            shape: [rows, cols],
            data,
        }
    }

    pub fn from_vec(data: Vec<f32>, rows: usize, cols: usize) -> Self {
        assert_eq!(data.len(), rows * cols, "data length does not match shape");
        Self {
            shape: [rows, cols],
            data,
        }
    }

    /// Stacks equally sized rows into one matrix.
    pub fn from_rows<T: AsRef<[f32]>>(rows: &[T]) -> Self {
        let cols = rows.first().map_or(0, |r| r.as_ref().len());
        let mut data = Vec::with_capacity(rows.len() * cols);
        for row in rows {
            assert_eq!(row.as_ref().len(), cols, "rows must have equal length");
            data.extend_from_slice(row.as_ref());
        }
        Self::from_vec(data, rows.len(), cols)
    }

    pub fn rows(&self) -> usize {self.shape[0]}
    pub fn cols(&self) -> usize {self.shape[1]}
    pub fn data(&self) -> &[f32] {&self.data}
    pub fn data_mut(&mut self) -> &mut [f32] {&mut self.data}

    pub fn row(&self, index: usize) -> &[f32] {
        let cols = self.cols();
        &self.data[index * cols..(index + 1) * cols]
    }

    pub fn transpose(&self) -> Self {
        let (m, n) = (self.rows(), self.cols());
        let mut out = vec![0.0; m * n];
        for i in 0..m {
            for j in 0..n {
                out[j * m + i] = self.data[i * n + j];
            }
        }
        Self::from_vec(out, n, m)
    }

    pub fn matmul(&self, other: &Tensor) -> Tensor {
        assert_eq!(self.cols(), other.rows(), "self columns must equal other rows");

        let k = self.cols();
        let n = other.cols();
        let mut c = Tensor::zeros(self.rows(), n);
        if n == 0 {
            return c;
        }

        let a = &self.data;
        let b = &other.data;

        // parallelize over output rows
        c.data.par_chunks_mut(n).enumerate().for_each(|(m_idx, c_row)| {
            for k_idx in 0..k {
                let a_val = a[m_idx * k + k_idx];
                let b_row = &b[k_idx * n..(k_idx + 1) * n];
                for (c_val, &b_val) in c_row.iter_mut().zip(b_row) {
                    *c_val += a_val * b_val;
                }
            }
        });

        c
    }

    /// Adds a `[1, cols]` row to every row.
    pub fn add_row(&mut self, row: &Tensor) {
        assert_eq!(row.shape, [1, self.cols()], "row must be [1, cols]");
        let cols = self.cols();
        if cols == 0 {
            return;
        }
        self.data.par_chunks_mut(cols).for_each(|chunk| {
            for (x, &b) in chunk.iter_mut().zip(&row.data) {
                *x += b;
            }
        });
    }

    /// Column sums as a `[1, cols]` row.
    pub fn sum_rows(&self) -> Tensor {
        let cols = self.cols();
        let mut out = vec![0.0; cols];
        if cols > 0 {
            for chunk in self.data.chunks(cols) {
                for (acc, &x) in out.iter_mut().zip(chunk) {
                    *acc += x;
                }
            }
        }
        Self::from_vec(out, 1, cols)
    }

    pub fn map<F>(&self, f: F) -> Tensor
    where F: Fn(f32) -> f32 + Sync + Send {
        let data = self.data.par_iter().map(|&x| f(x)).collect();
        Self { shape: self.shape, data }
    }

    // map through self allowing access to second tensor
    pub fn map2<F>(&self, other: &Tensor, f: F) -> Tensor
    where F: Fn(f32, f32) -> f32 + Sync + Send {
        assert_eq!(self.shape, other.shape, "tensors must have the same shape");
        let data = self.data.par_iter().zip(other.data.par_iter()).map(|(&x, &y)| f(x, y)).collect();
        Self { shape: self.shape, data }
    }

    pub fn scale(&mut self, factor: f32) {
        self.data.iter_mut().for_each(|x| *x *= factor);
    }

    pub fn squared_norm(&self) -> f32 {
        self.data.iter().map(|x| x * x).sum()
    }
}
