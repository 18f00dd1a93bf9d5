//! Sparse matrix storage and a Jacobi-preconditioned conjugate gradient solver.
//!
//! The normal matrix of the ARAP energy is the same for the x, y and z coordinates, so
//! it is stored once as a scalar CSR matrix and each coordinate is solved separately.

use nalgebra::{DMatrix, DVector};

use super::scalar::Real;

/// Compressed Sparse Row (CSR) matrix.
#[derive(Debug, Clone)]
pub struct CsrMatrix<T: Real> {
    /// Number of rows.
    rows: usize,
    /// Number of columns.
    cols: usize,
    /// `row_ptr[i]..row_ptr[i + 1]` is the range of row `i` in `col_idx`/`values`.
    row_ptr: Vec<usize>,
    /// Column index of each stored value.
    col_idx: Vec<usize>,
    /// Stored values.
    values: Vec<T>,
}

impl<T: Real> CsrMatrix<T> {
    /// Create a CSR matrix from triplets (row, col, value).
    ///
    /// Duplicate entries at the same (row, col) are summed.
    pub fn from_triplets(rows: usize, cols: usize, mut triplets: Vec<(usize, usize, T)>) -> Self {
        triplets.sort_by(|a, b| a.0.cmp(&b.0).then(a.1.cmp(&b.1)));

        let mut row_ptr = vec![0usize; rows + 1];
        let mut col_idx: Vec<usize> = Vec::with_capacity(triplets.len());
        let mut values: Vec<T> = Vec::with_capacity(triplets.len());
        let mut last: Option<(usize, usize)> = None;

        for (row, col, val) in triplets {
            if last == Some((row, col)) {
                if let Some(acc) = values.last_mut() {
                    *acc += val;
                }
                continue;
            }
            col_idx.push(col);
            values.push(val);
            row_ptr[row + 1] += 1;
            last = Some((row, col));
        }

        for r in 0..rows {
            row_ptr[r + 1] += row_ptr[r];
        }

        Self {
            rows,
            cols,
            row_ptr,
            col_idx,
            values,
        }
    }

    /// Get the number of rows.
    #[inline]
    pub fn nrows(&self) -> usize {
        self.rows
    }

    /// Get the number of columns.
    #[inline]
    pub fn ncols(&self) -> usize {
        self.cols
    }

    /// Get the number of stored entries.
    #[inline]
    pub fn nnz(&self) -> usize {
        self.values.len()
    }

    /// Entry `(row, col)`, zero if not stored.
    pub fn get(&self, row: usize, col: usize) -> T {
        let range = self.row_ptr[row]..self.row_ptr[row + 1];
        self.col_idx[range.clone()]
            .iter()
            .position(|&c| c == col)
            .map(|k| self.values[range.start + k])
            .unwrap_or_else(T::zero)
    }

    /// The main diagonal.
    pub fn diagonal(&self) -> DVector<T> {
        DVector::from_fn(self.rows.min(self.cols), |i, _| self.get(i, i))
    }

    /// Multiply matrix by vector: y = A * x.
    pub fn mul_vec(&self, x: &DVector<T>) -> DVector<T> {
        assert_eq!(x.len(), self.cols, "Vector dimension mismatch");

        DVector::from_fn(self.rows, |i, _| {
            let mut sum = T::zero();
            for k in self.row_ptr[i]..self.row_ptr[i + 1] {
                sum += self.values[k] * x[self.col_idx[k]];
            }
            sum
        })
    }

    /// A copy with `damping * diag(A)` added to the diagonal (Marquardt scaling).
    ///
    /// Every row must already store its diagonal entry.
    pub fn with_scaled_diagonal(&self, damping: T) -> Self {
        let mut damped = self.clone();
        for i in 0..self.rows {
            for k in self.row_ptr[i]..self.row_ptr[i + 1] {
                if self.col_idx[k] == i {
                    damped.values[k] += self.values[k] * damping;
                }
            }
        }
        damped
    }

    /// Expand into a dense matrix.
    pub fn to_dense(&self) -> DMatrix<T> {
        let mut dense = DMatrix::zeros(self.rows, self.cols);
        for i in 0..self.rows {
            for k in self.row_ptr[i]..self.row_ptr[i + 1] {
                dense[(i, self.col_idx[k])] += self.values[k];
            }
        }
        dense
    }
}

/// Result of a conjugate gradient solve.
#[derive(Debug, Clone)]
pub struct CgSolve<T: Real> {
    /// Best iterate (the last one).
    pub solution: DVector<T>,
    /// Iterations performed.
    pub iterations: usize,
    /// Whether the relative residual dropped below the tolerance.
    pub converged: bool,
}

/// Solve A*x = b with Jacobi-preconditioned conjugate gradient.
///
/// Requires A to be symmetric positive (semi-)definite with `b` in its range. Running
/// out of iterations is not an error: the last iterate is returned with
/// `converged = false`.
///
/// # Arguments
///
/// * `a` - The system matrix
/// * `b` - The right-hand side vector
/// * `x0` - Optional initial guess (zeros if None)
/// * `max_iter` - Maximum number of iterations
/// * `tolerance` - Convergence tolerance (relative residual norm)
pub fn preconditioned_cg<T: Real>(
    a: &CsrMatrix<T>,
    b: &DVector<T>,
    x0: Option<&DVector<T>>,
    max_iter: usize,
    tolerance: T,
) -> CgSolve<T> {
    let n = b.len();
    assert_eq!(a.nrows(), n, "Matrix-vector dimension mismatch");
    assert_eq!(a.ncols(), n, "Matrix must be square");

    let mut x = match x0 {
        Some(x0) => x0.clone(),
        None => DVector::zeros(n),
    };

    let b_norm = b.norm();
    if b_norm == T::zero() {
        return CgSolve {
            solution: x,
            iterations: 0,
            converged: true,
        };
    }

    let inv_diag = a.diagonal().map(|d| {
        if d > T::zero() {
            T::one() / d
        } else {
            T::one()
        }
    });

    let mut r = b - a.mul_vec(&x);
    if r.norm() / b_norm < tolerance {
        return CgSolve {
            solution: x,
            iterations: 0,
            converged: true,
        };
    }

    let mut z = r.component_mul(&inv_diag);
    let mut p = z.clone();
    let mut rz = r.dot(&z);

    for iter in 0..max_iter {
        let ap = a.mul_vec(&p);
        let p_ap = p.dot(&ap);
        if p_ap <= T::zero() {
            return CgSolve {
                solution: x,
                iterations: iter,
                converged: false,
            };
        }
        let alpha = rz / p_ap;

        x.axpy(alpha, &p, T::one());
        r.axpy(-alpha, &ap, T::one());

        if r.norm() / b_norm < tolerance {
            return CgSolve {
                solution: x,
                iterations: iter + 1,
                converged: true,
            };
        }

        z = r.component_mul(&inv_diag);
        let rz_new = r.dot(&z);
        let beta = rz_new / rz;
        p = &z + &p * beta;
        rz = rz_new;
    }

    CgSolve {
        solution: x,
        iterations: max_iter,
        converged: false,
    }
}
