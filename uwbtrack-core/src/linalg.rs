//! Fixed-size linear algebra for the positioning filters
//!
//! Everything the trilateration solver and the range EKF need, on plain
//! `f32` arrays whose shapes are const generics. No heap, no external
//! matrix crate; the largest matrix in the tracker is 4×4.
//!
//! Shapes are checked by the compiler. A product of incompatible operands
//! does not build:
//!
//! ```rust,compile_fail
//! use uwbtrack_core::linalg::{multiply, Matrix};
//!
//! let a: Matrix<2, 3> = [[0.0; 3]; 2];
//! let b: Matrix<2, 2> = [[0.0; 2]; 2];
//! let mut c: Matrix<2, 2> = [[0.0; 2]; 2];
//! multiply(&a, &b, &mut c);
//! ```
//!
//! Inversion and solving use Gauss-Jordan elimination with partial pivoting
//! and report [`TrackingError::SingularMatrix`] when no remaining row offers
//! a pivot larger than [`PIVOT_EPSILON`].

use crate::{
    constants::PIVOT_EPSILON,
    errors::{TrackingError, TrackingResult},
};

/// Matrix type using const generics
pub type Matrix<const R: usize, const C: usize> = [[f32; C]; R];

/// Square matrix type
pub type SquareMatrix<const N: usize> = Matrix<N, N>;

/// Vector type
pub type Vector<const N: usize> = [f32; N];

/// Identity matrix
pub fn identity<const N: usize>() -> SquareMatrix<N> {
    let mut m = [[0.0; N]; N];
    for (i, row) in m.iter_mut().enumerate() {
        row[i] = 1.0;
    }
    m
}

/// Diagonal matrix from a vector
pub fn diagonal<const N: usize>(values: &Vector<N>) -> SquareMatrix<N> {
    let mut m = [[0.0; N]; N];
    for i in 0..N {
        m[i][i] = values[i];
    }
    m
}

/// Matrix multiplication: C = A × B
///
/// Dimensions: A[R×K] × B[K×C] = C[R×C]
pub fn multiply<const R: usize, const K: usize, const C: usize>(
    a: &Matrix<R, K>,
    b: &Matrix<K, C>,
    result: &mut Matrix<R, C>,
) {
    for i in 0..R {
        for j in 0..C {
            result[i][j] = 0.0;
            for k in 0..K {
                result[i][j] += a[i][k] * b[k][j];
            }
        }
    }
}

/// Matrix transpose: B = Aᵀ
pub fn transpose<const R: usize, const C: usize>(
    a: &Matrix<R, C>,
    result: &mut Matrix<C, R>,
) {
    for i in 0..R {
        for j in 0..C {
            result[j][i] = a[i][j];
        }
    }
}

/// Matrix addition: C = A + B
pub fn add<const R: usize, const C: usize>(
    a: &Matrix<R, C>,
    b: &Matrix<R, C>,
    result: &mut Matrix<R, C>,
) {
    for i in 0..R {
        for j in 0..C {
            result[i][j] = a[i][j] + b[i][j];
        }
    }
}

/// Matrix subtraction: C = A - B
pub fn subtract<const R: usize, const C: usize>(
    a: &Matrix<R, C>,
    b: &Matrix<R, C>,
    result: &mut Matrix<R, C>,
) {
    for i in 0..R {
        for j in 0..C {
            result[i][j] = a[i][j] - b[i][j];
        }
    }
}

/// Scalar multiplication: B = s·A
pub fn scale<const R: usize, const C: usize>(
    a: &Matrix<R, C>,
    s: f32,
    result: &mut Matrix<R, C>,
) {
    for i in 0..R {
        for j in 0..C {
            result[i][j] = a[i][j] * s;
        }
    }
}

/// Matrix-vector multiplication: y = A × x
pub fn matvec<const R: usize, const C: usize>(
    matrix: &Matrix<R, C>,
    vector: &Vector<C>,
    result: &mut Vector<R>,
) {
    for i in 0..R {
        result[i] = 0.0;
        for j in 0..C {
            result[i] += matrix[i][j] * vector[j];
        }
    }
}

/// Dot product: aᵀb
pub fn dot<const N: usize>(a: &Vector<N>, b: &Vector<N>) -> f32 {
    a.iter().zip(b.iter()).map(|(x, y)| x * y).sum()
}

/// Make matrix symmetric: A = (A + Aᵀ) / 2
///
/// Applied after every covariance product so rounding never lets the two
/// triangles drift apart.
pub fn make_symmetric<const N: usize>(matrix: &mut SquareMatrix<N>) {
    for i in 0..N {
        for j in i + 1..N {
            let avg = (matrix[i][j] + matrix[j][i]) * 0.5;
            matrix[i][j] = avg;
            matrix[j][i] = avg;
        }
    }
}

/// Row with the largest magnitude in column `col`, searching rows `col..N`.
fn pivot_row<const N: usize, const C: usize>(m: &Matrix<N, C>, col: usize) -> TrackingResult<usize> {
    let mut best = col;
    let mut best_val = libm::fabsf(m[col][col]);
    for (i, row) in m.iter().enumerate().skip(col + 1) {
        let val = libm::fabsf(row[col]);
        if val > best_val {
            best_val = val;
            best = i;
        }
    }

    // NaN fails this comparison too
    if !(best_val > PIVOT_EPSILON) {
        return Err(TrackingError::SingularMatrix);
    }
    Ok(best)
}

/// Matrix inversion using Gauss-Jordan elimination
///
/// `inv` is only meaningful on `Ok`. Row operations are mirrored onto an
/// identity matrix instead of an augmented `[A | I]` block, which keeps
/// every buffer at N×N.
pub fn invert<const N: usize>(
    a: &SquareMatrix<N>,
    inv: &mut SquareMatrix<N>,
) -> TrackingResult<()> {
    let mut work = *a;
    *inv = identity();

    for k in 0..N {
        let p = pivot_row(&work, k)?;
        if p != k {
            work.swap(k, p);
            inv.swap(k, p);
        }

        let pivot = work[k][k];
        for j in 0..N {
            work[k][j] /= pivot;
            inv[k][j] /= pivot;
        }

        for i in 0..N {
            if i == k {
                continue;
            }
            let factor = work[i][k];
            if factor == 0.0 {
                continue;
            }
            for j in 0..N {
                work[i][j] -= factor * work[k][j];
                inv[i][j] -= factor * inv[k][j];
            }
        }
    }

    Ok(())
}

/// Solve A×x = b by Gaussian elimination with partial pivoting
pub fn solve<const N: usize>(
    a: &SquareMatrix<N>,
    b: &Vector<N>,
    x: &mut Vector<N>,
) -> TrackingResult<()> {
    let mut work = *a;
    let mut rhs = *b;

    for k in 0..N {
        let p = pivot_row(&work, k)?;
        if p != k {
            work.swap(k, p);
            rhs.swap(k, p);
        }

        let pivot = work[k][k];
        for j in k..N {
            work[k][j] /= pivot;
        }
        rhs[k] /= pivot;

        for i in 0..N {
            if i == k {
                continue;
            }
            let factor = work[i][k];
            if factor == 0.0 {
                continue;
            }
            for j in k..N {
                work[i][j] -= factor * work[k][j];
            }
            rhs[i] -= factor * rhs[k];
        }
    }

    *x = rhs;
    Ok(())
}
