//! Complex QR/QZ iteration for dense real matrices.
//!
//! The standard problem is reduced to upper Hessenberg form by a unitary
//! similarity; the generalized problem to Hessenberg-triangular form by
//! unitary equivalence. Both are then driven to (generalized) Schur form
//! with implicitly shifted single-shift sweeps made of Givens rotations.
//! Working in complex arithmetic lets every eigenvalue deflate as a 1x1
//! block.

use nalgebra::{Complex, DMatrix};

use crate::error::{SolverError, SolverResult};

type C = Complex<f64>;

/// Generalized Schur data: eigenvalue `k` is `alpha[k] / beta[k]`,
/// eigenvector `k` is column `k` of `vectors`.
pub(crate) struct Schur {
    pub alpha: Vec<C>,
    /// Real and non-negative.
    pub beta: Vec<f64>,
    pub vectors: DMatrix<C>,
}

/// Rotation acting on a pair of rows `[c s; -conj(s) c]`.
#[derive(Clone, Copy, Debug)]
struct Givens {
    c: f64,
    s: C,
}

/// Rotation mapping `(a, b)` to `(r, 0)`.
fn givens(a: C, b: C) -> Givens {
    let na = a.norm();
    let nb = b.norm();
    if nb == 0.0 {
        return Givens {
            c: 1.0,
            s: C::new(0.0, 0.0),
        };
    }
    if na == 0.0 {
        return Givens {
            c: 0.0,
            s: b.conj() / nb,
        };
    }
    let r = na.hypot(nb);
    Givens {
        c: na / r,
        s: (a / na) * b.conj() / r,
    }
}

/// `M <- G M` on rows `p`, `q`.
fn rot_rows(m: &mut DMatrix<C>, p: usize, q: usize, g: Givens) {
    for j in 0..m.ncols() {
        let mp = m[(p, j)];
        let mq = m[(q, j)];
        m[(p, j)] = mp * g.c + g.s * mq;
        m[(q, j)] = -g.s.conj() * mp + mq * g.c;
    }
}

/// `M <- M G` on columns `p`, `q`.
fn rot_cols(m: &mut DMatrix<C>, p: usize, q: usize, g: Givens) {
    for i in 0..m.nrows() {
        let cp = m[(i, p)];
        let cq = m[(i, q)];
        m[(i, p)] = cp * g.c - g.s.conj() * cq;
        m[(i, q)] = g.s * cp + cq * g.c;
    }
}

/// `M <- M G^H` on columns `p`, `q`.
fn rot_cols_adj(m: &mut DMatrix<C>, p: usize, q: usize, g: Givens) {
    for i in 0..m.nrows() {
        let cp = m[(i, p)];
        let cq = m[(i, q)];
        m[(i, p)] = cp * g.c + g.s.conj() * cq;
        m[(i, q)] = -g.s * cp + cq * g.c;
    }
}

fn frobenius(m: &DMatrix<C>) -> f64 {
    m.iter().map(|z| z.norm_sqr()).sum::<f64>().sqrt()
}

fn to_complex(a: &DMatrix<f64>) -> DMatrix<C> {
    a.map(|v| C::new(v, 0.0))
}

/// Eigen-decomposition of `A x = lambda x`.
pub(crate) fn standard(a: &DMatrix<f64>, max_iterations: usize) -> SolverResult<Schur> {
    let n = a.nrows();
    let mut h = to_complex(a);
    let mut t = DMatrix::<C>::identity(n, n);
    let mut z = DMatrix::<C>::identity(n, n);

    // Hessenberg similarity, Z accumulates the right factor
    for j in 0..n.saturating_sub(2) {
        for i in ((j + 2)..n).rev() {
            let g = givens(h[(i - 1, j)], h[(i, j)]);
            rot_rows(&mut h, i - 1, i, g);
            rot_cols_adj(&mut h, i - 1, i, g);
            rot_cols_adj(&mut z, i - 1, i, g);
            h[(i, j)] = C::new(0.0, 0.0);
        }
    }

    iterate(&mut h, &mut t, &mut z, max_iterations)?;
    Ok(extract(h, t, z))
}

/// Eigen-decomposition of `A x = lambda B x`.
pub(crate) fn generalized(
    a: &DMatrix<f64>,
    b: &DMatrix<f64>,
    max_iterations: usize,
) -> SolverResult<Schur> {
    let n = a.nrows();
    let mut h = to_complex(a);
    let mut t = to_complex(b);
    let mut z = DMatrix::<C>::identity(n, n);

    // QR of B, applied to A from the left
    for j in 0..n {
        for i in ((j + 1)..n).rev() {
            let g = givens(t[(i - 1, j)], t[(i, j)]);
            rot_rows(&mut t, i - 1, i, g);
            rot_rows(&mut h, i - 1, i, g);
            t[(i, j)] = C::new(0.0, 0.0);
        }
    }

    // Hessenberg-triangular reduction
    for j in 0..n.saturating_sub(2) {
        for i in ((j + 2)..n).rev() {
            let g = givens(h[(i - 1, j)], h[(i, j)]);
            rot_rows(&mut h, i - 1, i, g);
            rot_rows(&mut t, i - 1, i, g);
            h[(i, j)] = C::new(0.0, 0.0);

            let g = givens(t[(i, i)], t[(i, i - 1)]);
            rot_cols(&mut h, i - 1, i, g);
            rot_cols(&mut t, i - 1, i, g);
            rot_cols(&mut z, i - 1, i, g);
            t[(i, i - 1)] = C::new(0.0, 0.0);
        }
    }

    iterate(&mut h, &mut t, &mut z, max_iterations)?;
    Ok(extract(h, t, z))
}

/// Drive the Hessenberg-triangular pair `(H, T)` to triangular form.
fn iterate(
    h: &mut DMatrix<C>,
    t: &mut DMatrix<C>,
    z: &mut DMatrix<C>,
    max_iterations: usize,
) -> SolverResult<()> {
    let n = h.nrows();
    if n < 2 {
        return Ok(());
    }
    let eps = f64::EPSILON;
    let h_norm = frobenius(h).max(f64::MIN_POSITIVE);
    let budget = max_iterations.saturating_mul(n);

    let mut hi = n - 1;
    let mut total = 0;
    let mut since_deflation = 0;
    while hi > 0 {
        let mut l = hi;
        while l > 0 {
            let mut scale = h[(l - 1, l - 1)].norm() + h[(l, l)].norm();
            if scale == 0.0 {
                scale = h_norm;
            }
            if h[(l, l - 1)].norm() <= eps * scale {
                h[(l, l - 1)] = C::new(0.0, 0.0);
                break;
            }
            l -= 1;
        }
        if l == hi {
            hi -= 1;
            since_deflation = 0;
            continue;
        }

        total += 1;
        since_deflation += 1;
        if total > budget {
            return Err(SolverError::EigenNotConverged { iterations: total });
        }

        let shift = if since_deflation % 10 == 0 {
            exceptional_shift(h, t, hi)
        } else {
            wilkinson_shift(h, t, hi)
        };
        sweep(h, t, z, l, hi, shift);
    }
    Ok(())
}

fn ratio_or_zero(num: C, den: C) -> C {
    if den.norm() > 0.0 {
        num / den
    } else {
        C::new(0.0, 0.0)
    }
}

/// Eigenvalue of the trailing 2x2 pencil closest to `h22 / t22`.
fn wilkinson_shift(h: &DMatrix<C>, t: &DMatrix<C>, hi: usize) -> C {
    let k = hi - 1;
    let (h11, h12, h21, h22) = (h[(k, k)], h[(k, hi)], h[(hi, k)], h[(hi, hi)]);
    let (t11, t12, t22) = (t[(k, k)], t[(k, hi)], t[(hi, hi)]);
    let target = ratio_or_zero(h22, t22);

    let a = t11 * t22;
    let b = -(h11 * t22 + h22 * t11) + h21 * t12;
    let c = h11 * h22 - h12 * h21;
    if a.norm() <= f64::EPSILON * (b.norm() + c.norm()) {
        return target;
    }
    let disc = (b * b - a * c * 4.0).sqrt();
    let q = if (b + disc).norm() >= (b - disc).norm() {
        (b + disc) * -0.5
    } else {
        (b - disc) * -0.5
    };
    let r1 = q / a;
    let r2 = ratio_or_zero(c, q);
    if (r1 - target).norm() <= (r2 - target).norm() {
        r1
    } else {
        r2
    }
}

/// Ad hoc shift used to break cycles.
fn exceptional_shift(h: &DMatrix<C>, t: &DMatrix<C>, hi: usize) -> C {
    ratio_or_zero(h[(hi, hi)], t[(hi, hi)]) + C::new(0.75 * h[(hi, hi - 1)].norm(), 0.0)
}

/// One implicit single-shift QZ sweep over the active window `[l, hi]`.
fn sweep(
    h: &mut DMatrix<C>,
    t: &mut DMatrix<C>,
    z: &mut DMatrix<C>,
    l: usize,
    hi: usize,
    shift: C,
) {
    let x = h[(l, l)] - shift * t[(l, l)];
    let y = h[(l + 1, l)];
    let mut g = givens(x, y);
    for k in l..hi {
        if k > l {
            g = givens(h[(k, k - 1)], h[(k + 1, k - 1)]);
        }
        rot_rows(h, k, k + 1, g);
        rot_rows(t, k, k + 1, g);
        if k > l {
            h[(k + 1, k - 1)] = C::new(0.0, 0.0);
        }

        let gz = givens(t[(k + 1, k + 1)], t[(k + 1, k)]);
        rot_cols(h, k, k + 1, gz);
        rot_cols(t, k, k + 1, gz);
        rot_cols(z, k, k + 1, gz);
        t[(k + 1, k)] = C::new(0.0, 0.0);
    }
}

/// Eigenvalues and eigenvectors from a triangular pair.
fn extract(mut h: DMatrix<C>, mut t: DMatrix<C>, mut z: DMatrix<C>) -> Schur {
    let n = h.nrows();

    // real non-negative diagonal of T
    for k in 0..n {
        let tkk = t[(k, k)];
        let m = tkk.norm();
        if m > 0.0 {
            let phase = tkk.conj() / m;
            h.column_mut(k).iter_mut().for_each(|v| *v *= phase);
            t.column_mut(k).iter_mut().for_each(|v| *v *= phase);
            z.column_mut(k).iter_mut().for_each(|v| *v *= phase);
            t[(k, k)] = C::new(m, 0.0);
        }
    }

    let alpha: Vec<C> = (0..n).map(|k| h[(k, k)]).collect();
    let beta: Vec<f64> = (0..n).map(|k| t[(k, k)].re).collect();

    let h_norm = frobenius(&h);
    let t_norm = frobenius(&t);
    let mut vectors = DMatrix::<C>::zeros(n, n);
    for k in 0..n {
        let (ak, bk) = (alpha[k], beta[k]);
        let small = (f64::EPSILON * (h_norm * bk.abs() + t_norm * ak.norm())).max(f64::MIN_POSITIVE);

        let mut y = vec![C::new(0.0, 0.0); n];
        y[k] = C::new(1.0, 0.0);
        for i in (0..k).rev() {
            let mut sum = C::new(0.0, 0.0);
            for j in (i + 1)..=k {
                sum += (h[(i, j)] * bk - ak * t[(i, j)]) * y[j];
            }
            let mut d = h[(i, i)] * bk - ak * t[(i, i)];
            if d.norm() < small {
                d = C::new(small, 0.0);
            }
            y[i] = -sum / d;
        }

        let mut x = vec![C::new(0.0, 0.0); n];
        for (r, xr) in x.iter_mut().enumerate() {
            for (j, yj) in y.iter().enumerate().take(k + 1) {
                *xr += z[(r, j)] * yj;
            }
        }
        normalize(&mut x);
        for (r, xr) in x.into_iter().enumerate() {
            vectors[(r, k)] = xr;
        }
    }

    Schur {
        alpha,
        beta,
        vectors,
    }
}

/// Unit 2-norm, phase chosen so the largest entry is real and positive.
fn normalize(x: &mut [C]) {
    let norm = x.iter().map(|v| v.norm_sqr()).sum::<f64>().sqrt();
    if norm == 0.0 {
        return;
    }
    let pivot = x
        .iter()
        .copied()
        .max_by(|a, b| a.norm().total_cmp(&b.norm()))
        .unwrap_or(C::new(1.0, 0.0));
    let phase = pivot.conj() / pivot.norm();
    for v in x.iter_mut() {
        *v = *v * phase / norm;
    }
}
