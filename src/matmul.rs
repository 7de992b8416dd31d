//! Strided GEMM used by the dense layers.
//!
//! One kernel computes `C = alpha * A·B + beta * C` for arbitrary strides, so
//! transposed operands never need to be materialized:
//! - default: a simple, safe triple-loop implementation
//! - optional: `matrixmultiply::dgemm` via the `matrixmultiply` feature

#[allow(clippy::too_many_arguments)]
#[inline]
fn gemm_f64(
    m: usize,
    n: usize,
    k: usize,
    alpha: f64,
    a: &[f64],
    rsa: usize,
    csa: usize,
    b: &[f64],
    rsb: usize,
    csb: usize,
    beta: f64,
    c: &mut [f64],
    rsc: usize,
    csc: usize,
) {
    if m == 0 || n == 0 {
        return;
    }
    if k == 0 {
        // Empty inner dimension: A·B is all zeros.
        for i in 0..m {
            for j in 0..n {
                let idx = i * rsc + j * csc;
                c[idx] = if beta == 0.0 { 0.0 } else { beta * c[idx] };
            }
        }
        return;
    }

    debug_assert!(a.len() >= (m - 1) * rsa + (k - 1) * csa + 1);
    debug_assert!(b.len() >= (k - 1) * rsb + (n - 1) * csb + 1);
    debug_assert!(c.len() >= (m - 1) * rsc + (n - 1) * csc + 1);

    #[cfg(feature = "matrixmultiply")]
    {
        // SAFETY: the debug assertions above describe the extents the strides
        // address; every caller in this module derives them from slice lengths.
        unsafe {
            matrixmultiply::dgemm(
                m,
                k,
                n,
                alpha,
                a.as_ptr(),
                rsa as isize,
                csa as isize,
                b.as_ptr(),
                rsb as isize,
                csb as isize,
                beta,
                c.as_mut_ptr(),
                rsc as isize,
                csc as isize,
            );
        }
    }

    #[cfg(not(feature = "matrixmultiply"))]
    for i in 0..m {
        for j in 0..n {
            let mut acc = 0.0_f64;
            let a0 = i * rsa;
            let b0 = j * csb;

            for p in 0..k {
                let av = a[a0 + p * csa];
                let bv = b[p * rsb + b0];
                acc = av.mul_add(bv, acc);
            }

            let idx = i * rsc + j * csc;
            // beta == 0 must not propagate NaN from a stale output buffer.
            c[idx] = if beta == 0.0 {
                alpha * acc
            } else {
                alpha * acc + beta * c[idx]
            };
        }
    }
}

/// `out(batch, n_out) = x(batch, n_in) · w(n_in, n_out)`.
#[inline]
pub(crate) fn x_dot_w(
    batch: usize,
    n_in: usize,
    n_out: usize,
    x: &[f64],
    w: &[f64],
    out: &mut [f64],
) {
    debug_assert_eq!(x.len(), batch * n_in);
    debug_assert_eq!(w.len(), n_in * n_out);
    debug_assert_eq!(out.len(), batch * n_out);
    gemm_f64(batch, n_out, n_in, 1.0, x, n_in, 1, w, n_out, 1, 0.0, out, n_out, 1);
}

/// `dx(batch, n_in) = g(batch, n_out) · wᵀ`.
#[inline]
pub(crate) fn g_dot_wt(
    batch: usize,
    n_in: usize,
    n_out: usize,
    g: &[f64],
    w: &[f64],
    dx: &mut [f64],
) {
    debug_assert_eq!(g.len(), batch * n_out);
    debug_assert_eq!(w.len(), n_in * n_out);
    debug_assert_eq!(dx.len(), batch * n_in);
    gemm_f64(batch, n_in, n_out, 1.0, g, n_out, 1, w, 1, n_out, 0.0, dx, n_in, 1);
}

/// `dw(n_in, n_out) = xᵀ · g`.
#[inline]
pub(crate) fn xt_dot_g(
    batch: usize,
    n_in: usize,
    n_out: usize,
    x: &[f64],
    g: &[f64],
    dw: &mut [f64],
) {
    debug_assert_eq!(x.len(), batch * n_in);
    debug_assert_eq!(g.len(), batch * n_out);
    debug_assert_eq!(dw.len(), n_in * n_out);
    gemm_f64(n_in, n_out, batch, 1.0, x, 1, n_in, g, n_out, 1, 0.0, dw, n_out, 1);
}
