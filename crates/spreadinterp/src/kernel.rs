//! Compact-support kernels and per-column weight tensors.
//!
//! A kernel is separable: the 3D weight of a node is the product of three
//! 1D profiles evaluated at the node-minus-particle offsets, scaled by the
//! particle's normalization on each axis.

use crate::constants::NORM_QUADRATURE_INTERVALS;

/// Shape parameters of one particle's kernel.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ShapeParams {
    /// Nominal width class.
    pub width: u16,
    /// Shape factor.
    pub beta: f64,
    /// Support radius.
    pub alpha: f64,
}

/// A 1D kernel profile with support `[-alpha, alpha]`.
///
/// Implementations must be pure: the transfer engine calls them from many
/// column tasks at once.
pub trait KernelShape: Sync {
    /// Unnormalized profile at offset `r`.
    fn profile(&self, r: f64, params: &ShapeParams) -> f64;

    /// Reciprocal of the profile's integral over its support.
    fn normalization(&self, params: &ShapeParams) -> f64 {
        let n = NORM_QUADRATURE_INTERVALS;
        let a = params.alpha;
        let step = 2.0 * a / n as f64;
        let mut sum = self.profile(-a, params) + self.profile(a, params);
        for i in 1..n {
            let coeff = if i % 2 == 1 { 4.0 } else { 2.0 };
            sum += coeff * self.profile(-a + i as f64 * step, params);
        }
        3.0 / (step * sum)
    }
}

/// Exponential of semicircle: `exp(beta * w * (sqrt(1 - (r/alpha)^2) - 1))`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct EsKernel;

impl KernelShape for EsKernel {
    #[inline]
    fn profile(&self, r: f64, params: &ShapeParams) -> f64 {
        let z = r / params.alpha;
        let z2 = z * z;
        if z2 > 1.0 {
            0.0
        } else {
            (params.beta * params.width as f64 * ((1.0 - z2).sqrt() - 1.0)).exp()
        }
    }
}

/// Per-particle inputs to [`evaluate_column`], already gathered into
/// contiguous buffers.
pub struct KernelInputs<'a> {
    /// Shape factor per particle.
    pub beta: &'a [f64],
    /// Width class per particle.
    pub width: &'a [u16],
    /// Normalization per particle.
    pub norm: &'a [f64],
    /// x offsets, stride `wx_max`.
    pub xunwrap: &'a [f64],
    /// y offsets, stride `wy_max`.
    pub yunwrap: &'a [f64],
    /// z offsets, stride `wz_max`.
    pub zunwrap: &'a [f64],
    /// Strides of the offset buffers.
    pub strides: [usize; 3],
}

/// Fill `delta` with the `wx * wy * wz[p]` weight tensor of every particle.
///
/// Particle `p` owns `delta[p * kersz..(p + 1) * kersz]`; node `(i, j, k)` of
/// its window sits at `i + wx * (j + wy * k)`. Entries past `wz[p]` planes
/// are left zero.
#[allow(clippy::too_many_arguments)]
pub fn evaluate_column<K: KernelShape + ?Sized>(
    kernel: &K,
    delta: &mut [f64],
    inputs: &KernelInputs<'_>,
    alphaf: f64,
    wx: usize,
    wy: usize,
    wz: &[usize],
    kersz: usize,
) {
    let npts = inputs.beta.len();
    debug_assert_eq!(delta.len(), kersz * npts);
    debug_assert_eq!(wz.len(), npts);

    let [sx, sy, sz] = inputs.strides;
    let wz_max = wz.iter().copied().max().unwrap_or(0);
    let mut px = vec![0.0; wx];
    let mut py = vec![0.0; wy];
    let mut pz = vec![0.0; wz_max];

    for p in 0..npts {
        let params = ShapeParams {
            width: inputs.width[p],
            beta: inputs.beta[p],
            alpha: alphaf,
        };
        let norm = inputs.norm[p];
        let norm3 = norm * norm * norm;

        for (i, v) in px.iter_mut().enumerate() {
            *v = kernel.profile(inputs.xunwrap[p * sx + i], &params);
        }
        for (j, v) in py.iter_mut().enumerate() {
            *v = kernel.profile(inputs.yunwrap[p * sy + j], &params);
        }
        for k in 0..wz[p] {
            pz[k] = norm3 * kernel.profile(inputs.zunwrap[p * sz + k], &params);
        }

        let out = &mut delta[p * kersz..(p + 1) * kersz];
        for k in 0..wz[p] {
            for j in 0..wy {
                let yz = py[j] * pz[k];
                let row = wx * (j + wy * k);
                for i in 0..wx {
                    out[row + i] = px[i] * yz;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::{ES_PRESETS, ES_W4, ES_W6};

    fn params(width: u16, beta: f64, alpha: f64) -> ShapeParams {
        ShapeParams { width, beta, alpha }
    }

    #[test]
    fn test_es_peak_and_support() {
        let p = params(6, 1.714, 3.0);
        assert!((EsKernel.profile(0.0, &p) - 1.0).abs() < 1e-15);
        assert_eq!(EsKernel.profile(3.0001, &p), 0.0);
        assert_eq!(EsKernel.profile(-4.0, &p), 0.0);
        // Edge value is exp(-beta * w)
        let edge = EsKernel.profile(3.0, &p);
        assert!((edge - (-1.714f64 * 6.0).exp()).abs() < 1e-15);
    }

    #[test]
    fn test_es_symmetric_and_monotone() {
        let p = params(4, 1.785, 2.0);
        let mut prev = EsKernel.profile(0.0, &p);
        for i in 1..20 {
            let r = i as f64 * 0.1;
            let v = EsKernel.profile(r, &p);
            assert_eq!(v, EsKernel.profile(-r, &p));
            assert!(v < prev, "profile should decrease away from center");
            prev = v;
        }
    }

    #[test]
    fn test_normalization_integrates_to_one() {
        for preset in ES_PRESETS {
            let p = params(preset.width, preset.beta, preset.alpha(0.5));
            let norm = EsKernel.normalization(&p);
            // Fine trapezoid check of the normalized integral
            let n = 20000;
            let a = p.alpha;
            let step = 2.0 * a / n as f64;
            let integral: f64 = (0..=n)
                .map(|i| {
                    let w = if i == 0 || i == n { 0.5 } else { 1.0 };
                    w * EsKernel.profile(-a + i as f64 * step, &p)
                })
                .sum::<f64>()
                * step;
            assert!(
                (norm * integral - 1.0).abs() < 1e-4,
                "width {} normalized integral = {}",
                preset.width,
                norm * integral
            );
        }
    }

    #[test]
    fn test_discrete_partition_of_unity() {
        // Sum over grid nodes of the normalized profile times h is ~1
        let h = 0.25;
        let p = params(ES_W6.width, ES_W6.beta, ES_W6.alpha(h));
        let norm = EsKernel.normalization(&p);
        for shift in [0.0, 0.13, 0.5, 0.77] {
            let sum: f64 = (-10i32..=10)
                .map(|i| EsKernel.profile((i as f64 - shift) * h, &p))
                .sum::<f64>()
                * norm
                * h;
            assert!((sum - 1.0).abs() < 1e-2, "shift {} sum {}", shift, sum);
        }
    }

    #[test]
    fn test_evaluate_column_layout() {
        // Two particles, 2x2 in-plane window, different axial widths
        let h = 1.0;
        let alpha = ES_W4.alpha(h);
        let beta = [ES_W4.beta; 2];
        let width = [ES_W4.width; 2];
        let norm = [1.0; 2];
        let xunwrap = [-0.5, 0.5, 0.0, 1.0];
        let yunwrap = [-0.5, 0.5, -1.0, 0.0];
        let zunwrap = [-1.0, 0.0, 1.0, 0.0, 0.0, 0.0];
        let inputs = KernelInputs {
            beta: &beta,
            width: &width,
            norm: &norm,
            xunwrap: &xunwrap,
            yunwrap: &yunwrap,
            zunwrap: &zunwrap,
            strides: [2, 2, 3],
        };
        let kersz = 2 * 2 * 3;
        let mut delta = vec![0.0; kersz * 2];
        evaluate_column(&EsKernel, &mut delta, &inputs, alpha, 2, 2, &[3, 1], kersz);

        let p = params(ES_W4.width, ES_W4.beta, alpha);
        let phi = |r: f64| EsKernel.profile(r, &p);

        // Particle 0, node (1, 0, 2)
        let expect = phi(0.5) * phi(-0.5) * phi(1.0);
        assert!((delta[1 + 2 * (0 + 2 * 2)] - expect).abs() < 1e-15);

        // Particle 1, node (0, 1, 0)
        let expect = phi(0.0) * phi(0.0) * phi(0.0);
        assert!((delta[kersz + 2 * 1] - expect).abs() < 1e-15);

        // Planes beyond particle 1's axial width stay zero
        assert!(delta[kersz + 4..2 * kersz].iter().all(|&v| v == 0.0));
    }
}
