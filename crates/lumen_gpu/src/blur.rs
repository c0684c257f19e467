//! Separable Gaussian blur parameters
//!
//! Large sigmas are handled by downsampling rather than by widening the
//! kernel: [`adjust_sigma`] halves sigma and doubles the downsample factor
//! until sigma fits under the cap, so the kernel never exceeds
//! `2 * ceil(3 * cap) + 1` taps.

use std::num::NonZeroUsize;

use lru::LruCache;
use smallvec::SmallVec;

/// Kernel taps, inline up to the default cap of 25
pub type Kernel = SmallVec<[f32; 25]>;

/// Sigma below which the kernel degenerates to a single tap
const NEARLY_ZERO_SIGMA: f32 = 0.05;

/// Blur parameters after downsampling
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BlurParams {
    /// Sigma in downsampled pixels
    pub sigma: f32,
    /// Downsample factor (power of two)
    pub scale_factor: f32,
    /// Kernel radius: `ceil(3 * sigma)`
    pub radius: u32,
}

/// Fit `sigma` under `max_sigma` by downsampling, capping the factor at
/// `max_scale`
pub fn adjust_sigma(sigma: f32, max_sigma: f32, max_scale: f32) -> BlurParams {
    let mut sigma = sigma.max(0.0);
    let mut scale_factor = 1.0f32;
    while sigma > max_sigma && scale_factor < max_scale {
        scale_factor *= 2.0;
        sigma *= 0.5;
    }
    BlurParams {
        sigma,
        scale_factor,
        radius: (3.0 * sigma).ceil() as u32,
    }
}

/// Normalized 1-D Gaussian of width `2 * radius + 1`, at most `max_width`
///
/// Sigma is rounded to one decimal. A sigma that rounds to zero yields the
/// identity kernel, so the taps always sum to one.
pub fn gaussian_kernel(sigma: f32, radius: u32, max_width: usize) -> Kernel {
    let max_radius = max_width.saturating_sub(1) / 2;
    let radius = (radius as usize).min(max_radius);
    let width = 2 * radius + 1;
    let mut kernel: Kernel = SmallVec::from_elem(0.0, width);

    let sigma = (sigma * 10.0).round() / 10.0;
    if sigma < NEARLY_ZERO_SIGMA {
        kernel[radius] = 1.0;
        return kernel;
    }

    let denom = 1.0 / (2.0 * sigma * sigma);
    let mut sum = 0.0;
    for (i, tap) in kernel.iter_mut().enumerate() {
        let x = i as f32 - radius as f32;
        *tap = (-x * x * denom).exp();
        sum += *tap;
    }
    for tap in kernel.iter_mut() {
        *tap /= sum;
    }
    kernel
}

/// LRU cache of kernels keyed by (sigma in tenths, radius)
pub struct KernelCache {
    cache: LruCache<(u32, u32), Kernel>,
    max_width: usize,
}

impl KernelCache {
    pub fn new(max_width: usize) -> Self {
        Self::with_capacity(max_width, 64)
    }

    pub fn with_capacity(max_width: usize, capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            cache: LruCache::new(capacity),
            max_width,
        }
    }

    pub fn get(&mut self, sigma: f32, radius: u32) -> Kernel {
        let key = ((sigma * 10.0).round() as u32, radius);
        if let Some(kernel) = self.cache.get(&key) {
            return kernel.clone();
        }
        let kernel = gaussian_kernel(sigma, radius, self.max_width);
        self.cache.put(key, kernel.clone());
        kernel
    }

    pub fn len(&self) -> usize {
        self.cache.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cache.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_adjust_small_sigma_untouched() {
        let params = adjust_sigma(2.0, 4.0, 16_384.0);
        assert_eq!(params.scale_factor, 1.0);
        assert_eq!(params.sigma, 2.0);
        assert_eq!(params.radius, 6);
    }

    #[test]
    fn test_adjust_large_sigma_downsamples() {
        let params = adjust_sigma(20.0, 4.0, 16_384.0);
        assert_eq!(params.scale_factor, 8.0);
        assert_eq!(params.sigma, 2.5);
        assert_eq!(params.radius, 8);
    }

    #[test]
    fn test_adjust_respects_scale_cap() {
        let params = adjust_sigma(1000.0, 4.0, 4.0);
        assert_eq!(params.scale_factor, 4.0);
        assert_eq!(params.sigma, 250.0);
    }

    #[test]
    fn test_kernel_sums_to_one() {
        for sigma in [0.3f32, 0.5, 1.0, 1.7, 2.5, 3.3, 4.0] {
            let radius = (3.0 * sigma).ceil() as u32;
            let kernel = gaussian_kernel(sigma, radius, 25);
            let sum: f32 = kernel.iter().sum();
            assert!((sum - 1.0).abs() < 1e-5, "sigma {sigma}: sum {sum}");
            assert_eq!(kernel.len(), 2 * radius as usize + 1);
        }
    }

    #[test]
    fn test_kernel_is_symmetric_and_peaked() {
        let kernel = gaussian_kernel(2.0, 6, 25);
        for i in 0..6 {
            assert!((kernel[i] - kernel[12 - i]).abs() < 1e-6);
            assert!(kernel[i] < kernel[i + 1]);
        }
    }

    #[test]
    fn test_kernel_width_capped() {
        let kernel = gaussian_kernel(10.0, 30, 25);
        assert_eq!(kernel.len(), 25);
        let sum: f32 = kernel.iter().sum();
        assert!((sum - 1.0).abs() < 1e-5);
    }

    #[test]
    fn test_tiny_sigma_is_identity() {
        let kernel = gaussian_kernel(0.01, 1, 25);
        assert_eq!(kernel.as_slice(), &[0.0, 1.0, 0.0]);
    }

    #[test]
    fn test_cache_reuses_rounded_sigma() {
        let mut cache = KernelCache::new(25);
        let a = cache.get(2.01, 7);
        let b = cache.get(1.99, 7);
        assert_eq!(a, b);
        assert_eq!(cache.len(), 1);
    }
}
