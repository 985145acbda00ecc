//! Rescaling and random geometric augmentation
//!
//! Training images get one random affine transform each time they are drawn
//! (rotation, shift, shear and zoom about the image centre) followed by an
//! optional horizontal flip. Validation and test images are only rescaled.
//!
//! The affine matrix maps output pixel coordinates `(row, col)` to source
//! coordinates; source samples are read with bilinear interpolation and
//! coordinates falling outside the image are resolved by the [`FillMode`].

use image::RgbImage;
use rand::Rng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

/// How to fill pixels that map outside the source image
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FillMode {
    /// `d c b a | a b c d | d c b a`
    Reflect,
    /// `a a a a | a b c d | d d d d`
    Nearest,
    /// `k k k k | a b c d | k k k k` with `k = cval`
    Constant,
}

/// Augmentation and normalization settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AugmentationConfig {
    /// Multiplier applied to raw 0..255 pixel values
    pub rescale: f32,
    /// Max rotation in degrees (uniform in ±range)
    pub rotation_range: f32,
    /// Max horizontal shift as a fraction of the width
    pub width_shift_range: f32,
    /// Max vertical shift as a fraction of the height
    pub height_shift_range: f32,
    /// Max shear angle in degrees
    pub shear_range: f32,
    /// Zoom factors are drawn per axis from `[1 - zoom_range, 1 + zoom_range]`
    pub zoom_range: f32,
    pub horizontal_flip: bool,
    pub fill_mode: FillMode,
    /// Fill value (0..255 scale) for `FillMode::Constant`
    pub cval: f32,
}

impl Default for AugmentationConfig {
    fn default() -> Self {
        Self {
            rescale: 1.0 / 255.0,
            rotation_range: 10.0,
            width_shift_range: 0.1,
            height_shift_range: 0.1,
            shear_range: 0.1,
            zoom_range: 0.1,
            horizontal_flip: true,
            fill_mode: FillMode::Reflect,
            cval: 0.0,
        }
    }
}

impl AugmentationConfig {
    /// Only rescale pixel values (validation, test, evaluation)
    pub fn rescale_only() -> Self {
        Self {
            rotation_range: 0.0,
            width_shift_range: 0.0,
            height_shift_range: 0.0,
            shear_range: 0.0,
            zoom_range: 0.0,
            horizontal_flip: false,
            ..Self::default()
        }
    }

    /// Same normalization with every random transform stripped
    pub fn without_random_transforms(&self) -> Self {
        Self {
            rescale: self.rescale,
            fill_mode: self.fill_mode,
            cval: self.cval,
            ..Self::rescale_only()
        }
    }

    /// Whether any random transform is enabled
    pub fn is_random(&self) -> bool {
        self.rotation_range > 0.0
            || self.width_shift_range > 0.0
            || self.height_shift_range > 0.0
            || self.shear_range > 0.0
            || self.zoom_range > 0.0
            || self.horizontal_flip
    }

    pub fn validate(&self) -> Result<(), String> {
        if !(self.rescale.is_finite() && self.rescale > 0.0) {
            return Err("rescale must be a positive number".to_string());
        }
        if self.zoom_range < 0.0 || self.zoom_range >= 1.0 {
            return Err("zoom_range must be in [0, 1)".to_string());
        }
        let ranges = [
            self.rotation_range,
            self.width_shift_range,
            self.height_shift_range,
            self.shear_range,
        ];
        if ranges.iter().any(|r| !r.is_finite() || *r < 0.0) {
            return Err("augmentation ranges must be non-negative".to_string());
        }
        Ok(())
    }
}

/// Parameters of one sampled random transform
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TransformParams {
    /// Rotation in degrees
    pub theta: f32,
    /// Row shift in pixels
    pub tx: f32,
    /// Column shift in pixels
    pub ty: f32,
    /// Shear in degrees
    pub shear: f32,
    pub zx: f32,
    pub zy: f32,
    pub flip_horizontal: bool,
}

impl TransformParams {
    pub fn identity() -> Self {
        Self {
            theta: 0.0,
            tx: 0.0,
            ty: 0.0,
            shear: 0.0,
            zx: 1.0,
            zy: 1.0,
            flip_horizontal: false,
        }
    }

    fn is_affine_identity(&self) -> bool {
        self.theta == 0.0
            && self.tx == 0.0
            && self.ty == 0.0
            && self.shear == 0.0
            && self.zx == 1.0
            && self.zy == 1.0
    }

    /// Output-to-source matrix in `(row, col, 1)` coordinates, centred on the image
    pub fn matrix(&self, height: u32, width: u32) -> Matrix3 {
        let theta = self.theta.to_radians();
        let shear = self.shear.to_radians();

        let rotation = [
            [theta.cos(), -theta.sin(), 0.0],
            [theta.sin(), theta.cos(), 0.0],
            [0.0, 0.0, 1.0],
        ];
        let shift = [[1.0, 0.0, self.tx], [0.0, 1.0, self.ty], [0.0, 0.0, 1.0]];
        let shear_m = [
            [1.0, -shear.sin(), 0.0],
            [0.0, shear.cos(), 0.0],
            [0.0, 0.0, 1.0],
        ];
        let zoom = [[self.zx, 0.0, 0.0], [0.0, self.zy, 0.0], [0.0, 0.0, 1.0]];

        let transform = matmul(&matmul(&matmul(&rotation, &shift), &shear_m), &zoom);

        let o_row = height as f32 / 2.0 + 0.5;
        let o_col = width as f32 / 2.0 + 0.5;
        let offset = [[1.0, 0.0, o_row], [0.0, 1.0, o_col], [0.0, 0.0, 1.0]];
        let reset = [[1.0, 0.0, -o_row], [0.0, 1.0, -o_col], [0.0, 0.0, 1.0]];

        matmul(&matmul(&offset, &transform), &reset)
    }
}

pub type Matrix3 = [[f32; 3]; 3];

fn matmul(a: &Matrix3, b: &Matrix3) -> Matrix3 {
    let mut out = [[0.0f32; 3]; 3];
    for (i, row) in out.iter_mut().enumerate() {
        for (j, cell) in row.iter_mut().enumerate() {
            *cell = (0..3).map(|k| a[i][k] * b[k][j]).sum();
        }
    }
    out
}

/// Applies rescaling and, when configured, random transforms
#[derive(Debug, Clone)]
pub struct Augmenter {
    config: AugmentationConfig,
}

impl Augmenter {
    pub fn new(config: AugmentationConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &AugmentationConfig {
        &self.config
    }

    /// Draw transform parameters for an image of the given size
    pub fn sample_params(&self, height: u32, width: u32, rng: &mut ChaCha8Rng) -> TransformParams {
        let c = &self.config;
        let mut symmetric = |range: f32| {
            if range > 0.0 {
                rng.gen_range(-range..=range)
            } else {
                0.0
            }
        };

        let theta = symmetric(c.rotation_range);
        let tx = symmetric(c.height_shift_range) * height as f32;
        let ty = symmetric(c.width_shift_range) * width as f32;
        let shear = symmetric(c.shear_range);
        let zx = 1.0 + symmetric(c.zoom_range);
        let zy = 1.0 + symmetric(c.zoom_range);
        let flip_horizontal = c.horizontal_flip && rng.gen_bool(0.5);

        TransformParams {
            theta,
            tx,
            ty,
            shear,
            zx,
            zy,
            flip_horizontal,
        }
    }

    /// Turn a decoded image into a rescaled CHW buffer, augmenting if configured
    pub fn process(&self, img: &RgbImage, rng: &mut ChaCha8Rng) -> Vec<f32> {
        if self.config.is_random() {
            let params = self.sample_params(img.height(), img.width(), rng);
            self.apply(img, &params)
        } else {
            self.rescale(img)
        }
    }

    /// Apply fixed transform parameters and rescale
    pub fn apply(&self, img: &RgbImage, params: &TransformParams) -> Vec<f32> {
        let (width, height) = img.dimensions();
        let plane = (width * height) as usize;
        let mut out = vec![0.0f32; 3 * plane];

        if params.is_affine_identity() {
            for (x, y, pixel) in img.enumerate_pixels() {
                let idx = (y * width + x) as usize;
                for c in 0..3 {
                    out[c * plane + idx] = pixel[c] as f32;
                }
            }
        } else {
            let m = params.matrix(height, width);
            for row in 0..height {
                for col in 0..width {
                    let (r, cl) = (row as f32, col as f32);
                    let src_row = m[0][0] * r + m[0][1] * cl + m[0][2];
                    let src_col = m[1][0] * r + m[1][1] * cl + m[1][2];
                    let sample = self.bilinear_sample(img, src_row, src_col);
                    let idx = (row * width + col) as usize;
                    for c in 0..3 {
                        out[c * plane + idx] = sample[c];
                    }
                }
            }
        }

        if params.flip_horizontal {
            for c in 0..3 {
                for row in 0..height as usize {
                    let start = c * plane + row * width as usize;
                    out[start..start + width as usize].reverse();
                }
            }
        }

        let scale = self.config.rescale;
        out.iter_mut().for_each(|v| *v *= scale);
        out
    }

    /// Rescale without any geometric change
    pub fn rescale(&self, img: &RgbImage) -> Vec<f32> {
        self.apply(img, &TransformParams::identity())
    }

    fn bilinear_sample(&self, img: &RgbImage, row: f32, col: f32) -> [f32; 3] {
        let (width, height) = img.dimensions();

        let r0 = row.floor();
        let c0 = col.floor();
        let fr = row - r0;
        let fc = col - c0;
        let (r0, c0) = (r0 as i64, c0 as i64);

        let mut result = [0.0f32; 3];
        let taps = [
            (r0, c0, (1.0 - fr) * (1.0 - fc)),
            (r0, c0 + 1, (1.0 - fr) * fc),
            (r0 + 1, c0, fr * (1.0 - fc)),
            (r0 + 1, c0 + 1, fr * fc),
        ];

        for (r, c, weight) in taps {
            if weight == 0.0 {
                continue;
            }
            let value = match (
                resolve_index(r, height, self.config.fill_mode),
                resolve_index(c, width, self.config.fill_mode),
            ) {
                (Some(rr), Some(cc)) => {
                    let p = img.get_pixel(cc, rr);
                    [p[0] as f32, p[1] as f32, p[2] as f32]
                }
                _ => [self.config.cval; 3],
            };
            for ch in 0..3 {
                result[ch] += weight * value[ch];
            }
        }

        result
    }
}

/// Map a possibly out-of-range pixel index into `0..len`
pub fn resolve_index(idx: i64, len: u32, mode: FillMode) -> Option<u32> {
    let n = len as i64;
    if n == 0 {
        return None;
    }
    if (0..n).contains(&idx) {
        return Some(idx as u32);
    }
    match mode {
        FillMode::Constant => None,
        FillMode::Nearest => Some(idx.clamp(0, n - 1) as u32),
        FillMode::Reflect => {
            let period = 2 * n;
            let m = idx.rem_euclid(period);
            Some(if m < n { m } else { period - 1 - m } as u32)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;
    use rand::SeedableRng;

    fn gradient_image(width: u32, height: u32) -> RgbImage {
        RgbImage::from_fn(width, height, |x, y| {
            Rgb([(x * 20) as u8, (y * 20) as u8, ((x + y) * 10) as u8])
        })
    }

    #[test]
    fn test_default_matches_training_generator() {
        let config = AugmentationConfig::default();
        assert!((config.rescale - 1.0 / 255.0).abs() < 1e-9);
        assert_eq!(config.rotation_range, 10.0);
        assert_eq!(config.fill_mode, FillMode::Reflect);
        assert!(config.horizontal_flip);
        assert!(config.is_random());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_rescale_only_is_not_random() {
        let config = AugmentationConfig::rescale_only();
        assert!(!config.is_random());
        assert!(!AugmentationConfig::default().without_random_transforms().is_random());
    }

    #[test]
    fn test_rescale_produces_chw_in_unit_range() {
        let img = gradient_image(4, 3);
        let augmenter = Augmenter::new(AugmentationConfig::rescale_only());
        let mut rng = ChaCha8Rng::seed_from_u64(0);

        let data = augmenter.process(&img, &mut rng);

        assert_eq!(data.len(), 3 * 4 * 3);
        assert!(data.iter().all(|v| (0.0..=1.0).contains(v)));
        // pixel (x=2, y=1): R = 40, G = 20, B = 30
        let plane = 12;
        let idx = 4 + 2;
        assert!((data[idx] - 40.0 / 255.0).abs() < 1e-6);
        assert!((data[plane + idx] - 20.0 / 255.0).abs() < 1e-6);
        assert!((data[2 * plane + idx] - 30.0 / 255.0).abs() < 1e-6);
    }

    #[test]
    fn test_flip_mirrors_columns() {
        let img = gradient_image(5, 2);
        let augmenter = Augmenter::new(AugmentationConfig::default());
        let params = TransformParams {
            flip_horizontal: true,
            ..TransformParams::identity()
        };

        let plain = augmenter.rescale(&img);
        let flipped = augmenter.apply(&img, &params);

        for row in 0..2 {
            for col in 0..5 {
                assert_eq!(flipped[row * 5 + col], plain[row * 5 + (4 - col)]);
            }
        }
    }

    #[test]
    fn test_integer_shift_moves_pixels_with_reflection() {
        let img = gradient_image(6, 6);
        let augmenter = Augmenter::new(AugmentationConfig::default());
        let params = TransformParams {
            ty: 2.0,
            ..TransformParams::identity()
        };

        let plain = augmenter.rescale(&img);
        let shifted = augmenter.apply(&img, &params);

        // output col c reads source col c + 2
        assert!((shifted[0] - plain[2]).abs() < 1e-6);
        assert!((shifted[3] - plain[5]).abs() < 1e-6);
        // col 4 -> source col 6 -> reflects to 5, col 5 -> source 7 -> 4
        assert!((shifted[4] - plain[5]).abs() < 1e-6);
        assert!((shifted[5] - plain[4]).abs() < 1e-6);
    }

    #[test]
    fn test_sampled_params_stay_in_range() {
        let augmenter = Augmenter::new(AugmentationConfig::default());
        let mut rng = ChaCha8Rng::seed_from_u64(7);

        for _ in 0..200 {
            let p = augmenter.sample_params(256, 256, &mut rng);
            assert!(p.theta.abs() <= 10.0);
            assert!(p.tx.abs() <= 25.6 + 1e-3);
            assert!(p.ty.abs() <= 25.6 + 1e-3);
            assert!(p.shear.abs() <= 0.1);
            assert!((0.9..=1.1).contains(&p.zx));
            assert!((0.9..=1.1).contains(&p.zy));
        }
    }

    #[test]
    fn test_same_seed_same_augmentation() {
        let img = gradient_image(8, 8);
        let augmenter = Augmenter::new(AugmentationConfig::default());

        let a = augmenter.process(&img, &mut ChaCha8Rng::seed_from_u64(42));
        let b = augmenter.process(&img, &mut ChaCha8Rng::seed_from_u64(42));
        assert_eq!(a, b);
    }

    #[test]
    fn test_resolve_index_modes() {
        assert_eq!(resolve_index(-1, 4, FillMode::Reflect), Some(0));
        assert_eq!(resolve_index(-2, 4, FillMode::Reflect), Some(1));
        assert_eq!(resolve_index(4, 4, FillMode::Reflect), Some(3));
        assert_eq!(resolve_index(9, 4, FillMode::Reflect), Some(1));
        assert_eq!(resolve_index(-3, 4, FillMode::Nearest), Some(0));
        assert_eq!(resolve_index(10, 4, FillMode::Nearest), Some(3));
        assert_eq!(resolve_index(4, 4, FillMode::Constant), None);
        assert_eq!(resolve_index(2, 4, FillMode::Constant), Some(2));
    }

    #[test]
    fn test_validate_rejects_bad_zoom() {
        let config = AugmentationConfig {
            zoom_range: 1.5,
            ..AugmentationConfig::default()
        };
        assert!(config.validate().is_err());
    }
}
