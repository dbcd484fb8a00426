use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};

use log::debug;
use rand::Rng;
use rayon::prelude::*;

use crate::cascade::Cascade;
use crate::error::{Error, Result};
use crate::integral::{DualImage, IntegralImage};

/// Attempts per background image to find a crop that still fools the
/// cascade before settling for a random one.
const ADVERSARIAL_ATTEMPTS: usize = 10;

/// Attempts to dodge a zero-variance crop, which cannot be
/// contrast-normalised.
const FLAT_CROP_ATTEMPTS: usize = 10;

/// Provides training windows. All windows are contrast-normalised, so
/// classifiers never see absolute brightness.
pub trait SampleSource {
    /// Positive samples, all of the detection window's exact size.
    fn positives(&self) -> Vec<IntegralImage>;

    /// Negative samples for the first layer of a cascade.
    fn initial_negatives(&self) -> Vec<IntegralImage>;

    /// Negative samples that the existing cascade still accepts, for
    /// every layer after the first.
    fn adversarial_negatives(&self, cascade: &Cascade) -> Vec<IntegralImage>;
}

/// Samples loaded from a directory of positives and a directory of
/// larger background images. Negatives are random positive-sized crops
/// of the backgrounds.
pub struct DirSampleSource {
    positives: Vec<IntegralImage>,
    negatives: Vec<DualImage>,
    window_width: usize,
    window_height: usize,
}

impl DirSampleSource {
    /// Reads every non-hidden file of both directories. All positives
    /// must share one size and every background must be at least that
    /// size.
    pub fn load(pos_dir: impl AsRef<Path>, neg_dir: impl AsRef<Path>) -> Result<Self> {
        let mut positives = Vec::new();
        let mut window: Option<(usize, usize)> = None;
        for path in image_paths(pos_dir.as_ref())? {
            let (pixels, w, h) = load_grayscale(&path)?;
            match window {
                None => window = Some((w, h)),
                Some(expected) if expected != (w, h) => {
                    return Err(Error::SampleSizeMismatch {
                        path,
                        expected,
                        actual: (w, h),
                    });
                }
                Some(_) => {}
            }
            let dual = DualImage::new(&IntegralImage::from_bitmap(&pixels, w, h)?);
            positives.push(dual.normalized_crop(0, 0, w, h));
        }
        let (window_width, window_height) = window.unwrap_or((0, 0));

        let mut negatives = Vec::new();
        for path in image_paths(neg_dir.as_ref())? {
            let (pixels, w, h) = load_grayscale(&path)?;
            if w < window_width || h < window_height {
                return Err(Error::NegativeTooSmall {
                    path,
                    actual: (w, h),
                    window: (window_width, window_height),
                });
            }
            negatives.push(DualImage::new(&IntegralImage::from_bitmap(&pixels, w, h)?));
        }

        Ok(Self {
            positives,
            negatives,
            window_width,
            window_height,
        })
    }

    /// The common size of the positive samples, if any were loaded.
    pub fn window_size(&self) -> Option<(usize, usize)> {
        (!self.positives.is_empty()).then_some((self.window_width, self.window_height))
    }

    fn random_crop(&self, rng: &mut impl Rng, image: &DualImage) -> IntegralImage {
        let max_x = image.width() - self.window_width;
        let max_y = image.height() - self.window_height;
        let mut crop = (0, 0);
        for attempt in 0..FLAT_CROP_ATTEMPTS {
            crop = (rng.gen_range(0..=max_x), rng.gen_range(0..=max_y));
            let deviation =
                image.deviation(crop.0, crop.1, self.window_width, self.window_height);
            if deviation > 0.0 || attempt + 1 == FLAT_CROP_ATTEMPTS {
                break;
            }
        }
        image.normalized_crop(crop.0, crop.1, self.window_width, self.window_height)
    }
}

impl SampleSource for DirSampleSource {
    fn positives(&self) -> Vec<IntegralImage> {
        self.positives.clone()
    }

    fn initial_negatives(&self) -> Vec<IntegralImage> {
        let mut rng = rand::thread_rng();
        self.negatives
            .iter()
            .map(|image| self.random_crop(&mut rng, image))
            .collect()
    }

    fn adversarial_negatives(&self, cascade: &Cascade) -> Vec<IntegralImage> {
        let fallbacks = AtomicUsize::new(0);
        let crops: Vec<IntegralImage> = self
            .negatives
            .par_iter()
            .map_init(rand::thread_rng, |rng, image| {
                for _ in 0..ADVERSARIAL_ATTEMPTS {
                    let crop = self.random_crop(rng, image);
                    if cascade.classify(&crop) {
                        return crop;
                    }
                }
                fallbacks.fetch_add(1, Ordering::Relaxed);
                self.random_crop(rng, image)
            })
            .collect();

        let fallbacks = fallbacks.into_inner();
        if fallbacks > 0 {
            debug!(
                "adversarial mining fell back to {fallbacks} random crops out of {}",
                crops.len()
            );
        }
        crops
    }
}

fn image_paths(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut paths = Vec::new();
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        let hidden = path
            .file_name()
            .and_then(|n| n.to_str())
            .is_some_and(|n| n.starts_with('.'));
        if path.is_dir() || hidden {
            continue;
        }
        paths.push(path);
    }
    paths.sort();
    Ok(paths)
}

/// Decodes an image and averages R, G and B into [0, 1] brightness.
fn load_grayscale(path: &Path) -> Result<(Vec<f64>, usize, usize)> {
    let img = image::open(path)?.to_rgb8();
    let (w, h) = img.dimensions();
    let pixels = img
        .pixels()
        .map(|p| (p[0] as f64 + p[1] as f64 + p[2] as f64) / (3.0 * 255.0))
        .collect();
    Ok((pixels, w as usize, h as usize))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cascade::Layer;
    use crate::feature::{Feature, FeatureKind};
    use crate::integral::IntegralView;
    use image::GrayImage;

    struct TestDirs {
        root: PathBuf,
        pos: PathBuf,
        neg: PathBuf,
    }

    impl Drop for TestDirs {
        fn drop(&mut self) {
            let _ = fs::remove_dir_all(&self.root);
        }
    }

    fn write_gradient(path: &Path, width: u32, height: u32, seed: u32) {
        let img = GrayImage::from_fn(width, height, |x, y| {
            image::Luma([((x * 37 + y * 11 + seed * 53) % 256) as u8])
        });
        img.save(path).unwrap();
    }

    fn sample_dirs(name: &str, pos_sizes: &[(u32, u32)], neg_sizes: &[(u32, u32)]) -> TestDirs {
        let root = std::env::temp_dir().join(format!("haar-cascade-samples-{name}"));
        let _ = fs::remove_dir_all(&root);
        let pos = root.join("pos");
        let neg = root.join("neg");
        fs::create_dir_all(&pos).unwrap();
        fs::create_dir_all(&neg).unwrap();
        for (i, &(w, h)) in pos_sizes.iter().enumerate() {
            write_gradient(&pos.join(format!("p{i}.png")), w, h, i as u32);
        }
        for (i, &(w, h)) in neg_sizes.iter().enumerate() {
            write_gradient(&neg.join(format!("n{i}.png")), w, h, 100 + i as u32);
        }
        TestDirs { root, pos, neg }
    }

    #[test]
    fn loads_and_normalizes_positives() {
        let dirs = sample_dirs("load", &[(8, 8), (8, 8)], &[(24, 16)]);
        let source = DirSampleSource::load(&dirs.pos, &dirs.neg).unwrap();
        assert_eq!(source.window_size(), Some((8, 8)));
        let positives = source.positives();
        assert_eq!(positives.len(), 2);
        for p in &positives {
            assert_eq!((p.width(), p.height()), (8, 8));
            // Normalised windows sum to zero over their full frame.
            assert!(p.rect_sum(0, 0, 8, 8).abs() < 1e-6);
        }
    }

    #[test]
    fn rejects_mixed_positive_sizes() {
        let dirs = sample_dirs("mixed", &[(8, 8), (9, 8)], &[(24, 16)]);
        assert!(matches!(
            DirSampleSource::load(&dirs.pos, &dirs.neg),
            Err(Error::SampleSizeMismatch { .. })
        ));
    }

    #[test]
    fn rejects_undersized_negatives() {
        let dirs = sample_dirs("small", &[(8, 8)], &[(6, 10)]);
        assert!(matches!(
            DirSampleSource::load(&dirs.pos, &dirs.neg),
            Err(Error::NegativeTooSmall { .. })
        ));
    }

    #[test]
    fn one_initial_negative_per_background() {
        let dirs = sample_dirs("initial", &[(8, 8)], &[(24, 16), (12, 12), (8, 8)]);
        let source = DirSampleSource::load(&dirs.pos, &dirs.neg).unwrap();
        let negatives = source.initial_negatives();
        assert_eq!(negatives.len(), 3);
        for n in &negatives {
            assert_eq!((n.width(), n.height()), (8, 8));
        }
    }

    #[test]
    fn adversarial_mining_always_delivers() {
        let dirs = sample_dirs("mining", &[(8, 8)], &[(24, 16), (16, 16)]);
        let source = DirSampleSource::load(&dirs.pos, &dirs.neg).unwrap();

        // A cascade that rejects everything forces the random-crop
        // fallback for every background.
        let hostile = Cascade {
            layers: vec![Layer {
                features: vec![Feature {
                    kind: FeatureKind::HorizontalPair,
                    x: 0,
                    y: 0,
                    width: 2,
                    height: 2,
                }],
                thresholds: vec![0.0],
                weights: vec![1.0],
                threshold: 10.0,
            }],
            window_width: 8,
            window_height: 8,
        };
        let crops = source.adversarial_negatives(&hostile);
        assert_eq!(crops.len(), 2);

        // An empty cascade accepts the first attempt for every image.
        let crops = source.adversarial_negatives(&Cascade::default());
        assert_eq!(crops.len(), 2);
        for c in &crops {
            assert_eq!((c.width(), c.height()), (8, 8));
        }
    }
}
