use crate::error::{Error, Result};

/// Read access to a 2-D prefix sum. Everything that evaluates Haar
/// features goes through this trait, so detection can hand classifiers
/// lazy normalised or rescaled views while training uses owned images.
pub trait IntegralView {
    fn width(&self) -> usize;

    fn height(&self) -> usize;

    /// Sum of all pixels strictly above and to the left of `(x, y)`.
    /// `(0, 0)` is the top-left pixel, so `integral_at(0, y)` and
    /// `integral_at(x, 0)` are 0 for freshly built images.
    fn integral_at(&self, x: usize, y: usize) -> f64;

    /// Sum of the pixels in the `(x, y, w, h)` rectangle, via the four
    /// corner lookups.
    fn rect_sum(&self, x: usize, y: usize, w: usize, h: usize) -> f64 {
        self.integral_at(x + w, y + h) + self.integral_at(x, y)
            - self.integral_at(x + w, y)
            - self.integral_at(x, y + h)
    }
}

impl<T: IntegralView + ?Sized> IntegralView for &T {
    fn width(&self) -> usize {
        (**self).width()
    }

    fn height(&self) -> usize {
        (**self).height()
    }

    fn integral_at(&self, x: usize, y: usize) -> f64 {
        (**self).integral_at(x, y)
    }
}

/// An owned integral image. Immutable once built.
#[derive(Debug, Clone)]
pub struct IntegralImage {
    integrals: Vec<f64>,
    width: usize,
    height: usize,
}

impl IntegralImage {
    /// Builds the prefix sums of a row-major grayscale bitmap.
    pub fn from_bitmap(pixels: &[f64], width: usize, height: usize) -> Result<Self> {
        if pixels.len() != width * height {
            return Err(Error::BitmapSize {
                len: pixels.len(),
                width,
                height,
            });
        }
        Ok(Self::build(pixels, width, height))
    }

    // Length already validated by the caller.
    fn build(pixels: &[f64], width: usize, height: usize) -> Self {
        let mut res = Self {
            integrals: vec![0.0; width * height],
            width,
            height,
        };
        let mut idx = 0;
        for y in 0..height {
            for x in 0..width {
                let above_left = res.integral_at(x, y);
                let left = res.integral_at(x, y + 1);
                let above = res.integral_at(x + 1, y);
                res.integrals[idx] = pixels[idx] + above + left - above_left;
                idx += 1;
            }
        }
        res
    }
}

impl IntegralView for IntegralImage {
    fn width(&self) -> usize {
        self.width
    }

    fn height(&self) -> usize {
        self.height
    }

    fn integral_at(&self, x: usize, y: usize) -> f64 {
        if x == 0 || y == 0 {
            return 0.0;
        }
        self.integrals[(x - 1) + self.width * (y - 1)]
    }
}

/// Integral images of an image's brightness and of its squared
/// brightness, which together price any sub-window's mean and standard
/// deviation at O(1). All windows handed to classifiers come from
/// here, so every evaluation sees contrast-normalised pixels.
#[derive(Debug, Clone)]
pub struct DualImage {
    values: IntegralImage,
    squares: IntegralImage,
}

impl DualImage {
    pub fn new(image: &IntegralImage) -> Self {
        let (width, height) = (image.width(), image.height());
        let mut values = Vec::with_capacity(width * height);
        let mut squares = Vec::with_capacity(width * height);
        for y in 0..height {
            for x in 0..width {
                let pixel = image.rect_sum(x, y, 1, 1);
                values.push(pixel);
                squares.push(pixel * pixel);
            }
        }
        Self {
            values: IntegralImage::build(&values, width, height),
            squares: IntegralImage::build(&squares, width, height),
        }
    }

    pub fn width(&self) -> usize {
        self.values.width()
    }

    pub fn height(&self) -> usize {
        self.values.height()
    }

    /// A lazy view of the `(x, y, w, h)` sub-window behaving as the
    /// integral image of `(b - mean) / stddev` over that rectangle.
    /// Constant-time; used by the scanner at every window position.
    pub fn window(&self, x: usize, y: usize, w: usize, h: usize) -> NormalizedWindow<'_> {
        assert!(
            x + w <= self.width() && y + h <= self.height(),
            "window rectangle out of bounds"
        );
        let (mean, stddev) = self.stats(x, y, w, h);
        NormalizedWindow {
            image: &self.values,
            x,
            y,
            width: w,
            height: h,
            mean,
            stddev,
        }
    }

    /// An owned normalised window: the honest integral image of the
    /// normalised pixels. Rectangle sums agree with [`Self::window`],
    /// and the result can be windowed again because its zero strip is
    /// real. Training samples are materialised through this.
    pub fn normalized_crop(&self, x: usize, y: usize, w: usize, h: usize) -> IntegralImage {
        assert!(
            x + w <= self.width() && y + h <= self.height(),
            "crop rectangle out of bounds"
        );
        let (mean, stddev) = self.stats(x, y, w, h);
        let mut pixels = Vec::with_capacity(w * h);
        for v in 0..h {
            for u in 0..w {
                let b = self.values.rect_sum(x + u, y + v, 1, 1);
                pixels.push((b - mean) / stddev);
            }
        }
        IntegralImage::build(&pixels, w, h)
    }

    /// Standard deviation of the brightness over a rectangle. Zero
    /// means the window is constant and cannot be normalised.
    pub(crate) fn deviation(&self, x: usize, y: usize, w: usize, h: usize) -> f64 {
        self.stats(x, y, w, h).1
    }

    fn stats(&self, x: usize, y: usize, w: usize, h: usize) -> (f64, f64) {
        let area = (w * h) as f64;
        let mean = self.values.rect_sum(x, y, w, h) / area;
        let variance = self.squares.rect_sum(x, y, w, h) / area - mean * mean;
        (mean, variance.max(0.0).sqrt())
    }
}

/// Lazy contrast-normalised view of one rectangle of a [`DualImage`].
///
/// The mean subtraction leans on the backing image's zero strip along
/// x=0 and y=0, so these views are only produced for root dual images;
/// nested windowing goes through [`DualImage::normalized_crop`], which
/// renormalises.
#[derive(Debug, Clone, Copy)]
pub struct NormalizedWindow<'a> {
    image: &'a IntegralImage,
    x: usize,
    y: usize,
    width: usize,
    height: usize,
    mean: f64,
    stddev: f64,
}

impl<'a> NormalizedWindow<'a> {
    /// Nearest-neighbour rescale of this window to another size, for
    /// running a fixed-size cascade over larger detection windows.
    pub fn scaled_to(self, width: usize, height: usize) -> ScaledWindow<'a> {
        let scale_x = self.width as f64 / width as f64;
        let scale_y = self.height as f64 / height as f64;
        ScaledWindow {
            inner: self,
            width,
            height,
            scale_x,
            scale_y,
        }
    }
}

impl IntegralView for NormalizedWindow<'_> {
    fn width(&self) -> usize {
        self.width
    }

    fn height(&self) -> usize {
        self.height
    }

    fn integral_at(&self, x: usize, y: usize) -> f64 {
        let raw = self.image.integral_at(x + self.x, y + self.y);
        let area = ((x + self.x) * (y + self.y)) as f64;
        (raw - self.mean * area) / self.stddev
    }
}

/// Nearest-neighbour resampled view of a [`NormalizedWindow`]. Corner
/// lookups are mapped back onto the source lattice and sums divided by
/// the area ratio, so feature values stay comparable with the window
/// size the cascade was trained at.
#[derive(Debug, Clone, Copy)]
pub struct ScaledWindow<'a> {
    inner: NormalizedWindow<'a>,
    width: usize,
    height: usize,
    scale_x: f64,
    scale_y: f64,
}

impl IntegralView for ScaledWindow<'_> {
    fn width(&self) -> usize {
        self.width
    }

    fn height(&self) -> usize {
        self.height
    }

    fn integral_at(&self, x: usize, y: usize) -> f64 {
        let sx = ((x as f64 * self.scale_x).round() as usize).min(self.inner.width);
        let sy = ((y as f64 * self.scale_y).round() as usize).min(self.inner.height);
        self.inner.integral_at(sx, sy) / (self.scale_x * self.scale_y)
    }
}
