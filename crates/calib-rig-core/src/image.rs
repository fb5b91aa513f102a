use crate::ImageSize;

/// Borrowed 8-bit grayscale image, row-major, `data.len() == width * height`.
#[derive(Clone, Copy, Debug)]
pub struct GrayImageView<'a> {
    pub width: usize,
    pub height: usize,
    pub data: &'a [u8],
}

/// Owned 8-bit grayscale frame handed between frame sources, detectors and
/// display sinks.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GrayImage {
    pub width: usize,
    pub height: usize,
    pub data: Vec<u8>,
}

impl GrayImage {
    /// Wrap a raw buffer. Returns `None` when the length does not match.
    pub fn from_raw(width: usize, height: usize, data: Vec<u8>) -> Option<Self> {
        let expected = width.checked_mul(height)?;
        (data.len() == expected).then_some(Self {
            width,
            height,
            data,
        })
    }

    /// A black frame of the given size.
    pub fn blank(width: usize, height: usize) -> Self {
        Self {
            width,
            height,
            data: vec![0; width * height],
        }
    }

    #[inline]
    pub fn view(&self) -> GrayImageView<'_> {
        GrayImageView {
            width: self.width,
            height: self.height,
            data: &self.data,
        }
    }

    #[inline]
    pub fn size(&self) -> ImageSize {
        ImageSize {
            width: self.width as u32,
            height: self.height as u32,
        }
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    /// Halve both dimensions with a 2×2 box filter.
    pub fn downsample_half(&self) -> GrayImage {
        let w = self.width / 2;
        let h = self.height / 2;
        let mut data = Vec::with_capacity(w * h);
        for y in 0..h {
            let r0 = 2 * y * self.width;
            let r1 = r0 + self.width;
            for x in 0..w {
                let c = 2 * x;
                let sum = self.data[r0 + c] as u16
                    + self.data[r0 + c + 1] as u16
                    + self.data[r1 + c] as u16
                    + self.data[r1 + c + 1] as u16;
                data.push(((sum + 2) / 4) as u8);
            }
        }
        GrayImage {
            width: w,
            height: h,
            data,
        }
    }
}
