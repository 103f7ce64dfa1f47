//! Where the pixels come from.
//!
//! An encode reads its source one row at a time as plain integer samples,
//! one `u32` per band, through the [`PixelSource`] trait. The
//! [`SampleLayout`] says how wide each band is and how to interpret the
//! samples.

use crate::{PngEncodeError, PngResult};

/// How a source's samples turn into colors.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ColorModel {
  /// Each band is a channel. With alpha, the alpha band is the last one.
  Direct {
    has_alpha: bool,
    /// The color bands have already been multiplied by alpha.
    premultiplied: bool,
  },
  /// A single band of palette indexes.
  Indexed {
    palette: Vec<[u8; 3]>,
    /// Per-entry alpha. Missing entries are opaque.
    alpha: Option<Vec<u8>>,
  },
}
impl ColorModel {
  /// If any color can be less than fully opaque.
  ///
  /// An indexed model whose alpha table is all 255 has no alpha.
  #[inline]
  #[must_use]
  pub fn has_alpha(&self) -> bool {
    match self {
      Self::Direct { has_alpha, .. } => *has_alpha,
      Self::Indexed { alpha, .. } => alpha.as_ref().map_or(false, |a| a.iter().any(|&x| x != u8::MAX)),
    }
  }

  #[inline]
  #[must_use]
  pub const fn is_premultiplied(&self) -> bool {
    matches!(self, Self::Direct { has_alpha: true, premultiplied: true })
  }

  #[inline]
  #[must_use]
  pub const fn is_indexed(&self) -> bool {
    matches!(self, Self::Indexed { .. })
  }
}

/// Sample sizes plus color interpretation of a source.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SampleLayout {
  /// Bits per sample, one entry per band.
  pub sample_bits: Vec<u8>,
  pub color_model: ColorModel,
}
impl SampleLayout {
  /// Direct color with the given bits per band.
  #[inline]
  #[must_use]
  pub fn direct(sample_bits: Vec<u8>, has_alpha: bool) -> Self {
    Self { sample_bits, color_model: ColorModel::Direct { has_alpha, premultiplied: false } }
  }

  /// Direct color with a premultiplied alpha band last.
  #[inline]
  #[must_use]
  pub fn direct_premultiplied(sample_bits: Vec<u8>) -> Self {
    Self { sample_bits, color_model: ColorModel::Direct { has_alpha: true, premultiplied: true } }
  }

  /// One band of `bits` wide palette indexes.
  #[inline]
  #[must_use]
  pub fn indexed(bits: u8, palette: Vec<[u8; 3]>, alpha: Option<Vec<u8>>) -> Self {
    Self { sample_bits: vec![bits], color_model: ColorModel::Indexed { palette, alpha } }
  }

  #[inline]
  #[must_use]
  pub fn num_bands(&self) -> usize {
    self.sample_bits.len()
  }
}

/// Something an image can be encoded from.
pub trait PixelSource {
  fn width(&self) -> u32;
  fn height(&self) -> u32;
  fn layout(&self) -> &SampleLayout;

  /// Reads `width` pixels of row `y`, starting at column `x`.
  ///
  /// For each pixel the samples of `bands` are written in that order, so
  /// `out` gets `width * bands.len()` values. The caller guarantees the span
  /// and the band indexes are in bounds.
  fn read_row(&self, x: u32, y: u32, width: u32, bands: &[usize], out: &mut [u32]);
}

/// Converts an `(x,y)` position within a given `width` 2D space into a linear
/// index.
#[inline]
#[must_use]
pub const fn xy_width_to_index(x: u32, y: u32, width: u32) -> usize {
  (y as usize) * (width as usize) + (x as usize)
}

/// An in-memory image of band-interleaved samples.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SampleImage {
  width: u32,
  height: u32,
  layout: SampleLayout,
  samples: Vec<u32>,
}
impl SampleImage {
  /// Needs exactly `width * height * bands` samples, and at least one band.
  pub fn new(width: u32, height: u32, layout: SampleLayout, samples: Vec<u32>) -> PngResult<Self> {
    if layout.num_bands() == 0 {
      return Err(PngEncodeError::InvalidArgument("sample layout has no bands"));
    }
    if layout.color_model.is_indexed() && layout.num_bands() != 1 {
      return Err(PngEncodeError::InvalidArgument("indexed color must have exactly one band"));
    }
    let expected = (width as usize)
      .checked_mul(height as usize)
      .and_then(|px| px.checked_mul(layout.num_bands()));
    if expected != Some(samples.len()) {
      return Err(PngEncodeError::InvalidArgument("sample count doesn't match the image size"));
    }
    Ok(Self { width, height, layout, samples })
  }

  /// 8-bit RGB pixels.
  pub fn from_rgb8(width: u32, height: u32, pixels: &[[u8; 3]]) -> PngResult<Self> {
    let bytes: &[u8] = bytemuck::cast_slice(pixels);
    Self::new(width, height, SampleLayout::direct(vec![8; 3], false), bytes.iter().map(|&b| u32::from(b)).collect())
  }

  /// 8-bit RGBA pixels (straight alpha).
  pub fn from_rgba8(width: u32, height: u32, pixels: &[[u8; 4]]) -> PngResult<Self> {
    let bytes: &[u8] = bytemuck::cast_slice(pixels);
    Self::new(width, height, SampleLayout::direct(vec![8; 4], true), bytes.iter().map(|&b| u32::from(b)).collect())
  }

  /// Grayscale with `bits` per sample.
  pub fn from_gray(width: u32, height: u32, bits: u8, pixels: &[u16]) -> PngResult<Self> {
    Self::new(width, height, SampleLayout::direct(vec![bits], false), pixels.iter().map(|&p| u32::from(p)).collect())
  }

  /// Palette indexes with `bits` per index.
  pub fn from_indexed(
    width: u32, height: u32, bits: u8, palette: Vec<[u8; 3]>, alpha: Option<Vec<u8>>, indexes: &[u8],
  ) -> PngResult<Self> {
    Self::new(width, height, SampleLayout::indexed(bits, palette, alpha), indexes.iter().map(|&i| u32::from(i)).collect())
  }

  /// Gets one sample, or `None` if out of bounds.
  #[inline]
  #[must_use]
  pub fn get(&self, x: u32, y: u32, band: usize) -> Option<u32> {
    if x < self.width && y < self.height && band < self.layout.num_bands() {
      self.samples.get(xy_width_to_index(x, y, self.width) * self.layout.num_bands() + band).copied()
    } else {
      None
    }
  }
}
impl PixelSource for SampleImage {
  #[inline]
  fn width(&self) -> u32 {
    self.width
  }
  #[inline]
  fn height(&self) -> u32 {
    self.height
  }
  #[inline]
  fn layout(&self) -> &SampleLayout {
    &self.layout
  }
  fn read_row(&self, x: u32, y: u32, width: u32, bands: &[usize], out: &mut [u32]) {
    let nb = self.layout.num_bands();
    let start = xy_width_to_index(x, y, self.width) * nb;
    let row = &self.samples[start..start + width as usize * nb];
    for (pixel, out) in row.chunks_exact(nb).zip(out.chunks_exact_mut(bands.len())) {
      for (o, &band) in out.iter_mut().zip(bands) {
        *o = pixel[band];
      }
    }
  }
}

/// Undoes alpha premultiplication for one pixel.
///
/// `pixel` holds the samples being written with alpha last, and `bits` their
/// sample sizes. Each color becomes `trunc(c * max_alpha / alpha + 0.5)`,
/// clamped to its band's max. Fully transparent pixels are left alone.
pub fn unpremultiply(pixel: &mut [u32], bits: &[u8]) {
  let Some((alpha, colors)) = pixel.split_last_mut() else { return };
  let Some((&alpha_bits, color_bits)) = bits.split_last() else { return };
  if *alpha == 0 {
    return;
  }
  let max_alpha = ((1_u64 << alpha_bits) - 1) as f32;
  let recip = max_alpha / (*alpha as f32);
  for (c, &b) in colors.iter_mut().zip(color_bits) {
    let band_max = (1_u64 << b) - 1;
    let v = (*c as f32 * recip + 0.5) as u64;
    *c = v.min(band_max) as u32;
  }
}
