//! Holds all the tools for encoding PNG data.
//!
//! * [Portable Network Graphics Specification (Second Edition)][png-spec]
//!
//! [png-spec]: https://www.w3.org/TR/2003/REC-PNG-20031110/
//!
//! ## Automated PNG Encoding
//!
//! If you just want the bytes of a PNG, make a [`SampleImage`] and call
//! [`encode_to_vec`]:
//!
//! ```
//! use imprint::png::{encode_to_vec, SampleImage};
//! let image = SampleImage::from_rgb8(2, 1, &[[255, 0, 0], [0, 0, 255]]).unwrap();
//! let bytes = encode_to_vec(&image, None).unwrap();
//! assert_eq!(&bytes[..8], &imprint::png::PNG_SIGNATURE);
//! ```
//!
//! ## Encoding With Full Control
//!
//! A [`PngEncoder`] takes a seekable sink, any [`PixelSource`], optional
//! [`ImageMetadata`] with the ancillary chunks you want written, and an
//! [`EncodeObserver`] that's told about progress and warnings (and can ask
//! for the encode to stop early). [`WriteParams`] selects a region of the
//! source, subsampling, a band subset, the compression effort, and
//! interlacing.
//!
//! The output is always:
//! * The 8 byte signature.
//! * `IHDR`, then the ancillary chunks in a fixed order, then any unknown
//!   chunks being passed through.
//! * One or more `IDAT` chunks holding a single zlib stream of filtered
//!   scanlines. For an interlaced image that's the seven Adam7 reduced images
//!   one after the other, skipping the empty ones.
//! * `IEND`.

mod crc32;
pub use crc32::*;

mod chunk;
pub use chunk::*;

mod idat;
pub use idat::*;

mod filter;
pub use filter::*;

mod adam7;
pub use adam7::*;

mod scale;
pub use scale::*;

mod source;
pub use source::*;

mod metadata;
pub use metadata::*;

mod chunks;
pub use chunks::*;

mod scanline;
pub use scanline::*;

mod encoder;
pub use encoder::*;

/// The first eight bytes of a PNG datastream should match these bytes.
pub const PNG_SIGNATURE: [u8; 8] = [137, 80, 78, 71, 13, 10, 26, 10];

/// The color types a PNG can hold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(u8)]
pub enum PngColorType {
  /// Greyscale
  Y = 0,
  /// Red, Green, Blue
  RGB = 2,
  /// Index into a palette.
  ///
  /// The palette will have RGB8 data. There may optionally be a transparency
  /// chunk.
  Index = 3,
  /// Greyscale + Alpha
  YA = 4,
  /// Red, Green, Blue, Alpha
  RGBA = 6,
}
impl PngColorType {
  /// The number of channels in this type of color.
  #[inline]
  #[must_use]
  pub const fn channel_count(self) -> usize {
    match self {
      Self::Y => 1,
      Self::RGB => 3,
      Self::Index => 1,
      Self::YA => 2,
      Self::RGBA => 4,
    }
  }

  /// The same color type with any alpha channel dropped.
  #[inline]
  #[must_use]
  pub const fn without_alpha(self) -> Self {
    match self {
      Self::YA => Self::Y,
      Self::RGBA => Self::RGB,
      other => other,
    }
  }

  /// If this type of color carries an alpha channel.
  #[inline]
  #[must_use]
  pub const fn has_alpha(self) -> bool {
    matches!(self, Self::YA | Self::RGBA)
  }

  /// If the bit depth is allowed for this color type.
  #[inline]
  #[must_use]
  pub const fn allows_bit_depth(self, bit_depth: u8) -> bool {
    match self {
      Self::Y => matches!(bit_depth, 1 | 2 | 4 | 8 | 16),
      Self::Index => matches!(bit_depth, 1 | 2 | 4 | 8),
      Self::RGB | Self::YA | Self::RGBA => matches!(bit_depth, 8 | 16),
    }
  }
}
impl TryFrom<u8> for PngColorType {
  type Error = ();
  #[inline]
  fn try_from(value: u8) -> Result<Self, Self::Error> {
    Ok(match value {
      0 => PngColorType::Y,
      2 => PngColorType::RGB,
      3 => PngColorType::Index,
      4 => PngColorType::YA,
      6 => PngColorType::RGBA,
      _ => return Err(()),
    })
  }
}

#[test]
fn test_color_type_bytes() {
  for ct in [PngColorType::Y, PngColorType::RGB, PngColorType::Index, PngColorType::YA, PngColorType::RGBA] {
    assert_eq!(PngColorType::try_from(ct as u8), Ok(ct));
  }
  assert!(PngColorType::try_from(1).is_err());
  assert!(PngColorType::YA.allows_bit_depth(16));
  assert!(!PngColorType::RGB.allows_bit_depth(4));
  assert!(!PngColorType::Index.allows_bit_depth(16));
}
