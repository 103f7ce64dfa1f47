//! The chunk-level description of a PNG to be written.
//!
//! Each optional chunk is an `Option` (or a `Vec` for the repeatable ones)
//! holding a value that has every field the chunk needs. The color-typed
//! chunks (`tRNS`, `bKGD`, `sBIT`) are enums whose variant records which
//! color type they were made for.

use crate::{PngEncodeError, PngResult, SrgbIntent};

use super::{ChunkTy, ColorModel, PngColorType, SampleLayout};

/// PNG keywords are limited to 79 bytes.
pub const MAX_KEYWORD_LEN: usize = 79;

/// Converts to Latin-1 bytes, or `None` if a char is outside Latin-1.
#[must_use]
pub(crate) fn latin1_bytes(s: &str) -> Option<Vec<u8>> {
  s.chars().map(|c| u8::try_from(u32::from(c)).ok()).collect()
}

/// A chunk keyword (also used for profile and palette names).
///
/// Must be 1-79 printable Latin-1 characters (32-126 and 161-255), with no
/// leading, trailing, or consecutive spaces.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Keyword(String);
impl Keyword {
  pub fn new(s: &str) -> PngResult<Self> {
    let count = s.chars().count();
    if count == 0 || count > MAX_KEYWORD_LEN {
      return Err(PngEncodeError::MalformedMetadata("keyword must be 1 to 79 characters"));
    }
    if s.starts_with(' ') || s.ends_with(' ') || s.contains("  ") {
      return Err(PngEncodeError::MalformedMetadata("keyword has leading, trailing, or double spaces"));
    }
    let printable = |c: char| matches!(u32::from(c), 32..=126 | 161..=255);
    if !s.chars().all(printable) {
      return Err(PngEncodeError::MalformedMetadata("keyword is not printable Latin-1"));
    }
    Ok(Self(s.into()))
  }

  #[inline]
  #[must_use]
  pub fn as_str(&self) -> &str {
    &self.0
  }

  /// The keyword's Latin-1 bytes (one per char).
  #[must_use]
  pub fn to_latin1(&self) -> Vec<u8> {
    // the constructor already rejected anything outside Latin-1.
    self.0.chars().map(|c| u32::from(c) as u8).collect()
  }
}
impl TryFrom<&str> for Keyword {
  type Error = PngEncodeError;
  #[inline]
  fn try_from(s: &str) -> Result<Self, Self::Error> {
    Self::new(s)
  }
}

/// Image Header
///
/// The method bytes are kept raw so that a header from elsewhere can be
/// checked when it's written.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ImageHeader {
  pub width: u32,
  pub height: u32,
  /// bits per channel
  pub bit_depth: u8,
  pub color_type: PngColorType,
  /// must be 0 (deflate)
  pub compression_method: u8,
  /// must be 0 (adaptive)
  pub filter_method: u8,
  /// 0 (none) or 1 (Adam7)
  pub interlace_method: u8,
}
impl ImageHeader {
  #[inline]
  #[must_use]
  pub const fn new(width: u32, height: u32, bit_depth: u8, color_type: PngColorType) -> Self {
    Self {
      width,
      height,
      bit_depth,
      color_type,
      compression_method: 0,
      filter_method: 0,
      interlace_method: 0,
    }
  }

  #[inline]
  #[must_use]
  pub const fn is_interlaced(&self) -> bool {
    self.interlace_method == 1
  }

  /// Bits used by one full pixel.
  #[inline]
  #[must_use]
  pub const fn bits_per_pixel(&self) -> usize {
    (self.bit_depth as usize) * self.color_type.channel_count()
  }

  /// Bytes per complete pixel, at least 1. This is the filter stride.
  #[inline]
  #[must_use]
  pub const fn filter_bpp(&self) -> usize {
    let bytes = self.bits_per_pixel() / 8;
    if bytes == 0 {
      1
    } else {
      bytes
    }
  }

  /// Bytes in one scanline (without the filter type byte) for a pass that's
  /// `width` pixels wide.
  #[inline]
  #[must_use]
  pub const fn bytes_per_row(&self, width: u32) -> usize {
    (self.bits_per_pixel() * (width as usize) + 7) / 8
  }
}

/// Palette
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Palette {
  entries: Vec<[u8; 3]>,
  order: Option<Vec<u8>>,
}
impl Palette {
  /// Needs 1 to 256 entries.
  pub fn new(entries: Vec<[u8; 3]>) -> PngResult<Self> {
    if entries.is_empty() || entries.len() > 256 {
      return Err(PngEncodeError::MalformedMetadata("palette must have 1 to 256 entries"));
    }
    Ok(Self { entries, order: None })
  }

  /// Builds from parallel channel arrays, which must all be the same length.
  pub fn from_channels(red: &[u8], green: &[u8], blue: &[u8]) -> PngResult<Self> {
    if red.len() != green.len() || red.len() != blue.len() {
      return Err(PngEncodeError::MalformedMetadata("palette channel arrays differ in length"));
    }
    Self::new(red.iter().zip(green).zip(blue).map(|((r, g), b)| [*r, *g, *b]).collect())
  }

  /// Sets the index remap: source index `i` is written as `order[i]`.
  ///
  /// The order must be a permutation of `0 .. entries.len()`.
  pub fn with_order(mut self, order: Vec<u8>) -> PngResult<Self> {
    let mut seen = [false; 256];
    let is_permutation = order.len() == self.entries.len()
      && order.iter().all(|&i| {
        let fresh = usize::from(i) < self.entries.len() && !seen[usize::from(i)];
        seen[usize::from(i)] = true;
        fresh
      });
    if !is_permutation {
      return Err(PngEncodeError::MalformedMetadata("palette order is not a permutation"));
    }
    self.order = Some(order);
    Ok(self)
  }

  #[inline]
  #[must_use]
  pub fn entries(&self) -> &[[u8; 3]] {
    &self.entries
  }

  #[inline]
  #[must_use]
  pub fn order(&self) -> Option<&[u8]> {
    self.order.as_deref()
  }

  #[inline]
  #[must_use]
  pub fn len(&self) -> usize {
    self.entries.len()
  }

  #[inline]
  #[must_use]
  pub fn is_empty(&self) -> bool {
    self.entries.is_empty()
  }
}

/// Transparency
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Transparency {
  /// One alpha per palette entry. Can be shorter than the palette, the
  /// missing entries are fully opaque.
  Palette { alpha: Vec<u8> },
  /// This gray level is fully transparent.
  Gray { gray: u16 },
  /// This color is fully transparent.
  Rgb { red: u16, green: u16, blue: u16 },
}
impl Transparency {
  /// The color type this value was made for.
  #[inline]
  #[must_use]
  pub const fn color_type(&self) -> PngColorType {
    match self {
      Self::Palette { .. } => PngColorType::Index,
      Self::Gray { .. } => PngColorType::Y,
      Self::Rgb { .. } => PngColorType::RGB,
    }
  }

  /// Fits the value to an image's color type.
  ///
  /// A gray value is promoted to an RGB image as `r = g = b`. Any other
  /// mismatch gives `None` (the chunk can't be written). Alpha color types
  /// never take a `tRNS`.
  #[must_use]
  pub fn fit_to(&self, image: PngColorType) -> Option<Self> {
    match (self, image) {
      (Self::Gray { gray }, PngColorType::RGB) => {
        Some(Self::Rgb { red: *gray, green: *gray, blue: *gray })
      }
      (_, image) if image == self.color_type() => Some(self.clone()),
      _ => None,
    }
  }
}

/// Background color
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Background {
  Palette { index: u8 },
  Gray { gray: u16 },
  Rgb { red: u16, green: u16, blue: u16 },
}
impl Background {
  /// The color type this value was made for.
  #[inline]
  #[must_use]
  pub const fn color_type(&self) -> PngColorType {
    match self {
      Self::Palette { .. } => PngColorType::Index,
      Self::Gray { .. } => PngColorType::Y,
      Self::Rgb { .. } => PngColorType::RGB,
    }
  }

  /// Fits the value to an image's color type.
  ///
  /// The alpha channel doesn't take part, so a gray background fits a
  /// gray+alpha image. A gray value is promoted to RGB (or RGBA) images as
  /// `r = g = b`. Any other mismatch gives `None`.
  #[must_use]
  pub const fn fit_to(&self, image: PngColorType) -> Option<Self> {
    match (*self, image.without_alpha()) {
      (Self::Gray { gray }, PngColorType::RGB) => {
        Some(Self::Rgb { red: gray, green: gray, blue: gray })
      }
      (Self::Palette { .. }, PngColorType::Index)
      | (Self::Gray { .. }, PngColorType::Y)
      | (Self::Rgb { .. }, PngColorType::RGB) => Some(*self),
      _ => None,
    }
  }
}

/// Significant bits per channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SignificantBits {
  Gray { gray: u8 },
  GrayAlpha { gray: u8, alpha: u8 },
  Rgb { red: u8, green: u8, blue: u8 },
  /// the bits of the palette's RGB entries
  Palette { red: u8, green: u8, blue: u8 },
  RgbAlpha { red: u8, green: u8, blue: u8, alpha: u8 },
}
impl SignificantBits {
  /// The color type this value was made for.
  #[inline]
  #[must_use]
  pub const fn color_type(&self) -> PngColorType {
    match self {
      Self::Gray { .. } => PngColorType::Y,
      Self::GrayAlpha { .. } => PngColorType::YA,
      Self::Rgb { .. } => PngColorType::RGB,
      Self::Palette { .. } => PngColorType::Index,
      Self::RgbAlpha { .. } => PngColorType::RGBA,
    }
  }

  /// There's no promotion for `sBIT`, only an exact match fits.
  #[inline]
  #[must_use]
  pub fn fit_to(&self, image: PngColorType) -> Option<Self> {
    (self.color_type() == image).then_some(*self)
  }

  /// The chunk payload.
  #[must_use]
  pub fn to_bytes(&self) -> Vec<u8> {
    match *self {
      Self::Gray { gray } => vec![gray],
      Self::GrayAlpha { gray, alpha } => vec![gray, alpha],
      Self::Rgb { red, green, blue } | Self::Palette { red, green, blue } => vec![red, green, blue],
      Self::RgbAlpha { red, green, blue, alpha } => vec![red, green, blue, alpha],
    }
  }
}

/// Primary chromaticities and white point, each times 100,000.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Chromaticities {
  pub white_x: u32,
  pub white_y: u32,
  pub red_x: u32,
  pub red_y: u32,
  pub green_x: u32,
  pub green_y: u32,
  pub blue_x: u32,
  pub blue_y: u32,
}

/// Embedded ICC profile.
///
/// The profile is stored uncompressed and deflated when written.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct IccProfile {
  pub name: Keyword,
  pub profile: Vec<u8>,
}

/// Unit for [`PhysicalDimensions`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub enum PhysUnit {
  /// Only the aspect ratio is known.
  #[default]
  Unknown = 0,
  Meter = 1,
}

/// Physical pixel dimensions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PhysicalDimensions {
  pub pixels_per_unit_x: u32,
  pub pixels_per_unit_y: u32,
  pub unit: PhysUnit,
}

/// One entry of a [`SuggestedPalette`].
///
/// For an 8-bit palette only the low byte of each channel is written.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct SuggestedPaletteEntry {
  pub red: u16,
  pub green: u16,
  pub blue: u16,
  pub alpha: u16,
  pub frequency: u16,
}

/// Suggested palette
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SuggestedPalette {
  pub name: Keyword,
  /// 8 or 16
  pub sample_depth: u8,
  pub entries: Vec<SuggestedPaletteEntry>,
}

/// Image last-modification time (UTC).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ModificationTime {
  pub year: u16,
  pub month: u8,
  pub day: u8,
  pub hour: u8,
  pub minute: u8,
  pub second: u8,
}

/// One textual data chunk.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TextEntry {
  /// `tEXt`: Latin-1 text.
  Plain { keyword: Keyword, text: String },
  /// `zTXt`: Latin-1 text, deflated.
  Compressed { keyword: Keyword, text: String },
  /// `iTXt`: UTF-8 text, optionally deflated, with an optional language.
  International {
    keyword: Keyword,
    compressed: bool,
    /// empty for unknown
    language_tag: String,
    /// empty for none
    translated_keyword: String,
    text: String,
  },
}
impl TextEntry {
  /// The chunk type this entry is written as.
  #[inline]
  #[must_use]
  pub const fn chunk_ty(&self) -> ChunkTy {
    match self {
      Self::Plain { .. } => ChunkTy::tEXt,
      Self::Compressed { .. } => ChunkTy::zTXt,
      Self::International { .. } => ChunkTy::iTXt,
    }
  }

  #[inline]
  #[must_use]
  pub const fn keyword(&self) -> &Keyword {
    match self {
      Self::Plain { keyword, .. }
      | Self::Compressed { keyword, .. }
      | Self::International { keyword, .. } => keyword,
    }
  }
}

/// A chunk passed through as-is.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct UnknownChunk {
  pub ty: ChunkTy,
  pub data: Vec<u8>,
}

/// Everything about a PNG other than the pixels.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ImageMetadata {
  pub header: Option<ImageHeader>,
  pub palette: Option<Palette>,
  pub transparency: Option<Transparency>,
  pub background: Option<Background>,
  pub chromaticities: Option<Chromaticities>,
  /// gamma times 100,000
  pub gamma: Option<u32>,
  pub icc_profile: Option<IccProfile>,
  pub srgb: Option<SrgbIntent>,
  pub physical: Option<PhysicalDimensions>,
  pub significant_bits: Option<SignificantBits>,
  pub suggested_palettes: Vec<SuggestedPalette>,
  /// one frequency per palette entry
  pub histogram: Option<Vec<u16>>,
  pub time: Option<ModificationTime>,
  pub text: Vec<TextEntry>,
  pub unknown_chunks: Vec<UnknownChunk>,
}

/// Picks the PNG bit depth for a set of per-band sample sizes.
///
/// The widest band wins, multi-band images get at least 8 bits, and the
/// result is rounded up to 1, 2, 4, 8, or 16.
pub fn png_bit_depth_for(sample_bits: &[u8]) -> PngResult<u8> {
  if sample_bits.is_empty() || sample_bits.contains(&0) {
    return Err(PngEncodeError::InvalidArgument("sample size of 0 bits"));
  }
  let mut depth = sample_bits.iter().copied().max().unwrap_or(0);
  if sample_bits.len() > 1 && depth < 8 {
    depth = 8;
  }
  Ok(match depth {
    1 | 2 => depth,
    3 | 4 => 4,
    5..=8 => 8,
    9..=16 => 16,
    _ => return Err(PngEncodeError::InvalidArgument("sample size over 16 bits")),
  })
}

impl ImageMetadata {
  /// Sets the header's bit depth and color type to suit the source layout,
  /// and for indexed sources also the palette (and `tRNS`).
  ///
  /// `num_bands` is how many bands are being written, which can be fewer
  /// than the layout has. Header width and height are left for the caller.
  ///
  /// For an indexed source with transparency the palette gets reordered so
  /// that the non-opaque entries come first, which lets the `tRNS` chunk drop
  /// all the trailing 255s. The reordering is kept as the palette's order so
  /// the pixel indexes can be remapped while encoding.
  pub fn initialize(&mut self, layout: &SampleLayout, num_bands: usize) -> PngResult<()> {
    let bit_depth = png_bit_depth_for(&layout.sample_bits)?;
    let color_type = match &layout.color_model {
      ColorModel::Indexed { palette, alpha } => {
        let forced_palette = matches!(self.header, Some(h) if h.color_type == PngColorType::Index);
        let is_gray = !forced_palette && is_gray_ramp(palette, bit_depth);
        let has_alpha = layout.color_model.has_alpha();
        if is_gray && has_alpha && (bit_depth == 8 || bit_depth == 16) {
          PngColorType::YA
        } else if is_gray && !has_alpha {
          PngColorType::Y
        } else {
          let mut plte = Palette::new(palette.clone())?;
          if let (true, Some(alpha)) = (has_alpha, alpha) {
            let alpha: Vec<u8> =
              (0..palette.len()).map(|i| alpha.get(i).copied().unwrap_or(u8::MAX)).collect();
            let (reordered, trns) = opaque_last(&plte, &alpha)?;
            plte = reordered;
            self.transparency = Some(Transparency::Palette { alpha: trns });
          }
          self.palette = Some(plte);
          PngColorType::Index
        }
      }
      ColorModel::Direct { .. } => match num_bands {
        1 => PngColorType::Y,
        2 => PngColorType::YA,
        3 => PngColorType::RGB,
        4 => PngColorType::RGBA,
        _ => return Err(PngEncodeError::InvalidArgument("number of bands not 1-4")),
      },
    };
    let mut header = self.header.unwrap_or(ImageHeader::new(0, 0, bit_depth, color_type));
    header.bit_depth = bit_depth;
    header.color_type = color_type;
    self.header = Some(header);
    Ok(())
  }
}

/// If every entry is `i * (255 / max)` in all three channels.
fn is_gray_ramp(palette: &[[u8; 3]], bit_depth: u8) -> bool {
  let scale = 255 / ((1_u32 << bit_depth) - 1);
  palette.iter().enumerate().all(|(i, &[r, g, b])| {
    let expected = (i as u32).wrapping_mul(scale) as u8;
    r == expected && r == g && r == b
  })
}

/// Moves the non-opaque entries to the front of the palette.
///
/// Gives the reordered palette (with the order that was used) and the
/// shortened alpha table.
fn opaque_last(palette: &Palette, alpha: &[u8]) -> PngResult<(Palette, Vec<u8>)> {
  let len = palette.len();
  let mut order = vec![0_u8; len];
  let mut trns = Vec::new();
  let mut next = 0_usize;
  for (i, &a) in alpha.iter().enumerate().filter(|(_, &a)| a != u8::MAX) {
    order[i] = next as u8;
    trns.push(a);
    next += 1;
  }
  for (i, _) in alpha.iter().enumerate().filter(|(_, &a)| a == u8::MAX) {
    order[i] = next as u8;
    next += 1;
  }
  let mut entries = vec![[0_u8; 3]; len];
  for (old, new) in order.iter().enumerate() {
    entries[usize::from(*new)] = palette.entries()[old];
  }
  Ok((Palette::new(entries)?.with_order(order)?, trns))
}
