//! Writes the non-pixel chunks of a PNG from an [`ImageMetadata`].
//!
//! Chunks go out in this order, each only if present:
//! `IHDR`, `cHRM`, `gAMA`, `iCCP`, `sBIT`, `sRGB`, `PLTE`, `hIST`, `tRNS`,
//! `bKGD`, `pHYs`, `sPLT`, `tIME`, `tEXt`, `iTXt`, `zTXt`, then the unknown
//! chunks being passed through.
//!
//! Structural problems are a [`MalformedMetadata`](PngEncodeError::MalformedMetadata)
//! error. A color-typed chunk that doesn't fit the image is skipped with a
//! warning instead.

#![allow(non_snake_case)]

use std::io::{Seek, Write};

use bytemuck::cast_slice;
use miniz_oxide::deflate::compress_to_vec_zlib;

use crate::{PngEncodeError, PngResult, SrgbIntent};

use super::*;

/// Deflate level for compressed text and ICC profiles (zlib's default).
pub const TEXT_COMPRESSION_LEVEL: u8 = 6;

impl SrgbIntent {
  /// The `sRGB` chunk byte for this intent.
  #[inline]
  #[must_use]
  pub const fn to_png_byte(self) -> u8 {
    match self {
      Self::Perceptual => 0,
      Self::RelativeColorimetric => 1,
      Self::Saturation => 2,
      Self::AbsoluteColorimetric => 3,
    }
  }
}

/// Logs a warning and passes it to the observer.
pub(crate) fn soft_warning(observer: &mut dyn EncodeObserver, message: &str) {
  log::warn!("{message}");
  observer.warning(message);
}

/// Writes every chunk that comes before the image data.
///
/// The header must be present.
pub fn write_metadata_chunks<W: Write + Seek>(
  sink: &mut W, md: &ImageMetadata, observer: &mut dyn EncodeObserver,
) -> PngResult<()> {
  let header = md.header.ok_or(PngEncodeError::MalformedMetadata("the IHDR is missing"))?;
  let color_type = header.color_type;
  write_IHDR(sink, &header)?;

  if let Some(chrm) = &md.chromaticities {
    write_cHRM(sink, chrm)?;
  }
  if let Some(gamma) = md.gamma {
    write_chunk(sink, ChunkTy::gAMA, &gamma.to_be_bytes())?;
  }
  if let Some(icc) = &md.icc_profile {
    write_iCCP(sink, icc)?;
  }
  if let Some(sbit) = &md.significant_bits {
    match sbit.fit_to(color_type) {
      Some(sbit) => write_chunk(sink, ChunkTy::sBIT, &sbit.to_bytes())?,
      None => soft_warning(observer, "sBIT metadata has the wrong color type, skipping it"),
    }
  }
  if let Some(intent) = md.srgb {
    write_chunk(sink, ChunkTy::sRGB, &[intent.to_png_byte()])?;
  }

  let mut wrote_plte = false;
  match (&md.palette, color_type) {
    (Some(_), PngColorType::Y | PngColorType::YA) => {
      soft_warning(observer, "a PLTE chunk can't appear in a gray image, skipping it")
    }
    (Some(plte), _) => {
      write_chunk(sink, ChunkTy::PLTE, cast_slice(plte.entries()))?;
      wrote_plte = true;
    }
    (None, PngColorType::Index) => {
      return Err(PngEncodeError::MalformedMetadata("an indexed color image needs a PLTE"))
    }
    (None, _) => (),
  }

  if let Some(hist) = &md.histogram {
    if !wrote_plte {
      return Err(PngEncodeError::MalformedMetadata("hIST needs a PLTE before it"));
    }
    let mut cw = ChunkWriter::new(sink, ChunkTy::hIST)?;
    for &freq in hist {
      cw.write_u16(freq)?;
    }
    cw.finish()?;
  }

  if let Some(trns) = &md.transparency {
    if let Transparency::Palette { alpha } = trns {
      let palette_len = match (&md.palette, wrote_plte) {
        (Some(plte), true) => plte.len(),
        _ => return Err(PngEncodeError::MalformedMetadata("a palette tRNS needs a PLTE before it")),
      };
      if alpha.len() > palette_len {
        return Err(PngEncodeError::MalformedMetadata("tRNS has more entries than the PLTE"));
      }
    }
    match trns.fit_to(color_type) {
      Some(trns) => write_tRNS(sink, &trns)?,
      None => soft_warning(observer, "tRNS metadata has an incompatible color type, skipping it"),
    }
  }

  if let Some(bkgd) = &md.background {
    match bkgd.fit_to(color_type) {
      Some(bkgd) => write_bKGD(sink, &bkgd)?,
      None => soft_warning(observer, "bKGD metadata has an incompatible color type, skipping it"),
    }
  }

  if let Some(phys) = &md.physical {
    let mut cw = ChunkWriter::new(sink, ChunkTy::pHYs)?;
    cw.write_u32(phys.pixels_per_unit_x)?;
    cw.write_u32(phys.pixels_per_unit_y)?;
    cw.write_u8(phys.unit as u8)?;
    cw.finish()?;
  }
  for splt in &md.suggested_palettes {
    write_sPLT(sink, splt)?;
  }
  if let Some(time) = &md.time {
    let mut cw = ChunkWriter::new(sink, ChunkTy::tIME)?;
    cw.write_u16(time.year)?;
    cw.write_bytes(&[time.month, time.day, time.hour, time.minute, time.second])?;
    cw.finish()?;
  }

  for ty in [ChunkTy::tEXt, ChunkTy::iTXt, ChunkTy::zTXt] {
    for entry in md.text.iter().filter(|e| e.chunk_ty() == ty) {
      write_text(sink, entry)?;
    }
  }

  for unknown in &md.unknown_chunks {
    if !unknown.ty.is_well_formed() {
      return Err(PngEncodeError::MalformedMetadata("chunk type isn't 4 ASCII letters"));
    }
    write_chunk(sink, unknown.ty, &unknown.data)?;
  }
  Ok(())
}

/// Checks the header, then writes it.
pub fn write_IHDR<W: Write + Seek>(sink: &mut W, header: &ImageHeader) -> PngResult<()> {
  if header.compression_method != 0 {
    return Err(PngEncodeError::MalformedMetadata("IHDR compression method must be 0"));
  }
  if header.filter_method != 0 {
    return Err(PngEncodeError::MalformedMetadata("IHDR filter method must be 0"));
  }
  if header.interlace_method > 1 {
    return Err(PngEncodeError::MalformedMetadata("IHDR interlace method must be 0 or 1"));
  }
  if !header.color_type.allows_bit_depth(header.bit_depth) {
    return Err(PngEncodeError::MalformedMetadata("IHDR bit depth isn't allowed for the color type"));
  }
  let dimension_ok = |d: u32| d >= 1 && d <= i32::MAX as u32;
  if !dimension_ok(header.width) || !dimension_ok(header.height) {
    return Err(PngEncodeError::MalformedMetadata("IHDR width and height must be 1 to 2^31-1"));
  }
  let mut cw = ChunkWriter::new(sink, ChunkTy::IHDR)?;
  cw.write_u32(header.width)?;
  cw.write_u32(header.height)?;
  cw.write_bytes(&[
    header.bit_depth,
    header.color_type as u8,
    header.compression_method,
    header.filter_method,
    header.interlace_method,
  ])?;
  cw.finish()?;
  Ok(())
}

fn write_cHRM<W: Write + Seek>(sink: &mut W, c: &Chromaticities) -> PngResult<()> {
  let mut cw = ChunkWriter::new(sink, ChunkTy::cHRM)?;
  for v in [c.white_x, c.white_y, c.red_x, c.red_y, c.green_x, c.green_y, c.blue_x, c.blue_y] {
    cw.write_u32(v)?;
  }
  cw.finish()?;
  Ok(())
}

fn write_iCCP<W: Write + Seek>(sink: &mut W, icc: &IccProfile) -> PngResult<()> {
  let compressed = compress_to_vec_zlib(&icc.profile, TEXT_COMPRESSION_LEVEL);
  let mut cw = ChunkWriter::new(sink, ChunkTy::iCCP)?;
  cw.write_bytes(&icc.name.to_latin1())?;
  cw.write_bytes(&[0, 0])?;
  cw.write_bytes(&compressed)?;
  cw.finish()?;
  Ok(())
}

fn write_tRNS<W: Write + Seek>(sink: &mut W, trns: &Transparency) -> PngResult<()> {
  let mut cw = ChunkWriter::new(sink, ChunkTy::tRNS)?;
  match trns {
    Transparency::Palette { alpha } => cw.write_bytes(alpha)?,
    Transparency::Gray { gray } => cw.write_u16(*gray)?,
    Transparency::Rgb { red, green, blue } => {
      cw.write_u16(*red)?;
      cw.write_u16(*green)?;
      cw.write_u16(*blue)?;
    }
  }
  cw.finish()?;
  Ok(())
}

fn write_bKGD<W: Write + Seek>(sink: &mut W, bkgd: &Background) -> PngResult<()> {
  let mut cw = ChunkWriter::new(sink, ChunkTy::bKGD)?;
  match *bkgd {
    Background::Palette { index } => cw.write_u8(index)?,
    Background::Gray { gray } => cw.write_u16(gray)?,
    Background::Rgb { red, green, blue } => {
      cw.write_u16(red)?;
      cw.write_u16(green)?;
      cw.write_u16(blue)?;
    }
  }
  cw.finish()?;
  Ok(())
}

fn write_sPLT<W: Write + Seek>(sink: &mut W, splt: &SuggestedPalette) -> PngResult<()> {
  if splt.sample_depth != 8 && splt.sample_depth != 16 {
    return Err(PngEncodeError::MalformedMetadata("sPLT sample depth must be 8 or 16"));
  }
  let mut cw = ChunkWriter::new(sink, ChunkTy::sPLT)?;
  cw.write_bytes(&splt.name.to_latin1())?;
  cw.write_bytes(&[0, splt.sample_depth])?;
  for e in &splt.entries {
    if splt.sample_depth == 8 {
      cw.write_bytes(&[e.red as u8, e.green as u8, e.blue as u8, e.alpha as u8])?;
    } else {
      for v in [e.red, e.green, e.blue, e.alpha] {
        cw.write_u16(v)?;
      }
    }
    cw.write_u16(e.frequency)?;
  }
  cw.finish()?;
  Ok(())
}

/// Latin-1 text without any NUL.
fn latin1_text(text: &str) -> PngResult<Vec<u8>> {
  let bytes = latin1_bytes(text).ok_or(PngEncodeError::MalformedMetadata("text isn't Latin-1"))?;
  if bytes.contains(&0) {
    return Err(PngEncodeError::MalformedMetadata("text contains a NUL"));
  }
  Ok(bytes)
}

fn no_nul(s: &str) -> PngResult<&[u8]> {
  if s.as_bytes().contains(&0) {
    Err(PngEncodeError::MalformedMetadata("text contains a NUL"))
  } else {
    Ok(s.as_bytes())
  }
}

/// Writes one `tEXt`, `zTXt`, or `iTXt` chunk.
pub fn write_text<W: Write + Seek>(sink: &mut W, entry: &TextEntry) -> PngResult<()> {
  let keyword = entry.keyword().to_latin1();
  match entry {
    TextEntry::Plain { text, .. } => {
      let text = latin1_text(text)?;
      let mut cw = ChunkWriter::new(sink, ChunkTy::tEXt)?;
      cw.write_bytes(&keyword)?;
      cw.write_u8(0)?;
      cw.write_bytes(&text)?;
      cw.finish()?;
    }
    TextEntry::Compressed { text, .. } => {
      let compressed = compress_to_vec_zlib(&latin1_text(text)?, TEXT_COMPRESSION_LEVEL);
      let mut cw = ChunkWriter::new(sink, ChunkTy::zTXt)?;
      cw.write_bytes(&keyword)?;
      cw.write_bytes(&[0, 0])?;
      cw.write_bytes(&compressed)?;
      cw.finish()?;
    }
    TextEntry::International { compressed, language_tag, translated_keyword, text, .. } => {
      let language_tag = no_nul(language_tag)?;
      let translated_keyword = no_nul(translated_keyword)?;
      let text = if *compressed {
        compress_to_vec_zlib(text.as_bytes(), TEXT_COMPRESSION_LEVEL)
      } else {
        no_nul(text)?.to_vec()
      };
      let mut cw = ChunkWriter::new(sink, ChunkTy::iTXt)?;
      cw.write_bytes(&keyword)?;
      cw.write_bytes(&[0, u8::from(*compressed), 0])?;
      cw.write_bytes(language_tag)?;
      cw.write_u8(0)?;
      cw.write_bytes(translated_keyword)?;
      cw.write_u8(0)?;
      cw.write_bytes(&text)?;
      cw.finish()?;
    }
  }
  Ok(())
}
