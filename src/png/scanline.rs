//! Turns source rows into filtered PNG scanlines.

use std::io::{Seek, Write};

use crate::PngResult;

use super::*;

/// The working rows of an encode.
///
/// Every row buffer starts with `bpp` zero bytes so that the filters can
/// look "left" of the first pixel without a special case.
#[derive(Debug, Clone, Default)]
pub struct RowBuffers {
  key: Option<(u8, usize)>,
  bpp: usize,
  bytes_per_row: usize,
  curr: Vec<u8>,
  prev: Vec<u8>,
  scratch: [Vec<u8>; 5],
  allocations: usize,
}
impl RowBuffers {
  #[inline]
  #[must_use]
  pub fn new() -> Self {
    Self::default()
  }

  /// Gets ready for the first row of a pass.
  ///
  /// The buffers are only reallocated when the bit depth or the row length
  /// differs from the last pass. Either way the previous row is all zeros
  /// afterwards.
  pub fn start_pass(&mut self, bit_depth: u8, bytes_per_row: usize, bpp: usize) {
    let key = (bit_depth, bytes_per_row);
    if self.key != Some(key) || self.bpp != bpp {
      let len = bpp + bytes_per_row;
      self.curr = vec![0; len];
      self.prev = vec![0; len];
      self.scratch = core::array::from_fn(|_| vec![0; len]);
      self.key = Some(key);
      self.bpp = bpp;
      self.bytes_per_row = bytes_per_row;
      self.allocations += 1;
    } else {
      self.prev.fill(0);
    }
  }

  /// The current row, without the guard bytes.
  #[inline]
  #[must_use]
  pub fn current_mut(&mut self) -> &mut [u8] {
    &mut self.curr[self.bpp..]
  }

  /// Filters the current row, giving the filter used and the filtered bytes.
  pub fn filter(&mut self, color_type: PngColorType) -> (FilterType, &[u8]) {
    let filter =
      filter_row(color_type, &self.curr, &self.prev, &mut self.scratch, self.bytes_per_row, self.bpp);
    (filter, &self.scratch[filter as usize][self.bpp..])
  }

  /// The current row becomes the previous row.
  #[inline]
  pub fn advance(&mut self) {
    core::mem::swap(&mut self.curr, &mut self.prev);
  }

  /// How many times the buffers have been (re)allocated.
  #[inline]
  #[must_use]
  pub const fn allocations(&self) -> usize {
    self.allocations
  }
}

/// How samples become bytes of a scanline.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PackPlan {
  /// PNG bit depth.
  pub bit_depth: u8,
  /// Samples per source pixel being written.
  pub num_bands: usize,
  /// Source bits of each band being written.
  pub band_bits: Vec<u8>,
  /// Undo premultiplied alpha (the last band) before packing.
  pub unpremultiply: bool,
  /// Palette index remap.
  pub palette_order: Option<Vec<u8>>,
  /// For an indexed source written as gray+alpha: alpha per index.
  pub index_alpha: Option<Vec<u8>>,
}
impl PackPlan {
  /// Packs one row of samples into `out`.
  ///
  /// `samples` has `num_bands` values per pixel and is changed in place by
  /// un-premultiplying and palette remapping. `scales` has a table per band.
  pub fn pack_row(&self, samples: &mut [u32], scales: &[BandScale], out: &mut [u8]) {
    if self.unpremultiply && self.num_bands > 1 {
      for pixel in samples.chunks_exact_mut(self.num_bands) {
        unpremultiply(pixel, &self.band_bits);
      }
    }
    if let Some(order) = &self.palette_order {
      for s in samples.iter_mut() {
        if let Some(&remapped) = usize::try_from(*s).ok().and_then(|i| order.get(i)) {
          *s = u32::from(remapped);
        }
      }
    }
    match self.bit_depth {
      1 | 2 | 4 => self.pack_sub_byte(samples, &scales[0], out),
      8 => self.pack_8(samples, scales, out),
      _ => self.pack_16(samples, scales, out),
    }
  }

  fn alpha_of(&self, sample: u32) -> Option<u8> {
    self.index_alpha.as_ref().map(|alpha| {
      usize::try_from(sample).ok().and_then(|i| alpha.get(i)).copied().unwrap_or(u8::MAX)
    })
  }

  /// Several samples per byte, first sample in the high bits. A final partial
  /// byte is padded with zero bits on the right.
  fn pack_sub_byte(&self, samples: &[u32], scale: &BandScale, out: &mut [u8]) {
    let depth = u32::from(self.bit_depth);
    let mask = (1_u8 << depth) - 1;
    let per_byte = (8 / depth) as usize;
    for (chunk, o) in samples.chunks(per_byte).zip(out.iter_mut()) {
      let mut acc = 0_u8;
      for &s in chunk {
        acc = (acc << depth) | (scale.narrow(s) & mask);
      }
      *o = acc << (depth as usize * (per_byte - chunk.len()));
    }
  }

  fn pack_8(&self, samples: &[u32], scales: &[BandScale], out: &mut [u8]) {
    if self.index_alpha.is_some() {
      for (&s, o) in samples.iter().zip(out.chunks_exact_mut(2)) {
        o[0] = scales[0].narrow(s);
        o[1] = self.alpha_of(s).unwrap_or(u8::MAX);
      }
    } else {
      for (pixel, o) in samples.chunks_exact(self.num_bands).zip(out.chunks_exact_mut(self.num_bands)) {
        for ((&s, o), scale) in pixel.iter().zip(o.iter_mut()).zip(scales) {
          *o = scale.narrow(s);
        }
      }
    }
  }

  fn pack_16(&self, samples: &[u32], scales: &[BandScale], out: &mut [u8]) {
    if self.index_alpha.is_some() {
      for (&s, o) in samples.iter().zip(out.chunks_exact_mut(4)) {
        o[..2].copy_from_slice(&scales[0].wide(s));
        let a = self.alpha_of(s).unwrap_or(u8::MAX);
        o[2..].copy_from_slice(&[a, a]);
      }
    } else {
      let px_bytes = self.num_bands * 2;
      for (pixel, o) in samples.chunks_exact(self.num_bands).zip(out.chunks_exact_mut(px_bytes)) {
        for ((&s, o), scale) in pixel.iter().zip(o.chunks_exact_mut(2)).zip(scales) {
          o.copy_from_slice(&scale.wide(s));
        }
      }
    }
  }
}

/// The part of the source that's being written, in source coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SourceWindow {
  /// Source position of output pixel `(0,0)`.
  pub x: u32,
  pub y: u32,
  /// Source distance between neighboring output pixels.
  pub period_x: u32,
  pub period_y: u32,
  /// Output image size.
  pub dest_width: u32,
  pub dest_height: u32,
}

/// How a pass ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PassEnd {
  Finished,
  /// The observer asked to stop after a row.
  Aborted,
}

/// Reads, packs, filters, and deflates the rows of each pass.
pub struct ScanlineEncoder<'a, S: PixelSource + ?Sized> {
  source: &'a S,
  header: ImageHeader,
  window: SourceWindow,
  bands: &'a [usize],
  plan: PackPlan,
  rows: RowBuffers,
  scales: ScaleCache,
  scale_out_bits: u8,
  span: Vec<u32>,
  samples: Vec<u32>,
  pixels_done: u64,
  total_pixels: u64,
}
impl<'a, S: PixelSource + ?Sized> ScanlineEncoder<'a, S> {
  /// `bands` are the source bands being written, in output order.
  pub fn new(
    source: &'a S, header: ImageHeader, window: SourceWindow, bands: &'a [usize], plan: PackPlan,
  ) -> Self {
    // indexes are never rescaled, whatever the PNG depth is.
    let scale_out_bits = if source.layout().color_model.is_indexed() {
      plan.band_bits.first().copied().unwrap_or(header.bit_depth)
    } else {
      header.bit_depth
    };
    Self {
      source,
      header,
      window,
      bands,
      plan,
      rows: RowBuffers::new(),
      scales: ScaleCache::new(),
      scale_out_bits,
      span: Vec::new(),
      samples: Vec::new(),
      pixels_done: 0,
      total_pixels: u64::from(window.dest_width) * u64::from(window.dest_height),
    }
  }

  /// Encodes one pass (given in output coordinates).
  ///
  /// A pass with no rows or no columns writes nothing. After each row the
  /// observer gets the overall progress and is asked if it wants to abort.
  pub fn encode_pass<W: Write + Seek>(
    &mut self, pass: Pass, idat: &mut IdatWriter<'_, W>, observer: &mut dyn EncodeObserver,
  ) -> PngResult<PassEnd> {
    let (cols, rows) = pass.extent(self.window.dest_width, self.window.dest_height);
    if cols == 0 || rows == 0 {
      log::trace!("skipping empty pass {pass:?}");
      return Ok(PassEnd::Finished);
    }
    let bytes_per_row = self.header.bytes_per_row(cols);
    let bpp = self.header.filter_bpp();
    log::trace!("pass {pass:?}: {cols}x{rows}, {bytes_per_row} bytes per row");
    self.rows.start_pass(self.header.bit_depth, bytes_per_row, bpp);

    let nb = self.bands.len();
    let w = self.window;
    let src = pass.scaled(w.period_x, w.period_y);
    let src_x = w.x + src.x_offset;
    let span_width = (cols - 1) * src.x_step + 1;
    self.span.resize(span_width as usize * nb, 0);
    self.samples.resize(cols as usize * nb, 0);

    for row in 0..rows {
      let src_y = w.y + src.y_offset + row * src.y_step;
      self.source.read_row(src_x, src_y, span_width, self.bands, &mut self.span);
      for (dst, px) in self.samples.chunks_exact_mut(nb).zip(self.span.chunks(nb).step_by(src.x_step as usize)) {
        dst.copy_from_slice(&px[..nb]);
      }

      let scales = self.scales.tables(&self.plan.band_bits, self.scale_out_bits);
      self.plan.pack_row(&mut self.samples, scales, self.rows.current_mut());
      let (filter, filtered) = self.rows.filter(self.header.color_type);
      idat.write_all(&[filter as u8])?;
      idat.write_all(filtered)?;
      self.rows.advance();

      self.pixels_done += u64::from(cols);
      observer.image_progress(self.pixels_done as f32 / self.total_pixels as f32);
      if observer.abort_requested() {
        return Ok(PassEnd::Aborted);
      }
    }
    Ok(PassEnd::Finished)
  }
}
