//! Runs a whole encode: checks the request, writes the chunks, streams the
//! pixel data, and tells an observer how it's going.

use std::io::{Cursor, Seek, Write};

use crate::{PngEncodeError, PngResult};

use super::*;

/// A rectangle of the source image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Region {
  pub x: u32,
  pub y: u32,
  pub width: u32,
  pub height: u32,
}

/// Take every `period`th pixel, starting `offset` pixels into the region.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Subsampling {
  pub x_period: u32,
  pub y_period: u32,
  pub x_offset: u32,
  pub y_offset: u32,
}
impl Default for Subsampling {
  #[inline]
  fn default() -> Self {
    Self { x_period: 1, y_period: 1, x_offset: 0, y_offset: 0 }
  }
}

/// Per-encode settings.
#[derive(Debug, Clone, PartialEq)]
pub struct WriteParams {
  /// Part of the source to write. Clipped to the image bounds. `None` is the
  /// whole image.
  pub source_region: Option<Region>,
  pub subsampling: Subsampling,
  /// Source bands to write, in output order. `None` is every band.
  pub source_bands: Option<Vec<usize>>,
  /// `0.0 ..= 1.0`, higher is faster with bigger output. `None` uses
  /// [`DEFAULT_COMPRESSION_LEVEL`].
  pub compression_quality: Option<f32>,
  /// Force Adam7 on or off. `None` follows the metadata's header.
  pub interlace: Option<bool>,
  /// Max payload of each `IDAT` chunk.
  pub idat_chunk_size: usize,
}
impl Default for WriteParams {
  #[inline]
  fn default() -> Self {
    Self {
      source_region: None,
      subsampling: Subsampling::default(),
      source_bands: None,
      compression_quality: None,
      interlace: None,
      idat_chunk_size: DEFAULT_IDAT_CHUNK_SIZE,
    }
  }
}

/// Gets told what an encode is doing, and can stop it.
///
/// All methods have do-nothing defaults.
pub trait EncodeObserver {
  fn image_started(&mut self) {}
  /// Fraction of output pixels written so far, after every row.
  fn image_progress(&mut self, _fraction: f32) {}
  fn image_complete(&mut self) {}
  fn write_aborted(&mut self) {}
  /// A chunk was skipped because it doesn't fit the image.
  fn warning(&mut self, _message: &str) {}
  /// Polled before any output and after every row.
  fn abort_requested(&mut self) -> bool {
    false
  }
}

/// An observer that ignores everything and never aborts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct NoObserver;
impl EncodeObserver for NoObserver {}

/// How an encode that didn't fail ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EncodeOutcome {
  /// A full PNG, through `IEND`.
  Complete,
  /// Stopped by the observer. If any bytes were written, the `IDAT` stream is
  /// closed properly but there's no `IEND`.
  Aborted,
}

/// Everything worked out from a request before any byte is written.
#[derive(Debug, Clone, PartialEq)]
pub struct EncodePlan {
  /// The metadata with its header filled in for this image.
  pub metadata: ImageMetadata,
  pub header: ImageHeader,
  pub window: SourceWindow,
  pub bands: Vec<usize>,
  pub pack: PackPlan,
  pub compression_level: u8,
}

/// Writes images as PNG.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PngEncoder {
  pub params: WriteParams,
}
impl PngEncoder {
  #[inline]
  #[must_use]
  pub const fn new(params: WriteParams) -> Self {
    Self { params }
  }

  /// Checks the request against the image and works out the output.
  ///
  /// Caller metadata is copied, then its header (and for indexed sources the
  /// palette) is set from the source layout.
  pub fn plan<S: PixelSource + ?Sized>(
    &self, image: &S, metadata: Option<&ImageMetadata>,
  ) -> PngResult<EncodePlan> {
    let p = &self.params;
    let layout = image.layout();
    let sub = p.subsampling;
    if sub.x_period == 0 || sub.y_period == 0 {
      return Err(PngEncodeError::InvalidArgument("subsampling period of 0"));
    }
    if sub.x_offset >= sub.x_period || sub.y_offset >= sub.y_period {
      return Err(PngEncodeError::InvalidArgument("subsampling offset must be less than the period"));
    }

    let region = p.source_region.unwrap_or(Region { x: 0, y: 0, width: image.width(), height: image.height() });
    let x_end = region.x.saturating_add(region.width).min(image.width());
    let y_end = region.y.saturating_add(region.height).min(image.height());
    if region.x >= x_end || region.y >= y_end {
      return Err(PngEncodeError::InvalidArgument("source region is empty"));
    }
    let x = region.x + sub.x_offset;
    let y = region.y + sub.y_offset;
    if x >= x_end || y >= y_end {
      return Err(PngEncodeError::InvalidArgument("destination region is empty"));
    }
    let dest_width = (x_end - x - 1) / sub.x_period + 1;
    let dest_height = (y_end - y - 1) / sub.y_period + 1;
    let window = SourceWindow { x, y, period_x: sub.x_period, period_y: sub.y_period, dest_width, dest_height };

    let num_source_bands = layout.num_bands();
    let bands = match &p.source_bands {
      Some(bands) => bands.clone(),
      None => (0..num_source_bands).collect(),
    };
    if bands.is_empty() || bands.len() > 4 {
      return Err(PngEncodeError::InvalidArgument("must write 1 to 4 bands"));
    }
    if bands.iter().any(|&b| b >= num_source_bands) {
      return Err(PngEncodeError::InvalidArgument("source band out of range"));
    }
    if bands.iter().enumerate().any(|(i, b)| bands[..i].contains(b)) {
      return Err(PngEncodeError::InvalidArgument("source band selected twice"));
    }

    let compression_level = match p.compression_quality {
      None => DEFAULT_COMPRESSION_LEVEL,
      Some(q) => compression_level_for_quality(q)
        .ok_or(PngEncodeError::InvalidArgument("compression quality must be within 0.0 ..= 1.0"))?,
    };

    let mut metadata = metadata.cloned().unwrap_or_default();
    metadata.initialize(layout, bands.len())?;
    let mut header = metadata.header.ok_or(PngEncodeError::MalformedMetadata("the IHDR is missing"))?;
    header.width = dest_width;
    header.height = dest_height;
    if let Some(interlace) = p.interlace {
      header.interlace_method = u8::from(interlace);
    }
    metadata.header = Some(header);

    let band_bits: Vec<u8> = bands.iter().map(|&b| layout.sample_bits[b]).collect();
    let model = &layout.color_model;
    let pack = PackPlan {
      bit_depth: header.bit_depth,
      num_bands: bands.len(),
      band_bits,
      unpremultiply: model.is_premultiplied()
        && bands.len() > 1
        && bands.last() == Some(&(num_source_bands - 1)),
      palette_order: match (&metadata.palette, header.color_type) {
        (Some(plte), PngColorType::Index) => plte.order().map(<[u8]>::to_vec),
        _ => None,
      },
      index_alpha: match model {
        ColorModel::Indexed { alpha, .. } if header.color_type == PngColorType::YA => {
          Some(alpha.clone().unwrap_or_default())
        }
        _ => None,
      },
    };

    Ok(EncodePlan { metadata, header, window, bands, pack, compression_level })
  }

  /// Encodes the image into the sink.
  ///
  /// Request problems are reported before anything is written. After that, an
  /// error leaves whatever was already written in the sink.
  pub fn encode<W: Write + Seek, S: PixelSource + ?Sized>(
    &self, sink: &mut W, image: &S, metadata: Option<&ImageMetadata>, observer: &mut dyn EncodeObserver,
  ) -> PngResult<EncodeOutcome> {
    let plan = self.plan(image, metadata)?;
    let header = plan.header;
    log::debug!(
      "encoding {}x{} {:?} at {} bits, interlaced: {}",
      header.width,
      header.height,
      header.color_type,
      header.bit_depth,
      header.is_interlaced()
    );

    observer.image_started();
    if observer.abort_requested() {
      log::debug!("encode aborted before any output");
      observer.write_aborted();
      return Ok(EncodeOutcome::Aborted);
    }

    sink.write_all(&PNG_SIGNATURE)?;
    write_metadata_chunks(sink, &plan.metadata, observer)?;

    let mut idat = IdatWriter::new(sink, plan.compression_level, self.params.idat_chunk_size);
    let mut scanlines = ScanlineEncoder::new(image, header, plan.window, &plan.bands, plan.pack);
    let mut end = PassEnd::Finished;
    for &pass in passes(header.is_interlaced()) {
      end = scanlines.encode_pass(pass, &mut idat, observer)?;
      if end == PassEnd::Aborted {
        break;
      }
    }
    idat.finish()?;

    if end == PassEnd::Aborted {
      log::debug!("encode aborted, IDAT closed without IEND");
      observer.write_aborted();
      return Ok(EncodeOutcome::Aborted);
    }
    write_chunk(sink, ChunkTy::IEND, &[])?;
    sink.flush()?;
    log::debug!("encode complete");
    observer.image_complete();
    Ok(EncodeOutcome::Complete)
  }
}

/// Encodes with default settings into a new `Vec`.
pub fn encode_to_vec<S: PixelSource + ?Sized>(image: &S, metadata: Option<&ImageMetadata>) -> PngResult<Vec<u8>> {
  let mut out = Cursor::new(Vec::new());
  PngEncoder::default().encode(&mut out, image, metadata, &mut NoObserver)?;
  Ok(out.into_inner())
}
