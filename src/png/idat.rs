//! Streams filtered scanlines through deflate and out as `IDAT` chunks.

use std::io::{self, Seek, Write};

use miniz_oxide::{
  deflate::core::{compress, CompressorOxide, TDEFLFlush, TDEFLStatus},
  DataFormat,
};

use super::{chunk::OpenChunk, ChunkTy};

/// The usual upper limit on the payload of a single `IDAT` chunk.
pub const DEFAULT_IDAT_CHUNK_SIZE: usize = 32768;

/// The deflate level used when the caller doesn't pick a quality.
pub const DEFAULT_COMPRESSION_LEVEL: u8 = 4;

/// Size of the buffer the compressor writes into before we copy to the sink.
const SCRATCH_SIZE: usize = 4096;

/// Converts a `0.0 ..= 1.0` quality value into a deflate level `0 ..= 9`.
///
/// Higher quality means *less* compression effort: `1.0` gives level 0
/// (stored blocks only), `0.0` gives level 9. The product is rounded half up.
///
/// Returns `None` if the quality isn't within `0.0 ..= 1.0` (including NaN).
#[inline]
#[must_use]
pub fn compression_level_for_quality(quality: f32) -> Option<u8> {
  if !(0.0..=1.0).contains(&quality) {
    return None;
  }
  let rounded = (9.0 * quality + 0.5).floor() as u8;
  Some(9 - rounded.min(9))
}

/// Deflates everything written to it and frames the compressed stream as a
/// series of `IDAT` chunks.
///
/// Every chunk except possibly the last holds exactly `chunk_size` bytes of
/// compressed data. Chunks are opened only when there's data for them, so no
/// empty `IDAT` is ever produced.
///
/// You must call [`finish`](Self::finish) to end the zlib stream and close
/// the last chunk. Nothing happens on drop.
pub struct IdatWriter<'w, W: Write + Seek> {
  sink: &'w mut W,
  compressor: Box<CompressorOxide>,
  scratch: Box<[u8]>,
  chunk: Option<OpenChunk>,
  chunk_size: usize,
  chunks_written: usize,
}
impl<'w, W: Write + Seek> IdatWriter<'w, W> {
  /// Makes a writer with the given deflate level (clamped to `0 ..= 9`) and
  /// max chunk payload size (at least 1).
  pub fn new(sink: &'w mut W, level: u8, chunk_size: usize) -> Self {
    let mut compressor: Box<CompressorOxide> = Box::default();
    compressor.set_format_and_level(DataFormat::Zlib, level.min(9));
    Self {
      sink,
      compressor,
      scratch: vec![0; SCRATCH_SIZE].into_boxed_slice(),
      chunk: None,
      chunk_size: chunk_size.max(1),
      chunks_written: 0,
    }
  }

  /// How many `IDAT` chunks have been closed so far.
  #[inline]
  #[must_use]
  pub const fn chunks_written(&self) -> usize {
    self.chunks_written
  }

  /// Copies compressed bytes into chunks, opening and closing them as they
  /// fill up.
  fn emit(&mut self, mut compressed: &[u8]) -> io::Result<()> {
    while !compressed.is_empty() {
      let mut chunk = match self.chunk.take() {
        Some(chunk) => chunk,
        None => OpenChunk::begin(self.sink, ChunkTy::IDAT)?,
      };
      let room = self.chunk_size - chunk.written();
      let (now, later) = compressed.split_at(room.min(compressed.len()));
      chunk.write(self.sink, now)?;
      compressed = later;
      if chunk.written() == self.chunk_size {
        self.close(chunk)?;
      } else {
        self.chunk = Some(chunk);
      }
    }
    Ok(())
  }

  fn close(&mut self, chunk: OpenChunk) -> io::Result<()> {
    let length = chunk.finish(self.sink)?;
    self.chunks_written += 1;
    log::trace!("closed IDAT chunk #{} with {length} bytes", self.chunks_written);
    Ok(())
  }

  /// Runs the compressor once, sending whatever it produced to the sink.
  ///
  /// Returns the status and the count of input bytes consumed.
  fn step(&mut self, input: &[u8], flush: TDEFLFlush) -> io::Result<(TDEFLStatus, usize)> {
    let (status, consumed, produced) = compress(&mut self.compressor, input, &mut self.scratch, flush);
    match status {
      TDEFLStatus::Okay | TDEFLStatus::Done => (),
      TDEFLStatus::BadParam | TDEFLStatus::PutBufFailed => {
        return Err(io::Error::new(io::ErrorKind::Other, "deflate compressor failure"))
      }
    }
    // the scratch buffer is a field, so it gets moved out for the copy.
    let scratch = core::mem::take(&mut self.scratch);
    let emit_result = self.emit(&scratch[..produced]);
    self.scratch = scratch;
    emit_result?;
    Ok((status, consumed))
  }

  /// Ends the compressed stream and closes the final chunk.
  pub fn finish(mut self) -> io::Result<()> {
    loop {
      let (status, _) = self.step(&[], TDEFLFlush::Finish)?;
      if status == TDEFLStatus::Done {
        break;
      }
    }
    if let Some(chunk) = self.chunk.take() {
      self.close(chunk)?;
    }
    Ok(())
  }
}
impl<W: Write + Seek> Write for IdatWriter<'_, W> {
  fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
    let mut input = buf;
    while !input.is_empty() {
      let (_, consumed) = self.step(input, TDEFLFlush::None)?;
      input = &input[consumed..];
    }
    Ok(buf.len())
  }

  /// Flushes the sink only. A deflate sync flush would cost compression and
  /// doesn't make the partial data any more usable.
  fn flush(&mut self) -> io::Result<()> {
    self.sink.flush()
  }
}
