use core::fmt::Write as _;
use std::io::{self, Seek, SeekFrom, Write};

use super::Crc32;

/// The four byte type tag of a PNG chunk.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(transparent)]
pub struct ChunkTy(pub [u8; 4]);
#[allow(nonstandard_style)]
impl ChunkTy {
  pub const IHDR: Self = Self(*b"IHDR");
  pub const PLTE: Self = Self(*b"PLTE");
  pub const IDAT: Self = Self(*b"IDAT");
  pub const IEND: Self = Self(*b"IEND");
  pub const cHRM: Self = Self(*b"cHRM");
  pub const gAMA: Self = Self(*b"gAMA");
  pub const iCCP: Self = Self(*b"iCCP");
  pub const sBIT: Self = Self(*b"sBIT");
  pub const sRGB: Self = Self(*b"sRGB");
  pub const hIST: Self = Self(*b"hIST");
  pub const tRNS: Self = Self(*b"tRNS");
  pub const bKGD: Self = Self(*b"bKGD");
  pub const pHYs: Self = Self(*b"pHYs");
  pub const sPLT: Self = Self(*b"sPLT");
  pub const tIME: Self = Self(*b"tIME");
  pub const tEXt: Self = Self(*b"tEXt");
  pub const iTXt: Self = Self(*b"iTXt");
  pub const zTXt: Self = Self(*b"zTXt");

  /// If all four bytes are ASCII letters, as PNG requires.
  #[inline]
  #[must_use]
  pub const fn is_well_formed(self) -> bool {
    let [a, b, c, d] = self.0;
    a.is_ascii_alphabetic()
      && b.is_ascii_alphabetic()
      && c.is_ascii_alphabetic()
      && d.is_ascii_alphabetic()
  }

  /// Critical chunks have an uppercase first letter.
  #[inline]
  #[must_use]
  pub const fn is_critical(self) -> bool {
    self.0[0].is_ascii_uppercase()
  }
}
impl core::fmt::Debug for ChunkTy {
  fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
    f.write_char('"')?;
    for ch in self.0.iter().copied().map(|u| u as char) {
      f.write_char(ch)?;
    }
    f.write_char('"')
  }
}
impl From<[u8; 4]> for ChunkTy {
  #[inline]
  fn from(array: [u8; 4]) -> Self {
    Self(array)
  }
}

/// length + type + crc
const CHUNK_OVERHEAD: u64 = 12;

/// The bookkeeping of a chunk that's been started but not finished.
///
/// This doesn't hold the sink, so that a longer lived writer (such as the
/// IDAT writer) can own the sink and open and close many chunks on it.
#[derive(Debug, Clone, Copy)]
pub(crate) struct OpenChunk {
  start: u64,
  crc: Crc32,
  written: usize,
}
impl OpenChunk {
  /// Writes a placeholder length and the chunk type.
  pub(crate) fn begin<W: Write + Seek>(sink: &mut W, ty: ChunkTy) -> io::Result<Self> {
    let start = sink.stream_position()?;
    sink.write_all(&[0; 4])?;
    sink.write_all(&ty.0)?;
    let mut crc = Crc32::new();
    crc.update(&ty.0);
    Ok(Self { start, crc, written: 0 })
  }

  #[inline]
  pub(crate) fn write<W: Write>(&mut self, sink: &mut W, bytes: &[u8]) -> io::Result<()> {
    if bytes.is_empty() {
      return Ok(());
    }
    sink.write_all(bytes)?;
    self.crc.update(bytes);
    self.written += bytes.len();
    Ok(())
  }

  /// Payload bytes written so far.
  #[inline]
  #[must_use]
  pub(crate) const fn written(&self) -> usize {
    self.written
  }

  /// Writes the CRC, then goes back and fills in the real length.
  ///
  /// The sink is left positioned just after the CRC. Returns the payload
  /// length.
  pub(crate) fn finish<W: Write + Seek>(self, sink: &mut W) -> io::Result<u32> {
    sink.write_all(&self.crc.value().to_be_bytes())?;
    let end = sink.stream_position()?;
    let length = end
      .checked_sub(self.start)
      .and_then(|n| n.checked_sub(CHUNK_OVERHEAD))
      .and_then(|n| u32::try_from(n).ok())
      .filter(|n| *n <= i32::MAX as u32)
      .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidData, "PNG chunk length out of range"))?;
    sink.seek(SeekFrom::Start(self.start))?;
    sink.write_all(&length.to_be_bytes())?;
    sink.seek(SeekFrom::Start(end))?;
    Ok(length)
  }
}

/// Writes one chunk whose length isn't known up front.
///
/// The payload can be given in as many pieces as you like. The length field
/// is backpatched when you call [`finish`](Self::finish). Dropping the writer
/// without finishing leaves a zero length in the sink.
pub struct ChunkWriter<'w, W: Write + Seek> {
  sink: &'w mut W,
  chunk: OpenChunk,
}
impl<'w, W: Write + Seek> ChunkWriter<'w, W> {
  /// Starts a chunk of the given type at the sink's current position.
  pub fn new(sink: &'w mut W, ty: ChunkTy) -> io::Result<Self> {
    let chunk = OpenChunk::begin(sink, ty)?;
    Ok(Self { sink, chunk })
  }

  /// Writes payload bytes.
  #[inline]
  pub fn write_bytes(&mut self, bytes: &[u8]) -> io::Result<()> {
    self.chunk.write(self.sink, bytes)
  }

  #[inline]
  pub fn write_u8(&mut self, u: u8) -> io::Result<()> {
    self.write_bytes(&[u])
  }

  /// Big-endian.
  #[inline]
  pub fn write_u16(&mut self, u: u16) -> io::Result<()> {
    self.write_bytes(&u.to_be_bytes())
  }

  /// Big-endian.
  #[inline]
  pub fn write_u32(&mut self, u: u32) -> io::Result<()> {
    self.write_bytes(&u.to_be_bytes())
  }

  /// Finishes the chunk, giving the payload length.
  pub fn finish(self) -> io::Result<u32> {
    self.chunk.finish(self.sink)
  }
}
impl<W: Write + Seek> Write for ChunkWriter<'_, W> {
  #[inline]
  fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
    self.write_bytes(buf)?;
    Ok(buf.len())
  }
  #[inline]
  fn flush(&mut self) -> io::Result<()> {
    self.sink.flush()
  }
}

/// Writes an entire chunk when the payload is already in hand.
pub fn write_chunk<W: Write + Seek>(sink: &mut W, ty: ChunkTy, data: &[u8]) -> io::Result<()> {
  let mut cw = ChunkWriter::new(sink, ty)?;
  cw.write_bytes(data)?;
  cw.finish()?;
  Ok(())
}

/// Splits a run of chunks into `(type, payload)` pairs, checking each length
/// and CRC.
#[cfg(test)]
pub(crate) fn split_chunks(mut bytes: &[u8]) -> Vec<([u8; 4], Vec<u8>)> {
  let mut out = Vec::new();
  while !bytes.is_empty() {
    let len = u32::from_be_bytes(bytes[0..4].try_into().unwrap()) as usize;
    let ty: [u8; 4] = bytes[4..8].try_into().unwrap();
    let data = bytes[8..8 + len].to_vec();
    let crc = u32::from_be_bytes(bytes[8 + len..12 + len].try_into().unwrap());
    assert_eq!(crc, super::png_crc(bytes[4..8 + len].iter().copied()));
    out.push((ty, data));
    bytes = &bytes[12 + len..];
  }
  out
}
