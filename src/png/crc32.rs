//! The CRC-32 used by PNG chunks (the same one zlib uses).

const CRC_TABLE: [u32; 256] = make_crc_table();

const fn make_crc_table() -> [u32; 256] {
  let mut out = [0; 256];
  let mut n = 0;
  while n < 256 {
    let mut c = n as u32;
    let mut k = 0;
    while k < 8 {
      if (c & 1) != 0 {
        c = 0xEDB8_8320_u32 ^ (c >> 1);
      } else {
        c >>= 1;
      }
      //
      k += 1;
    }
    out[n] = c;
    //
    n += 1;
  }
  out
}

/// An incrementally updatable CRC-32 accumulator.
///
/// ```
/// # use imprint::png::Crc32;
/// let mut crc = Crc32::new();
/// crc.update(b"123456789");
/// assert_eq!(crc.value(), 0xCBF4_3926);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Crc32 {
  state: u32,
}
impl Default for Crc32 {
  #[inline]
  fn default() -> Self {
    Self::new()
  }
}
impl Crc32 {
  /// A fresh accumulator (same as calling [`reset`](Self::reset)).
  #[inline]
  #[must_use]
  pub const fn new() -> Self {
    Self { state: u32::MAX }
  }

  /// Sets the running state back to all ones.
  #[inline]
  pub fn reset(&mut self) {
    self.state = u32::MAX;
  }

  /// Folds a single byte into the running state.
  #[inline]
  pub fn update_byte(&mut self, byte: u8) {
    let i = (self.state ^ u32::from(byte)) as u8 as usize;
    self.state = CRC_TABLE[i] ^ (self.state >> 8);
  }

  /// Folds all of the bytes into the running state.
  #[inline]
  pub fn update(&mut self, bytes: &[u8]) {
    bytes.iter().copied().for_each(|b| self.update_byte(b));
  }

  /// The CRC of everything given since the last reset.
  #[inline]
  #[must_use]
  pub const fn value(&self) -> u32 {
    self.state ^ u32::MAX
  }
}

/// One-shot CRC of an iterator of bytes.
#[inline]
#[must_use]
pub fn png_crc(iter: impl Iterator<Item = u8>) -> u32 {
  let mut crc = Crc32::new();
  iter.for_each(|b| crc.update_byte(b));
  crc.value()
}

#[test]
fn test_crc32_check_value() {
  let mut crc = Crc32::new();
  crc.update(b"123456789");
  assert_eq!(crc.value(), 0xCBF4_3926);

  // byte at a time gives the same answer, and reset really resets.
  crc.reset();
  b"123456789".iter().for_each(|b| crc.update_byte(*b));
  assert_eq!(crc.value(), 0xCBF4_3926);
}

#[test]
fn test_crc32_known_chunks() {
  // every PNG ends with this exact IEND chunk.
  assert_eq!(png_crc(b"IEND".iter().copied()), 0xAE42_6082);
  // split updates match a single update
  let mut crc = Crc32::new();
  crc.update(b"IE");
  crc.update(b"ND");
  assert_eq!(crc.value(), 0xAE42_6082);
}
