//! Lookup tables that move samples from their source bit depth to the PNG's
//! bit depth.

/// Rescales a single sample with rounding to nearest.
///
/// ## Panics
/// * If `in_bits` or `out_bits` is outside `1..=16`.
#[inline]
#[must_use]
pub const fn rescale_sample(sample: u32, in_bits: u8, out_bits: u8) -> u32 {
  assert!(in_bits >= 1 && in_bits <= 16 && out_bits >= 1 && out_bits <= 16);
  let max_in = (1_u64 << in_bits) - 1;
  let max_out = (1_u64 << out_bits) - 1;
  ((sample as u64 * max_out + max_in / 2) / max_in) as u32
}

/// The rescaling table for one band.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum BandScale {
  /// Output depth of 8 or less, one byte per input value.
  Narrow(Vec<u8>),
  /// 16-bit output, split into high and low byte tables.
  Wide { high: Vec<u8>, low: Vec<u8> },
}
impl BandScale {
  /// Builds the table for every `in_bits` sample value.
  #[must_use]
  pub fn build(in_bits: u8, out_bits: u8) -> Self {
    let count = 1_usize << in_bits;
    if out_bits <= 8 {
      Self::Narrow((0..count as u32).map(|s| rescale_sample(s, in_bits, out_bits) as u8).collect())
    } else {
      let (high, low) = (0..count as u32)
        .map(|s| {
          let [h, l] = (rescale_sample(s, in_bits, out_bits) as u16).to_be_bytes();
          (h, l)
        })
        .unzip();
      Self::Wide { high, low }
    }
  }

  /// Looks up a sample for 1, 2, 4, or 8 bit output.
  ///
  /// Out of range samples are treated as the max input value.
  #[inline]
  #[must_use]
  pub fn narrow(&self, sample: u32) -> u8 {
    match self {
      Self::Narrow(table) => table[clamp_index(sample, table.len())],
      Self::Wide { high, .. } => high[clamp_index(sample, high.len())],
    }
  }

  /// Looks up a sample for 16 bit output, as big-endian bytes.
  #[inline]
  #[must_use]
  pub fn wide(&self, sample: u32) -> [u8; 2] {
    match self {
      Self::Narrow(table) => [0, table[clamp_index(sample, table.len())]],
      Self::Wide { high, low } => {
        let i = clamp_index(sample, high.len());
        [high[i], low[i]]
      }
    }
  }
}

#[inline]
#[must_use]
fn clamp_index(sample: u32, len: usize) -> usize {
  (sample as usize).min(len - 1)
}

/// Per-band scale tables, kept until the band depths or the target depth
/// change.
#[derive(Debug, Clone, Default)]
pub struct ScaleCache {
  key: Option<(Vec<u8>, u8)>,
  bands: Vec<BandScale>,
  builds: usize,
}
impl ScaleCache {
  #[inline]
  #[must_use]
  pub const fn new() -> Self {
    Self { key: None, bands: Vec::new(), builds: 0 }
  }

  /// Gets the tables for the given source depths (one per band) and output
  /// depth, building them only if they differ from the last request.
  pub fn tables(&mut self, sample_bits: &[u8], out_bits: u8) -> &[BandScale] {
    let up_to_date = matches!(&self.key, Some((bits, out)) if bits.as_slice() == sample_bits && *out == out_bits);
    if !up_to_date {
      self.bands = sample_bits.iter().map(|&in_bits| BandScale::build(in_bits, out_bits)).collect();
      self.key = Some((sample_bits.to_vec(), out_bits));
      self.builds += 1;
      log::trace!("built scale tables {sample_bits:?} -> {out_bits} bits");
    }
    &self.bands
  }

  /// How many times the tables have been (re)built.
  #[inline]
  #[must_use]
  pub const fn builds(&self) -> usize {
    self.builds
  }
}

#[test]
fn test_8_to_8_is_identity() {
  let table = BandScale::build(8, 8);
  for i in 0..=255_u32 {
    assert_eq!(table.narrow(i), i as u8);
  }
}

#[test]
fn test_known_rescales() {
  // 1 bit up to 8 bits is 0 or 255
  assert_eq!(rescale_sample(1, 1, 8), 255);
  assert_eq!(rescale_sample(0, 1, 8), 0);
  // 5 bit max goes to 8 bit max, and mid rounds to nearest
  assert_eq!(rescale_sample(31, 5, 8), 255);
  assert_eq!(rescale_sample(16, 5, 8), 132);
  // 8 bits down to 1 bit splits at the middle
  assert_eq!(rescale_sample(127, 8, 1), 0);
  assert_eq!(rescale_sample(128, 8, 1), 1);
  // 8 bits up to 16 bits replicates the byte
  let wide = BandScale::build(8, 16);
  assert_eq!(wide.wide(0xAB), [0xAB, 0xAB]);
  assert_eq!(wide.wide(255), [255, 255]);
  // out of range samples clamp instead of panicking
  assert_eq!(BandScale::build(4, 8).narrow(99), 255);
}

#[test]
fn test_cache_rebuilds_only_on_key_change() {
  let mut cache = ScaleCache::new();
  assert_eq!(cache.tables(&[8, 8, 8], 8).len(), 3);
  assert_eq!(cache.builds(), 1);
  // a different allocation with equal contents is still a hit.
  let same = vec![8_u8, 8, 8];
  cache.tables(&same, 8);
  assert_eq!(cache.builds(), 1);
  cache.tables(&[8, 8, 8], 16);
  assert_eq!(cache.builds(), 2);
  cache.tables(&[5, 6, 5], 16);
  assert_eq!(cache.builds(), 3);
}
