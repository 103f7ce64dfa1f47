//! Adaptive scanline filtering.
//!
//! From the PNG spec:
//!
//! > Filters are applied to **bytes**, not to pixels, regardless of the bit
//! > depth or color type of the image.
//!
//! All of the row slices used here carry `bpp` leading zero bytes, so the
//! "left" neighbor of the first real byte is always a zero guard byte rather
//! than a special case.

use super::PngColorType;

/// The five filter types of PNG filter method 0.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(u8)]
pub enum FilterType {
  None = 0,
  Sub = 1,
  Up = 2,
  Average = 3,
  Paeth = 4,
}
impl FilterType {
  /// All filter types in index order.
  pub const ALL: [Self; 5] = [Self::None, Self::Sub, Self::Up, Self::Average, Self::Paeth];
}

/// The Paeth filter function computes a simple linear function of the three
/// neighboring pixels (left `a`, above `b`, upper left `c`).
///
/// The output is the "predictor" of the neighboring pixel closest to the
/// computed value.
#[inline]
#[must_use]
pub const fn paeth_predictor(a: u8, b: u8, c: u8) -> u8 {
  // Note(Lokathor): PNG spec says "The calculations within the PaethPredictor
  // function shall be performed exactly, without overflow.", so we use i32 math
  // here, which is wide enough to never give us trouble no matter what the u8
  // input values are.
  let a_ = a as i32;
  let b_ = b as i32;
  let c_ = c as i32;
  let p = a_ + b_ - c_;
  let pa = (p - a_).abs();
  let pb = (p - b_).abs();
  let pc = (p - c_).abs();
  // the order of these tests must not change.
  if pa <= pb && pa <= pc {
    a
  } else if pb <= pc {
    b
  } else {
    c
  }
}

/// Filters one row every possible way and picks the cheapest.
///
/// * `curr` and `prev` are `bpp + bytes_per_row` long, the first `bpp` bytes
///   being zero. For the first row of an image (or of an interlace pass)
///   `prev` is all zeros.
/// * `scratch` holds one output row per filter type, each with the same
///   layout. After the call, `scratch[t as usize][bpp..]` is the payload to
///   write after the filter type byte `t`.
///
/// Each candidate is scored with a "badness": the sum of the unsigned bytes
/// for `None`, or the sum of the absolute (unwrapped) differences from the
/// predictor for the other types. The lowest score wins, and ties go to the
/// lower filter type.
///
/// Indexed color rows are never filtered.
pub fn filter_row(
  color_type: PngColorType, curr: &[u8], prev: &[u8], scratch: &mut [Vec<u8>; 5],
  bytes_per_row: usize, bpp: usize,
) -> FilterType {
  let end = bpp + bytes_per_row;
  let curr = &curr[..end];
  let prev = &prev[..end];
  let [none, sub, up, average, paeth] = scratch;
  none[bpp..end].copy_from_slice(&curr[bpp..]);

  if color_type == PngColorType::Index {
    return FilterType::None;
  }

  let mut badness = [0_u64; 5];
  badness[0] = curr[bpp..].iter().map(|&x| u64::from(x)).sum();
  for i in bpp..end {
    let x = i32::from(curr[i]);
    let a = curr[i - bpp];
    let b = prev[i];
    let c = prev[i - bpp];

    let d = x - i32::from(a);
    sub[i] = d as u8;
    badness[1] += u64::from(d.unsigned_abs());

    let d = x - i32::from(b);
    up[i] = d as u8;
    badness[2] += u64::from(d.unsigned_abs());

    let d = x - ((i32::from(a) + i32::from(b)) / 2);
    average[i] = d as u8;
    badness[3] += u64::from(d.unsigned_abs());

    let d = x - i32::from(paeth_predictor(a, b, c));
    paeth[i] = d as u8;
    badness[4] += u64::from(d.unsigned_abs());
  }

  let mut best = FilterType::None;
  for filter in FilterType::ALL.into_iter().skip(1) {
    if badness[filter as usize] < badness[best as usize] {
      best = filter;
    }
  }
  best
}
