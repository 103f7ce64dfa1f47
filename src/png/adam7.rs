//! Interlacing geometry.
//!
//! ```txt
//! 1 6 4 6 2 6 4 6
//! 7 7 7 7 7 7 7 7
//! 5 6 5 6 5 6 5 6
//! 7 7 7 7 7 7 7 7
//! 3 6 4 6 3 6 4 6
//! 7 7 7 7 7 7 7 7
//! 5 6 5 6 5 6 5 6
//! 7 7 7 7 7 7 7 7
//! ```

/// One pass over an image: which columns and rows it takes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Pass {
  pub x_offset: u32,
  pub y_offset: u32,
  pub x_step: u32,
  pub y_step: u32,
}
impl Pass {
  /// The one pass of a non-interlaced image.
  pub const FULL: Self = Self::new(0, 0, 1, 1);

  #[inline]
  #[must_use]
  pub const fn new(x_offset: u32, y_offset: u32, x_step: u32, y_step: u32) -> Self {
    Self { x_offset, y_offset, x_step, y_step }
  }

  /// Stretches the pass to work in a space that's subsampled by the given
  /// periods (so a pass over the output image can walk the source image).
  ///
  /// Saturates. An offset or step that doesn't fit in `u32` is past the end
  /// of any source, so only a pass holding a single column or row can end
  /// up with one, and that value is never stepped by.
  #[inline]
  #[must_use]
  pub const fn scaled(self, period_x: u32, period_y: u32) -> Self {
    Self {
      x_offset: self.x_offset.saturating_mul(period_x),
      y_offset: self.y_offset.saturating_mul(period_y),
      x_step: self.x_step.saturating_mul(period_x),
      y_step: self.y_step.saturating_mul(period_y),
    }
  }

  /// The `(columns, rows)` this pass takes out of an image of the given size.
  ///
  /// Either can be 0 for small images, in which case the pass is empty.
  #[inline]
  #[must_use]
  pub const fn extent(self, width: u32, height: u32) -> (u32, u32) {
    (span(width, self.x_offset, self.x_step), span(height, self.y_offset, self.y_step))
  }
}

#[inline]
#[must_use]
const fn span(length: u32, offset: u32, step: u32) -> u32 {
  if length > offset {
    (length - offset - 1) / step + 1
  } else {
    0
  }
}

/// The seven Adam7 passes, in the order they're stored.
pub const ADAM7_PASSES: [Pass; 7] = [
  Pass::new(0, 0, 8, 8),
  Pass::new(4, 0, 8, 8),
  Pass::new(0, 4, 4, 8),
  Pass::new(2, 0, 4, 4),
  Pass::new(0, 2, 2, 4),
  Pass::new(1, 0, 2, 2),
  Pass::new(0, 1, 1, 2),
];

/// Gets the passes for an image with or without interlacing.
#[inline]
#[must_use]
pub fn passes(interlaced: bool) -> &'static [Pass] {
  if interlaced {
    &ADAM7_PASSES
  } else {
    core::slice::from_ref(&Pass::FULL)
  }
}

#[cfg(test)]
fn reduced_image_dimensions(full_width: u32, full_height: u32) -> [(u32, u32); 8] {
  let mut out = [(full_width, full_height); 8];
  for (o, pass) in out[1..].iter_mut().zip(ADAM7_PASSES) {
    *o = pass.extent(full_width, full_height);
  }
  out
}

#[test]
fn test_reduced_image_dimensions() {
  assert_eq!(reduced_image_dimensions(0, 0), [(0, 0); 8]);
  // one
  for (w, ex) in (1..=8).zip([1, 1, 1, 1, 1, 1, 1, 1]) {
    assert_eq!(reduced_image_dimensions(w, 0)[1].0, ex, "failed w:{w}");
  }
  for (h, ex) in (1..=8).zip([1, 1, 1, 1, 1, 1, 1, 1]) {
    assert_eq!(reduced_image_dimensions(0, h)[1].1, ex, "failed h:{h}");
  }
  // two
  for (w, ex) in (1..=8).zip([0, 0, 0, 0, 1, 1, 1, 1]) {
    assert_eq!(reduced_image_dimensions(w, 0)[2].0, ex, "failed w:{w}");
  }
  for (h, ex) in (1..=8).zip([1, 1, 1, 1, 1, 1, 1, 1]) {
    assert_eq!(reduced_image_dimensions(0, h)[2].1, ex, "failed h:{h}");
  }
  // three
  for (w, ex) in (1..=8).zip([1, 1, 1, 1, 2, 2, 2, 2]) {
    assert_eq!(reduced_image_dimensions(w, 0)[3].0, ex, "failed w: {w}");
  }
  for (h, ex) in (1..=8).zip([0, 0, 0, 0, 1, 1, 1, 1]) {
    assert_eq!(reduced_image_dimensions(0, h)[3].1, ex, "failed h: {h}");
  }
  // four
  for (w, ex) in (1..=8).zip([0, 0, 1, 1, 1, 1, 2, 2]) {
    assert_eq!(reduced_image_dimensions(w, 0)[4].0, ex, "failed w: {w}");
  }
  for (h, ex) in (1..=8).zip([1, 1, 1, 1, 2, 2, 2, 2]) {
    assert_eq!(reduced_image_dimensions(0, h)[4].1, ex, "failed h: {h}");
  }
  // five
  for (w, ex) in (1..=8).zip([1, 1, 2, 2, 3, 3, 4, 4]) {
    assert_eq!(reduced_image_dimensions(w, 0)[5].0, ex, "failed w: {w}");
  }
  for (h, ex) in (1..=8).zip([0, 0, 1, 1, 1, 1, 2, 2]) {
    assert_eq!(reduced_image_dimensions(0, h)[5].1, ex, "failed h: {h}");
  }
  // six
  for (w, ex) in (1..=8).zip([0, 1, 1, 2, 2, 3, 3, 4]) {
    assert_eq!(reduced_image_dimensions(w, 0)[6].0, ex, "failed w: {w}");
  }
  for (h, ex) in (1..=8).zip([1, 1, 2, 2, 3, 3, 4, 4]) {
    assert_eq!(reduced_image_dimensions(0, h)[6].1, ex, "failed h: {h}");
  }
  // seven
  for (w, ex) in (1..=8).zip([1, 2, 3, 4, 5, 6, 7, 8]) {
    assert_eq!(reduced_image_dimensions(w, 0)[7].0, ex, "failed w: {w}");
  }
  for (h, ex) in (1..=8).zip([0, 1, 1, 2, 2, 3, 3, 4]) {
    assert_eq!(reduced_image_dimensions(0, h)[7].1, ex, "failed h: {h}");
  }
  //
  assert_eq!(
    reduced_image_dimensions(8, 8),
    [
      (8, 8), // zeroth
      (1, 1), // one
      (1, 1), // two
      (2, 1), // three
      (2, 2), // four
      (4, 2), // five
      (4, 4), // six
      (8, 4), // seven
    ]
  );
}

#[test]
fn test_one_pixel_image_uses_only_the_first_pass() {
  let non_empty: Vec<usize> = ADAM7_PASSES
    .iter()
    .enumerate()
    .filter(|(_, p)| {
      let (w, h) = p.extent(1, 1);
      w > 0 && h > 0
    })
    .map(|(i, _)| i)
    .collect();
  assert_eq!(non_empty, vec![0]);
}

#[test]
fn test_scaled_pass_walks_subsampled_source() {
  // a 2x subsampled 16 wide source gives an 8 wide output, so each Adam7
  // pass sees the same column count it would on an 8 wide image.
  for pass in ADAM7_PASSES {
    assert_eq!(pass.scaled(2, 2).extent(16, 16), pass.extent(8, 8));
  }
  assert_eq!(passes(false), &[Pass::FULL]);
  assert_eq!(passes(true).len(), 7);
}

#[test]
fn test_scaled_pass_saturates_huge_periods() {
  let pass = ADAM7_PASSES[1].scaled(u32::MAX, 1 << 30);
  assert_eq!((pass.x_offset, pass.x_step), (u32::MAX, u32::MAX));
  assert_eq!((pass.y_offset, pass.y_step), (0, u32::MAX));
  assert_eq!(pass.extent(u32::MAX, u32::MAX), (0, 1));
  assert_eq!(Pass::FULL.scaled(u32::MAX, 1).extent(u32::MAX, 3), (1, 3));
}
