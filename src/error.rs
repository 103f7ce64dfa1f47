use core::fmt;

/// An error from the `imprint` crate.
#[derive(Debug)]
pub enum PngEncodeError {
  /// The output sink failed a write or seek.
  ///
  /// Whatever bytes were already written stay in the sink.
  Io(std::io::Error),

  /// The metadata can't be turned into a legal PNG chunk sequence.
  ///
  /// This is raised before the offending chunk is started.
  MalformedMetadata(&'static str),

  /// The encode request itself is unusable (empty region, bad bands, etc).
  ///
  /// This is raised before any byte reaches the sink.
  InvalidArgument(&'static str),
}
impl fmt::Display for PngEncodeError {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Self::Io(e) => write!(f, "I/O error writing PNG file: {e}"),
      Self::MalformedMetadata(msg) => write!(f, "malformed PNG metadata: {msg}"),
      Self::InvalidArgument(msg) => write!(f, "invalid argument: {msg}"),
    }
  }
}
impl std::error::Error for PngEncodeError {
  fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
    match self {
      Self::Io(e) => Some(e),
      _ => None,
    }
  }
}
impl From<std::io::Error> for PngEncodeError {
  #[inline]
  fn from(e: std::io::Error) -> Self {
    Self::Io(e)
  }
}

/// Shorthand for results in this crate.
pub type PngResult<T> = Result<T, PngEncodeError>;

#[test]
fn test_io_error_display_has_context() {
  let e = PngEncodeError::from(std::io::Error::new(std::io::ErrorKind::WriteZero, "disk full"));
  assert!(e.to_string().starts_with("I/O error writing PNG file"));
  assert!(std::error::Error::source(&e).is_some());
  let e = PngEncodeError::MalformedMetadata("hIST chunk without PLTE chunk");
  assert!(std::error::Error::source(&e).is_none());
}
