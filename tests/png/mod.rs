use std::io::Cursor;

use imprint::{png::*, PngEncodeError, SrgbIntent};

/// Splits a chunk run into `(type, payload)` pairs, checking every length and
/// CRC along the way.
fn parse_chunks(mut bytes: &[u8]) -> Vec<([u8; 4], Vec<u8>)> {
  let mut out = Vec::new();
  while !bytes.is_empty() {
    assert!(bytes.len() >= 12, "truncated chunk");
    let len = u32::from_be_bytes(bytes[0..4].try_into().unwrap()) as usize;
    let ty: [u8; 4] = bytes[4..8].try_into().unwrap();
    let data = bytes[8..8 + len].to_vec();
    let declared_crc = u32::from_be_bytes(bytes[8 + len..12 + len].try_into().unwrap());
    assert_eq!(declared_crc, png_crc(bytes[4..8 + len].iter().copied()), "bad CRC on {ty:?}");
    out.push((ty, data));
    bytes = &bytes[12 + len..];
  }
  out
}

fn chunk_types(chunks: &[([u8; 4], Vec<u8>)]) -> Vec<String> {
  chunks.iter().map(|(ty, _)| String::from_utf8_lossy(ty).into_owned()).collect()
}

fn find<'c>(chunks: &'c [([u8; 4], Vec<u8>)], ty: &[u8; 4]) -> Option<&'c [u8]> {
  chunks.iter().find(|(t, _)| t == ty).map(|(_, d)| d.as_slice())
}

const fn paeth_predict(a: u8, b: u8, c: u8) -> u8 {
  let a_ = a as i32;
  let b_ = b as i32;
  let c_ = c as i32;
  let p: i32 = a_ + b_ - c_;
  let pa = (p - a_).abs();
  let pb = (p - b_).abs();
  let pc = (p - c_).abs();
  if pa <= pb && pa <= pc {
    a
  } else if pb <= pc {
    b
  } else {
    c
  }
}

fn unfilter(filter: u8, line: &mut [u8], prev: &[u8], bpp: usize) {
  for i in 0..line.len() {
    let a = if i >= bpp { line[i - bpp] } else { 0 };
    let b = prev[i];
    let c = if i >= bpp { prev[i - bpp] } else { 0 };
    line[i] = line[i].wrapping_add(match filter {
      0 => 0,
      1 => a,
      2 => b,
      3 => ((a as u32 + b as u32) / 2) as u8,
      4 => paeth_predict(a, b, c),
      _ => panic!("illegal filter type {filter}"),
    });
  }
}

/// What the reference decoder pulls out of a PNG.
struct Decoded {
  chunks: Vec<([u8; 4], Vec<u8>)>,
  width: u32,
  height: u32,
  bit_depth: u8,
  color_type: u8,
  channels: usize,
  /// filter type bytes, in stream order
  filters: Vec<u8>,
  /// unfiltered scanlines, in stream order
  lines: Vec<Vec<u8>>,
  /// `channels` raw samples per pixel, row-major
  samples: Vec<u16>,
}
impl Decoded {
  fn pixel(&self, x: u32, y: u32) -> &[u16] {
    let i = (y * self.width + x) as usize * self.channels;
    &self.samples[i..i + self.channels]
  }
}

fn read_sample(line: &[u8], i: usize, depth: u8) -> u16 {
  match depth {
    16 => u16::from_be_bytes([line[2 * i], line[2 * i + 1]]),
    8 => u16::from(line[i]),
    d => {
      let d = usize::from(d);
      let bit = i * d;
      let shift = 8 - d - bit % 8;
      u16::from((line[bit / 8] >> shift) & ((1 << d) - 1))
    }
  }
}

/// Decodes a complete PNG, checking the framing on the way.
fn decode(png: &[u8]) -> Decoded {
  assert_eq!(&png[..8], &PNG_SIGNATURE);
  let chunks = parse_chunks(&png[8..]);
  assert_eq!(&chunks[0].0, b"IHDR");
  assert_eq!(chunks.last().unwrap(), &(*b"IEND", vec![]));
  let ihdr = &chunks[0].1;
  assert_eq!(ihdr.len(), 13);
  let width = u32::from_be_bytes(ihdr[0..4].try_into().unwrap());
  let height = u32::from_be_bytes(ihdr[4..8].try_into().unwrap());
  let (bit_depth, color_type) = (ihdr[8], ihdr[9]);
  assert_eq!((ihdr[10], ihdr[11]), (0, 0));
  let interlaced = ihdr[12] == 1;
  let channels = match color_type {
    0 | 3 => 1,
    2 => 3,
    4 => 2,
    6 => 4,
    _ => panic!("bad color type"),
  };

  // every IDAT must be consecutive
  let first = chunks.iter().position(|(t, _)| t == b"IDAT").unwrap();
  let count = chunks.iter().filter(|(t, _)| t == b"IDAT").count();
  assert!(chunks[first..first + count].iter().all(|(t, _)| t == b"IDAT"));
  let zlib: Vec<u8> = chunks[first..first + count].iter().flat_map(|(_, d)| d.iter().copied()).collect();
  let raw = miniz_oxide::inflate::decompress_to_vec_zlib(&zlib).unwrap();

  let bits_pp = channels * usize::from(bit_depth);
  let bpp = (bits_pp / 8).max(1);
  let passes: &[(u32, u32, u32, u32)] = if interlaced {
    &[(0, 0, 8, 8), (4, 0, 8, 8), (0, 4, 4, 8), (2, 0, 4, 4), (0, 2, 2, 4), (1, 0, 2, 2), (0, 1, 1, 2)]
  } else {
    &[(0, 0, 1, 1)]
  };
  let mut samples = vec![0_u16; (width * height) as usize * channels];
  let mut filters = Vec::new();
  let mut lines = Vec::new();
  let mut pos = 0;
  for &(xo, yo, xs, ys) in passes {
    let cols = if width > xo { (width - xo + xs - 1) / xs } else { 0 };
    let rows = if height > yo { (height - yo + ys - 1) / ys } else { 0 };
    if cols == 0 || rows == 0 {
      continue;
    }
    let row_bytes = (bits_pp * cols as usize + 7) / 8;
    let mut prev = vec![0_u8; row_bytes];
    for r in 0..rows {
      let filter = raw[pos];
      let mut line = raw[pos + 1..pos + 1 + row_bytes].to_vec();
      pos += 1 + row_bytes;
      unfilter(filter, &mut line, &prev, bpp);
      for c in 0..cols {
        let (x, y) = (xo + c * xs, yo + r * ys);
        for ch in 0..channels {
          let v = read_sample(&line, c as usize * channels + ch, bit_depth);
          samples[(y * width + x) as usize * channels + ch] = v;
        }
      }
      filters.push(filter);
      lines.push(line.clone());
      prev = line;
    }
  }
  assert_eq!(pos, raw.len(), "extra bytes in the image data");
  Decoded { chunks, width, height, bit_depth, color_type, channels, filters, lines, samples }
}

#[derive(Default)]
struct Recorder {
  events: Vec<String>,
  progress: Vec<f32>,
  warnings: Vec<String>,
  abort_after_rows: Option<usize>,
}
impl EncodeObserver for Recorder {
  fn image_started(&mut self) {
    self.events.push("started".into());
  }
  fn image_progress(&mut self, fraction: f32) {
    self.progress.push(fraction);
  }
  fn image_complete(&mut self) {
    self.events.push("complete".into());
  }
  fn write_aborted(&mut self) {
    self.events.push("aborted".into());
  }
  fn warning(&mut self, message: &str) {
    self.warnings.push(message.into());
  }
  fn abort_requested(&mut self) -> bool {
    self.abort_after_rows.map_or(false, |n| self.progress.len() >= n && n > 0)
  }
}

fn encode_with(
  params: WriteParams, image: &SampleImage, md: Option<&ImageMetadata>, observer: &mut Recorder,
) -> (Result<EncodeOutcome, PngEncodeError>, Vec<u8>) {
  let mut out = Cursor::new(Vec::new());
  let result = PngEncoder::new(params).encode(&mut out, image, md, observer);
  (result, out.into_inner())
}

fn rgb_bytes(count: usize) -> Vec<[u8; 3]> {
  super::rand_bytes(count * 3).chunks_exact(3).map(|c| [c[0], c[1], c[2]]).collect()
}

#[test]
fn test_2x2_rgb8_end_to_end() {
  let pixels = [[255, 0, 0], [0, 255, 0], [0, 0, 255], [10, 20, 30]];
  let image = SampleImage::from_rgb8(2, 2, &pixels).unwrap();
  let png = encode_to_vec(&image, None).unwrap();
  let d = decode(&png);
  assert_eq!(chunk_types(&d.chunks), ["IHDR", "IDAT", "IEND"]);
  assert_eq!(d.chunks[0].1, [0, 0, 0, 2, 0, 0, 0, 2, 8, 2, 0, 0, 0]);
  assert_eq!(d.lines.len(), 2);
  assert!(d.lines.iter().all(|l| l.len() == 6));
  let flat: Vec<u8> = d.lines.concat();
  assert_eq!(flat, pixels.concat());
  assert_eq!((d.width, d.height, d.bit_depth, d.color_type), (2, 2, 8, 2));
}

#[test]
fn test_observer_sees_the_whole_encode() {
  let image = SampleImage::from_rgb8(3, 4, &rgb_bytes(12)).unwrap();
  let mut observer = Recorder::default();
  let (result, _) = encode_with(WriteParams::default(), &image, None, &mut observer);
  assert_eq!(result.unwrap(), EncodeOutcome::Complete);
  assert_eq!(observer.events, ["started", "complete"]);
  assert_eq!(observer.progress, [0.25, 0.5, 0.75, 1.0]);
}

#[test]
fn test_abort_after_first_row() {
  let image = SampleImage::from_rgb8(5, 6, &rgb_bytes(30)).unwrap();
  let mut observer = Recorder { abort_after_rows: Some(1), ..Recorder::default() };
  let (result, png) = encode_with(WriteParams::default(), &image, None, &mut observer);
  assert_eq!(result.unwrap(), EncodeOutcome::Aborted);
  assert_eq!(observer.events, ["started", "aborted"]);
  assert_eq!(observer.progress.len(), 1);

  assert_eq!(&png[..8], &PNG_SIGNATURE);
  let chunks = parse_chunks(&png[8..]);
  assert_eq!(chunk_types(&chunks).last().unwrap(), "IDAT");
  assert!(find(&chunks, b"IEND").is_none());
  let zlib: Vec<u8> =
    chunks.iter().filter(|(t, _)| t == b"IDAT").flat_map(|(_, d)| d.iter().copied()).collect();
  let raw = miniz_oxide::inflate::decompress_to_vec_zlib(&zlib).unwrap();
  assert_eq!(raw.len(), 1 + 15);
}

#[test]
fn test_1x1_interlaced_uses_one_pass() {
  let image = SampleImage::from_rgb8(1, 1, &[[1, 2, 3]]).unwrap();
  let params = WriteParams { interlace: Some(true), ..WriteParams::default() };
  let (result, png) = encode_with(params, &image, None, &mut Recorder::default());
  result.unwrap();
  let d = decode(&png);
  assert_eq!(d.chunks[0].1[12], 1);
  assert_eq!(d.lines, [vec![1, 2, 3]]);
}

#[test]
fn test_interlaced_round_trip() {
  let (w, h) = (13, 11);
  let bytes = super::rand_bytes((w * h * 4) as usize);
  let pixels: Vec<[u8; 4]> = bytes.chunks_exact(4).map(|c| [c[0], c[1], c[2], c[3]]).collect();
  let image = SampleImage::from_rgba8(w, h, &pixels).unwrap();
  let params = WriteParams { interlace: Some(true), compression_quality: Some(0.0), ..WriteParams::default() };
  let mut observer = Recorder::default();
  let (result, png) = encode_with(params, &image, None, &mut observer);
  result.unwrap();
  let d = decode(&png);
  assert_eq!(d.color_type, 6);
  assert_eq!(d.lines.len(), [2, 2, 1, 3, 3, 6, 5].iter().sum::<usize>());
  for y in 0..h {
    for x in 0..w {
      let expected: Vec<u16> = pixels[(y * w + x) as usize].iter().map(|&b| u16::from(b)).collect();
      assert_eq!(d.pixel(x, y), expected.as_slice(), "pixel ({x},{y})");
    }
  }
  assert_eq!(observer.progress.last(), Some(&1.0));
  assert!(observer.progress.windows(2).all(|w| w[0] <= w[1]));
}

#[test]
fn test_1_bit_gray_packing() {
  let samples: Vec<u16> = (0..22).map(|i| (i % 2 == 0) as u16).collect();
  let image = SampleImage::from_gray(11, 2, 1, &samples).unwrap();
  let png = encode_to_vec(&image, None).unwrap();
  let d = decode(&png);
  assert_eq!((d.bit_depth, d.color_type), (1, 0));
  assert_eq!(d.lines, [vec![0b1010_1010, 0b1010_0000], vec![0b0101_0101, 0b0100_0000]]);
}

#[test]
fn test_palette_with_transparency() {
  let palette = vec![[10, 0, 0], [20, 0, 0], [30, 0, 0], [40, 0, 0]];
  let alpha = vec![255, 0, 255, 128];
  let indexes: Vec<u8> = (0..16).map(|i| (i * 7 % 4) as u8).collect();
  let image = SampleImage::from_indexed(4, 4, 2, palette.clone(), Some(alpha.clone()), &indexes).unwrap();
  let png = encode_to_vec(&image, None).unwrap();
  let d = decode(&png);
  assert_eq!((d.bit_depth, d.color_type), (2, 3));
  assert_eq!(chunk_types(&d.chunks), ["IHDR", "PLTE", "tRNS", "IDAT", "IEND"]);
  assert_eq!(find(&d.chunks, b"tRNS").unwrap(), &[0, 128]);
  assert!(d.filters.iter().all(|&f| f == 0));

  let plte: Vec<[u8; 3]> =
    find(&d.chunks, b"PLTE").unwrap().chunks_exact(3).map(|c| [c[0], c[1], c[2]]).collect();
  let trns = find(&d.chunks, b"tRNS").unwrap();
  for (i, &src) in indexes.iter().enumerate() {
    let written = usize::from(d.samples[i]);
    assert_eq!(plte[written], palette[usize::from(src)]);
    assert_eq!(trns.get(written).copied().unwrap_or(255), alpha[usize::from(src)]);
  }
}

#[test]
fn test_gray_ramp_palette_with_alpha_becomes_gray_alpha() {
  let ramp: Vec<[u8; 3]> = (0..=255_u8).map(|i| [i; 3]).collect();
  let alpha: Vec<u8> = (0..=255_u8).rev().collect();
  let indexes = [0_u8, 1, 100, 255];
  let image = SampleImage::from_indexed(2, 2, 8, ramp, Some(alpha), &indexes).unwrap();
  let d = decode(&encode_to_vec(&image, None).unwrap());
  assert_eq!((d.bit_depth, d.color_type), (8, 4));
  assert!(find(&d.chunks, b"PLTE").is_none());
  assert_eq!(d.samples, [0, 255, 1, 254, 100, 155, 255, 0]);
}

#[test]
fn test_region_subsampling_and_bands() {
  let (w, h) = (9, 7);
  let bytes = super::rand_bytes((w * h * 4) as usize);
  let pixels: Vec<[u8; 4]> = bytes.chunks_exact(4).map(|c| [c[0], c[1], c[2], c[3]]).collect();
  let image = SampleImage::from_rgba8(w, h, &pixels).unwrap();
  let params = WriteParams {
    source_region: Some(Region { x: 1, y: 2, width: 7, height: 5 }),
    subsampling: Subsampling { x_period: 3, y_period: 2, x_offset: 1, y_offset: 0 },
    source_bands: Some(vec![2, 0]),
    ..WriteParams::default()
  };
  let (result, png) = encode_with(params, &image, None, &mut Recorder::default());
  result.unwrap();
  let d = decode(&png);
  // columns 2, 5 and rows 2, 4, 6
  assert_eq!((d.width, d.height, d.color_type), (2, 3, 4));
  for oy in 0..3 {
    for ox in 0..2 {
      let src = pixels[((2 + oy * 2) * w + 2 + ox * 3) as usize];
      assert_eq!(d.pixel(ox, oy), &[u16::from(src[2]), u16::from(src[0])]);
    }
  }
}

#[test]
fn test_16_bit_round_trip() {
  let bytes = super::rand_bytes(2 * 5 * 3);
  let samples: Vec<u16> = bytes.chunks_exact(2).map(|c| u16::from_be_bytes([c[0], c[1]])).collect();
  let image = SampleImage::from_gray(5, 3, 16, &samples).unwrap();
  let d = decode(&encode_to_vec(&image, None).unwrap());
  assert_eq!((d.bit_depth, d.color_type), (16, 0));
  assert_eq!(d.samples, samples);

  // 12 bit samples go up to 16 bits at full scale
  let image = SampleImage::from_gray(2, 1, 12, &[0, 4095]).unwrap();
  let d = decode(&encode_to_vec(&image, None).unwrap());
  assert_eq!((d.bit_depth, d.samples.as_slice()), (16, &[0, 65535][..]));
}

#[test]
fn test_565_samples_rescale_to_8_bits() {
  let layout = SampleLayout::direct(vec![5, 6, 5], false);
  let image = SampleImage::new(2, 1, layout, vec![31, 63, 31, 0, 32, 16]).unwrap();
  let d = decode(&encode_to_vec(&image, None).unwrap());
  assert_eq!((d.bit_depth, d.color_type), (8, 2));
  assert_eq!(d.samples, [255, 255, 255, 0, 130, 132]);
}

#[test]
fn test_premultiplied_source_is_unpremultiplied() {
  let layout = SampleLayout::direct_premultiplied(vec![8; 4]);
  let image = SampleImage::new(2, 1, layout, vec![64, 32, 0, 128, 9, 9, 9, 0]).unwrap();
  let d = decode(&encode_to_vec(&image, None).unwrap());
  assert_eq!(d.samples, [128, 64, 0, 128, 9, 9, 9, 0]);
}

#[test]
fn test_small_idat_chunks() {
  let image = SampleImage::from_rgb8(16, 16, &rgb_bytes(256)).unwrap();
  let params = WriteParams { idat_chunk_size: 64, compression_quality: Some(1.0), ..WriteParams::default() };
  let (result, png) = encode_with(params, &image, None, &mut Recorder::default());
  result.unwrap();
  let d = decode(&png);
  let idats: Vec<&Vec<u8>> = d.chunks.iter().filter(|(t, _)| t == b"IDAT").map(|(_, d)| d).collect();
  assert!(idats.len() > 10);
  assert!(idats.iter().all(|d| !d.is_empty() && d.len() <= 64));
  assert!(idats[..idats.len() - 1].iter().all(|d| d.len() == 64));
}

#[test]
fn test_metadata_chunks_in_order() {
  let image = SampleImage::from_rgb8(2, 2, &rgb_bytes(4)).unwrap();
  let md = ImageMetadata {
    gamma: Some(45455),
    srgb: Some(SrgbIntent::RelativeColorimetric),
    background: Some(Background::Gray { gray: 3 }),
    time: Some(ModificationTime { year: 2001, month: 1, day: 2, hour: 3, minute: 4, second: 5 }),
    text: vec![
      TextEntry::Compressed { keyword: Keyword::new("Comment").unwrap(), text: "long ".repeat(50) },
      TextEntry::Plain { keyword: Keyword::new("Title").unwrap(), text: "Test".into() },
    ],
    unknown_chunks: vec![UnknownChunk { ty: ChunkTy(*b"raNd"), data: vec![42] }],
    ..ImageMetadata::default()
  };
  let png = encode_to_vec(&image, Some(&md)).unwrap();
  let d = decode(&png);
  assert_eq!(chunk_types(&d.chunks), ["IHDR", "gAMA", "sRGB", "bKGD", "tIME", "tEXt", "zTXt", "raNd", "IDAT", "IEND"]);
  assert_eq!(find(&d.chunks, b"sRGB").unwrap(), &[1]);
  assert_eq!(find(&d.chunks, b"bKGD").unwrap(), &[0, 3, 0, 3, 0, 3]);
  // the caller's metadata doesn't change the image's own header
  assert_eq!(&d.chunks[0].1[..10], &[0, 0, 0, 2, 0, 0, 0, 2, 8, 2]);
}

#[test]
fn test_mismatched_chunks_warn_and_skip() {
  let image = SampleImage::from_rgb8(2, 2, &rgb_bytes(4)).unwrap();
  let md = ImageMetadata {
    background: Some(Background::Palette { index: 0 }),
    significant_bits: Some(SignificantBits::Gray { gray: 4 }),
    ..ImageMetadata::default()
  };
  let mut observer = Recorder::default();
  let (result, png) = encode_with(WriteParams::default(), &image, Some(&md), &mut observer);
  assert_eq!(result.unwrap(), EncodeOutcome::Complete);
  assert_eq!(observer.warnings.len(), 2);
  assert_eq!(chunk_types(&decode(&png).chunks), ["IHDR", "IDAT", "IEND"]);
}

#[test]
fn test_structural_errors() {
  let image = SampleImage::from_rgb8(2, 2, &rgb_bytes(4)).unwrap();
  let md = ImageMetadata { histogram: Some(vec![1, 2]), ..ImageMetadata::default() };
  let (result, _) = encode_with(WriteParams::default(), &image, Some(&md), &mut Recorder::default());
  assert!(matches!(result, Err(PngEncodeError::MalformedMetadata(_))));

  let md = ImageMetadata {
    header: Some(ImageHeader { interlace_method: 2, ..ImageHeader::new(2, 2, 8, PngColorType::RGB) }),
    ..ImageMetadata::default()
  };
  let (result, png) = encode_with(WriteParams::default(), &image, Some(&md), &mut Recorder::default());
  assert!(matches!(result, Err(PngEncodeError::MalformedMetadata(_))));
  // the signature went out but no IHDR did
  assert_eq!(png, PNG_SIGNATURE);

  assert!(matches!(Keyword::new(&"x".repeat(80)), Err(PngEncodeError::MalformedMetadata(_))));
}

#[test]
fn test_io_errors_are_reported() {
  struct Broken;
  impl std::io::Write for Broken {
    fn write(&mut self, _: &[u8]) -> std::io::Result<usize> {
      Err(std::io::Error::new(std::io::ErrorKind::Other, "disk full"))
    }
    fn flush(&mut self) -> std::io::Result<()> {
      Ok(())
    }
  }
  impl std::io::Seek for Broken {
    fn seek(&mut self, _: std::io::SeekFrom) -> std::io::Result<u64> {
      Ok(0)
    }
  }
  let image = SampleImage::from_rgb8(1, 1, &[[0, 0, 0]]).unwrap();
  let err = PngEncoder::default().encode(&mut Broken, &image, None, &mut NoObserver).unwrap_err();
  assert!(matches!(err, PngEncodeError::Io(_)));
  assert!(err.to_string().starts_with("I/O error writing PNG file"));
}
