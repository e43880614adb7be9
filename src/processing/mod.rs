//! Per-file transcoding: decode, orient, resize, fit into the byte budget

use std::fmt;
use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::time::Instant;

use image::{DynamicImage, ImageFormat};
use indicatif::HumanBytes;
use tempfile::NamedTempFile;
use tracing::debug;

use crate::config::Limits;
use crate::discovery::ImageJob;
use crate::error::{CodecContext, ErrorContext, JpegFitError, Result};

pub mod formats;
pub mod orientation;
pub mod quality;
pub mod resize;

pub use formats::*;
pub use quality::{search, JpegEncode, QualityRange, SearchResult};
pub use resize::{FilterType, ImageResizer};

/// Result of processing one job
#[derive(Debug)]
pub enum TranscodeOutcome {
    /// Output written and within every limit
    Success,
    /// Output written, but larger than the budget even at minimum quality
    SuccessWithWarning(String),
    /// No output was kept
    Failure(JpegFitError),
}

impl TranscodeOutcome {
    pub fn is_success(&self) -> bool {
        !matches!(self, Self::Failure(_))
    }

    /// Console text for outcomes that need one
    pub fn message(&self) -> Option<String> {
        match self {
            Self::Success => None,
            Self::SuccessWithWarning(message) => Some(message.clone()),
            Self::Failure(error) => Some(error.user_message()),
        }
    }
}

impl fmt::Display for TranscodeOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Success => write!(f, "success"),
            Self::SuccessWithWarning(message) => write!(f, "warning: {message}"),
            Self::Failure(error) => write!(f, "failed: {error}"),
        }
    }
}

/// Anything that can turn one job into an outcome
pub trait Transcode: Sync {
    fn transcode(&self, job: &ImageJob) -> TranscodeOutcome;
}

/// How a successful job produced its output
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Written {
    Copied,
    Encoded { quality: u8, met_budget: bool, size: u64 },
}

/// Converts a single image into a constrained JPEG
#[derive(Debug, Clone)]
pub struct FileTranscoder {
    limits: Limits,
    resizer: ImageResizer,
    range: QualityRange,
}

impl FileTranscoder {
    /// Create a transcoder for the given limits
    pub fn new(limits: Limits) -> Result<Self> {
        limits.validate()?;
        let range = QualityRange::new(limits.min_quality, limits.max_quality)?;

        Ok(Self {
            limits,
            resizer: ImageResizer::new(limits.max_dimension, limits.resize_filter),
            range,
        })
    }

    pub fn limits(&self) -> &Limits {
        &self.limits
    }

    fn run(&self, job: &ImageJob) -> Result<Written> {
        let source = job.source();
        let destination = job.destination();

        let (image, format) = decode(source, self.limits.decode_memory_limit)?;
        let image = orientation::auto_orient(source, image);
        debug!("Decoded {:?} as {:?}: {}x{}", source, format, image.width(), image.height());

        // A misnamed file is re-encoded, never copied under a .jpg name
        let jpeg_content = job.is_jpeg() && format == Some(ImageFormat::Jpeg);
        if jpeg_content && !self.resizer.needs_resize(image.width(), image.height()) {
            let source_size = fs::metadata(source).with_file_context(source)?.len();
            if source_size <= self.limits.max_output_bytes {
                let mut output = StagedOutput::create(destination)?;
                let mut input = File::open(source).with_file_context(source)?;
                io::copy(&mut input, output.file()).with_file_context(destination)?;
                output.persist()?;
                debug!("Copied {:?} verbatim ({} bytes)", source, source_size);
                return Ok(Written::Copied);
            }
        }

        let image = flatten_for_jpeg(self.resizer.fit(image));

        let found = quality::search(&image, self.limits.max_output_bytes, self.range)
            .encode_context(source)?;

        let mut output = StagedOutput::create(destination)?;
        output.file().write_all(&found.encoded).with_file_context(destination)?;
        output.persist()?;

        Ok(Written::Encoded {
            quality: found.quality,
            met_budget: found.met_budget,
            size: found.size(),
        })
    }
}

impl Transcode for FileTranscoder {
    fn transcode(&self, job: &ImageJob) -> TranscodeOutcome {
        let start = Instant::now();

        match self.run(job) {
            Ok(Written::Copied) => TranscodeOutcome::Success,
            Ok(Written::Encoded { quality, met_budget: true, size }) => {
                debug!(
                    "Encoded {} at quality {} ({}) in {:.2}s",
                    job.file_name(),
                    quality,
                    HumanBytes(size),
                    start.elapsed().as_secs_f64()
                );
                TranscodeOutcome::Success
            }
            Ok(Written::Encoded { quality, met_budget: false, size }) => {
                TranscodeOutcome::SuccessWithWarning(format!(
                    "{}: could not reach {} even at quality {}, kept {}",
                    job.file_name(),
                    HumanBytes(self.limits.max_output_bytes),
                    quality,
                    HumanBytes(size)
                ))
            }
            Err(error) => {
                debug!("Failed {:?}: {}", job.source(), error);
                TranscodeOutcome::Failure(error)
            }
        }
    }
}

/// Decode `path`, detecting the container from its contents.
///
/// Returns the detected format along with the pixels. `memory_limit` caps
/// decoder allocations; `None` lifts `image`'s 512 MiB default.
fn decode(path: &Path, memory_limit: Option<u64>) -> Result<(DynamicImage, Option<ImageFormat>)> {
    let mut reader = image::io::Reader::open(path)
        .with_file_context(path)?
        .with_guessed_format()
        .with_file_context(path)?;

    match memory_limit {
        Some(max_alloc) => {
            let mut limits = image::io::Limits::default();
            limits.max_alloc = Some(max_alloc);
            reader.limits(limits);
        }
        None => reader.no_limits(),
    }

    let format = reader.format();
    let image = reader.decode().decode_context(path)?;
    Ok((image, format))
}

/// JPEG carries 8-bit gray or RGB only
fn flatten_for_jpeg(image: DynamicImage) -> DynamicImage {
    match image {
        DynamicImage::ImageLuma8(_) | DynamicImage::ImageRgb8(_) => image,
        DynamicImage::ImageLuma16(_) | DynamicImage::ImageLumaA8(_) | DynamicImage::ImageLumaA16(_) => {
            DynamicImage::ImageLuma8(image.to_luma8())
        }
        other => DynamicImage::ImageRgb8(other.to_rgb8()),
    }
}

/// Output staged in a hidden temporary file beside its destination.
///
/// `persist` renames it into place, so the destination only ever holds a
/// complete file and jobs sharing a destination resolve to the last rename.
/// Dropping it unpersisted removes the temporary file and leaves the
/// destination untouched.
struct StagedOutput {
    temp: NamedTempFile,
    destination: PathBuf,
}

impl StagedOutput {
    fn create(destination: &Path) -> Result<Self> {
        let dir = destination.parent().unwrap_or_else(|| Path::new("."));
        let mut builder = tempfile::Builder::new();
        builder.prefix(".jpegfit-").suffix(".part");
        // Temp files default to owner-only; outputs get ordinary file modes
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            builder.permissions(fs::Permissions::from_mode(0o644));
        }
        let temp = builder.tempfile_in(dir).with_file_context(destination)?;

        Ok(Self {
            temp,
            destination: destination.to_path_buf(),
        })
    }

    fn file(&mut self) -> &mut File {
        self.temp.as_file_mut()
    }

    fn persist(self) -> Result<()> {
        self.temp
            .persist(&self.destination)
            .map_err(|e| e.error)
            .with_file_context(&self.destination)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{GenericImageView, ImageOutputFormat, Rgb, RgbImage, Rgba, RgbaImage};
    use tempfile::TempDir;

    fn gradient(width: u32, height: u32) -> DynamicImage {
        DynamicImage::ImageRgb8(RgbImage::from_fn(width, height, |x, y| {
            Rgb([(x % 256) as u8, (y % 256) as u8, ((x + y) % 256) as u8])
        }))
    }

    fn noise(width: u32, height: u32) -> DynamicImage {
        let mut state = 0x9e37_79b9_u32;
        DynamicImage::ImageRgb8(RgbImage::from_fn(width, height, |_, _| {
            state ^= state << 13;
            state ^= state >> 17;
            state ^= state << 5;
            let [a, b, c, _] = state.to_le_bytes();
            Rgb([a, b, c])
        }))
    }

    fn save_jpeg(image: &DynamicImage, path: &Path, quality: u8) {
        let mut file = fs::File::create(path).unwrap();
        image.write_to(&mut file, ImageOutputFormat::Jpeg(quality)).unwrap();
    }

    fn limits(max_output_bytes: u64, max_dimension: u32) -> Limits {
        Limits {
            max_output_bytes,
            max_dimension,
            resize_filter: FilterType::Triangle,
            ..Limits::default()
        }
    }

    struct Dirs {
        _tmp: TempDir,
        input: PathBuf,
        output: PathBuf,
    }

    fn dirs() -> Dirs {
        let tmp = TempDir::new().unwrap();
        let input = tmp.path().join("in");
        let output = tmp.path().join("out");
        fs::create_dir_all(&input).unwrap();
        fs::create_dir_all(&output).unwrap();
        Dirs {
            _tmp: tmp,
            input,
            output,
        }
    }

    #[test]
    fn test_compliant_jpeg_is_copied_verbatim() {
        let d = dirs();
        let source = d.input.join("a.jpg");
        save_jpeg(&gradient(64, 48), &source, 90);

        let transcoder = FileTranscoder::new(limits(10 * 1024 * 1024, 100)).unwrap();
        let job = ImageJob::new(&source, &d.output);
        let outcome = transcoder.transcode(&job);

        assert!(matches!(outcome, TranscodeOutcome::Success));
        assert_eq!(fs::read(&source).unwrap(), fs::read(job.destination()).unwrap());
    }

    #[test]
    fn test_oversized_jpeg_is_resized() {
        let d = dirs();
        let source = d.input.join("wide.jpeg");
        save_jpeg(&gradient(200, 100), &source, 90);

        let transcoder = FileTranscoder::new(limits(10 * 1024 * 1024, 50)).unwrap();
        let job = ImageJob::new(&source, &d.output);
        assert!(matches!(transcoder.transcode(&job), TranscodeOutcome::Success));

        let out = image::open(job.destination()).unwrap();
        assert_eq!(out.dimensions(), (50, 25));
    }

    #[test]
    fn test_png_is_reencoded_within_budget() {
        let d = dirs();
        let source = d.input.join("b.png");
        noise(300, 200).save(&source).unwrap();

        let budget = 40 * 1024;
        let transcoder = FileTranscoder::new(limits(budget, 120)).unwrap();
        let job = ImageJob::new(&source, &d.output);
        assert!(matches!(transcoder.transcode(&job), TranscodeOutcome::Success));

        let bytes = fs::read(job.destination()).unwrap();
        assert!(bytes.len() as u64 <= budget);
        assert_eq!(&bytes[..2], &[0xFF, 0xD8]);
        let out = image::load_from_memory(&bytes).unwrap();
        assert_eq!(out.dimensions(), (120, 80));
    }

    #[test]
    fn test_unreachable_budget_keeps_best_effort() {
        let d = dirs();
        let source = d.input.join("noisy.png");
        noise(64, 64).save(&source).unwrap();

        let transcoder = FileTranscoder::new(limits(200, 7500)).unwrap();
        let job = ImageJob::new(&source, &d.output);

        match transcoder.transcode(&job) {
            TranscodeOutcome::SuccessWithWarning(message) => {
                assert!(message.contains("noisy.png"));
                assert!(message.contains("200 B"));
            }
            other => panic!("expected a warning, got {other}"),
        }
        assert!(job.destination().exists());
    }

    #[test]
    fn test_alpha_source_is_flattened() {
        let d = dirs();
        let source = d.input.join("alpha.png");
        RgbaImage::from_pixel(32, 32, Rgba([10, 200, 30, 128]))
            .save(&source)
            .unwrap();

        let transcoder = FileTranscoder::new(Limits::default()).unwrap();
        let job = ImageJob::new(&source, &d.output);
        assert!(matches!(transcoder.transcode(&job), TranscodeOutcome::Success));
        assert!(image::open(job.destination()).is_ok());
    }

    #[test]
    fn test_corrupt_input_fails_without_output() {
        let d = dirs();
        let source = d.input.join("c.png");
        fs::write(&source, b"definitely not a png").unwrap();

        let transcoder = FileTranscoder::new(Limits::default()).unwrap();
        let job = ImageJob::new(&source, &d.output);

        match transcoder.transcode(&job) {
            TranscodeOutcome::Failure(error) => {
                assert!(error.is_recoverable());
                assert!(error.user_message().contains("c.png"));
            }
            other => panic!("expected failure, got {other}"),
        }
        assert!(!job.destination().exists());
    }

    #[test]
    fn test_failure_leaves_unrelated_output_alone() {
        let d = dirs();
        // photo.png already produced photo.jpg; a broken photo.jpeg maps to the same name
        let existing = d.output.join("photo.jpg");
        fs::write(&existing, b"earlier output").unwrap();
        let source = d.input.join("photo.jpeg");
        fs::write(&source, b"broken").unwrap();

        let transcoder = FileTranscoder::new(Limits::default()).unwrap();
        let outcome = transcoder.transcode(&ImageJob::new(&source, &d.output));
        assert!(!outcome.is_success());
        assert_eq!(fs::read(&existing).unwrap(), b"earlier output");
    }

    fn leftovers(dir: &Path) -> Vec<String> {
        fs::read_dir(dir)
            .unwrap()
            .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
            .filter(|name| name.ends_with(".part"))
            .collect()
    }

    #[test]
    fn test_staged_output_dropped_without_persist() {
        let d = dirs();
        let path = d.output.join("partial.jpg");
        {
            let mut output = StagedOutput::create(&path).unwrap();
            output.file().write_all(b"half").unwrap();
        }
        assert!(!path.exists());
        assert!(leftovers(&d.output).is_empty());
    }

    #[test]
    fn test_staged_output_replaces_destination_whole() {
        let d = dirs();
        let path = d.output.join("photo.jpg");
        fs::write(&path, b"from photo.png").unwrap();

        let mut output = StagedOutput::create(&path).unwrap();
        output.file().write_all(b"from photo.bmp").unwrap();
        // Nothing visible at the destination until the rename
        assert_eq!(fs::read(&path).unwrap(), b"from photo.png");
        output.persist().unwrap();

        assert_eq!(fs::read(&path).unwrap(), b"from photo.bmp");
        assert!(leftovers(&d.output).is_empty());

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mode = fs::metadata(&path).unwrap().permissions().mode();
            assert_eq!(mode & 0o044, 0o044, "mode {mode:o}");
        }
    }

    #[test]
    fn test_decode_memory_limit_is_applied() {
        let d = dirs();
        let source = d.input.join("limited.png");
        gradient(64, 64).save(&source).unwrap();

        // 64x64 RGB needs 12 KiB once decoded
        assert!(decode(&source, None).is_ok());
        assert!(decode(&source, Some(64 * 1024 * 1024)).is_ok());
        let err = decode(&source, Some(1024)).unwrap_err();
        assert!(matches!(err, JpegFitError::Decode { .. }));

        let tight = Limits {
            decode_memory_limit: Some(1024),
            ..Limits::default()
        };
        let job = ImageJob::new(&source, &d.output);
        assert!(!FileTranscoder::new(tight).unwrap().transcode(&job).is_success());
        assert!(FileTranscoder::new(Limits::default()).unwrap().transcode(&job).is_success());
    }

    #[test]
    fn test_png_named_jpg_is_reencoded() {
        let d = dirs();
        let source = d.input.join("photo.jpg");
        let mut bytes = Vec::new();
        gradient(64, 64)
            .write_to(&mut std::io::Cursor::new(&mut bytes), ImageOutputFormat::Png)
            .unwrap();
        fs::write(&source, &bytes).unwrap();

        let (_, format) = decode(&source, None).unwrap();
        assert_eq!(format, Some(ImageFormat::Png));

        let transcoder = FileTranscoder::new(Limits::default()).unwrap();
        let job = ImageJob::new(&source, &d.output);
        assert!(matches!(transcoder.transcode(&job), TranscodeOutcome::Success));

        let written = fs::read(job.destination()).unwrap();
        assert_eq!(&written[..2], &[0xFF, 0xD8]);
        assert_ne!(written, bytes);
    }

    #[test]
    fn test_jpeg_over_budget_is_reencoded() {
        let d = dirs();
        let source = d.input.join("heavy.jpg");
        save_jpeg(&noise(64, 64), &source, 100);
        let source_size = fs::metadata(&source).unwrap().len();

        // Within the dimension limit, just over the byte budget
        let transcoder = FileTranscoder::new(limits(source_size - 1, 7500)).unwrap();
        let job = ImageJob::new(&source, &d.output);
        assert!(matches!(transcoder.transcode(&job), TranscodeOutcome::Success));

        let written = fs::read(job.destination()).unwrap();
        assert!((written.len() as u64) < source_size);
        assert_ne!(written, fs::read(&source).unwrap());
        assert_eq!(image::load_from_memory(&written).unwrap().dimensions(), (64, 64));
    }

    /// Splice an EXIF APP1 segment holding only an Orientation tag after SOI
    fn with_orientation(jpeg: &[u8], orientation: u16) -> Vec<u8> {
        let mut tiff = Vec::new();
        tiff.extend_from_slice(b"MM\x00\x2A\x00\x00\x00\x08");
        tiff.extend_from_slice(&1u16.to_be_bytes());
        tiff.extend_from_slice(&0x0112u16.to_be_bytes());
        tiff.extend_from_slice(&3u16.to_be_bytes());
        tiff.extend_from_slice(&1u32.to_be_bytes());
        tiff.extend_from_slice(&orientation.to_be_bytes());
        tiff.extend_from_slice(&[0, 0]);
        tiff.extend_from_slice(&0u32.to_be_bytes());

        let mut payload = b"Exif\x00\x00".to_vec();
        payload.extend_from_slice(&tiff);
        let length = u16::try_from(payload.len() + 2).unwrap();

        let mut out = jpeg[..2].to_vec();
        out.extend_from_slice(&[0xFF, 0xE1]);
        out.extend_from_slice(&length.to_be_bytes());
        out.extend_from_slice(&payload);
        out.extend_from_slice(&jpeg[2..]);
        out
    }

    /// Left half red, right half blue
    fn split_image(width: u32, height: u32) -> DynamicImage {
        DynamicImage::ImageRgb8(RgbImage::from_fn(width, height, |x, _| {
            if x < width / 2 {
                Rgb([230, 20, 20])
            } else {
                Rgb([20, 20, 230])
            }
        }))
    }

    #[test]
    fn test_exif_orientation_is_applied_before_resize() {
        let d = dirs();
        let plain = d.input.join("plain.jpg");
        save_jpeg(&split_image(80, 40), &plain, 95);
        let source = d.input.join("rotated.jpg");
        fs::write(&source, with_orientation(&fs::read(&plain).unwrap(), 6)).unwrap();
        assert_eq!(orientation::Orientation::from_path(&source), orientation::Orientation::CW90);

        // Stored 80x40, displayed 40x80; the limit applies to the displayed shape
        let transcoder = FileTranscoder::new(limits(10 * 1024 * 1024, 40)).unwrap();
        let job = ImageJob::new(&source, &d.output);
        assert!(matches!(transcoder.transcode(&job), TranscodeOutcome::Success));

        let out = image::open(job.destination()).unwrap().to_rgb8();
        assert_eq!(out.dimensions(), (20, 40));
        // A clockwise quarter turn puts the left (red) half on top
        let top = out.get_pixel(10, 5);
        let bottom = out.get_pixel(10, 34);
        assert!(top[0] > 150 && top[2] < 100, "top {top:?}");
        assert!(bottom[2] > 150 && bottom[0] < 100, "bottom {bottom:?}");
    }

    #[test]
    fn test_rotated_jpeg_within_limits_is_copied() {
        let d = dirs();
        let plain = d.input.join("plain.jpg");
        save_jpeg(&split_image(60, 30), &plain, 90);
        let source = d.input.join("rotated.jpg");
        let tagged = with_orientation(&fs::read(&plain).unwrap(), 6);
        fs::write(&source, &tagged).unwrap();

        let transcoder = FileTranscoder::new(limits(10 * 1024 * 1024, 60)).unwrap();
        let job = ImageJob::new(&source, &d.output);
        assert!(matches!(transcoder.transcode(&job), TranscodeOutcome::Success));

        // The tag travels with the copy, so viewers still rotate it
        assert_eq!(fs::read(job.destination()).unwrap(), tagged);
    }

    #[test]
    fn test_invalid_limits_rejected() {
        let bad = Limits {
            min_quality: 90,
            max_quality: 40,
            ..Limits::default()
        };
        assert!(FileTranscoder::new(bad).is_err());
    }
}
