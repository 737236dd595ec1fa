// THEORY:
// The landmark/mask producer is an external collaborator. The engine only sees it
// through the `FrameSource` trait: a blocking "give me the next frame" call that
// returns `Ok(None)` once the stream is over.
//
// `JsonlFrameSource` is the one concrete producer shipped with the engine. It reads
// JSON-lines recordings (or a live pipe from an external pose model), one frame per
// line:
//
//   {"width": 640, "height": 480, "landmarks": {...} | [...] | null, "mask": "mask_0001.png" | null}
//
// `landmarks` is either a map keyed by body part (`"left_shoulder": {"x":..,"y":..,"visibility":..}`)
// or the raw 33-point MediaPipe array. Mask paths are resolved against `base_dir`.

use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

use serde::Deserialize;
use tracing::debug;

use crate::core_modules::landmark::{BodyPart, FrameSize, Landmark, LandmarkSet, PoseFrame, SegmentationMask};
use crate::error::SourceError;

/// A producer of pose frames. Blocking; the runtime drives it from its own thread.
pub trait FrameSource {
    /// The next frame, or `Ok(None)` when the source is exhausted.
    fn next_frame(&mut self) -> Result<Option<PoseFrame>, SourceError>;
}

impl<T: FrameSource + ?Sized> FrameSource for Box<T> {
    fn next_frame(&mut self) -> Result<Option<PoseFrame>, SourceError> {
        (**self).next_frame()
    }
}

/// Frames held in memory, handed out in order. Handy for tests and demos.
impl FrameSource for std::vec::IntoIter<PoseFrame> {
    fn next_frame(&mut self) -> Result<Option<PoseFrame>, SourceError> {
        Ok(self.next())
    }
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RecordedLandmarks {
    Named(BTreeMap<BodyPart, Landmark>),
    MediaPipe(Vec<Landmark>),
}

#[derive(Debug, Deserialize)]
struct RecordedFrame {
    width: u32,
    height: u32,
    #[serde(default)]
    landmarks: Option<RecordedLandmarks>,
    #[serde(default)]
    mask: Option<PathBuf>,
}

pub struct JsonlFrameSource<R> {
    reader: R,
    base_dir: PathBuf,
    line_number: usize,
    buffer: String,
}

impl JsonlFrameSource<BufReader<File>> {
    /// Opens a recording file; mask paths resolve relative to its directory.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, SourceError> {
        let path = path.as_ref();
        let file = File::open(path)?;
        let base_dir = path.parent().map(Path::to_path_buf).unwrap_or_default();
        Ok(Self::new(BufReader::new(file), base_dir))
    }
}

impl<R: BufRead> JsonlFrameSource<R> {
    pub fn new(reader: R, base_dir: impl Into<PathBuf>) -> Self {
        Self {
            reader,
            base_dir: base_dir.into(),
            line_number: 0,
            buffer: String::new(),
        }
    }

    fn decode(&self, line: &str) -> Result<PoseFrame, SourceError> {
        let recorded: RecordedFrame = serde_json::from_str(line).map_err(|source| SourceError::Parse {
            line: self.line_number,
            source,
        })?;
        let size = FrameSize::new(recorded.width, recorded.height);
        if size.width == 0 || size.height == 0 {
            return Err(SourceError::InvalidFrame {
                line: self.line_number,
                reason: "frame size must be non-zero".to_string(),
            });
        }

        let landmarks = match recorded.landmarks {
            None => None,
            Some(RecordedLandmarks::Named(parts)) => Some(LandmarkSet::from_parts(&parts)),
            Some(RecordedLandmarks::MediaPipe(points)) => {
                let set = LandmarkSet::from_mediapipe(&points).ok_or_else(|| SourceError::InvalidFrame {
                    line: self.line_number,
                    reason: format!("expected a full MediaPipe pose, got {} points", points.len()),
                })?;
                Some(set)
            }
        };

        let mask = match recorded.mask {
            None => None,
            Some(relative) => Some(self.load_mask(&relative, size)?),
        };

        Ok(PoseFrame { size, landmarks, mask })
    }

    fn load_mask(&self, relative: &Path, size: FrameSize) -> Result<SegmentationMask, SourceError> {
        let path = self.base_dir.join(relative);
        let image = image::open(&path)
            .map_err(|source| SourceError::Mask {
                path: path.clone(),
                source,
            })?
            .to_luma8();
        if image.dimensions() != (size.width, size.height) {
            return Err(SourceError::InvalidFrame {
                line: self.line_number,
                reason: format!(
                    "mask {} is {}x{}, frame is {}x{}",
                    path.display(),
                    image.width(),
                    image.height(),
                    size.width,
                    size.height
                ),
            });
        }
        Ok(SegmentationMask::from_luma(&image))
    }
}

impl<R: BufRead> FrameSource for JsonlFrameSource<R> {
    fn next_frame(&mut self) -> Result<Option<PoseFrame>, SourceError> {
        loop {
            self.buffer.clear();
            if self.reader.read_line(&mut self.buffer)? == 0 {
                return Ok(None);
            }
            self.line_number += 1;
            let line = self.buffer.trim();
            if line.is_empty() {
                continue;
            }
            let frame = self.decode(line)?;
            debug!(line = self.line_number, detected = frame.landmarks.is_some(), "decoded frame");
            return Ok(Some(frame));
        }
    }
}
