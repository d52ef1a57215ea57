//! Kernel image segment acquisition.

use segment_core::{SegmentError, SegmentHeader, HEADER_SIZE};
use std::fmt;
use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};

/// Where kernel segments come from.
pub trait SegmentSource {
    type Segment;

    fn acquire(&mut self, path: &Path) -> Result<Self::Segment, AcquireError>;
}

#[derive(Debug)]
pub enum LoadError {
    Io(io::Error),
    Corrupt(SegmentError),
    Truncated { expected: u64 },
    TooLarge(u64),
}

impl fmt::Display for LoadError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io(err) => write!(f, "{err}"),
            Self::Corrupt(err) => write!(f, "corrupt segment: {err}"),
            Self::Truncated { expected } => write!(f, "truncated segment, expected {expected} bytes"),
            Self::TooLarge(bytes) => write!(f, "segment of {bytes} bytes does not fit in memory"),
        }
    }
}

impl From<io::Error> for LoadError {
    fn from(value: io::Error) -> Self {
        Self::Io(value)
    }
}

impl From<SegmentError> for LoadError {
    fn from(value: SegmentError) -> Self {
        Self::Corrupt(value)
    }
}

#[derive(Debug)]
pub enum AcquireError {
    NotFound(PathBuf),
    Load { path: PathBuf, error: LoadError },
}

impl fmt::Display for AcquireError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotFound(path) => write!(f, "no such segment: {}", path.display()),
            Self::Load { path, error } => write!(f, "{}: {error}", path.display()),
        }
    }
}

impl std::error::Error for AcquireError {}

/// A loaded segment. Owns the bytes read from the image until dropped.
///
/// The reservation named by the header is geometry for the engine to map;
/// the launcher only holds the `size` bytes the image actually carries.
pub struct ImageSegment {
    header: SegmentHeader,
    contents: Box<[u8]>,
}

impl ImageSegment {
    /// Read a segment: header first, then the whole segment (header
    /// included) from the start of `reader`.
    pub fn load<R: Read + Seek>(reader: &mut R) -> Result<Self, LoadError> {
        let mut raw = [0_u8; HEADER_SIZE];
        read_exact_or_truncated(reader, &mut raw, HEADER_SIZE as u64)?;
        let header = SegmentHeader::decode(&raw)?;
        usize::try_from(header.size).map_err(|_| LoadError::TooLarge(header.size))?;

        // Never holds more than the reader yields, whatever `size` claims.
        let mut contents = Vec::new();
        reader.seek(SeekFrom::Start(0))?;
        reader.by_ref().take(header.size).read_to_end(&mut contents)?;
        if (contents.len() as u64) < header.size {
            return Err(LoadError::Truncated { expected: header.size });
        }

        Ok(Self {
            header,
            contents: contents.into_boxed_slice(),
        })
    }

    pub fn header(&self) -> &SegmentHeader {
        &self.header
    }

    pub fn base_address(&self) -> u64 {
        self.header.base_address
    }

    /// Loaded bytes, header included.
    pub fn contents(&self) -> &[u8] {
        &self.contents
    }
}

impl fmt::Debug for ImageSegment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ImageSegment")
            .field("header", &self.header)
            .field("loaded", &self.contents.len())
            .finish()
    }
}

impl Drop for ImageSegment {
    fn drop(&mut self) {
        log::debug!(
            "released segment at {:#x} ({} bytes)",
            self.header.base_address,
            self.contents.len()
        );
    }
}

fn read_exact_or_truncated<R: Read>(reader: &mut R, out: &mut [u8], expected: u64) -> Result<(), LoadError> {
    reader.read_exact(out).map_err(|err| match err.kind() {
        io::ErrorKind::UnexpectedEof => LoadError::Truncated { expected },
        _ => LoadError::Io(err),
    })
}

/// Loads segments from the filesystem.
#[derive(Debug, Default)]
pub struct FileSource;

impl SegmentSource for FileSource {
    type Segment = ImageSegment;

    fn acquire(&mut self, path: &Path) -> Result<ImageSegment, AcquireError> {
        let mut file = match File::open(path) {
            Ok(file) => file,
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                return Err(AcquireError::NotFound(path.to_path_buf()));
            }
            Err(err) => {
                return Err(AcquireError::Load {
                    path: path.to_path_buf(),
                    error: LoadError::Io(err),
                });
            }
        };

        let segment = ImageSegment::load(&mut file).map_err(|error| AcquireError::Load {
            path: path.to_path_buf(),
            error,
        })?;
        log::info!(
            "loaded {} ({} bytes, base {:#x}, module +{:#x})",
            path.display(),
            segment.header.size,
            segment.header.base_address,
            segment.header.module_offset()
        );
        Ok(segment)
    }
}
