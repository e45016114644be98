//! Baseline (climatological) ETo lookup
//!
//! The baseline file is an equirectangular raster of average annual potential
//! ETo, one byte per pixel, behind a 32 byte header:
//!
//! | bytes | content |
//! |-------|---------|
//! | 0     | format version (1) |
//! | 1-4   | width, big-endian u32 |
//! | 5-8   | height, big-endian u32 |
//! | 9     | bits per pixel (8) |
//! | 10-13 | minimum ETo, big-endian f32 (in/year) |
//! | 14-17 | scaling factor, big-endian f32 (in/year per unit) |
//!
//! The map is cropped to 80°N..60°S, so 140 degrees of latitude span the height.

use std::io::SeekFrom;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tokio::fs::File;
use tokio::io::{AsyncReadExt, AsyncSeekExt};

use crate::data::GeoCoordinates;
use crate::error::{CodedError, ErrorCode};

const HEADER_LEN: u64 = 32;
const SUPPORTED_VERSION: u8 = 1;
const SUPPORTED_BIT_DEPTH: u8 = 8;
const LATITUDE_SPAN: f64 = 140.0;
const NORTHERN_EDGE: f64 = 80.0;

/// Errors from the baseline ETo lookup
#[derive(Debug, Error)]
pub enum BaselineError {
    /// The header was never loaded, so no lookups are possible
    #[error("Baseline ETo data is unavailable")]
    Unavailable,

    #[error("Unsupported data file version {0}. The maximum supported version is 1.")]
    UnsupportedVersion(u8),

    #[error("Unsupported bit depth {0}")]
    UnsupportedBitDepth(u8),

    #[error("Data file dimensions {0}x{1} are invalid")]
    InvalidDimensions(u32, u32),

    #[error("Specified location is out of bounds")]
    OutOfBounds,

    #[error("ETo data is not available for this location")]
    NoData,

    #[error("Failed to read baseline data file: {0}")]
    Io(#[from] std::io::Error),
}

impl From<BaselineError> for CodedError {
    fn from(err: BaselineError) -> Self {
        match err {
            BaselineError::OutOfBounds | BaselineError::NoData => {
                CodedError::new(ErrorCode::LocationError, err.to_string())
            }
            _ => {
                tracing::error!(error = %err, "baseline ETo lookup failed");
                CodedError::unexpected()
            }
        }
    }
}

/// Parsed header of the baseline data file
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FileMeta {
    pub version: u8,
    pub width: u32,
    pub height: u32,
    pub bit_depth: u8,
    pub minimum_eto: f32,
    pub scaling_factor: f32,
    pub origin_x: u32,
    pub origin_y: u32,
}

impl FileMeta {
    /// Parses the 32 byte header
    pub fn parse(header: &[u8; HEADER_LEN as usize]) -> Result<Self, BaselineError> {
        let version = header[0];
        if version != SUPPORTED_VERSION {
            return Err(BaselineError::UnsupportedVersion(version));
        }

        let word = |at: usize| [header[at], header[at + 1], header[at + 2], header[at + 3]];
        let be_u32 = |at: usize| u32::from_be_bytes(word(at));
        let be_f32 = |at: usize| f32::from_be_bytes(word(at));

        let width = be_u32(1);
        let height = be_u32(5);
        if width == 0 || height == 0 {
            return Err(BaselineError::InvalidDimensions(width, height));
        }

        let bit_depth = header[9];
        if bit_depth != SUPPORTED_BIT_DEPTH {
            return Err(BaselineError::UnsupportedBitDepth(bit_depth));
        }

        Ok(Self {
            version,
            width,
            height,
            bit_depth,
            minimum_eto: be_f32(10),
            scaling_factor: be_f32(14),
            origin_x: width / 2,
            origin_y: (f64::from(height) / LATITUDE_SPAN * NORTHERN_EDGE).floor() as u32,
        })
    }

    /// Byte offset of the pixel for the coordinates, from the start of the data block
    pub fn pixel_offset(&self, coordinates: GeoCoordinates) -> Result<u64, BaselineError> {
        let width = f64::from(self.width);
        let height = f64::from(self.height);

        let x = (f64::from(self.origin_x) + width * coordinates.longitude() / 360.0).floor();
        let y = (f64::from(self.origin_y) - height * coordinates.latitude() / LATITUDE_SPAN).floor();
        let offset = y * width + x;

        if offset < 0.0 || offset >= width * height {
            return Err(BaselineError::OutOfBounds);
        }
        Ok(offset as u64)
    }

    /// Converts a raw pixel value into inches per day
    pub fn daily_eto(&self, value: u8) -> Result<f64, BaselineError> {
        let no_data = (1u16 << self.bit_depth) - 1;
        if u16::from(value) == no_data {
            return Err(BaselineError::NoData);
        }
        Ok((f64::from(value) * f64::from(self.scaling_factor) + f64::from(self.minimum_eto)) / 365.0)
    }
}

/// Read-only accessor over the baseline ETo raster
///
/// The header is read once. If that fails the lookup stays unavailable for
/// its whole lifetime and every query returns [`BaselineError::Unavailable`].
#[derive(Debug, Clone)]
pub struct BaselineEToLookup {
    path: PathBuf,
    meta: Option<FileMeta>,
}

impl BaselineEToLookup {
    /// Loads the header from `path`, logging and disabling the lookup on failure
    pub async fn load(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref().to_path_buf();
        let meta = match read_header(&path).await {
            Ok(meta) => {
                tracing::info!(path = %path.display(), width = meta.width, height = meta.height, "loaded baseline ETo data");
                Some(meta)
            }
            Err(err) => {
                tracing::error!(path = %path.display(), error = %err, "baseline ETo lookup will be unavailable");
                None
            }
        };
        Self { path, meta }
    }

    /// A lookup with no data file
    pub fn unavailable() -> Self {
        Self {
            path: PathBuf::new(),
            meta: None,
        }
    }

    pub fn meta(&self) -> Option<&FileMeta> {
        self.meta.as_ref()
    }

    pub fn is_available(&self) -> bool {
        self.meta.is_some()
    }

    /// Average daily potential ETo at the coordinates, in inches per day
    ///
    /// # Returns
    /// * `Err(BaselineError::Unavailable)` if the header never loaded
    /// * `Err(BaselineError::OutOfBounds)` for points outside the cropped map
    /// * `Err(BaselineError::NoData)` for pixels marked as having no data
    pub async fn average_daily_eto(&self, coordinates: GeoCoordinates) -> Result<f64, BaselineError> {
        let meta = self.meta.as_ref().ok_or(BaselineError::Unavailable)?;
        let offset = meta.pixel_offset(coordinates)?;

        let mut file = File::open(&self.path).await?;
        file.seek(SeekFrom::Start(offset + HEADER_LEN)).await?;
        let value = file.read_u8().await?;

        meta.daily_eto(value)
    }
}

async fn read_header(path: &Path) -> Result<FileMeta, BaselineError> {
    let mut file = File::open(path).await?;
    let mut header = [0u8; HEADER_LEN as usize];
    file.read_exact(&mut header).await?;
    FileMeta::parse(&header)
}
