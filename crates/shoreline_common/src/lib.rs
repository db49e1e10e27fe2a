//! # Shoreline Common - Shared Types and Utilities
//!
//! Shared vocabulary for the shoreline workspace: per-run identity and the
//! storage layout derived from it, raster naming helpers, and the fixed
//! parameter keywords understood by the external geoprocessing toolkit.
//!
//! ## Example
//!
//! ```rust
//! use shoreline_common::{ProjectLocation, RunContext};
//!
//! let project = ProjectLocation::new("/data/Huron", "Huron");
//! let run = RunContext::from_counter(3);
//! let layout = run.layout(&project);
//!
//! assert!(layout.mosaic_file.ends_with("Output_Mosaics3/code_mosaic3.tif"));
//! assert!(layout.vector_dataset.ends_with("Huron.gdb/code_shoreline3"));
//! ```

use std::fmt;
use std::path::{Path, PathBuf};

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter, EnumString, IntoStaticStr, VariantNames};
use thiserror::Error;

// Re-exports for convenience
pub use chrono::{DateTime, Utc};

/// Result type for shared shoreline operations
pub type Result<T> = std::result::Result<T, CommonError>;

/// Standard error type for shared shoreline operations
#[derive(Error, Debug)]
pub enum CommonError {
    #[error("Invalid run discriminator '{value}': {reason}")]
    InvalidDiscriminator { value: String, reason: String },

    #[error("Invalid value: {message}")]
    InvalidValue { message: String },

    #[error("Parse error: {0}")]
    Parse(String),
}

/// Extension searched for when cataloging input rasters.
pub const RASTER_EXTENSION: &str = "tif";

/// Base-name marker of per-pixel usable-data-mask companion files.
pub const QUALITY_MASK_MARKER: &str = "udm";

/// Prefix of every per-raster shoreline output.
pub const SHORELINE_PREFIX: &str = "shore_";

/// Per-execution identity used to namespace every intermediate artifact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunContext {
    discriminator: String,
    started_at: DateTime<Utc>,
}

impl RunContext {
    /// Create a run context from an explicit discriminator token
    pub fn new(discriminator: impl Into<String>) -> Result<Self> {
        let discriminator = discriminator.into();
        if discriminator.is_empty() {
            return Err(CommonError::InvalidDiscriminator {
                value: discriminator,
                reason: "must not be empty".to_string(),
            });
        }
        if let Some(bad) = discriminator
            .chars()
            .find(|c| matches!(c, '/' | '\\' | '.' | ':') || c.is_whitespace())
        {
            return Err(CommonError::InvalidDiscriminator {
                reason: format!("contains reserved character {:?}", bad),
                value: discriminator,
            });
        }
        Ok(Self {
            discriminator,
            started_at: Utc::now(),
        })
    }

    /// Create a run context from the legacy overwrite-avoidance counter
    pub fn from_counter(counter: u32) -> Self {
        Self {
            discriminator: counter.to_string(),
            started_at: Utc::now(),
        }
    }

    /// Create a run context whose discriminator is the current UTC time
    pub fn timestamped() -> Self {
        let started_at = Utc::now();
        Self {
            discriminator: started_at.format("%Y%m%dT%H%M%S%3f").to_string(),
            started_at,
        }
    }

    pub fn discriminator(&self) -> &str {
        &self.discriminator
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    /// Derive every storage location this run owns inside a project
    pub fn layout(&self, project: &ProjectLocation) -> RunLayout {
        let run = &self.discriminator;
        let shorelines_dir = project.root.join(format!("Output_Shorelines{run}"));
        let mosaics_dir = project.root.join(format!("Output_Mosaics{run}"));
        let mosaic_name = format!("code_mosaic{run}.{RASTER_EXTENSION}");
        let vector_dataset_name = format!("code_shoreline{run}");
        let container = project.container();

        RunLayout {
            mosaic_file: mosaics_dir.join(&mosaic_name),
            vector_dataset: container.join(&vector_dataset_name),
            shorelines_dir,
            mosaics_dir,
            mosaic_name,
            container,
            vector_dataset_name,
        }
    }
}

impl fmt::Display for RunContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "run {}", self.discriminator)
    }
}

/// Project root plus the named storage container holding the final dataset
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct ProjectLocation {
    pub root: PathBuf,
    pub name: String,
    /// Extension of the feature container (a file geodatabase by default)
    #[serde(default = "default_container_ext")]
    pub container_ext: String,
}

fn default_container_ext() -> String {
    "gdb".to_string()
}

impl ProjectLocation {
    pub fn new(root: impl Into<PathBuf>, name: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            name: name.into(),
            container_ext: default_container_ext(),
        }
    }

    pub fn with_container_ext(mut self, ext: impl Into<String>) -> Self {
        self.container_ext = ext.into();
        self
    }

    /// `<root>/<name>.<container_ext>`
    pub fn container(&self) -> PathBuf {
        self.root.join(format!("{}.{}", self.name, self.container_ext))
    }
}

/// Every location written by a single run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct RunLayout {
    /// Folder of per-raster shoreline rasters (run-owned)
    pub shorelines_dir: PathBuf,
    /// Folder of the merged raster (run-owned)
    pub mosaics_dir: PathBuf,
    pub mosaic_name: String,
    pub mosaic_file: PathBuf,
    /// Shared project container
    pub container: PathBuf,
    pub vector_dataset_name: String,
    pub vector_dataset: PathBuf,
}

impl RunLayout {
    /// Give the vector dataset a file extension, for engines that keep it as
    /// a standalone file inside the container instead of a feature class
    pub fn with_dataset_extension(mut self, ext: &str) -> Self {
        self.vector_dataset_name = format!("{}.{}", self.vector_dataset_name, ext);
        self.vector_dataset = self.container.join(&self.vector_dataset_name);
        self
    }

    /// Folders that must not exist before the run starts
    pub fn owned_dirs(&self) -> [&Path; 2] {
        [&self.shorelines_dir, &self.mosaics_dir]
    }

    /// The four artifacts that identify a run on disk
    pub fn outputs(&self) -> [&Path; 4] {
        [
            &self.shorelines_dir,
            &self.mosaics_dir,
            &self.mosaic_file,
            &self.vector_dataset,
        ]
    }
}

/// Output pixel encoding of a new raster dataset
#[derive(
    Debug, Clone, Copy, PartialEq, Eq,
    Serialize, Deserialize, JsonSchema,
    Display, EnumString, EnumIter, VariantNames, IntoStaticStr,
)]
pub enum PixelType {
    #[strum(serialize = "8_BIT_UNSIGNED")]
    #[serde(rename = "8_BIT_UNSIGNED")]
    Unsigned8,
    #[strum(serialize = "16_BIT_SIGNED")]
    #[serde(rename = "16_BIT_SIGNED")]
    Signed16,
    #[strum(serialize = "32_BIT_SIGNED")]
    #[serde(rename = "32_BIT_SIGNED")]
    Signed32,
    #[strum(serialize = "32_BIT_FLOAT")]
    #[serde(rename = "32_BIT_FLOAT")]
    Float32,
}

/// Rule selecting the output value where input rasters overlap
#[derive(
    Debug, Clone, Copy, PartialEq, Eq,
    Serialize, Deserialize, JsonSchema,
    Display, EnumString, EnumIter, VariantNames, IntoStaticStr,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum MosaicMethod {
    First,
    Last,
    Blend,
    Mean,
    Minimum,
    Maximum,
    Sum,
}

/// Tie-break among inputs that rank equally under the [`MosaicMethod`]
#[derive(
    Debug, Clone, Copy, PartialEq, Eq,
    Serialize, Deserialize, JsonSchema,
    Display, EnumString, EnumIter, VariantNames, IntoStaticStr,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum ColormapMode {
    First,
    Last,
    Match,
    Reject,
}

/// Pixel value treated as "not shoreline" when tracing lines
#[derive(
    Debug, Clone, Copy, PartialEq, Eq,
    Serialize, Deserialize, JsonSchema,
    Display, EnumString, EnumIter, VariantNames, IntoStaticStr,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum BackgroundValue {
    Zero,
    Nodata,
}

impl BackgroundValue {
    /// Numeric pixel value for [`BackgroundValue::Zero`]
    pub fn pixel_value(&self) -> Option<i32> {
        match self {
            Self::Zero => Some(0),
            Self::Nodata => None,
        }
    }
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq,
    Serialize, Deserialize, JsonSchema,
    Display, EnumString, EnumIter, VariantNames, IntoStaticStr,
)]
pub enum LinearUnit {
    Meters,
    Kilometers,
    Feet,
}

impl LinearUnit {
    pub fn meters_per_unit(&self) -> f64 {
        match self {
            Self::Meters => 1.0,
            Self::Kilometers => 1000.0,
            Self::Feet => 0.3048,
        }
    }
}

/// A linear distance rendered the way the toolkit expects (`"3 Meters"`)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Distance {
    pub value: f64,
    pub unit: LinearUnit,
}

impl Distance {
    pub fn new(value: f64, unit: LinearUnit) -> Result<Self> {
        if !value.is_finite() || value < 0.0 {
            return Err(CommonError::InvalidValue {
                message: format!("distance must be a finite non-negative number, got {value}"),
            });
        }
        Ok(Self { value, unit })
    }

    pub fn meters(value: f64) -> Result<Self> {
        Self::new(value, LinearUnit::Meters)
    }

    pub fn to_meters(&self) -> f64 {
        self.value * self.unit.meters_per_unit()
    }
}

impl PartialOrd for Distance {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        self.to_meters().partial_cmp(&other.to_meters())
    }
}

impl fmt::Display for Distance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.value, self.unit)
    }
}

impl std::str::FromStr for Distance {
    type Err = CommonError;

    fn from_str(s: &str) -> Result<Self> {
        let mut parts = s.split_whitespace();
        let (Some(value), Some(unit), None) = (parts.next(), parts.next(), parts.next()) else {
            return Err(CommonError::Parse(format!(
                "expected '<value> <unit>', got '{s}'"
            )));
        };
        let value: f64 = value
            .parse()
            .map_err(|_| CommonError::Parse(format!("invalid distance value '{value}'")))?;
        let unit: LinearUnit = unit
            .parse()
            .map_err(|_| CommonError::Parse(format!("unknown linear unit '{unit}'")))?;
        Self::new(value, unit)
    }
}

/// Coordinate system handed verbatim to the toolkit as a WKT string
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct SpatialReference {
    pub name: String,
    pub wkt: String,
}

const WGS_1984_UTM_ZONE_17N: &str = concat!(
    r#"PROJCS["WGS_1984_UTM_Zone_17N",GEOGCS["GCS_WGS_1984",DATUM["D_WGS_1984","#,
    r#"SPHEROID["WGS_1984",6378137.0,298.257223563]],PRIMEM["Greenwich",0.0],"#,
    r#"UNIT["Degree",0.0174532925199433]],PROJECTION["Transverse_Mercator"],"#,
    r#"PARAMETER["False_Easting",500000.0],PARAMETER["False_Northing",0.0],"#,
    r#"PARAMETER["Central_Meridian",-81.0],PARAMETER["Scale_Factor",0.9996],"#,
    r#"PARAMETER["Latitude_Of_Origin",0.0],UNIT["Meter",1.0]]"#,
);

impl SpatialReference {
    /// WGS 1984 UTM zone 17N, the projection every mosaic is written in
    pub fn utm_zone_17n() -> Self {
        Self {
            name: "WGS_1984_UTM_Zone_17N".to_string(),
            wkt: WGS_1984_UTM_ZONE_17N.to_string(),
        }
    }
}

impl Default for SpatialReference {
    fn default() -> Self {
        Self::utm_zone_17n()
    }
}

/// Naming helpers shared by the catalog and the extraction stage
pub mod utils {
    /// Stem of a raster path, independent of the platform's separator.
    ///
    /// Everything after the first `.` of the last path component is dropped,
    /// so `C:\scenes\a.b.tif` and `/scenes/a.b.tif` both yield `a`.
    pub fn raster_base_name(path: &str) -> &str {
        let file_name = path.rsplit(['/', '\\']).next().unwrap_or(path);
        file_name.split('.').next().unwrap_or(file_name)
    }

    /// Output name (without extension) of the shoreline raster for a base name
    pub fn shoreline_output_name(base_name: &str) -> String {
        format!("{}{}", super::SHORELINE_PREFIX, base_name)
    }

    /// Case-sensitive quality-mask test applied to a base name
    pub fn is_quality_mask(base_name: &str, marker: &str) -> bool {
        !marker.is_empty() && base_name.contains(marker)
    }
}
