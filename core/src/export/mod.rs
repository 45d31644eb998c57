//! File export of validated models.

pub mod stl;
pub mod threemf;

#[cfg(test)]
mod tests_export;

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::geometry::tessellation::MeshOptions;
use crate::kernel::{GeometryKernel, KernelOpError};
use crate::sandbox::ModelShape;

#[derive(Debug, Error)]
pub enum ExportError {
    #[error("nothing to export: the model has no triangles")]
    Empty,

    #[error("unknown export format '{0}', expected stl or 3mf")]
    UnknownFormat(String),

    #[error("failed to merge parts: {0}")]
    Kernel(#[from] KernelOpError),

    #[error("failed to write XML: {0}")]
    Xml(String),

    #[error("failed to write archive: {0}")]
    Archive(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type ExportResult<T> = Result<T, ExportError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportFormat {
    Stl,
    #[serde(rename = "3mf")]
    ThreeMf,
}

impl ExportFormat {
    pub fn extension(self) -> &'static str {
        match self {
            ExportFormat::Stl => "stl",
            ExportFormat::ThreeMf => "3mf",
        }
    }

    pub fn content_type(self) -> &'static str {
        match self {
            ExportFormat::Stl => "model/stl",
            ExportFormat::ThreeMf => "application/vnd.ms-package.3dmanufacturing-3dmodel+xml",
        }
    }
}

impl FromStr for ExportFormat {
    type Err = ExportError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "stl" => Ok(ExportFormat::Stl),
            "3mf" => Ok(ExportFormat::ThreeMf),
            _ => Err(ExportError::UnknownFormat(s.to_string())),
        }
    }
}

impl fmt::Display for ExportFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

/// Serialize a model. STL merges all parts; 3MF keeps one object per part.
pub fn export(
    shape: &ModelShape,
    format: ExportFormat,
    kernel: &dyn GeometryKernel,
    options: &MeshOptions,
) -> ExportResult<Vec<u8>> {
    match format {
        ExportFormat::Stl => stl::write_stl(shape, kernel, options),
        ExportFormat::ThreeMf => threemf::write_3mf(shape, options),
    }
}
