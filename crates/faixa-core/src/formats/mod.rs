//! Survey file readers
//!
//! Pure functions converting CSV tables and KML layers into typed rows and
//! geometry-tagged features. Nothing here touches storage.

pub mod csv;
pub mod kml;

pub use self::csv::{parse_csv, read_csv, CsvDocument, CsvRow};
pub use self::kml::{parse_kml, read_kml, KmlDocument, KmlFeature};

use std::path::Path;

/// File name used in error messages and staging records
pub(crate) fn file_label(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}
