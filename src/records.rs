use std::collections::BTreeMap;
use std::path::Path;

use anyhow::{Context, Result};
use serde::Deserialize;

/// One record from the legacy CMS export. Field names follow the export's
/// camelCase keys.
///
/// `image_width`/`image_height` ride along from the export but nothing
/// downstream reads them; `image_data` only matters when the mutation creates
/// the asset from an existing handle instead of connecting an upload.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Record {
    /// Legacy primary key, kept in the target CMS as `oldId`.
    pub id: i64,
    /// Relative path on the legacy host, e.g. `/images/foo.jpg`.
    pub image_url: String,
    pub title: String,
    pub image_alt: String,
    #[serde(default)]
    pub image_width: i64,
    #[serde(default)]
    pub image_height: i64,
    pub description_html: String,
    #[serde(default)]
    pub image_data: String,
    /// Foreign key into the previously migrated taxonomy collection.
    pub taxonomy_id: i64,
}

/// The whole export: legacy-id string -> record. Loaded once, never written.
pub type RecordSet = BTreeMap<String, Record>;

/// Load and parse the legacy export file.
pub fn load_records(path: &Path) -> Result<RecordSet> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("reading legacy export {}", path.display()))?;
    let records: RecordSet = serde_json::from_str(&raw)
        .with_context(|| format!("parsing legacy export {}", path.display()))?;
    Ok(records)
}
