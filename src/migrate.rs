//! The migration runner: walks the record set sequentially and produces at
//! most one content item (linked to one asset and one taxonomy entry) per
//! legacy record.

use anyhow::{Context, Result};
use tracing::{info, warn};

use crate::graphcms::{AssetLink, GraphCmsClient, NewImage};
use crate::html::html_to_text;
use crate::records::{Record, RecordSet};
use crate::retry::{with_retry, RetryPolicy};

/// Default host the legacy export's relative image paths resolve against.
pub const DEFAULT_ASSET_HOST: &str = "http://www.ruszkai.hu";

#[derive(Debug, Clone)]
pub struct MigrateOptions {
    /// Query the target for `oldId` first and skip records that already exist.
    pub skip_existing: bool,
    /// Absolute prefix for the records' relative image paths.
    pub asset_host: String,
    /// Retry pacing for the two network calls; `None` means single attempts.
    pub retry: Option<RetryPolicy>,
}

impl Default for MigrateOptions {
    fn default() -> Self {
        Self {
            skip_existing: false,
            asset_host: DEFAULT_ASSET_HOST.to_string(),
            retry: None,
        }
    }
}

/// What happened to a single record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// A new content item was created with this id.
    Created(String),
    /// An item with this legacy id already existed; nothing was sent.
    Skipped,
}

/// Explicit accumulator for a run; returned instead of mutating shared state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MigrationReport {
    pub created: usize,
    pub skipped: usize,
    pub total: usize,
}

impl MigrationReport {
    pub fn summary(&self) -> String {
        if self.skipped > 0 {
            format!(
                "{} out of {} records migrated ({} already existed)",
                self.created, self.total, self.skipped
            )
        } else {
            format!("{} out of {} records migrated", self.created, self.total)
        }
    }
}

/// Migrate every record. Strictly sequential; the first unrecovered failure
/// aborts the run, leaving later records untouched.
pub async fn migrate_all(
    client: &GraphCmsClient,
    records: &RecordSet,
    opts: &MigrateOptions,
) -> Result<MigrationReport> {
    if !opts.skip_existing {
        warn!("running without --skip-existing; a re-run can create duplicate items");
    }
    let mut report = MigrationReport {
        total: records.len(),
        ..Default::default()
    };
    for (key, record) in records {
        let outcome = migrate_one(client, record, opts)
            .await
            .with_context(|| format!("migrating record {key}"))?;
        match outcome {
            Outcome::Created(_) => {
                report.created += 1;
                info!(
                    "{} out of {} records migrated",
                    report.created, report.total
                );
            }
            Outcome::Skipped => report.skipped += 1,
        }
    }
    Ok(report)
}

/// Migrate a single record: optional existence check, image upload, HTML
/// flattening, then the create mutation.
pub async fn migrate_one(
    client: &GraphCmsClient,
    record: &Record,
    opts: &MigrateOptions,
) -> Result<Outcome> {
    if opts.skip_existing {
        if let Some(existing) = client.find_image_by_old_id(record.id).await? {
            info!(old_id = record.id, item_id = %existing, "already migrated; skipping");
            return Ok(Outcome::Skipped);
        }
    }

    let image_url = format!("{}{}", opts.asset_host.trim_end_matches('/'), record.image_url);
    let asset_id = match opts.retry {
        Some(policy) => {
            with_retry("image upload", policy, || client.upload_from_url(&image_url)).await?
        }
        None => client.upload_from_url(&image_url).await?,
    };

    let new_image = NewImage {
        name: record.title.clone(),
        alt: record.image_alt.clone(),
        asset: AssetLink::Connect { id: asset_id },
        taxonomy_old_id: record.taxonomy_id,
        old_id: record.id,
        body: html_to_text(&record.description_html),
    };

    let item_id = match opts.retry {
        Some(policy) => {
            with_retry("create mutation", policy, || client.create_image(&new_image)).await?
        }
        None => client.create_image(&new_image).await?,
    };

    info!(old_id = record.id, item_id = %item_id, "created content item");
    Ok(Outcome::Created(item_id))
}
