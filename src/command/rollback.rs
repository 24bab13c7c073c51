use futures::future::try_join_all;
use tracing::{debug, info, instrument, warn};

use crate::{
    config::RollbackConfig,
    error::{Context, Result},
    path::join_path,
    storage::{CopyFile, Storage},
    upload::{HTML_CONTENT_TYPE, LIMITED, content_encoding, is_html},
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RollbackReport {
    pub version: String,
    /// Number of live pages now pointing at `version`.
    pub reverted: usize,
    /// Whether anything was stored under the version at all.
    pub found: bool,
}

/// Points every live page back at the copy stored under
/// `<dest>/<version>/`.
///
/// Only HTML is aliased; the hashed scripts and stylesheets those pages
/// reference never left the bucket.
#[instrument(skip(storage), err)]
pub async fn rollback<S: Storage>(storage: &S, config: &RollbackConfig) -> Result<RollbackReport> {
    let prefix = format!("{}/", join_path(&[config.dest.as_str(), config.version.as_str()]));

    let keys = storage
        .list_bucket_filepaths(&prefix)
        .await
        .context("list version")?;

    if keys.is_empty() {
        warn!(version = %config.version, "version not found");
        return Ok(RollbackReport {
            version: config.version.clone(),
            reverted: 0,
            found: false,
        });
    }

    let pages: Vec<(&str, &str)> = keys
        .iter()
        .filter_map(|key| {
            let Some(internal) = key.strip_prefix(prefix.as_str()) else {
                warn!(key = %key, prefix = %prefix, "listed key outside the version, skipping");
                return None;
            };
            if !is_html(key) {
                debug!(key = %key, "not html, skipping");
                return None;
            }
            Some((key.as_str(), internal))
        })
        .collect();

    try_join_all(pages.iter().map(|&(key, internal)| {
        let live = join_path(&[config.dest.as_str(), internal]);
        info!(from = %key, to = %live, "aliasing");

        storage.copy_file(CopyFile {
            source: key.to_string(),
            dest: live,
            cache_seconds: LIMITED,
            content_type: HTML_CONTENT_TYPE.to_string(),
            content_encoding: content_encoding(key).to_string(),
        })
    }))
    .await
    .context("alias")?;

    Ok(RollbackReport {
        version: config.version.clone(),
        reverted: pages.len(),
        found: true,
    })
}
