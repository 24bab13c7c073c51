use std::{fmt, path::PathBuf};

use tracing::{info, instrument};

use crate::{
    config::DeployConfig,
    discovery,
    error::{Context, Result},
    hash,
    metadata::FileRef,
    resolver::{self, Resolved},
    storage::Storage,
    upload::Uploader,
};

/// Shown in place of a version id when a deploy carried no HTML.
pub const NO_HTML: &str = "0 HTML Files";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeployReport {
    /// Version id to roll back to, `None` when there was no HTML.
    pub version: Option<String>,
    pub html_files: usize,
    pub dependencies: usize,
    pub other_files: usize,
}

impl DeployReport {
    pub fn deploy_id(&self) -> &str {
        self.version.as_deref().unwrap_or(NO_HTML)
    }
}

impl fmt::Display for DeployReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let id = format!("Deploy ID: {}", self.deploy_id());
        let width = id.len().max(34);

        writeln!(f, "+{}+", "-".repeat(width + 2))?;
        writeln!(f, "| {:^width$} |", "Deploy Successful!")?;
        writeln!(f, "| {:^width$} |", "")?;
        writeln!(f, "| {id:^width$} |")?;
        write!(f, "+{}+", "-".repeat(width + 2))
    }
}

/// Publishes the site under `config.root`.
///
/// Scripts and stylesheets referenced from HTML go out first under hashed
/// names, then every other matched file under its plain name. After the
/// propagation delay each page is rendered against the hashed names, stored
/// under `<dest>/<version>/` and aliased to its live path.
#[instrument(skip(uploader), err)]
pub async fn deploy<S: Storage>(uploader: &Uploader<S>, config: &DeployConfig) -> Result<DeployReport> {
    let root = &config.root;
    let dest = config.dest.as_str();

    let files = discovery::list_files(root, &config.files, dest).context("discover")?;
    let pages = discovery::files_with_extension(&files, "html");

    let mut resolved = Resolved::default();
    let mut version = None;

    if pages.is_empty() {
        info!("no HTML files found");
    } else {
        resolved = resolver::resolve_dependencies(root, dest, &pages).context("resolve")?;

        let id = hash::version_id(&resolved.local_paths()).context("version")?;
        info!(version = %id, dependencies = resolved.files.len(), "resolved HTML dependencies");

        uploader
            .deploy_dependencies(dest, &mut resolved.files)
            .await
            .context("upload dependencies")?;

        version = Some(id);
    }

    let excluded: Vec<PathBuf> = resolved.local_paths();
    let others: Vec<&FileRef> = discovery::ignore_files(&files, &excluded);

    uploader
        .deploy_files(dest, false, &others)
        .await
        .context("upload files")?;

    if let Some(id) = &version {
        tokio::time::sleep(config.propagation_delay).await;

        uploader
            .deploy_pages(root, dest, id, &resolved.pages, &resolved.files)
            .await
            .context("deploy html")?;
    }

    Ok(DeployReport {
        version,
        html_files: resolved.pages.len(),
        dependencies: resolved.files.len(),
        other_files: others.len(),
    })
}

#[cfg(test)]
mod tests {
    use std::{fs, path::Path, time::Duration};

    use super::*;
    use crate::{error::Error, retry::Backoff, storage::MemoryStorage, upload::LIMITED};

    fn config(root: &Path, files: &str, dest: &str) -> DeployConfig {
        DeployConfig {
            root: root.to_path_buf(),
            files: files.to_string(),
            dest: dest.to_string(),
            workers: 4,
            propagation_delay: Duration::ZERO,
        }
    }

    #[tokio::test]
    async fn dependencies_are_not_uploaded_twice() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        fs::write(root.join("a.html"), r#"<link rel="stylesheet" href="shared.css">"#).unwrap();
        fs::write(root.join("b.html"), r#"<link rel="stylesheet" href="./shared.css">"#).unwrap();
        fs::write(root.join("shared.css"), "body {}").unwrap();
        fs::write(root.join("robots.txt"), "User-agent: *").unwrap();

        let uploader = Uploader::new(MemoryStorage::new());
        let report = deploy(&uploader, &config(root, "*", "site")).await.unwrap();

        assert_eq!(report.html_files, 2);
        assert_eq!(report.dependencies, 1);
        assert_eq!(report.other_files, 1);

        let uploads = uploader.storage().uploads();
        assert_eq!(uploads.iter().filter(|k| k.ends_with("shared.css")).count(), 1);
        assert!(uploads.contains(&"site/robots.txt".to_string()));
        assert_eq!(uploader.storage().copies().len(), 2);
    }

    #[tokio::test]
    async fn absolute_base_fails_before_upload() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        fs::write(root.join("index.html"), r#"<base href="//example.com/">"#).unwrap();
        fs::write(root.join("logo.png"), [1u8, 2, 3]).unwrap();

        let uploader = Uploader::new(MemoryStorage::new());
        let err = deploy(&uploader, &config(root, "*", "")).await.unwrap_err();

        assert!(matches!(
            err,
            Error::Context { phase: "resolve", ref source } if matches!(**source, Error::AbsoluteBase { .. })
        ));
        assert!(uploader.storage().uploads().is_empty());
    }

    #[tokio::test]
    async fn failed_dependency_upload_keeps_old_html_live() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        fs::write(root.join("index.html"), r#"<script src="app.js"></script>"#).unwrap();
        fs::write(root.join("app.js"), "run()").unwrap();

        let uploader = Uploader::new(MemoryStorage::new()).with_backoff(Backoff {
            initial_interval: Duration::from_millis(1),
            multiplier: 1.0,
            max_interval: Duration::from_millis(1),
            max_elapsed: Duration::from_millis(20),
        });
        uploader.storage().fail_uploads(usize::MAX);

        let err = deploy(&uploader, &config(root, "*.html", "")).await.unwrap_err();

        assert!(matches!(err, Error::Context { phase: "upload dependencies", .. }));
        assert!(uploader.storage().copies().is_empty());
    }

    #[tokio::test]
    async fn missing_dependency_fails_the_deploy() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("index.html"), r#"<script src="missing.js"></script>"#).unwrap();

        let uploader = Uploader::new(MemoryStorage::new());
        let err = deploy(&uploader, &config(dir.path(), "*.html", "")).await.unwrap_err();

        assert!(matches!(err, Error::Context { phase: "version", .. }));
        assert!(uploader.storage().uploads().is_empty());
    }

    #[tokio::test]
    async fn no_html_reports_sentinel() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("logo.png"), [1u8, 2, 3]).unwrap();

        let uploader = Uploader::new(MemoryStorage::new());
        let report = deploy(&uploader, &config(dir.path(), "*", "")).await.unwrap();

        assert_eq!(report.deploy_id(), NO_HTML);
        let logo = uploader.storage().object("logo.png").unwrap();
        assert_eq!(logo.metadata.cache_control, format!("public, max-age={LIMITED}"));
    }

    #[test]
    fn banner_shows_deploy_id() {
        let report = DeployReport {
            version: Some("0123456789ab".into()),
            html_files: 1,
            dependencies: 0,
            other_files: 0,
        };

        let banner = report.to_string();
        assert!(banner.contains("Deploy ID: 0123456789ab"));
        assert!(banner.lines().all(|l| l.len() == banner.lines().next().unwrap().len()));
    }
}
