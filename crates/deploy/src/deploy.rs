//! Deploy orchestrator.
//!
//! Scans every configured part, hands the mappings to one
//! [`ResilientUploader`] batch and turns the outcome into a report with
//! public URLs.

use std::path::PathBuf;
use std::sync::Arc;

use sitedeploy_remote_path::to_web_url;
use sitedeploy_transfer::{
    BatchResult, Connector, FileMapping, FtpConnector, ResilientUploader, UploadEvent,
};
use tokio::sync::mpsc;
use tracing::{error, info, warn};

use crate::config::DeployConfig;
use crate::error::DeployError;
use crate::scanner::scan_part;

/// A successfully uploaded file and where it is served from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishedFile {
    pub relative_path: String,
    pub remote_path: String,
    /// `None` when the target has no public domain.
    pub url: Option<String>,
}

/// Result of one deployment.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeployReport {
    pub batch: BatchResult,
    pub published: Vec<PublishedFile>,
}

impl DeployReport {
    pub fn is_success(&self) -> bool {
        self.batch.is_success()
    }

    pub fn summary(&self) -> String {
        self.batch.summary()
    }
}

/// Runs a deployment described by a [`DeployConfig`].
pub struct DeployOrchestrator {
    config: DeployConfig,
    base_dir: PathBuf,
    events_tx: mpsc::Sender<UploadEvent>,
    events_rx: Option<mpsc::Receiver<UploadEvent>>,
}

impl DeployOrchestrator {
    /// `base_dir` anchors the parts' relative local directories, normally
    /// the directory holding the config file.
    pub fn new(config: DeployConfig, base_dir: impl Into<PathBuf>) -> Self {
        let (events_tx, events_rx) = mpsc::channel(256);
        Self {
            config,
            base_dir: base_dir.into(),
            events_tx,
            events_rx: Some(events_rx),
        }
    }

    /// Takes the event receiver. Can only be called once.
    pub fn take_events(&mut self) -> Option<mpsc::Receiver<UploadEvent>> {
        self.events_rx.take()
    }

    /// Scans every part into file mappings.
    pub fn plan(&self) -> Result<Vec<FileMapping>, DeployError> {
        let tenant = self.config.target.tenant_id();
        let mut files = Vec::new();
        for part in &self.config.parts {
            files.extend(scan_part(&self.base_dir, part, tenant)?);
        }
        Ok(files)
    }

    /// Deploys over FTP using the configured credentials.
    pub async fn deploy(&self) -> Result<DeployReport, DeployError> {
        let connector = FtpConnector::new(self.config.target.ftp_config());
        self.deploy_with(Arc::new(connector)).await
    }

    /// Deploys through `connector`.
    pub async fn deploy_with(
        &self,
        connector: Arc<dyn Connector>,
    ) -> Result<DeployReport, DeployError> {
        self.config.validate()?;
        let files = self.plan()?;
        if files.is_empty() {
            warn!("nothing to deploy: no files found in any part");
            return Ok(DeployReport::default());
        }
        info!(
            domain = %self.config.target.domain,
            files = files.len(),
            parts = self.config.parts.len(),
            "deploy started"
        );

        let uploader = ResilientUploader::new(connector, self.config.upload_policy())
            .with_events(self.events_tx.clone());
        let batch = uploader.upload_batch(&files, &self.config.target).await?;

        for failure in batch.failures() {
            error!(
                file = %failure.relative_path,
                error = failure.last_error.as_deref().unwrap_or("unknown"),
                "file not deployed"
            );
        }

        let published = self.published_files(&batch);
        info!(summary = %batch.summary(), "deploy finished");
        Ok(DeployReport { batch, published })
    }

    fn published_files(&self, batch: &BatchResult) -> Vec<PublishedFile> {
        let site = self.config.target.public_site();
        let has_domain = !site.domain.trim().is_empty();
        if !has_domain {
            warn!("no public domain configured, deployed files have no URLs");
        }

        batch
            .outcomes
            .iter()
            .filter(|o| o.succeeded)
            .map(|o| PublishedFile {
                relative_path: o.relative_path.clone(),
                remote_path: o.final_remote_path.clone(),
                url: if has_domain {
                    to_web_url(&site, &o.final_remote_path)
                } else {
                    None
                },
            })
            .collect()
    }
}
