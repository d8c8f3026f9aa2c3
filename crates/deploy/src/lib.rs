//! Site deploy flow: config, scan, upload, public URLs.
//!
//! This crate is the glue around `sitedeploy-transfer`. It loads a deploy
//! config, scans the local build directories into file mappings, runs one
//! resilient upload batch and reports where every file is served from.
//!
//! # Pipeline
//!
//! 1. **Load**: read and validate the JSON config
//! 2. **Scan**: walk each part's local directory
//! 3. **Upload**: one batch over a single reconnecting FTP session
//! 4. **Report**: per-file outcome plus public URL

pub mod config;
pub mod deploy;
pub mod error;
pub mod scanner;

pub use config::{DeployConfig, PASSWORD_ENV, PartConfig, UploadSettings};
pub use deploy::{DeployOrchestrator, DeployReport, PublishedFile};
pub use error::DeployError;
pub use scanner::scan_part;
