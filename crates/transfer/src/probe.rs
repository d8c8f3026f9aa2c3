//! Effective root detection on a live connection.

use std::fmt;

use sitedeploy_remote_path::{PUBLIC_ROOT, normalize};
use tracing::{debug, info, warn};

use crate::session::TransferSession;

/// The directory uploads are rooted at for one batch. Decided once, never
/// changed afterwards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EffectiveRoot {
    path: String,
    tenant_scoped: bool,
}

impl EffectiveRoot {
    /// A root that was not derived from probing.
    pub fn fixed(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            tenant_scoped: false,
        }
    }

    pub fn as_str(&self) -> &str {
        &self.path
    }

    /// The login already sits inside the tenant folder, so a tenant prefix
    /// on a file path is redundant.
    pub fn is_tenant_scoped(&self) -> bool {
        self.tenant_scoped
    }
}

impl fmt::Display for EffectiveRoot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.path)
    }
}

/// What the probe saw and what it decided.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeReport {
    pub working_dir: String,
    pub public_root_visible: bool,
    pub tenant_public_root_visible: bool,
    pub root: EffectiveRoot,
}

/// Works out where uploads should be rooted, since configured roots are
/// unreliable on shared hosts that chroot the account into the tenant.
pub struct EffectiveRootProbe<'a> {
    configured_root: &'a str,
    tenant: &'a str,
}

impl<'a> EffectiveRootProbe<'a> {
    pub fn new(configured_root: &'a str, tenant: &'a str) -> Self {
        Self {
            configured_root,
            tenant,
        }
    }

    /// Probes `/httpdocs` and `/{tenant}/httpdocs` by changing into each and
    /// back. Failed directory changes are the expected negative answer.
    pub async fn run(&self, session: &mut TransferSession) -> ProbeReport {
        let working_dir = match session.pwd().await {
            Ok(dir) => normalize(&dir, self.tenant),
            Err(e) => {
                warn!(error = %e, "PWD failed during root probe, assuming /");
                "/".to_string()
            }
        };

        let configured = normalize(self.configured_root, self.tenant);
        let tentative = if configured != "/" {
            configured
        } else {
            working_dir.clone()
        };

        let public = format!("/{PUBLIC_ROOT}");
        let public_root_visible = can_enter(session, &public, &working_dir).await;
        let tenant_public_root_visible = if self.tenant.is_empty() {
            false
        } else {
            let candidate = format!("/{}/{PUBLIC_ROOT}", self.tenant);
            can_enter(session, &candidate, &working_dir).await
        };

        let root = match (public_root_visible, tenant_public_root_visible) {
            (true, false) => EffectiveRoot {
                path: working_dir.clone(),
                tenant_scoped: !self.tenant.is_empty(),
            },
            (true, true) => {
                // The tenant folder exists at the top level, so hints that
                // name it must keep it.
                warn!(
                    working_dir = %working_dir,
                    tenant = %self.tenant,
                    "both /httpdocs and the tenant httpdocs are reachable, using working directory"
                );
                EffectiveRoot::fixed(working_dir.clone())
            }
            (false, true) => EffectiveRoot::fixed(format!("/{}", self.tenant)),
            (false, false) => EffectiveRoot::fixed(tentative),
        };

        info!(
            root = %root,
            working_dir = %working_dir,
            public_root_visible,
            tenant_public_root_visible,
            "effective root resolved"
        );

        ProbeReport {
            working_dir,
            public_root_visible,
            tenant_public_root_visible,
            root,
        }
    }
}

async fn can_enter(session: &mut TransferSession, candidate: &str, home: &str) -> bool {
    match session.change_dir(candidate).await {
        Ok(()) => {
            if let Err(e) = session.change_dir(home).await {
                debug!(home, error = %e, "could not return to working directory after probe");
            }
            debug!(candidate, "probe: reachable");
            true
        }
        Err(e) => {
            debug!(candidate, error = %e, "probe: not reachable");
            false
        }
    }
}
