//! Batch upload with bounded per-file retries.

use std::collections::BTreeSet;
use std::sync::{Arc, Mutex, PoisonError};

use sitedeploy_remote_path::{
    ensure_safe, normalize, resolve_remote_path, segment_count, strip_tenant_prefix,
};
use tokio::sync::mpsc;
use tracing::{debug, error, info, trace, warn};

use crate::TransferError;
use crate::connection::Connector;
use crate::probe::{EffectiveRoot, EffectiveRootProbe};
use crate::retry::{is_transient, retry_with_backoff};
use crate::session::TransferSession;
use crate::types::{
    BatchResult, FileMapping, FileState, TargetConfig, UploadEvent, UploadOutcome, UploadPolicy,
};
use crate::validation::validate_remote_path;

/// Uploads a batch of files sequentially over one replaceable connection.
pub struct ResilientUploader {
    connector: Arc<dyn Connector>,
    policy: UploadPolicy,
    events: Option<mpsc::Sender<UploadEvent>>,
}

impl ResilientUploader {
    pub fn new(connector: Arc<dyn Connector>, policy: UploadPolicy) -> Self {
        Self {
            connector,
            policy,
            events: None,
        }
    }

    /// Sends progress events to `tx`. Events are dropped when the channel
    /// is full; the batch never waits on a slow consumer.
    pub fn with_events(mut self, tx: mpsc::Sender<UploadEvent>) -> Self {
        self.events = Some(tx);
        self
    }

    /// Uploads `files` to `target`.
    ///
    /// Individual file failures are collected in the result. An error is
    /// returned only when the target configuration is invalid or the first
    /// connection cannot be established.
    pub async fn upload_batch(
        &self,
        files: &[FileMapping],
        target: &TargetConfig,
    ) -> Result<BatchResult, TransferError> {
        target.validate()?;
        let tenant = target.tenant_id();

        let mut session = TransferSession::open(self.connector.clone()).await?;
        info!(host = %target.credentials.host, files = files.len(), "upload batch started");

        let root = EffectiveRootProbe::new(&target.remote_root, tenant)
            .run(&mut session)
            .await
            .root;
        self.emit(UploadEvent::RootResolved {
            root: root.to_string(),
        });

        let plans: Vec<(&FileMapping, Result<String, TransferError>)> = files
            .iter()
            .map(|file| (file, resolve_target(&root, file, tenant)))
            .collect();

        self.ensure_directories(&mut session, &plans).await;

        let mut outcomes = Vec::with_capacity(plans.len());
        for (i, (file, resolved)) in plans.into_iter().enumerate() {
            if i > 0 {
                tokio::time::sleep(self.policy.upload_pacing).await;
            }
            let outcome = match resolved {
                Ok(remote) => self.upload_one(&mut session, file, &remote, tenant).await,
                Err(e) => self.reject(file, e),
            };
            outcomes.push(outcome);
        }

        session.close().await;

        let result = BatchResult::from_outcomes(outcomes);
        info!(
            succeeded = result.success_count,
            failed = result.fail_count,
            "upload batch finished"
        );
        self.emit(UploadEvent::BatchFinished {
            success_count: result.success_count,
            fail_count: result.fail_count,
        });
        Ok(result)
    }

    /// Creates the parent directory of every resolved file, shallow first.
    async fn ensure_directories(
        &self,
        session: &mut TransferSession,
        plans: &[(&FileMapping, Result<String, TransferError>)],
    ) {
        let distinct: BTreeSet<&str> = plans
            .iter()
            .filter_map(|(_, resolved)| resolved.as_deref().ok())
            .map(parent_dir)
            .filter(|dir| *dir != "/")
            .collect();
        let mut dirs: Vec<&str> = distinct.into_iter().collect();
        dirs.sort_by_key(|dir| segment_count(dir));

        for (i, dir) in dirs.into_iter().enumerate() {
            if i > 0 {
                tokio::time::sleep(self.policy.directory_pacing).await;
            }
            let (result, _) = retry_with_backoff(
                session,
                &self.policy.retry,
                is_transient,
                |s, _| {
                    let dir = dir.to_string();
                    Box::pin(async move { s.ensure_directory(&dir).await })
                },
                |s, notice| {
                    Box::pin(async move {
                        let _ = s.reconnect(notice.delay).await;
                    })
                },
            )
            .await;

            match result {
                Ok(()) => {
                    debug!(dir, "directory ensured");
                    self.emit(UploadEvent::DirectoryEnsured {
                        path: dir.to_string(),
                    });
                }
                Err(e) => warn!(dir, error = %e, "could not ensure directory"),
            }
        }
    }

    async fn upload_one(
        &self,
        session: &mut TransferSession,
        file: &FileMapping,
        remote: &str,
        tenant: &str,
    ) -> UploadOutcome {
        let tracker = FileTracker::new(&file.relative_path);

        let (result, attempts) = retry_with_backoff(
            session,
            &self.policy.retry,
            is_transient,
            |s, attempt| {
                tracker.advance(FileState::Uploading);
                self.emit(UploadEvent::FileStarted {
                    relative_path: file.relative_path.clone(),
                    remote_path: remote.to_string(),
                    attempt,
                });
                let local = file.local_path.clone();
                let remote = remote.to_string();
                let tenant = tenant.to_string();
                Box::pin(async move {
                    ensure_safe(&remote, &tenant)?;
                    s.upload_file(&local, &remote).await
                })
            },
            |s, notice| {
                tracker.advance(FileState::Retrying);
                self.emit(UploadEvent::FileRetrying {
                    relative_path: file.relative_path.clone(),
                    attempt: notice.attempt,
                    error: notice.error.clone(),
                });
                Box::pin(async move {
                    let _ = s.reconnect(notice.delay).await;
                })
            },
        )
        .await;

        match result {
            Ok(bytes) => {
                tracker.advance(FileState::Succeeded);
                info!(file = %file.relative_path, remote, bytes, attempts, "uploaded");
                self.emit(UploadEvent::FileSucceeded {
                    relative_path: file.relative_path.clone(),
                    remote_path: remote.to_string(),
                    attempts,
                });
                UploadOutcome {
                    relative_path: file.relative_path.clone(),
                    final_remote_path: remote.to_string(),
                    attempts,
                    succeeded: true,
                    last_error: None,
                }
            }
            Err(e) => {
                tracker.advance(FileState::Failed);
                self.fail(file, remote.to_string(), attempts, e)
            }
        }
    }

    /// Fails a file whose path could not be resolved safely. No attempt is
    /// made.
    fn reject(&self, file: &FileMapping, e: TransferError) -> UploadOutcome {
        FileTracker::new(&file.relative_path).advance(FileState::Failed);
        self.fail(file, file.remote_path.clone(), 0, e)
    }

    fn fail(
        &self,
        file: &FileMapping,
        remote: String,
        attempts: u32,
        e: TransferError,
    ) -> UploadOutcome {
        error!(file = %file.relative_path, remote = %remote, attempts, error = %e, "upload failed");
        self.emit(UploadEvent::FileFailed {
            relative_path: file.relative_path.clone(),
            attempts,
            error: e.to_string(),
        });
        UploadOutcome {
            relative_path: file.relative_path.clone(),
            final_remote_path: remote,
            attempts,
            succeeded: false,
            last_error: Some(e.to_string()),
        }
    }

    fn emit(&self, event: UploadEvent) {
        if let Some(tx) = &self.events
            && let Err(e) = tx.try_send(event)
        {
            trace!(error = %e, "upload event dropped");
        }
    }
}

/// Resolves a mapping's remote hint against the effective root and runs the
/// write gates.
fn resolve_target(
    root: &EffectiveRoot,
    file: &FileMapping,
    tenant: &str,
) -> Result<String, TransferError> {
    let hint = if root.is_tenant_scoped() {
        strip_tenant_prefix(&normalize(&file.remote_path, tenant), tenant)
    } else {
        file.remote_path.clone()
    };
    let resolved = resolve_remote_path(root.as_str(), &hint, tenant)?;
    validate_remote_path(&resolved)?;
    Ok(resolved)
}

fn parent_dir(path: &str) -> &str {
    match path.rsplit_once('/') {
        Some(("", _)) | None => "/",
        Some((parent, _)) => parent,
    }
}

/// Per-file state machine; transitions are checked in debug builds.
struct FileTracker<'a> {
    relative_path: &'a str,
    state: Mutex<FileState>,
}

impl<'a> FileTracker<'a> {
    fn new(relative_path: &'a str) -> Self {
        Self {
            relative_path,
            state: Mutex::new(FileState::Pending),
        }
    }

    fn advance(&self, next: FileState) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        debug_assert!(
            state.can_transition_to(next),
            "illegal transition {:?} -> {next:?}",
            *state
        );
        trace!(file = self.relative_path, from = ?*state, to = ?next, "file state");
        *state = next;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use std::time::Duration;

    use sitedeploy_remote_path::has_duplicated_segments;

    use crate::testing::{Fault, MockConnector, Shared, fail_mkd, fail_put, server};
    use crate::types::{Credentials, DeployMethod};

    fn target() -> TargetConfig {
        TargetConfig {
            domain: "acme.com".into(),
            tenant: None,
            remote_root: "/".into(),
            credentials: Credentials {
                host: "ftp.acme.com".into(),
                port: 21,
                user: "deploy".into(),
                password: "pw".into(),
                timeout_ms: 30_000,
            },
            method: DeployMethod::Ftp,
        }
    }

    fn mapping(relative: &str, remote: &str) -> FileMapping {
        FileMapping {
            local_path: PathBuf::from("dist").join(relative),
            relative_path: relative.into(),
            remote_path: remote.into(),
            web_path: format!("/{relative}"),
            part: "site".into(),
            size_bytes: 10,
        }
    }

    fn uploader(srv: &Shared) -> ResilientUploader {
        ResilientUploader::new(
            Arc::new(MockConnector {
                server: srv.clone(),
            }),
            UploadPolicy::default(),
        )
    }

    /// Host where the account sits at a shared top level.
    fn shared_host() -> Shared {
        server("/", &["/acme.com", "/acme.com/httpdocs"])
    }

    fn drain(rx: &mut mpsc::Receiver<UploadEvent>) -> Vec<UploadEvent> {
        let mut events = Vec::new();
        while let Ok(ev) = rx.try_recv() {
            events.push(ev);
        }
        events
    }

    #[tokio::test(start_paused = true)]
    async fn reset_mid_batch_reconnects_once_and_finishes() {
        let srv = shared_host();
        fail_put(&srv, "/acme.com/httpdocs/js/c.js", &[Fault::Reset]);
        let files = vec![
            mapping("css/a.css", "/httpdocs/css/a.css"),
            mapping("css/b.css", "/httpdocs/css/b.css"),
            mapping("js/c.js", "/httpdocs/js/c.js"),
            mapping("js/d.js", "/httpdocs/js/d.js"),
            mapping("css/e.css", "/httpdocs/css/e.css"),
        ];
        let (tx, mut rx) = mpsc::channel(256);

        let result = uploader(&srv)
            .with_events(tx)
            .upload_batch(&files, &target())
            .await
            .unwrap();

        assert_eq!(result.fail_count, 0);
        assert_eq!(result.success_count, 5);
        assert_eq!(result.outcomes[2].attempts, 2);
        assert!(result.outcomes.iter().enumerate().all(|(i, o)| i == 2 || o.attempts == 1));

        let s = srv.lock().unwrap();
        assert_eq!(s.connects, 2, "exactly one reconnect");
        assert_eq!(s.stored.len(), 5);
        assert!(s.dirs.contains("/acme.com/httpdocs/css"));
        assert!(s.dirs.contains("/acme.com/httpdocs/js"));
        drop(s);

        let events = drain(&mut rx);
        assert_eq!(
            events.first(),
            Some(&UploadEvent::RootResolved {
                root: "/acme.com".into()
            })
        );
        let retrying: Vec<_> = events
            .iter()
            .filter(|e| matches!(e, UploadEvent::FileRetrying { .. }))
            .collect();
        assert_eq!(retrying.len(), 1);
        assert!(matches!(
            retrying[0],
            UploadEvent::FileRetrying { relative_path, attempt: 1, .. } if relative_path == "js/c.js"
        ));
        assert_eq!(
            events.last(),
            Some(&UploadEvent::BatchFinished {
                success_count: 5,
                fail_count: 0
            })
        );
    }

    #[tokio::test(start_paused = true)]
    async fn env_file_in_public_root_is_rejected_without_attempts() {
        let srv = shared_host();
        let files = vec![
            mapping(".env", "/httpdocs/.env"),
            mapping("index.html", "/httpdocs/index.html"),
        ];

        let result = uploader(&srv).upload_batch(&files, &target()).await.unwrap();

        assert_eq!(result.fail_count, 1);
        let env = &result.outcomes[0];
        assert!(!env.succeeded);
        assert_eq!(env.attempts, 0);
        assert!(env.last_error.as_deref().unwrap().contains("env file"));
        assert!(result.outcomes[1].succeeded);

        let s = srv.lock().unwrap();
        assert!(!s.put_attempts.iter().any(|p| p.ends_with(".env")));
    }

    #[tokio::test(start_paused = true)]
    async fn always_transient_file_stops_at_four_attempts() {
        let srv = shared_host();
        fail_put(&srv, "/acme.com/httpdocs/big.zip", &[Fault::Reset; 10]);
        let files = vec![
            mapping("big.zip", "/httpdocs/big.zip"),
            mapping("index.html", "/httpdocs/index.html"),
        ];

        let result = uploader(&srv).upload_batch(&files, &target()).await.unwrap();

        let big = &result.outcomes[0];
        assert!(!big.succeeded);
        assert_eq!(big.attempts, 4);
        assert!(big.last_error.is_some());
        assert!(result.outcomes[1].succeeded);
        assert!(!result.is_success());

        let s = srv.lock().unwrap();
        let tries = s
            .put_attempts
            .iter()
            .filter(|p| p.as_str() == "/acme.com/httpdocs/big.zip")
            .count();
        assert_eq!(tries, 4);
        assert_eq!(s.connects, 4);
    }

    #[tokio::test(start_paused = true)]
    async fn terminal_error_fails_file_without_retry() {
        let srv = shared_host();
        fail_put(&srv, "/acme.com/httpdocs/locked.html", &[Fault::Denied]);
        let files = vec![
            mapping("locked.html", "/httpdocs/locked.html"),
            mapping("index.html", "/httpdocs/index.html"),
        ];

        let result = uploader(&srv).upload_batch(&files, &target()).await.unwrap();

        assert_eq!(result.outcomes[0].attempts, 1);
        assert!(!result.outcomes[0].succeeded);
        assert!(result.outcomes[1].succeeded);
        assert_eq!(srv.lock().unwrap().connects, 1);
        assert_eq!(result.failures().count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn duplicated_segments_never_reach_the_server() {
        let srv = shared_host();
        let files = vec![
            mapping("a.js", "/httpdocs/httpdocs/a.js"),
            mapping("b.js", "/acme.com/acme.com/httpdocs/b.js"),
            mapping("c.js", "/acme.com/httpdocs/acme.com/httpdocs/c.js"),
        ];

        let result = uploader(&srv).upload_batch(&files, &target()).await.unwrap();

        assert!(result.is_success(), "{:?}", result.outcomes);
        let s = srv.lock().unwrap();
        assert!(!s.put_attempts.is_empty());
        for path in &s.put_attempts {
            assert!(!has_duplicated_segments(path, "acme.com"), "{path}");
        }
        assert!(s.stored.contains(&"/acme.com/httpdocs/a.js".to_string()));
        assert!(s.stored.contains(&"/acme.com/httpdocs/b.js".to_string()));
        assert!(s.stored.contains(&"/acme.com/httpdocs/c.js".to_string()));
    }

    #[tokio::test(start_paused = true)]
    async fn tenant_scoped_host_drops_tenant_prefix() {
        let srv = server("/", &["/httpdocs"]);
        let files = vec![mapping("index.html", "/acme.com/httpdocs/index.html")];

        let result = uploader(&srv).upload_batch(&files, &target()).await.unwrap();

        assert!(result.is_success());
        assert_eq!(result.outcomes[0].final_remote_path, "/httpdocs/index.html");
        assert_eq!(srv.lock().unwrap().stored, vec!["/httpdocs/index.html".to_string()]);
    }

    #[tokio::test(start_paused = true)]
    async fn traversal_is_rejected_before_upload() {
        let srv = shared_host();
        let files = vec![mapping("evil", "/httpdocs/../../etc/passwd")];

        let result = uploader(&srv).upload_batch(&files, &target()).await.unwrap();

        assert_eq!(result.outcomes[0].attempts, 0);
        assert!(srv.lock().unwrap().put_attempts.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn first_connection_failure_is_fatal() {
        let srv = shared_host();
        srv.lock().unwrap().connect_faults.push_back(Fault::Reset);
        let files = vec![mapping("index.html", "/httpdocs/index.html")];

        let err = uploader(&srv).upload_batch(&files, &target()).await.unwrap_err();
        assert!(matches!(err, TransferError::Ftp(_)));
    }

    #[tokio::test]
    async fn invalid_target_fails_before_connecting() {
        let srv = shared_host();
        let mut bad = target();
        bad.credentials.user.clear();

        let err = uploader(&srv).upload_batch(&[], &bad).await.unwrap_err();
        assert!(matches!(err, TransferError::Config(_)));
        assert_eq!(srv.lock().unwrap().connects, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn uploads_and_directories_are_paced() {
        let srv = shared_host();
        let files = vec![
            mapping("a/1.txt", "/httpdocs/a/1.txt"),
            mapping("b/2.txt", "/httpdocs/b/2.txt"),
            mapping("c/3.txt", "/httpdocs/c/3.txt"),
        ];

        let start = tokio::time::Instant::now();
        uploader(&srv).upload_batch(&files, &target()).await.unwrap();
        let elapsed = start.elapsed();

        // Two gaps between three directories and two between three files.
        assert!(elapsed >= Duration::from_millis(2 * 50 + 2 * 150), "{elapsed:?}");
    }

    #[tokio::test(start_paused = true)]
    async fn directories_are_created_shallow_first() {
        let srv = shared_host();
        let files = vec![
            mapping("js/vendor/x.js", "/httpdocs/js/vendor/x.js"),
            mapping("js/y.js", "/httpdocs/js/y.js"),
        ];

        uploader(&srv).upload_batch(&files, &target()).await.unwrap();

        let s = srv.lock().unwrap();
        let mkds: Vec<&str> = s
            .commands
            .iter()
            .filter_map(|c| c.strip_prefix("MKD "))
            .collect();
        assert_eq!(mkds, vec!["js", "vendor"]);
    }

    #[tokio::test(start_paused = true)]
    async fn reset_while_creating_directory_reconnects_and_retries() {
        let srv = shared_host();
        fail_mkd(&srv, "/acme.com/httpdocs/js", &[Fault::Reset]);
        let files = vec![mapping("js/app.js", "/httpdocs/js/app.js")];
        let (tx, mut rx) = mpsc::channel(64);

        let result = uploader(&srv)
            .with_events(tx)
            .upload_batch(&files, &target())
            .await
            .unwrap();

        assert!(result.is_success(), "{:?}", result.outcomes);
        assert_eq!(result.outcomes[0].attempts, 1);

        let s = srv.lock().unwrap();
        assert_eq!(s.connects, 2, "exactly one reconnect");
        assert!(s.dirs.contains("/acme.com/httpdocs/js"));
        assert_eq!(s.commands.iter().filter(|c| *c == "MKD js").count(), 2);
        assert_eq!(s.stored, vec!["/acme.com/httpdocs/js/app.js".to_string()]);
        drop(s);

        assert!(drain(&mut rx).contains(&UploadEvent::DirectoryEnsured {
            path: "/acme.com/httpdocs/js".into()
        }));
    }

    #[tokio::test(start_paused = true)]
    async fn both_public_roots_keep_tenant_folder() {
        let srv = server("/", &["/httpdocs", "/acme.com", "/acme.com/httpdocs"]);
        let files = vec![mapping("index.html", "/acme.com/httpdocs/index.html")];

        let result = uploader(&srv).upload_batch(&files, &target()).await.unwrap();

        assert!(result.is_success());
        assert_eq!(
            result.outcomes[0].final_remote_path,
            "/acme.com/httpdocs/index.html"
        );
        assert_eq!(
            srv.lock().unwrap().stored,
            vec!["/acme.com/httpdocs/index.html".to_string()]
        );
    }

    #[test]
    fn upload_batch_future_is_send() {
        fn assert_send<T: Send>(_: T) {}
        let srv = shared_host();
        let uploader = uploader(&srv);
        let target = target();
        assert_send(uploader.upload_batch(&[], &target));
    }

    #[test]
    fn parent_of_paths() {
        assert_eq!(parent_dir("/a.txt"), "/");
        assert_eq!(parent_dir("/acme.com/httpdocs/a.txt"), "/acme.com/httpdocs");
    }
}
