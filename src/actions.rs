//! Operator actions delivered out-of-band, e.g. from a notification button.
//!
//! Currently only "unblock application": remove the app from the blocklist,
//! persist it, dismiss the "app blocked" notification and confirm to the
//! operator.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::blocklist::Blocklist;
use crate::config::{EXTRA_UNBLOCK_APP, NOTIFY_ID_APP_BLOCKED};
use crate::error::AppError;

/// Inbound action message. A missing or empty `unblock_app` is a no-op.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnblockRequest {
    #[serde(default)]
    pub unblock_app: Option<String>,
}

impl UnblockRequest {
    pub fn new(app: impl Into<String>) -> Self {
        Self {
            unblock_app: Some(app.into()),
        }
    }

    /// Build a request from the string extras attached to an action.
    pub fn from_extras(extras: &HashMap<String, String>) -> Self {
        Self {
            unblock_app: extras.get(EXTRA_UNBLOCK_APP).cloned(),
        }
    }

    fn app(&self) -> Option<&str> {
        self.unblock_app.as_deref().filter(|app| !app.is_empty())
    }
}

/// Installed application as known to the resolver.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppDescriptor {
    pub package_name: String,
    pub name: String,
}

/// Maps package identifiers to installed applications.
pub trait AppResolver: Send + Sync {
    fn resolve(&self, package_name: &str) -> Option<AppDescriptor>;
}

/// OS notification subsystem.
pub trait Notifier: Send + Sync {
    fn cancel(&self, notification_id: i32);
}

/// Messages shown to the operator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Feedback {
    AppUnblocked { label: String },
    UnblockFailed { app: String, reason: String },
}

impl Feedback {
    pub fn message(&self) -> String {
        match self {
            Feedback::AppUnblocked { label } => format!("{label} unblocked"),
            Feedback::UnblockFailed { app, reason } => format!("Could not unblock {app}: {reason}"),
        }
    }
}

/// Operator-visible toast/snackbar sink.
pub trait OperatorFeedback: Send + Sync {
    fn show(&self, feedback: Feedback);
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UnblockOutcome {
    /// Empty request, nothing done.
    Ignored,
    Unblocked { app: String, label: String },
}

/// Executes unblock requests against the shared blocklist.
pub struct BlocklistActionHandler {
    blocklist: Arc<dyn Blocklist>,
    notifier: Arc<dyn Notifier>,
    resolver: Arc<dyn AppResolver>,
    feedback: Arc<dyn OperatorFeedback>,
    /// Held while a request is processed.
    processing: Mutex<()>,
}

impl BlocklistActionHandler {
    pub fn new(
        blocklist: Arc<dyn Blocklist>,
        notifier: Arc<dyn Notifier>,
        resolver: Arc<dyn AppResolver>,
        feedback: Arc<dyn OperatorFeedback>,
    ) -> Self {
        Self {
            blocklist,
            notifier,
            resolver,
            feedback,
            processing: Mutex::new(()),
        }
    }

    pub fn handle(&self, request: &UnblockRequest) -> Result<UnblockOutcome, AppError> {
        let Some(app) = request.app() else {
            return Ok(UnblockOutcome::Ignored);
        };

        let _processing = self
            .processing
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        tracing::debug!("unblock_app: {app}");

        self.blocklist.remove_app(app);
        if let Err(e) = self.blocklist.save_and_reload() {
            let reason = format!("{e:#}");
            tracing::warn!("Failed to unblock {app}: {reason}");
            self.feedback.show(Feedback::UnblockFailed {
                app: app.to_string(),
                reason: reason.clone(),
            });
            return Err(AppError::Persistence(reason));
        }

        self.notifier.cancel(NOTIFY_ID_APP_BLOCKED);

        let label = self
            .resolver
            .resolve(app)
            .map(|desc| desc.name)
            .unwrap_or_else(|| app.to_string());
        self.feedback.show(Feedback::AppUnblocked {
            label: label.clone(),
        });

        tracing::info!("Unblocked {app} ({label})");
        Ok(UnblockOutcome::Unblocked {
            app: app.to_string(),
            label,
        })
    }

    /// Handle requests from `rx` until all senders are dropped.
    ///
    /// A failed request is logged and does not stop the listener.
    pub fn spawn_listener(
        self: &Arc<Self>,
        mut rx: mpsc::Receiver<UnblockRequest>,
    ) -> tokio::task::JoinHandle<()> {
        let handler = Arc::clone(self);
        tokio::spawn(async move {
            while let Some(request) = rx.recv().await {
                let handler = Arc::clone(&handler);
                let result =
                    tokio::task::spawn_blocking(move || handler.handle(&request)).await;
                match result {
                    Ok(Ok(_)) => {}
                    Ok(Err(e)) => tracing::warn!("Unblock request failed: {e}"),
                    Err(e) => tracing::error!("Unblock handler panicked: {e}"),
                }
            }
            tracing::debug!("Unblock request channel closed");
        })
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;
    use crate::blocklist::SqliteBlocklist;
    use crate::db::tests::{break_inserts, open_memory_db};
    use crate::db::Database;

    #[derive(Default)]
    struct RecordingNotifier {
        cancelled: Mutex<Vec<i32>>,
    }

    impl Notifier for RecordingNotifier {
        fn cancel(&self, notification_id: i32) {
            self.cancelled.lock().unwrap().push(notification_id);
        }
    }

    #[derive(Default)]
    struct RecordingFeedback {
        shown: Mutex<Vec<Feedback>>,
    }

    impl OperatorFeedback for RecordingFeedback {
        fn show(&self, feedback: Feedback) {
            self.shown.lock().unwrap().push(feedback);
        }
    }

    struct StaticResolver(HashSet<&'static str>);

    impl AppResolver for StaticResolver {
        fn resolve(&self, package_name: &str) -> Option<AppDescriptor> {
            self.0.contains(package_name).then(|| AppDescriptor {
                package_name: package_name.to_string(),
                name: "Example App".to_string(),
            })
        }
    }

    struct Fixture {
        handler: Arc<BlocklistActionHandler>,
        blocklist: Arc<SqliteBlocklist>,
        db: Arc<Database>,
        notifier: Arc<RecordingNotifier>,
        feedback: Arc<RecordingFeedback>,
    }

    fn fixture(blocked: &[&str], known: &[&'static str]) -> Fixture {
        let db = Arc::new(open_memory_db());
        db.replace_blocked_apps(blocked.iter().copied()).unwrap();
        let blocklist = Arc::new(SqliteBlocklist::load(Arc::clone(&db)).unwrap());
        let notifier = Arc::new(RecordingNotifier::default());
        let feedback = Arc::new(RecordingFeedback::default());
        let resolver = Arc::new(StaticResolver(known.iter().copied().collect()));

        let handler = Arc::new(BlocklistActionHandler::new(
            blocklist.clone(),
            notifier.clone(),
            resolver,
            feedback.clone(),
        ));
        Fixture {
            handler,
            blocklist,
            db,
            notifier,
            feedback,
        }
    }

    #[test]
    fn test_unblock_removes_app_and_confirms_with_label() {
        let f = fixture(&["com.example.app", "org.other"], &["com.example.app"]);

        let outcome = f.handler.handle(&UnblockRequest::new("com.example.app")).unwrap();
        assert_eq!(
            outcome,
            UnblockOutcome::Unblocked {
                app: "com.example.app".into(),
                label: "Example App".into()
            }
        );

        assert!(!f.blocklist.contains("com.example.app"));
        assert_eq!(f.db.load_blocked_apps().unwrap(), vec!["org.other".to_string()]);
        assert_eq!(*f.notifier.cancelled.lock().unwrap(), vec![NOTIFY_ID_APP_BLOCKED]);

        let shown = f.feedback.shown.lock().unwrap();
        assert_eq!(
            *shown,
            vec![Feedback::AppUnblocked {
                label: "Example App".into()
            }]
        );
        assert!(shown[0].message().contains("Example App"));
    }

    #[test]
    fn test_unresolved_app_falls_back_to_identifier() {
        let f = fixture(&["com.example.app"], &[]);
        f.handler.handle(&UnblockRequest::new("com.example.app")).unwrap();
        assert_eq!(
            *f.feedback.shown.lock().unwrap(),
            vec![Feedback::AppUnblocked {
                label: "com.example.app".into()
            }]
        );
    }

    #[test]
    fn test_empty_request_is_noop() {
        let f = fixture(&["com.example.app"], &[]);

        for request in [UnblockRequest::default(), UnblockRequest::new("")] {
            assert_eq!(f.handler.handle(&request).unwrap(), UnblockOutcome::Ignored);
        }

        assert!(f.blocklist.contains("com.example.app"));
        assert!(f.notifier.cancelled.lock().unwrap().is_empty());
        assert!(f.feedback.shown.lock().unwrap().is_empty());
    }

    #[test]
    fn test_duplicate_request_is_idempotent() {
        let f = fixture(&["com.example.app", "org.other"], &[]);
        let request = UnblockRequest::new("com.example.app");

        f.handler.handle(&request).unwrap();
        let after_first = f.db.load_blocked_apps().unwrap();
        f.handler.handle(&request).unwrap();

        assert_eq!(f.db.load_blocked_apps().unwrap(), after_first);
        assert_eq!(f.blocklist.apps(), after_first);
    }

    #[test]
    fn test_persistence_failure_reports_error_without_confirmation() {
        // a second entry keeps the save from being a bare DELETE
        let f = fixture(&["com.example.app", "org.other"], &["com.example.app"]);
        break_inserts(&f.db);

        let err = f
            .handler
            .handle(&UnblockRequest::new("com.example.app"))
            .unwrap_err();
        assert_eq!(err.kind(), "Persistence");

        // in-memory state restored from storage
        assert!(f.blocklist.contains("com.example.app"));
        assert_eq!(f.blocklist.apps(), f.db.load_blocked_apps().unwrap());
        assert!(f.notifier.cancelled.lock().unwrap().is_empty());

        let shown = f.feedback.shown.lock().unwrap();
        assert_eq!(shown.len(), 1);
        assert!(matches!(&shown[0], Feedback::UnblockFailed { app, .. } if app == "com.example.app"));
    }

    #[test]
    fn test_failure_does_not_affect_later_requests() {
        struct FlakyBlocklist {
            inner: SqliteBlocklist,
            fail_next: Mutex<bool>,
        }

        impl Blocklist for FlakyBlocklist {
            fn add_app(&self, app: &str) -> bool {
                self.inner.add_app(app)
            }
            fn remove_app(&self, app: &str) -> bool {
                self.inner.remove_app(app)
            }
            fn contains(&self, app: &str) -> bool {
                self.inner.contains(app)
            }
            fn save_and_reload(&self) -> anyhow::Result<()> {
                if std::mem::take(&mut *self.fail_next.lock().unwrap()) {
                    anyhow::bail!("disk full");
                }
                self.inner.save_and_reload()
            }
        }

        let db = Arc::new(open_memory_db());
        db.replace_blocked_apps(["com.example.app"]).unwrap();
        let blocklist = Arc::new(FlakyBlocklist {
            inner: SqliteBlocklist::load(Arc::clone(&db)).unwrap(),
            fail_next: Mutex::new(true),
        });
        let feedback = Arc::new(RecordingFeedback::default());
        let handler = BlocklistActionHandler::new(
            blocklist.clone(),
            Arc::new(RecordingNotifier::default()),
            Arc::new(StaticResolver(HashSet::new())),
            feedback.clone(),
        );

        let request = UnblockRequest::new("com.example.app");
        assert!(handler.handle(&request).is_err());
        assert!(handler.handle(&request).is_ok());
        assert!(db.load_blocked_apps().unwrap().is_empty());
        assert_eq!(feedback.shown.lock().unwrap().len(), 2);
    }

    #[test]
    fn test_request_deserializes_from_action_extras() {
        let request: UnblockRequest =
            serde_json::from_str(r#"{"unblock_app":"com.example.app"}"#).unwrap();
        assert_eq!(request, UnblockRequest::new("com.example.app"));

        let empty: UnblockRequest = serde_json::from_str("{}").unwrap();
        assert_eq!(empty.unblock_app, None);
    }

    #[test]
    fn test_request_from_extras() {
        let mut extras = HashMap::new();
        extras.insert("other".to_string(), "x".to_string());
        assert_eq!(UnblockRequest::from_extras(&extras), UnblockRequest::default());

        extras.insert(EXTRA_UNBLOCK_APP.to_string(), "com.example.app".to_string());
        assert_eq!(
            UnblockRequest::from_extras(&extras),
            UnblockRequest::new("com.example.app")
        );
    }

    #[tokio::test]
    async fn test_listener_processes_requests_in_order() {
        let f = fixture(&["a.app", "b.app", "c.app"], &[]);
        let (tx, rx) = mpsc::channel(8);
        let listener = f.handler.spawn_listener(rx);

        tx.send(UnblockRequest::new("a.app")).await.unwrap();
        tx.send(UnblockRequest::default()).await.unwrap();
        tx.send(UnblockRequest::new("c.app")).await.unwrap();
        drop(tx);
        listener.await.unwrap();

        assert_eq!(f.db.load_blocked_apps().unwrap(), vec!["b.app".to_string()]);
        assert_eq!(f.feedback.shown.lock().unwrap().len(), 2);
        assert_eq!(f.notifier.cancelled.lock().unwrap().len(), 2);
    }
}
