//! Drift reconciliation controller.
//!
//! One background task drives everything: refresh the desired state from
//! Git, enumerate live resources, diff each against its declared manifest,
//! run the state machine against the prior record, upsert. All passes —
//! scheduled and manually triggered — execute on this task, so writes to
//! any `resource_id` are naturally serialised and the store has a single
//! writer.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::Utc;
use serde_json::Value;
use tokio::sync::broadcast;
use tokio::sync::Mutex as AsyncMutex;
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::cluster::ClusterClient;
use crate::config::Config;
use crate::db::{drift_repo, Database};
use crate::detector::DriftDetector;
use crate::error::Result;
use crate::gitops::GitDesiredState;
use crate::hash::hash_state;
use crate::model::{normalize_kind, resource_id, DriftChange, DriftRecord, DriftResult, DriftStatus};
use crate::transition::{next_state, TransitionEvent};

/// Orchestrates periodic and on-demand drift analysis.
pub struct DriftController {
    namespaces: Vec<String>,
    resource_tokens: Vec<String>,
    interval: Duration,
    db: Database,
    cluster: Arc<dyn ClusterClient>,
    detector: DriftDetector,
    desired: AsyncMutex<GitDesiredState>,
    running: AtomicBool,
    shutdown: Arc<AtomicBool>,
    trigger_tx: broadcast::Sender<()>,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl DriftController {
    pub fn new(
        config: &Config,
        db: Database,
        cluster: Arc<dyn ClusterClient>,
        desired: GitDesiredState,
    ) -> Arc<Self> {
        let (trigger_tx, _) = broadcast::channel(16);

        Arc::new(Self {
            namespaces: config.kubernetes.namespaces.clone(),
            resource_tokens: config.kubernetes.resources.clone(),
            interval: Duration::from_secs(config.reconcile.interval_secs),
            db,
            cluster,
            detector: DriftDetector::new(),
            desired: AsyncMutex::new(desired),
            running: AtomicBool::new(false),
            shutdown: Arc::new(AtomicBool::new(false)),
            trigger_tx,
            handle: Mutex::new(None),
        })
    }

    /// Sender used by the HTTP surface to request an immediate pass.
    pub fn trigger_sender(&self) -> broadcast::Sender<()> {
        self.trigger_tx.clone()
    }

    /// Clones the desired-state repository and starts the analysis loop.
    /// Idempotent: a second call while running is a no-op with a warning.
    pub async fn start(self: Arc<Self>) -> Result<()> {
        if self.running.swap(true, Ordering::SeqCst) {
            log::warn!("DriftController is already running");
            return Ok(());
        }

        log::info!("Starting DriftController");

        if let Err(e) = self.desired.lock().await.clone_repo().await {
            self.running.store(false, Ordering::SeqCst);
            return Err(e.into());
        }

        self.shutdown.store(false, Ordering::SeqCst);
        let controller = Arc::clone(&self);
        let trigger_rx = self.trigger_tx.subscribe();
        let handle = tokio::spawn(async move {
            controller.run_loop(trigger_rx).await;
        });

        let mut guard = self.handle.lock().expect("controller handle lock");
        *guard = Some(handle);

        log::info!("DriftController started");
        Ok(())
    }

    /// Requests one immediate pass. Triggers queue behind the in-flight
    /// pass, if any.
    pub fn trigger_manual_analysis(&self) {
        log::info!("Manual drift analysis triggered");
        if self.trigger_tx.send(()).is_err() {
            log::warn!("Analysis loop is not listening for triggers");
        }
    }

    /// Stops the loop and waits for it to exit. No store writes happen
    /// after this returns.
    pub async fn stop(&self) {
        if !self.running.swap(false, Ordering::SeqCst) {
            log::warn!("DriftController is not running");
            return;
        }

        log::info!("Stopping DriftController");
        self.shutdown.store(true, Ordering::SeqCst);
        // Wake the select loop so it observes the shutdown flag.
        let _ = self.trigger_tx.send(());

        let handle = {
            let mut guard = self.handle.lock().expect("controller handle lock");
            guard.take()
        };
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                log::warn!("Analysis loop ended abnormally: {}", e);
            }
        }

        log::info!("DriftController stopped");
    }

    async fn run_loop(&self, mut trigger_rx: broadcast::Receiver<()>) {
        log::info!(
            "Starting periodic drift analysis (interval {}s)",
            self.interval.as_secs()
        );

        let mut timer = tokio::time::interval(self.interval);
        timer.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        timer.tick().await; // the first tick completes immediately

        loop {
            if self.shutdown.load(Ordering::Acquire) {
                break;
            }

            tokio::select! {
                _ = timer.tick() => {}
                result = trigger_rx.recv() => {
                    match result {
                        Ok(()) => {}
                        // Coalesced triggers still mean "run a pass now".
                        Err(broadcast::error::RecvError::Lagged(_)) => {}
                        Err(broadcast::error::RecvError::Closed) => break,
                    }
                }
            }

            if self.shutdown.load(Ordering::Acquire) {
                break;
            }

            self.run_analysis_pass().await;
        }

        self.desired.lock().await.cleanup();
        log::info!("Drift analysis loop stopped");
    }

    /// Runs one full pass over all monitored (namespace, kind) pairs.
    ///
    /// Transient failures are contained: a failed desired-state refresh
    /// aborts the pass, a failed resource listing skips that pair, and a
    /// malformed resource or store error skips that resource. The next
    /// tick is the retry.
    pub async fn run_analysis_pass(&self) {
        log::debug!("Performing drift analysis");

        let mut desired = self.desired.lock().await;
        if let Err(e) = desired.refresh().await {
            log::error!("Failed to refresh desired state from Git: {}", e);
            return;
        }

        let namespaces = if self.namespaces.is_empty() {
            match self.cluster.list_namespaces().await {
                Ok(namespaces) => namespaces,
                Err(e) => {
                    log::error!("Failed to list namespaces: {}", e);
                    return;
                }
            }
        } else {
            self.namespaces.clone()
        };

        log::info!(
            "Starting drift analysis: namespaces={:?} resources={:?}",
            namespaces,
            self.resource_tokens
        );

        for namespace in &namespaces {
            for token in &self.resource_tokens {
                if self.shutdown.load(Ordering::Acquire) {
                    log::info!("Drift analysis interrupted by shutdown");
                    return;
                }
                let kind = normalize_kind(token);
                self.analyze_resources(&desired, namespace, token, &kind).await;
            }
        }

        log::info!("Drift analysis completed");
    }

    async fn analyze_resources(
        &self,
        desired: &GitDesiredState,
        namespace: &str,
        token: &str,
        kind: &str,
    ) {
        log::debug!("Analyzing {} in namespace {}", kind, namespace);

        let live_resources = match self.cluster.list_resources(token, namespace).await {
            Ok(resources) => resources,
            Err(e) => {
                log::error!(
                    "Failed to list {} in namespace {}: {}",
                    kind,
                    namespace,
                    e
                );
                return;
            }
        };

        for live_resource in live_resources {
            if self.shutdown.load(Ordering::Acquire) {
                return;
            }
            self.analyze_single_resource(desired, live_resource, kind, namespace);
        }
    }

    fn analyze_single_resource(
        &self,
        desired: &GitDesiredState,
        live_resource: Value,
        kind: &str,
        namespace: &str,
    ) {
        let Some(metadata) = live_resource.get("metadata").and_then(Value::as_object) else {
            log::warn!(
                "Skipping {} resource in namespace {} without metadata",
                kind,
                namespace
            );
            return;
        };
        let Some(name) = metadata.get("name").and_then(Value::as_str) else {
            log::warn!(
                "Skipping {} resource in namespace {} without metadata.name",
                kind,
                namespace
            );
            return;
        };
        let name = name.to_string();

        let rid = resource_id(kind, namespace, &name);
        log::debug!("Analyzing resource {}", rid);

        let now = Utc::now();
        let outcome = match desired.get_manifest_for_resource(kind, namespace, &name) {
            Some(manifest) => self
                .detector
                .detect_drift(&rid, &live_resource, manifest),
            // Not declared in Git: never considered drifted.
            None => DriftResult::undeclared(rid.clone(), live_resource, now),
        };

        let prior = match drift_repo::find_by_resource_id(&self.db, &rid) {
            Ok(prior) => prior,
            Err(e) => {
                log::error!(
                    "Failed to read prior record for {}; skipping to preserve history: {}",
                    rid,
                    e
                );
                return;
            }
        };

        let decision = next_state(prior.as_ref(), &outcome, now);

        match decision.event {
            Some(TransitionEvent::Detected) => {
                log_drift_detected(kind, &name, &decision.drift_details)
            }
            Some(TransitionEvent::Continued) => {
                log_drift_continued(kind, &name, &decision.drift_details)
            }
            Some(TransitionEvent::Resolved) => log_drift_resolved(kind, &name),
            None => {}
        }

        let record = DriftRecord {
            id: prior
                .as_ref()
                .map(|p| p.id.clone())
                .unwrap_or_else(|| Uuid::new_v4().to_string()),
            resource_id: rid.clone(),
            kind: kind.to_string(),
            namespace: namespace.to_string(),
            name,
            drift_detected: decision.status == DriftStatus::Active,
            drift_status: decision.status,
            drift_details: decision.drift_details,
            last_known_good_hash: outcome.desired_state.as_ref().map(hash_state),
            desired_state: outcome.desired_state,
            live_state: outcome.live_state,
            first_detected: decision.first_detected,
            resolved_at: decision.resolved_at,
            resolution_message: decision.resolution_message,
            last_updated: now,
            created_at: prior.as_ref().map(|p| p.created_at).unwrap_or(now),
        };

        if let Err(e) = drift_repo::upsert(&self.db, &record) {
            log::error!("Failed to save drift record for {}: {}", rid, e);
        }
    }
}

fn log_drift_detected(kind: &str, name: &str, changes: &[DriftChange]) {
    log::warn!(
        "Drift detected resource={}/{} changes={}",
        kind,
        name,
        changes.len()
    );
    log_changes("detected", kind, name, changes);
}

fn log_drift_continued(kind: &str, name: &str, changes: &[DriftChange]) {
    log::warn!(
        "Drift continued resource={}/{} changes={}",
        kind,
        name,
        changes.len()
    );
    log_changes("continued", kind, name, changes);
}

fn log_drift_resolved(kind: &str, name: &str) {
    log::info!(
        "Drift resolved resource={}/{} message=\"Configuration now matches Git\"",
        kind,
        name
    );
}

fn log_changes(transition: &str, kind: &str, name: &str, changes: &[DriftChange]) {
    for change in changes {
        log::info!(
            "Drift {} in resource resource={}/{} field={} from={} to={} type={} severity={}",
            transition,
            kind,
            name,
            change.field,
            change.from,
            change.to,
            change.change_type,
            change.severity
        );
    }
}
