//! Debounced auto-sync scheduler.
//!
//! Local edits arrive as [`RegistryEvent::BecameDirty`] notifications. Each
//! one (re)arms a single debounce timer; once edits go quiet for the debounce
//! window a cycle saves every selected dirty factory, one at a time, in
//! selection order.
//!
//! # Cycle
//!
//! 1. Skip entirely unless auto-sync is enabled, not suspended, signed in and
//!    a namespace is set.
//! 2. Candidates = selected factories that are dirty, in selection order.
//! 3. Per candidate: conflict check (unless fresh), then a retried save.
//!
//! Configuration and the registry may change under a running cycle. Guards
//! are therefore re-evaluated before each candidate and after every remote
//! call: a removed or deselected factory is skipped, while disabling
//! auto-sync (or [`cleanup`](AutoSyncScheduler::cleanup)) halts the cycle.
//! A remote call that settles after its guards failed has no effect.

use crate::auth::AuthState;
use crate::clock::{Clock, SystemClock};
use crate::cloud::RemoteStore;
use crate::config::{AutoSyncConfig, SyncTimings};
use crate::conflict::{ConflictCheck, ConflictGuard};
use crate::registry::{EntityRegistry, RegistryEvent};
use crate::retry::{RetryOutcome, RetryPolicy};
use crate::shutdown::{Shutdown, ShutdownTrigger};
use foundry_types::{ConflictInfo, TrackedEntity};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{broadcast, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

const EVENT_CAPACITY: usize = 64;

/// Why a cycle did not run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// Auto-sync is switched off.
    Disabled,
    /// Auto-sync is suspended.
    Suspended,
    /// No signed-in session.
    NotAuthenticated,
    /// No namespace chosen.
    NoNamespace,
    /// The scheduler was cleaned up.
    ShutDown,
}

/// Summary of one cycle.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CycleReport {
    /// Set when the cycle did not run at all.
    pub skipped_because: Option<SkipReason>,
    /// Factories considered, in processing order.
    pub candidates: Vec<String>,
    /// Factories saved successfully.
    pub saved: Vec<String>,
    /// Factories put into conflict.
    pub conflicts: Vec<String>,
    /// Factories whose conflict check or save failed.
    pub failed: Vec<String>,
    /// Factories skipped because they were removed, deselected or no longer
    /// dirty.
    pub skipped: Vec<String>,
    /// True if the cycle stopped before finishing its candidates.
    pub halted: bool,
}

/// Progress notifications for observers such as a status bar.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncEvent {
    /// A cycle fired but did not run.
    CycleSkipped(SkipReason),
    /// A cycle started.
    CycleStarted {
        /// Factories about to be processed.
        candidates: Vec<String>,
    },
    /// A factory was saved.
    EntitySaved {
        /// The factory.
        name: String,
        /// Attempts it took.
        attempts: usize,
    },
    /// Another device wrote a factory's remote copy.
    ConflictDetected(ConflictInfo),
    /// Every save attempt for a factory failed.
    RetriesExhausted {
        /// The factory.
        name: String,
        /// The final error message.
        error: String,
        /// Attempts made.
        attempts: usize,
    },
    /// A cycle finished or halted.
    CycleFinished(CycleReport),
}

/// Result of re-evaluating the guards for one candidate.
enum Guard {
    Proceed {
        entity: TrackedEntity,
        namespace: String,
    },
    Skip,
    Halt,
}

enum Flow {
    Continue,
    Halt,
}

struct Session {
    shutdown: ShutdownTrigger,
    closed: bool,
    /// Bumped on every (re)arm so a stale timer can tell it was replaced.
    arm: u64,
    debounce: Option<JoinHandle<()>>,
    listener: Option<JoinHandle<()>>,
}

struct Inner {
    store: Arc<dyn RemoteStore>,
    registry: Arc<EntityRegistry>,
    config: Arc<AutoSyncConfig>,
    auth: Arc<dyn AuthState>,
    clock: Arc<dyn Clock>,
    debounce: Duration,
    guard: ConflictGuard,
    retry: RetryPolicy,
    session: Mutex<Session>,
    /// Held for the whole of a cycle.
    cycle_lock: Mutex<()>,
    events: broadcast::Sender<SyncEvent>,
}

/// The auto-sync engine. Construct once and share the handle.
pub struct AutoSyncScheduler {
    inner: Arc<Inner>,
}

impl AutoSyncScheduler {
    /// Creates a scheduler with the default timings and the system clock.
    pub fn new(
        store: Arc<dyn RemoteStore>,
        registry: Arc<EntityRegistry>,
        config: Arc<AutoSyncConfig>,
        auth: Arc<dyn AuthState>,
    ) -> Self {
        Self::with_options(
            store,
            registry,
            config,
            auth,
            &SyncTimings::default(),
            Arc::new(SystemClock),
        )
    }

    /// Creates a scheduler with custom timings and clock.
    pub fn with_options(
        store: Arc<dyn RemoteStore>,
        registry: Arc<EntityRegistry>,
        config: Arc<AutoSyncConfig>,
        auth: Arc<dyn AuthState>,
        timings: &SyncTimings,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            inner: Arc::new(Inner {
                store,
                registry,
                config,
                auth,
                clock,
                debounce: timings.debounce(),
                guard: ConflictGuard::new(timings.freshness_window()),
                retry: RetryPolicy::new(timings.retry_delays()),
                session: Mutex::new(Session {
                    shutdown: ShutdownTrigger::new(),
                    closed: false,
                    arm: 0,
                    debounce: None,
                    listener: None,
                }),
                cycle_lock: Mutex::new(()),
                events,
            }),
        }
    }

    /// Subscribes to progress notifications.
    pub fn subscribe(&self) -> broadcast::Receiver<SyncEvent> {
        self.inner.events.subscribe()
    }

    /// Wires registry edits to [`schedule_save`](Self::schedule_save).
    ///
    /// Re-opens a scheduler closed by [`cleanup`](Self::cleanup). Calling it
    /// again replaces the previous listener.
    pub async fn initialize(&self) {
        let mut session = self.inner.session.lock().await;
        if session.closed {
            session.shutdown = ShutdownTrigger::new();
            session.closed = false;
        }
        if let Some(listener) = session.listener.take() {
            listener.abort();
        }

        let mut rx = self.inner.registry.subscribe();
        let weak = Arc::downgrade(&self.inner);
        session.listener = Some(tokio::spawn(async move {
            loop {
                let name = match rx.recv().await {
                    Ok(RegistryEvent::BecameDirty(name)) => Some(name),
                    Ok(RegistryEvent::Removed(_)) => continue,
                    Err(RecvError::Lagged(missed)) => {
                        warn!("Dirty listener lagged, missed {} events", missed);
                        None
                    }
                    Err(RecvError::Closed) => break,
                };

                let Some(inner) = weak.upgrade() else {
                    break;
                };
                // After a lag the missed names are unknown, so always rearm
                let eligible = match &name {
                    Some(name) => inner.is_eligible(name).await,
                    None => true,
                };
                if eligible {
                    inner.schedule_save().await;
                } else if let Some(name) = name {
                    debug!("{} edited but not eligible for auto-sync", name);
                }
            }
        }));

        info!("Auto-sync scheduler initialized");
    }

    /// (Re)arms the debounce timer. Calls within the window coalesce into one
    /// cycle that runs once the window elapses after the last call.
    pub async fn schedule_save(&self) {
        self.inner.schedule_save().await;
    }

    /// Cancels the pending debounce timer, the dirty listener and any pending
    /// retry. A cycle in progress stops before its next remote call.
    pub async fn cleanup(&self) {
        let mut session = self.inner.session.lock().await;
        session.closed = true;
        session.shutdown.trigger();
        if let Some(timer) = session.debounce.take() {
            timer.abort();
        }
        if let Some(listener) = session.listener.take() {
            listener.abort();
        }
        info!("Auto-sync scheduler cleaned up");
    }

    /// Pauses auto-sync; cycles that fire while suspended are skipped.
    pub async fn suspend(&self) {
        self.inner.config.suspend().await;
        debug!("Auto-sync suspended");
    }

    /// Resumes auto-sync and schedules a save for edits made meanwhile.
    pub async fn resume(&self) {
        self.inner.config.resume().await;
        debug!("Auto-sync resumed");
        let selected = self.inner.config.selected_entities().await;
        if !self.inner.registry.dirty_among(&selected).await.is_empty() {
            self.inner.schedule_save().await;
        }
    }

    /// Clears a conflict after the user chose to keep the local copy.
    ///
    /// The store is told the conflicting remote write has been seen, so later
    /// cycles overwrite it instead of flagging it again. Returns `false` if
    /// `name` is not in conflict.
    pub async fn resolve_conflict(&self, name: &str) -> bool {
        let Some(info) = self.inner.registry.get(name).await.and_then(|e| e.conflict) else {
            return false;
        };
        let namespace = self.inner.config.namespace().await;
        if !namespace.is_empty() {
            self.inner
                .store
                .acknowledge(&namespace, name, info.cloud_timestamp)
                .await;
        }
        let resolved = self
            .inner
            .registry
            .resolve_conflict(name, self.inner.clock.now())
            .await;
        if resolved {
            info!("Conflict on {} resolved in favour of the local copy", name);
        }
        resolved
    }

    /// Returns whether a debounce timer is armed.
    pub async fn has_pending_save(&self) -> bool {
        self.inner
            .session
            .lock()
            .await
            .debounce
            .as_ref()
            .is_some_and(|timer| !timer.is_finished())
    }

    /// Runs a cycle immediately, bypassing the debounce window. Waits for a
    /// cycle already in progress to finish first.
    pub async fn sync_now(&self) -> CycleReport {
        let shutdown = self.inner.session.lock().await.shutdown.subscribe();
        self.inner.run_cycle(shutdown).await
    }
}

impl Inner {
    fn emit(&self, event: SyncEvent) {
        // No subscribers is fine
        let _ = self.events.send(event);
    }

    async fn is_eligible(&self, name: &str) -> bool {
        self.config.enabled().await
            && !self.config.is_suspended().await
            && self.config.is_selected(name).await
    }

    async fn schedule_save(self: &Arc<Self>) {
        let mut session = self.session.lock().await;
        if session.closed {
            debug!("Scheduler cleaned up, ignoring save request");
            return;
        }
        if let Some(pending) = session.debounce.take() {
            pending.abort();
        }
        session.arm += 1;

        let arm = session.arm;
        let delay = self.debounce;
        let shutdown = session.shutdown.subscribe();
        let weak: Weak<Inner> = Arc::downgrade(self);
        session.debounce = Some(tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let Some(inner) = weak.upgrade() else {
                return;
            };
            {
                let mut session = inner.session.lock().await;
                if session.arm != arm {
                    return;
                }
                session.debounce = None;
            }
            inner.run_cycle(shutdown).await;
        }));
        debug!("Auto-save scheduled in {:?}", delay);
    }

    async fn skip_reason(&self) -> Option<SkipReason> {
        if !self.config.enabled().await {
            Some(SkipReason::Disabled)
        } else if self.config.is_suspended().await {
            Some(SkipReason::Suspended)
        } else if !self.auth.is_authenticated() {
            Some(SkipReason::NotAuthenticated)
        } else if self.config.namespace().await.is_empty() {
            Some(SkipReason::NoNamespace)
        } else {
            None
        }
    }

    async fn run_cycle(&self, mut shutdown: Shutdown) -> CycleReport {
        let _cycle = self.cycle_lock.lock().await;
        let mut report = CycleReport::default();

        let skip = if shutdown.is_triggered() {
            Some(SkipReason::ShutDown)
        } else {
            self.skip_reason().await
        };
        if let Some(reason) = skip {
            debug!("Auto-sync cycle skipped: {:?}", reason);
            report.skipped_because = Some(reason);
            self.emit(SyncEvent::CycleSkipped(reason));
            return report;
        }

        let selected = self.config.selected_entities().await;
        report.candidates = self.registry.dirty_among(&selected).await;
        info!(
            "Auto-sync cycle: {} of {} selected factories dirty",
            report.candidates.len(),
            selected.len()
        );
        self.emit(SyncEvent::CycleStarted {
            candidates: report.candidates.clone(),
        });

        for name in report.candidates.clone() {
            if let Flow::Halt = self.sync_entity(&name, &mut shutdown, &mut report).await {
                info!("Auto-sync cycle halted before finishing");
                report.halted = true;
                break;
            }
        }

        info!(
            "Auto-sync cycle finished: {} saved, {} conflicts, {} failed",
            report.saved.len(),
            report.conflicts.len(),
            report.failed.len()
        );
        self.emit(SyncEvent::CycleFinished(report.clone()));
        report
    }

    /// Re-evaluates every guard for `name`.
    async fn guards(&self, name: &str) -> Guard {
        if !self.config.enabled().await {
            return Guard::Halt;
        }
        let namespace = self.config.namespace().await;
        if namespace.is_empty() {
            return Guard::Halt;
        }
        let Some(entity) = self.registry.get(name).await else {
            return Guard::Skip;
        };
        if !self.config.is_selected(name).await || !entity.is_dirty() {
            return Guard::Skip;
        }
        Guard::Proceed { entity, namespace }
    }

    async fn still_wanted(&self, name: &str) -> bool {
        matches!(self.guards(name).await, Guard::Proceed { .. })
    }

    /// Checks guards after a suspension point. Returns the flow to take if
    /// the candidate must be abandoned.
    async fn checkpoint(
        &self,
        name: &str,
        shutdown: &Shutdown,
        report: &mut CycleReport,
    ) -> Option<Flow> {
        if shutdown.is_triggered() {
            return Some(Flow::Halt);
        }
        match self.guards(name).await {
            Guard::Proceed { .. } => None,
            Guard::Skip => {
                debug!("{} removed, deselected or no longer dirty; skipping", name);
                report.skipped.push(name.to_string());
                Some(Flow::Continue)
            }
            Guard::Halt => Some(Flow::Halt),
        }
    }

    async fn sync_entity(
        &self,
        name: &str,
        shutdown: &mut Shutdown,
        report: &mut CycleReport,
    ) -> Flow {
        if shutdown.is_triggered() {
            return Flow::Halt;
        }
        let (entity, namespace) = match self.guards(name).await {
            Guard::Proceed { entity, namespace } => (entity, namespace),
            Guard::Skip => {
                debug!("{} removed, deselected or no longer dirty; skipping", name);
                report.skipped.push(name.to_string());
                return Flow::Continue;
            }
            Guard::Halt => return Flow::Halt,
        };
        let revision = entity.revision;

        let check = self
            .guard
            .check(self.store.as_ref(), &namespace, &entity, self.clock.now())
            .await;
        if let Some(flow) = self.checkpoint(name, shutdown, report).await {
            return flow;
        }

        match check {
            Ok(ConflictCheck::Conflict(info)) => {
                warn!("Conflict on {}: {}", name, info);
                let message = format!("Sync conflict: {info}");
                self.registry.set_sync_conflict(name, info.clone()).await;
                self.config.set_global_error(message).await;
                self.emit(SyncEvent::ConflictDetected(info));
                report.conflicts.push(name.to_string());
                return Flow::Continue;
            }
            Ok(ConflictCheck::Skipped | ConflictCheck::Clear) => {}
            Err(e) => {
                warn!("Conflict check for {} failed, not saving: {}", name, e);
                let message = e.to_string();
                self.registry.set_sync_error(name, message.clone()).await;
                self.config
                    .set_global_error(format!(
                        "Auto-sync of \"{name}\" failed: could not check for conflicts: {message}"
                    ))
                    .await;
                report.failed.push(name.to_string());
                return Flow::Continue;
            }
        }

        let store = self.store.as_ref();
        let ns = namespace.as_str();
        let outcome = self
            .retry
            .run(
                name,
                shutdown,
                || self.still_wanted(name),
                move |attempt| {
                    debug!("Saving {} to {} (attempt {})", name, ns, attempt + 1);
                    store.save(ns, name)
                },
            )
            .await;

        match outcome {
            RetryOutcome::Succeeded { attempts, .. } => {
                if let Some(flow) = self.checkpoint(name, shutdown, report).await {
                    return flow;
                }
                self.registry
                    .mark_synced(name, revision, self.clock.now())
                    .await;
                info!("Auto-saved {}", name);
                self.emit(SyncEvent::EntitySaved {
                    name: name.to_string(),
                    attempts,
                });
                report.saved.push(name.to_string());
                Flow::Continue
            }
            RetryOutcome::Exhausted { error, attempts } => {
                if let Some(flow) = self.checkpoint(name, shutdown, report).await {
                    return flow;
                }
                let message = error.to_string();
                self.registry.set_sync_error(name, message.clone()).await;
                self.config
                    .set_global_error(format!("Auto-sync of \"{name}\" failed: {message}"))
                    .await;
                self.emit(SyncEvent::RetriesExhausted {
                    name: name.to_string(),
                    error: message,
                    attempts,
                });
                report.failed.push(name.to_string());
                Flow::Continue
            }
            RetryOutcome::Interrupted { .. } => self
                .checkpoint(name, shutdown, report)
                .await
                .unwrap_or(Flow::Continue),
        }
    }
}
