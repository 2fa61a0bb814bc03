//! Live binding between one page and its search engine configuration.
//!
//! Every cycle recomputes treatment state from scratch: fetch the rules, take a
//! fresh snapshot of the results, clear every marked node, then classify and
//! mark. Nothing is read from the page across the fetch, so results added while
//! the rules load are part of the snapshot. Cycles may overlap at the rule
//! fetch; the last one to finish decides the markers, and any staleness is
//! repaired by the next trigger.

use crate::core::classifier::{classify, RuleSet};
use crate::core::registry::{EngineRegistry, SearchEngineConfig};
use crate::core::treatment;
use crate::domain::model::{NodeId, TreatmentKind};
use crate::domain::ports::{Page, RuleStore};
use crate::utils::error::Result;
use crate::utils::subscription::Subscription;
use std::future::Future;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// No engine matches the page; the session never touches it.
    Unbound,
    Idle,
    Cycling,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trigger {
    RulesChanged,
    PageMutated,
}

/// What one cycle saw and did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CycleReport {
    pub results: usize,
    pub reset: usize,
    pub applied: Vec<(NodeId, TreatmentKind)>,
    pub observer_attached: bool,
}

struct ObserverBinding {
    container: NodeId,
    subscription: Subscription,
}

struct CycleGuard<'a>(&'a AtomicUsize);

impl<'a> CycleGuard<'a> {
    fn enter(counter: &'a AtomicUsize) -> Self {
        counter.fetch_add(1, Ordering::SeqCst);
        Self(counter)
    }
}

impl Drop for CycleGuard<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

pub struct TailoringSession<S: RuleStore, P: Page> {
    page: Arc<P>,
    store: Arc<S>,
    engine: Option<SearchEngineConfig>,
    marker_selector: String,
    observer: Mutex<Option<ObserverBinding>>,
    store_subscription: Option<Subscription>,
    in_flight: AtomicUsize,
    completed: AtomicU64,
    trigger_tx: mpsc::UnboundedSender<Trigger>,
    trigger_rx: mpsc::UnboundedReceiver<Trigger>,
}

impl<S: RuleStore, P: Page> TailoringSession<S, P> {
    /// Claims `page` and binds a session to it. Returns `None` when another
    /// session already owns the page.
    pub async fn attach(page: Arc<P>, store: Arc<S>, registry: &EngineRegistry) -> Option<Self> {
        if !page.claim() {
            tracing::debug!("Page {} already has a tailoring session", page.url());
            return None;
        }
        Some(Self::bind(page, store, registry).await)
    }

    /// Resolves the engine for `page` and, if one matches, subscribes to rule
    /// changes and runs the initial cycle.
    pub async fn bind(page: Arc<P>, store: Arc<S>, registry: &EngineRegistry) -> Self {
        let url = page.url();
        let engine = registry.resolve(&url).cloned();
        let (trigger_tx, trigger_rx) = mpsc::unbounded_channel();

        let mut session = Self {
            page,
            store,
            engine,
            marker_selector: TreatmentKind::any_marker_selector(),
            observer: Mutex::new(None),
            store_subscription: None,
            in_flight: AtomicUsize::new(0),
            completed: AtomicU64::new(0),
            trigger_tx,
            trigger_rx,
        };

        let Some(engine_name) = session.engine.as_ref().map(|e| e.name.clone()) else {
            tracing::debug!("No search engine matches {}, session left unbound", url);
            return session;
        };
        tracing::info!("Tailoring {} results on {}", engine_name, url);

        let tx = session.trigger_tx.clone();
        session.store_subscription = Some(session.store.on_change(Arc::new(move || {
            let _ = tx.send(Trigger::RulesChanged);
        })));

        // Failures are already logged by the cycle and leave the page untouched.
        let _ = session.retailor().await;
        session
    }

    pub fn state(&self) -> SessionState {
        if self.engine.is_none() {
            SessionState::Unbound
        } else if self.in_flight.load(Ordering::SeqCst) > 0 {
            SessionState::Cycling
        } else {
            SessionState::Idle
        }
    }

    pub fn engine(&self) -> Option<&SearchEngineConfig> {
        self.engine.as_ref()
    }

    /// Cycles that ran to completion, excluding skipped ones.
    pub fn completed_cycles(&self) -> u64 {
        self.completed.load(Ordering::SeqCst)
    }

    pub fn has_observer(&self) -> bool {
        self.observer
            .lock()
            .map(|observer| observer.is_some())
            .unwrap_or(false)
    }

    /// Runs one reset, classify and apply pass over the current results.
    ///
    /// A failed rule read is returned and logged; markers from earlier cycles
    /// are left as they were.
    pub async fn retailor(&self) -> Result<CycleReport> {
        let mut report = CycleReport::default();
        let Some(engine) = &self.engine else {
            return Ok(report);
        };

        let _cycle = CycleGuard::enter(&self.in_flight);
        let selectors = &engine.selectors;
        let page = self.page.as_ref();

        if page
            .query_selector(None, &selectors.result_container)
            .is_none()
        {
            tracing::debug!(
                "Result container '{}' not found, nothing to tailor",
                selectors.result_container
            );
            return Ok(report);
        }

        let rules = match self.store.get_rules().await {
            Ok(rules) => rules,
            Err(e) => {
                tracing::warn!("Skipping tailoring cycle, keeping current treatments: {}", e);
                return Err(e);
            }
        };

        // The page may have changed while the rules were loading.
        let Some(container) = page.query_selector(None, &selectors.result_container) else {
            tracing::debug!("Result container disappeared during the cycle");
            return Ok(report);
        };
        let snapshot = page.query_selector_all(Some(container), &selectors.result);

        let marked = page.query_selector_all(Some(container), &self.marker_selector);
        for node in &marked {
            treatment::reset(page, *node);
        }
        report.reset = marked.len();
        report.results = snapshot.len();

        let rule_set = RuleSet::compile(&rules);
        for node in snapshot {
            if let Some(kind) = classify(page, node, &selectors.result_link, &rule_set) {
                treatment::apply(page, node, kind);
                report.applied.push((node, kind));
            }
        }

        if engine.observe_mutations {
            report.observer_attached = self.ensure_observer(container);
        }

        self.completed.fetch_add(1, Ordering::SeqCst);
        tracing::debug!(
            "Tailored {} of {} results with {} rules",
            report.applied.len(),
            report.results,
            rule_set.len()
        );
        Ok(report)
    }

    /// Attaches a child-list observer to `container` unless one is already
    /// watching it. Returns `true` when a new observer was attached.
    fn ensure_observer(&self, container: NodeId) -> bool {
        let Ok(mut observer) = self.observer.lock() else {
            return false;
        };

        if observer.as_ref().map(|binding| binding.container) == Some(container) {
            return false;
        }

        if let Some(previous) = observer.take() {
            tracing::debug!("Result container replaced, moving observer");
            previous.subscription.cancel();
        }

        let tx = self.trigger_tx.clone();
        let subscription = self.page.observe_child_list(
            container,
            Arc::new(move || {
                let _ = tx.send(Trigger::PageMutated);
            }),
        );
        *observer = Some(ObserverBinding {
            container,
            subscription,
        });
        true
    }

    async fn handle(&self, trigger: Trigger) {
        tracing::debug!("Retailoring after {:?}", trigger);
        // Errors were logged by the cycle; a failed cycle must not stop the loop.
        let _ = self.retailor().await;
    }

    /// Runs one cycle per queued trigger without waiting for new ones.
    /// Returns the number of triggers handled.
    pub async fn process_pending(&mut self) -> usize {
        let mut handled = 0;
        while let Ok(trigger) = self.trigger_rx.try_recv() {
            self.handle(trigger).await;
            handled += 1;
        }
        handled
    }

    /// Handles triggers as they arrive until `shutdown` resolves.
    pub async fn run_until<F>(&mut self, shutdown: F)
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);

        loop {
            let trigger = tokio::select! {
                _ = &mut shutdown => break,
                trigger = self.trigger_rx.recv() => trigger,
            };

            match trigger {
                Some(trigger) => self.handle(trigger).await,
                None => break,
            }
        }
    }

    /// Disconnects the page observer and the rule-store subscription.
    pub fn shutdown(&mut self) {
        if let Some(subscription) = self.store_subscription.take() {
            subscription.cancel();
        }
        if let Ok(mut observer) = self.observer.lock() {
            if let Some(binding) = observer.take() {
                binding.subscription.cancel();
            }
        }
        tracing::debug!("Tailoring session shut down");
    }
}
