use std::cell::RefCell;
use std::marker::PhantomData;
use std::sync::atomic::{AtomicU64, Ordering};

/// Log target for structured plan lines; routed to `plan.log` by the logger.
pub const PLAN_TARGET: &str = "nexuslite_query::plan";

#[derive(Default)]
pub struct Metrics {
    pub plans_total: AtomicU64,
    pub index_plans_total: AtomicU64,
    pub id_scan_plans_total: AtomicU64,
    pub full_scan_plans_total: AtomicU64,
    pub sorts_total: AtomicU64,
    pub slow_sorts_total: AtomicU64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlanKind {
    Index,
    IdScan,
    FullScan,
}

impl PlanKind {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Index => "index",
            Self::IdScan => "id_scan",
            Self::FullScan => "full_scan",
        }
    }
}

pub(crate) static METRICS: std::sync::LazyLock<Metrics> = std::sync::LazyLock::new(Metrics::default);

#[must_use]
pub fn metrics() -> &'static Metrics {
    &METRICS
}

/// One planning decision, as written to the plan log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlanRecord {
    pub collection: String,
    pub kind: PlanKind,
    pub plan: String,
    pub filter: String,
}

thread_local! {
    static CAPTURED: RefCell<Option<Vec<PlanRecord>>> = const { RefCell::new(None) };
}

/// Collects the plans chosen on the current thread until dropped, so tests
/// can inspect decisions without going through the global logger.
pub struct PlanCapture {
    _thread_bound: PhantomData<*const ()>,
}

impl PlanCapture {
    #[must_use]
    pub fn start() -> Self {
        CAPTURED.with(|c| *c.borrow_mut() = Some(Vec::new()));
        Self { _thread_bound: PhantomData }
    }

    /// Returns and clears the plans recorded so far.
    #[must_use]
    pub fn take(&self) -> Vec<PlanRecord> {
        CAPTURED.with(|c| c.borrow_mut().as_mut().map(std::mem::take).unwrap_or_default())
    }
}

impl Drop for PlanCapture {
    fn drop(&mut self) {
        CAPTURED.with(|c| *c.borrow_mut() = None);
    }
}

/// Counts and logs one planning decision as a JSON line.
pub fn log_plan(collection: &str, kind: PlanKind, explain: &str, filter: &str) {
    METRICS.plans_total.fetch_add(1, Ordering::Relaxed);
    let counter = match kind {
        PlanKind::Index => &METRICS.index_plans_total,
        PlanKind::IdScan => &METRICS.id_scan_plans_total,
        PlanKind::FullScan => &METRICS.full_scan_plans_total,
    };
    counter.fetch_add(1, Ordering::Relaxed);
    let line = serde_json::json!({
        "collection": collection,
        "kind": kind.as_str(),
        "plan": explain,
        "filter": filter,
    });
    log::debug!(target: PLAN_TARGET, "{line}");
    CAPTURED.with(|c| {
        if let Some(records) = c.borrow_mut().as_mut() {
            records.push(PlanRecord {
                collection: collection.to_owned(),
                kind,
                plan: explain.to_owned(),
                filter: filter.to_owned(),
            });
        }
    });
}

/// Records a finished sort materialization; slow ones are logged as warnings.
pub fn log_sort(items: usize, elapsed_ms: u128, slow_ms: u64) {
    METRICS.sorts_total.fetch_add(1, Ordering::Relaxed);
    if elapsed_ms >= u128::from(slow_ms) {
        METRICS.slow_sorts_total.fetch_add(1, Ordering::Relaxed);
        log::warn!(target: PLAN_TARGET, "slow sort: {items} items in {elapsed_ms} ms");
    }
}
