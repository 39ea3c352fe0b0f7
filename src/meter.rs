//! Memory metering and codec timing hooks.
//!
//! The engine reports every interpreter-visible allocation through a
//! single `use_memory(kind, amount)` callback and never inspects totals;
//! enforcing limits is the host's job. When no gauge is attached the
//! reporting helpers collapse to plain calls with no closure overhead.

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::rc::Rc;
use std::time::{Duration, Instant};

/// Kinds of interpreter-visible allocations.
///
/// Kinds are discrete counters: strings and big integers report their
/// length, everything else reports one unit per allocation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum MemoryKind {
    Bool,
    Number,
    BigInteger,
    String,
    Address,
    Array,
    Dictionary,
    Composite,
    StorageReference,
}

/// Host callback receiving allocation reports.
pub trait MemoryGauge {
    fn use_memory(&self, kind: MemoryKind, amount: u64);
}

/// An optional gauge handle held by the storage engine.
///
/// `Meter::disabled()` reports nothing.
#[derive(Clone, Default)]
pub struct Meter {
    gauge: Option<Rc<dyn MemoryGauge>>,
}

impl Meter {
    /// Creates a meter reporting to the given gauge.
    pub fn new(gauge: Rc<dyn MemoryGauge>) -> Self {
        Meter { gauge: Some(gauge) }
    }

    /// Creates a meter that reports nothing.
    pub fn disabled() -> Self {
        Meter { gauge: None }
    }

    /// Reports `amount` units of `kind` if a gauge is attached.
    #[inline]
    pub fn use_memory(&self, kind: MemoryKind, amount: u64) {
        if let Some(gauge) = &self.gauge {
            gauge.use_memory(kind, amount);
        }
    }
}

impl std::fmt::Debug for Meter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Meter")
            .field("enabled", &self.gauge.is_some())
            .finish()
    }
}

/// A gauge that accumulates per-kind totals.
///
/// Useful in tests and demos to assert on metering output.
#[derive(Debug, Default)]
pub struct RecordingGauge {
    totals: RefCell<BTreeMap<MemoryKind, u64>>,
}

impl RecordingGauge {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the accumulated total for a kind.
    pub fn total(&self, kind: MemoryKind) -> u64 {
        self.totals.borrow().get(&kind).copied().unwrap_or(0)
    }
}

impl MemoryGauge for RecordingGauge {
    fn use_memory(&self, kind: MemoryKind, amount: u64) {
        *self.totals.borrow_mut().entry(kind).or_insert(0) += amount;
    }
}

/// Codec operations whose duration is reported to the host.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Metric {
    ValueEncoded,
    ValueDecoded,
}

/// Host callback receiving codec timing reports.
pub trait MetricsReporter {
    fn report(&self, metric: Metric, duration: Duration);
}

/// An optional metrics handle held by the storage engine.
#[derive(Clone, Default)]
pub struct Metrics {
    reporter: Option<Rc<dyn MetricsReporter>>,
}

impl Metrics {
    /// Creates a metrics handle reporting to the given reporter.
    pub fn new(reporter: Rc<dyn MetricsReporter>) -> Self {
        Metrics {
            reporter: Some(reporter),
        }
    }

    /// Creates a metrics handle that reports nothing.
    pub fn disabled() -> Self {
        Metrics { reporter: None }
    }

    /// Runs `work`, reporting its duration under `metric`.
    ///
    /// When no reporter is attached the work runs without timing.
    pub fn measure<T>(&self, metric: Metric, work: impl FnOnce() -> T) -> T {
        match &self.reporter {
            None => work(),
            Some(reporter) => {
                let start = Instant::now();
                let out = work();
                reporter.report(metric, start.elapsed());
                out
            }
        }
    }
}

impl std::fmt::Debug for Metrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Metrics")
            .field("enabled", &self.reporter.is_some())
            .finish()
    }
}
