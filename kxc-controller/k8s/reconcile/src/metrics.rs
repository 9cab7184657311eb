use prometheus_client::{
    encoding::EncodeLabelSet,
    metrics::{counter::Counter, family::Family, histogram::Histogram},
    registry::{Registry, Unit},
};
use tokio::time;

#[derive(Clone, Debug)]
pub struct ReconcileMetrics {
    reconciles: Family<ResultLabels, Counter>,
    durations: Family<KindLabels, Histogram>,
}

#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
struct ResultLabels {
    kind: &'static str,
    result: &'static str,
}

#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
struct KindLabels {
    kind: &'static str,
}

// === impl ReconcileMetrics ===

impl ReconcileMetrics {
    pub fn register(prom: &mut Registry) -> Self {
        let reconciles = Family::default();
        prom.register(
            "reconciles",
            "Count of reconcile passes by resource kind and result",
            reconciles.clone(),
        );

        let durations = Family::<KindLabels, Histogram>::new_with_constructor(|| {
            Histogram::new([0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0, 5.0])
        });
        prom.register_with_unit(
            "duration",
            "Histogram of reconcile pass latency by resource kind",
            Unit::Seconds,
            durations.clone(),
        );

        Self {
            reconciles,
            durations,
        }
    }

    /// Records a completed pass. `result` is one of `requeue`, `done`,
    /// `error`, or `standby`.
    pub fn observe(&self, kind: &'static str, result: &'static str, started: time::Instant) {
        self.reconciles
            .get_or_create(&ResultLabels { kind, result })
            .inc();
        self.durations
            .get_or_create(&KindLabels { kind })
            .observe(started.elapsed().as_secs_f64());
    }
}
