use prometheus::{Encoder, IntCounter, IntCounterVec, Opts, Registry, TextEncoder};

#[derive(Clone)]
pub struct Metrics {
    registry: Registry,
    pub transitions_total: IntCounterVec,
    pub assignments_total: IntCounterVec,
    pub bookings_created_total: IntCounter,
    pub location_updates_total: IntCounter,
}

impl Metrics {
    pub fn new() -> Self {
        let registry = Registry::new();

        let transitions_total = IntCounterVec::new(
            Opts::new("transitions_total", "Booking transitions by event"),
            &["event"],
        )
        .expect("valid transitions_total metric");

        let assignments_total = IntCounterVec::new(
            Opts::new("assignments_total", "Assignment attempts by outcome"),
            &["outcome"],
        )
        .expect("valid assignments_total metric");

        let bookings_created_total =
            IntCounter::new("bookings_created_total", "Bookings taken in")
                .expect("valid bookings_created_total metric");

        let location_updates_total =
            IntCounter::new("location_updates_total", "Driver location pings accepted")
                .expect("valid location_updates_total metric");

        registry
            .register(Box::new(transitions_total.clone()))
            .expect("register transitions_total");
        registry
            .register(Box::new(assignments_total.clone()))
            .expect("register assignments_total");
        registry
            .register(Box::new(bookings_created_total.clone()))
            .expect("register bookings_created_total");
        registry
            .register(Box::new(location_updates_total.clone()))
            .expect("register location_updates_total");

        Self {
            registry,
            transitions_total,
            assignments_total,
            bookings_created_total,
            location_updates_total,
        }
    }

    pub fn encode(&self) -> Result<String, String> {
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();

        TextEncoder::new()
            .encode(&metric_families, &mut buffer)
            .map_err(|err| format!("failed to encode metrics: {err}"))?;

        String::from_utf8(buffer).map_err(|err| format!("metrics are not valid utf8: {err}"))
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}
