use prometheus::{Encoder, HistogramOpts, HistogramVec, IntCounterVec, Opts, Registry, TextEncoder};
use std::collections::HashSet;

pub struct Metrics {
    request_counter: IntCounterVec,
    failure_counter: IntCounterVec,
    inference_duration: HistogramVec,
    registry: Registry,
}

impl Metrics {
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();

        let request_counter = IntCounterVec::new(
            Opts::new("requests_total", "Total number of requests"),
            &["route"],
        )?;

        let failure_counter = IntCounterVec::new(
            Opts::new("failed_requests_total", "Total number of failed requests"),
            &["route"],
        )?;

        let boundaries = generate_boundaries((5, 25, 45, 245, 1045));

        let inference_duration = HistogramVec::new(
            HistogramOpts::new(
                "inference_duration_ms",
                "Duration of classifier calls in milliseconds",
            )
            .buckets(boundaries),
            &["route"],
        )?;

        registry.register(Box::new(request_counter.clone()))?;
        registry.register(Box::new(failure_counter.clone()))?;
        registry.register(Box::new(inference_duration.clone()))?;

        Ok(Metrics {
            request_counter,
            failure_counter,
            inference_duration,
            registry,
        })
    }

    pub fn record_request(&self, route: &str) {
        self.request_counter.with_label_values(&[route]).inc();
    }

    pub fn record_failure(&self, route: &str) {
        self.failure_counter.with_label_values(&[route]).inc();
    }

    pub fn record_inference_duration(&self, duration_ms: u64, route: &str) {
        self.inference_duration
            .with_label_values(&[route])
            .observe(duration_ms as f64);
    }

    pub fn encode(&self) -> Result<String, prometheus::Error> {
        let mut buffer = Vec::new();
        TextEncoder::new().encode(&self.registry.gather(), &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
    }
}

fn generate_boundaries(parts: (i32, i32, i32, i32, i32)) -> Vec<f64> {
    let first_step: usize = 5;
    let middle_step: usize = 10;
    let end_step: usize = 50;
    let tail_step: usize = 200;
    let first_part = (parts.0..=parts.1).step_by(first_step);
    let middle_part = (parts.1..=parts.2).step_by(middle_step);
    let end_part = (parts.2..=parts.3).step_by(end_step);
    let tail_part = (parts.3..=parts.4).step_by(tail_step);

    let mut seen = HashSet::new();
    first_part
        .chain(middle_part)
        .chain(end_part)
        .chain(tail_part)
        .filter(|&x| seen.insert(x))
        .map(|x| x as f64)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_boundaries() {
        let parts = (5, 25, 45, 245, 1045);
        let get = generate_boundaries(parts);
        let expected = vec![
            5.0, 10.0, 15.0, 20.0, 25.0, 35.0, 45.0, 95.0, 145.0, 195.0, 245.0, 445.0, 645.0,
            845.0, 1045.0,
        ];

        assert_eq!(get, expected);
    }

    #[test]
    fn test_encode_contains_recorded_routes() {
        let metrics = Metrics::new().unwrap();
        metrics.record_request("/predict");
        metrics.record_inference_duration(12, "/predict");

        let text = metrics.encode().unwrap();
        assert!(text.contains("requests_total{route=\"/predict\"} 1"));
        assert!(text.contains("inference_duration_ms_bucket"));
    }
}
