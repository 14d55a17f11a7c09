//! A synthetic learner: reaction times drawn from a per-LEGO baseline with
//! jitter, plus an occasional deliberately slow response to exercise spike
//! detection and the mastery regression path.

use rand::Rng;

pub struct SimulatedLearner {
    pub base_latency_ms: u32,
    pub jitter_ms: u32,
    pub spike_probability: f64,
    pub spike_multiplier: f64,
}

impl SimulatedLearner {
    pub fn new(base_latency_ms: u32) -> Self {
        Self {
            base_latency_ms,
            jitter_ms: base_latency_ms / 4,
            spike_probability: 0.12,
            spike_multiplier: 5.0,
        }
    }

    pub fn respond(&mut self, rng: &mut impl Rng) -> u32 {
        let jitter = rng.gen_range(0..=self.jitter_ms.max(1)) as i64 - (self.jitter_ms as i64 / 2);
        let normal = (self.base_latency_ms as i64 + jitter).max(200) as u32;

        if rng.gen_bool(self.spike_probability) {
            ((normal as f64) * self.spike_multiplier) as u32
        } else {
            // Responses get a little faster as the learner warms up.
            self.base_latency_ms = (self.base_latency_ms.saturating_sub(5)).max(400);
            normal
        }
    }
}
