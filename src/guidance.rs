//! User guidance after a streak of unproductive decode attempts.

use serde::Serialize;
use tokio::time::{Duration, Instant};

/// Rotating tip text shown with each prompt.
pub const TIPS: [&str; 4] = [
    "Buena luz, ~15–25 cm de distancia, incliná un poco el envase.",
    "Centrá el código de barras dentro del recuadro.",
    "Evitá reflejos: alejá el envase de la luz directa.",
    "Si no enfoca, alejate un poco y probá con \"Capturar\".",
];

/// A non-blocking hint for the caller to display.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct GuidanceHint {
    pub message: String,
    pub tip_index: usize,
    pub consecutive_failures: u32,
}

#[derive(Debug, Clone)]
pub struct GuidanceEscalation {
    threshold: u32,
    reprompt_interval: Duration,
    failures: u32,
    prompted: bool,
    last_prompt_at: Option<Instant>,
    next_tip: usize,
}

impl GuidanceEscalation {
    pub fn new(threshold: u32, reprompt_interval: Duration) -> Self {
        Self {
            threshold: threshold.max(1),
            reprompt_interval,
            failures: 0,
            prompted: false,
            last_prompt_at: None,
            next_tip: 0,
        }
    }

    /// Count a `NotFound` or backend error. Returns a hint when this failure
    /// crosses the threshold and no prompt is outstanding.
    ///
    /// A new streak only prompts once `reprompt_interval` has passed since the
    /// previous prompt.
    pub fn record_failure(&mut self, now: Instant) -> Option<GuidanceHint> {
        self.failures = self.failures.saturating_add(1);
        if self.prompted || self.failures < self.threshold {
            return None;
        }
        let rearmed = self
            .last_prompt_at
            .map_or(true, |at| now.saturating_duration_since(at) >= self.reprompt_interval);
        if !rearmed {
            return None;
        }

        self.prompted = true;
        self.last_prompt_at = Some(now);
        let tip_index = self.next_tip;
        self.next_tip = (self.next_tip + 1) % TIPS.len();
        Some(GuidanceHint {
            message: TIPS[tip_index].to_string(),
            tip_index,
            consecutive_failures: self.failures,
        })
    }

    /// An accepted detection ends the streak.
    pub fn record_success(&mut self) {
        self.reset();
    }

    /// The user closed the hint.
    pub fn dismiss(&mut self) {
        self.reset();
    }

    fn reset(&mut self) {
        self.failures = 0;
        self.prompted = false;
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.failures
    }

    pub fn is_prompting(&self) -> bool {
        self.prompted
    }
}
