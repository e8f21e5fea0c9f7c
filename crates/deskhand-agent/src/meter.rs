//! Per-run token accounting across the model phases.
//!
//! Usage is aggregated in memory and emitted as structured log lines under
//! the `token_meter` target: one `start` line per run, one `usage` line per
//! recorded completion, and one `summary` line when the run finishes.

use chrono::Utc;
use parking_lot::Mutex;
use serde::Serialize;
use uuid::Uuid;

use crate::planner::PlannerUsage;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MeterPhase {
    IntentParser,
    Planner,
    ScreenshotFallback,
}

impl MeterPhase {
    fn as_str(self) -> &'static str {
        match self {
            MeterPhase::IntentParser => "intent_parser",
            MeterPhase::Planner => "planner",
            MeterPhase::ScreenshotFallback => "screenshot_fallback",
        }
    }

    fn index(self) -> usize {
        match self {
            MeterPhase::IntentParser => 0,
            MeterPhase::Planner => 1,
            MeterPhase::ScreenshotFallback => 2,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize)]
struct Bucket {
    requests: u64,
    prompt_tokens: u64,
    completion_tokens: u64,
    total_tokens: u64,
}

impl Bucket {
    fn add(&mut self, usage: &PlannerUsage) {
        self.requests += 1;
        self.prompt_tokens += usage.prompt_tokens;
        self.completion_tokens += usage.completion_tokens;
        self.total_tokens += usage.effective_total();
    }
}

#[derive(Debug, Serialize)]
struct ActiveRun {
    run_id: String,
    task_preview: String,
    started_at: String,
    total: Bucket,
    by_phase: [Bucket; 3],
}

/// Token meter shared between the orchestrator and the intent parser.
/// Records are no-ops while disabled or between runs.
pub struct TokenMeter {
    enabled: bool,
    active: Mutex<Option<ActiveRun>>,
}

impl TokenMeter {
    pub fn new(enabled: bool) -> Self {
        Self {
            enabled,
            active: Mutex::new(None),
        }
    }

    pub fn start_run(&self, task: &str) {
        if !self.enabled {
            return;
        }
        let run = ActiveRun {
            run_id: format!("tm_{}", Uuid::new_v4().simple()),
            task_preview: task.chars().take(120).collect(),
            started_at: Utc::now().to_rfc3339(),
            total: Bucket::default(),
            by_phase: [Bucket::default(); 3],
        };
        tracing::info!(
            target: "token_meter",
            event = "start",
            run_id = %run.run_id,
            task = %run.task_preview,
        );
        *self.active.lock() = Some(run);
    }

    pub fn record(&self, phase: MeterPhase, model: &str, usage: &PlannerUsage) {
        if !self.enabled || usage.effective_total() == 0 {
            return;
        }
        let mut guard = self.active.lock();
        let Some(run) = guard.as_mut() else {
            return;
        };
        run.by_phase[phase.index()].add(usage);
        run.total.add(usage);
        tracing::info!(
            target: "token_meter",
            event = "usage",
            run_id = %run.run_id,
            phase = phase.as_str(),
            model,
            prompt_tokens = usage.prompt_tokens,
            completion_tokens = usage.completion_tokens,
            total_tokens = usage.effective_total(),
            cumulative_total_tokens = run.total.total_tokens,
        );
    }

    pub fn finish(&self, outcome: &str, step_count: u32) {
        let Some(run) = self.active.lock().take() else {
            return;
        };
        tracing::info!(
            target: "token_meter",
            event = "summary",
            run_id = %run.run_id,
            outcome,
            started_at = %run.started_at,
            ended_at = %Utc::now().to_rfc3339(),
            step_count,
            total_requests = run.total.requests,
            total_tokens = run.total.total_tokens,
            by_phase = %serde_json::to_string(&run.by_phase).unwrap_or_default(),
            task = %run.task_preview,
        );
    }

    #[cfg(test)]
    fn total_tokens(&self) -> u64 {
        self.active
            .lock()
            .as_ref()
            .map(|run| run.total.total_tokens)
            .unwrap_or(0)
    }
}
