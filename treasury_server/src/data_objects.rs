use serde::{Deserialize, Serialize};
use serde_json::Value;
use treasury_engine::{
    BatchRunResult,
    MonitorRunResult,
    OutboxRunResult,
    PayoutRunResult,
    RunError,
    SweepRunResult,
    TreasuryReport,
};

/// The envelope every cron endpoint returns. Partial failure is data, not an HTTP error: the
/// scheduler only sees a non-200 when the whole endpoint crashed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunSummary {
    pub processed: u32,
    pub succeeded: u32,
    pub failed: u32,
    pub errors: Vec<RunError>,
    /// The full pipeline-specific result.
    pub detail: Value,
}

impl RunSummary {
    fn new(processed: u32, succeeded: u32, failed: u32, errors: Vec<RunError>, detail: Value) -> Self {
        Self { processed, succeeded, failed, errors, detail }
    }
}

impl From<MonitorRunResult> for RunSummary {
    fn from(r: MonitorRunResult) -> Self {
        let failed = r.errors.len() as u32;
        let succeeded = r.processed - failed;
        let errors = r.errors.clone();
        let detail = serde_json::to_value(&r).unwrap_or(Value::Null);
        Self::new(r.processed, succeeded, failed, errors, detail)
    }
}

impl From<BatchRunResult> for RunSummary {
    fn from(r: BatchRunResult) -> Self {
        let batches = [r.direct_bonus_batch.as_ref(), r.residual_batch.as_ref()];
        let succeeded = batches.iter().flatten().count() as u32;
        let detail = serde_json::to_value(&r).unwrap_or(Value::Null);
        Self::new(succeeded, succeeded, 0, Vec::new(), detail)
    }
}

impl From<PayoutRunResult> for RunSummary {
    fn from(r: PayoutRunResult) -> Self {
        let failed = r.failed + r.reconciliation_required + r.errors.len() as u32;
        let errors = r.errors.clone();
        let detail = serde_json::to_value(&r).unwrap_or(Value::Null);
        Self::new(r.processed, r.executed + r.skipped, failed, errors, detail)
    }
}

impl From<SweepRunResult> for RunSummary {
    fn from(r: SweepRunResult) -> Self {
        let errors = r.errors.clone();
        let detail = serde_json::to_value(&r).unwrap_or(Value::Null);
        Self::new(r.processed, r.advanced + r.pending, r.failed + errors.len() as u32, errors, detail)
    }
}

impl From<TreasuryReport> for RunSummary {
    fn from(r: TreasuryReport) -> Self {
        let detail = serde_json::to_value(&r).unwrap_or(Value::Null);
        Self::new(1, 1, 0, Vec::new(), detail)
    }
}

impl From<OutboxRunResult> for RunSummary {
    fn from(r: OutboxRunResult) -> Self {
        let detail = serde_json::to_value(&r).unwrap_or(Value::Null);
        Self::new(r.processed, r.delivered + r.queued, r.failed, Vec::new(), detail)
    }
}
