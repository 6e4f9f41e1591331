use parking_lot::Mutex;
use serde::Serialize;

use crate::domain::error::ErrorCode;

const MAX_JOB_RECORDS: usize = 500;

/// ローカルメトリクス収集器
pub struct Metrics {
    counters: Mutex<MetricsCounters>,
    jobs: Mutex<Vec<JobRecord>>,
}

#[derive(Debug, Default)]
struct MetricsCounters {
    tasks_started: u64,
    tasks_completed: u64,
    tasks_failed: u64,
    tasks_cancelled: u64,
    installs_started: u64,
    installs_completed: u64,
    installs_failed: u64,
    rejected_busy: u64,
    rejected_channel: u64,
    rejected_other: u64,
}

/// ジョブの結果種別
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum JobOutcome {
    Completed,
    Failed,
    Cancelled,
}

#[derive(Debug, Clone, Serialize)]
pub struct JobRecord {
    pub job_id: String,
    pub outcome: JobOutcome,
    pub duration_ms: u64,
    pub finished_at: String,
}

/// メトリクスサマリー（UIに返す用）
#[derive(Debug, Clone, Serialize)]
pub struct MetricsSummary {
    pub tasks_started: u64,
    pub tasks_completed: u64,
    pub tasks_failed: u64,
    pub tasks_cancelled: u64,
    pub installs_started: u64,
    pub installs_completed: u64,
    pub installs_failed: u64,
    pub rejections: RejectionCounts,
    pub avg_job_ms: Option<f64>,
    pub recent_jobs: Vec<JobRecord>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RejectionCounts {
    pub busy: u64,
    pub channel_unavailable: u64,
    pub other: u64,
}

impl Metrics {
    pub fn new() -> Self {
        Self {
            counters: Mutex::new(MetricsCounters::default()),
            jobs: Mutex::new(Vec::new()),
        }
    }

    pub fn inc_tasks_started(&self) {
        self.counters.lock().tasks_started += 1;
    }

    pub fn inc_installs_started(&self) {
        self.counters.lock().installs_started += 1;
    }

    pub fn record_install_finished(&self, success: bool) {
        let mut c = self.counters.lock();
        if success {
            c.installs_completed += 1;
        } else {
            c.installs_failed += 1;
        }
    }

    pub fn inc_rejection(&self, code: ErrorCode) {
        let mut c = self.counters.lock();
        match code {
            ErrorCode::Busy => c.rejected_busy += 1,
            ErrorCode::ChannelUnavailable => c.rejected_channel += 1,
            _ => c.rejected_other += 1,
        }
    }

    pub fn record_job(&self, job_id: &str, outcome: JobOutcome, duration_ms: u64) {
        {
            let mut c = self.counters.lock();
            match outcome {
                JobOutcome::Completed => c.tasks_completed += 1,
                JobOutcome::Failed => c.tasks_failed += 1,
                JobOutcome::Cancelled => c.tasks_cancelled += 1,
            }
        }

        let record = JobRecord {
            job_id: job_id.to_string(),
            outcome,
            duration_ms,
            finished_at: chrono::Utc::now().to_rfc3339(),
        };
        let mut jobs = self.jobs.lock();
        jobs.push(record);
        if jobs.len() > MAX_JOB_RECORDS {
            let excess = jobs.len() - MAX_JOB_RECORDS;
            jobs.drain(0..excess);
        }
    }

    pub fn summary(&self) -> MetricsSummary {
        let c = self.counters.lock();
        let jobs = self.jobs.lock();

        let avg_job_ms = if jobs.is_empty() {
            None
        } else {
            Some(jobs.iter().map(|r| r.duration_ms as f64).sum::<f64>() / jobs.len() as f64)
        };

        MetricsSummary {
            tasks_started: c.tasks_started,
            tasks_completed: c.tasks_completed,
            tasks_failed: c.tasks_failed,
            tasks_cancelled: c.tasks_cancelled,
            installs_started: c.installs_started,
            installs_completed: c.installs_completed,
            installs_failed: c.installs_failed,
            rejections: RejectionCounts {
                busy: c.rejected_busy,
                channel_unavailable: c.rejected_channel,
                other: c.rejected_other,
            },
            avg_job_ms,
            recent_jobs: jobs.iter().rev().take(20).cloned().collect(),
        }
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}
