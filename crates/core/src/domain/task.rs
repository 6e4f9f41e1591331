use chrono::{DateTime, Utc};
use serde::Serialize;

use super::error::AppError;
use super::event::{clamp_progress, BridgeEvent, StatusUpdate, TaskCompleted, TaskFailed};
use super::job::{ResumeMode, Segment};

pub const STARTING_MESSAGE: &str = "Starting...";
pub const CANCELLING_MESSAGE: &str = "Cancelling...";
pub const COMPLETED_MESSAGE: &str = "Task completed successfully.";
pub const CANCELLED_MESSAGE: &str = "Task cancelled by user.";

/// メインスロットのステージ（常にちょうど1つ）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    #[default]
    Idle,
    LoadingModel,
    Transcribing,
    Translating,
    Saving,
    Cancelling,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::LoadingModel => "loading_model",
            Self::Transcribing => "transcribing",
            Self::Translating => "translating",
            Self::Saving => "saving",
            Self::Cancelling => "cancelling",
        }
    }

    /// ジョブ実行側が報告するラベルを解釈する。未知のラベルは None。
    pub fn from_label(label: &str) -> Option<Self> {
        match label {
            "idle" => Some(Self::Idle),
            "loading_model" => Some(Self::LoadingModel),
            "transcribing" => Some(Self::Transcribing),
            "translating" => Some(Self::Translating),
            "saving" => Some(Self::Saving),
            "cancelling" => Some(Self::Cancelling),
            _ => None,
        }
    }

    /// ボタン等に表示する進行中ラベル
    pub fn activity_label(&self) -> &'static str {
        match self {
            Self::LoadingModel => "Loading AI Model...",
            Self::Transcribing => "Transcribing Audio...",
            Self::Translating => "Translating Text...",
            Self::Saving => "Saving Results...",
            Self::Cancelling => "Cancelling...",
            Self::Idle => "Start Production",
        }
    }
}

/// ステージ遷移
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct StageTransition {
    pub prev: Stage,
    pub next: Stage,
}

/// メインスロットの外部公開スナップショット。
///
/// 変更はこのモジュールの遷移関数からのみ行う。`is_processing` は
/// 常に `stage != Idle` と一致する。
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TaskSnapshot {
    pub stage: Stage,
    pub is_processing: bool,
    pub progress: u8,
    pub status_message: String,
    pub results: Vec<Segment>,
    pub job_id: Option<String>,
    pub started_at: Option<DateTime<Utc>>,
    pub output_path: Option<String>,
    pub last_error: Option<AppError>,
}

impl TaskSnapshot {
    pub fn new() -> Self {
        Self {
            stage: Stage::Idle,
            is_processing: false,
            progress: 0,
            status_message: String::new(),
            results: Vec::new(),
            job_id: None,
            started_at: None,
            output_path: None,
            last_error: None,
        }
    }

    fn set_stage(&mut self, stage: Stage) -> StageTransition {
        let prev = self.stage;
        self.stage = stage;
        self.is_processing = stage != Stage::Idle;
        StageTransition { prev, next: stage }
    }

    /// 受理されたジョブを開始する: Idle → LoadingModel
    pub(crate) fn begin(
        &mut self,
        job_id: String,
        resume_mode: ResumeMode,
        now: DateTime<Utc>,
    ) -> StageTransition {
        if resume_mode.is_fresh() {
            self.results.clear();
        }
        self.progress = 0;
        self.status_message = STARTING_MESSAGE.to_string();
        self.job_id = Some(job_id);
        self.started_at = Some(now);
        self.output_path = None;
        self.last_error = None;
        self.set_stage(Stage::LoadingModel)
    }

    /// 実行側に開始を拒否された場合。ステージは Idle のまま。
    pub(crate) fn reject(&mut self, message: &str) {
        self.status_message = format!("Error: {message}");
    }

    /// キャンセル要求が受理された: * → Cancelling
    pub(crate) fn begin_cancel(&mut self) -> Result<StageTransition, AppError> {
        if !self.is_processing {
            return Err(AppError::invalid_state("No task is running."));
        }
        self.status_message = CANCELLING_MESSAGE.to_string();
        Ok(self.set_stage(Stage::Cancelling))
    }

    /// メインスロット宛のイベントを畳み込む。ステージが変わった場合のみ遷移を返す。
    pub fn apply(&mut self, event: &BridgeEvent) -> Option<StageTransition> {
        let prev = self.stage;
        match event {
            BridgeEvent::StatusUpdate(update) => self.apply_status(update),
            BridgeEvent::TaskCompleted(done) => self.complete(done),
            BridgeEvent::TaskFailed(failed) => self.fail(failed),
            _ => return None,
        }
        (prev != self.stage).then_some(StageTransition {
            prev,
            next: self.stage,
        })
    }

    fn apply_status(&mut self, update: &StatusUpdate) {
        self.progress = clamp_progress(update.progress);

        // キャンセル中はラベルもメッセージも上書きしない
        if self.stage == Stage::Cancelling {
            return;
        }
        self.status_message = update.message.clone();

        let Some(label) = update.stage.as_deref() else {
            return;
        };
        match Stage::from_label(label) {
            // 非終端イベントで Idle との出入りはしない
            Some(Stage::Idle) => {
                log::warn!("status_update の idle ラベルを無視します");
            }
            Some(_) if !self.is_processing => {
                log::debug!("ジョブ未実行のため stage={label} を無視します");
            }
            Some(stage) => {
                self.set_stage(stage);
            }
            None => {
                log::warn!("未知のステージラベルを無視します: {label}");
            }
        }
    }

    fn complete(&mut self, done: &TaskCompleted) {
        self.results = done.segments.clone();
        self.output_path = done.srt_path.clone();
        self.progress = 100;
        self.status_message = COMPLETED_MESSAGE.to_string();
        self.set_stage(Stage::Idle);
    }

    fn fail(&mut self, failed: &TaskFailed) {
        if failed.is_cancelled() {
            self.status_message = CANCELLED_MESSAGE.to_string();
        } else {
            self.status_message = format!("Error: {}", failed.message);
            self.last_error = Some(AppError::job_failure(failed.message.clone(), false));
        }
        self.set_stage(Stage::Idle);
    }
}

impl Default for TaskSnapshot {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn now() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2025-01-15T10:30:00Z")
            .unwrap()
            .with_timezone(&Utc)
    }

    fn status(progress: f64, stage: Option<&str>) -> BridgeEvent {
        BridgeEvent::StatusUpdate(StatusUpdate {
            message: format!("at {progress}"),
            progress,
            stage: stage.map(str::to_string),
        })
    }

    fn completed(segments: Vec<Segment>) -> BridgeEvent {
        BridgeEvent::TaskCompleted(TaskCompleted {
            segments,
            srt_path: Some("/v.srt".to_string()),
        })
    }

    fn failed(message: &str, cancelled: Option<bool>) -> BridgeEvent {
        BridgeEvent::TaskFailed(TaskFailed {
            message: message.to_string(),
            cancelled,
        })
    }

    fn running() -> TaskSnapshot {
        let mut snap = TaskSnapshot::new();
        snap.begin("job-1".to_string(), ResumeMode::Fresh, now());
        snap
    }

    #[test]
    fn test_new_is_idle() {
        let snap = TaskSnapshot::new();
        assert_eq!(snap.stage, Stage::Idle);
        assert!(!snap.is_processing);
        assert!(snap.results.is_empty());
    }

    #[test]
    fn test_begin_fresh_clears_results() {
        let mut snap = TaskSnapshot::new();
        snap.results = vec![Segment::new(0.0, 1.0, "old")];
        let t = snap.begin("job-1".to_string(), ResumeMode::Fresh, now());
        assert_eq!(t.prev, Stage::Idle);
        assert_eq!(t.next, Stage::LoadingModel);
        assert!(snap.results.is_empty());
        assert!(snap.is_processing);
        assert_eq!(snap.progress, 0);
        assert_eq!(snap.status_message, STARTING_MESSAGE);
    }

    #[test]
    fn test_begin_resume_keeps_results() {
        let mut snap = TaskSnapshot::new();
        snap.results = vec![Segment::new(0.0, 1.0, "old")];
        snap.begin("job-1".to_string(), ResumeMode::UseTranscript, now());
        assert_eq!(snap.results.len(), 1);
    }

    #[test]
    fn test_status_update_sets_stage_and_progress() {
        let mut snap = running();
        let t = snap.apply(&status(40.0, Some("transcribing"))).unwrap();
        assert_eq!(t.next, Stage::Transcribing);
        assert_eq!(snap.progress, 40);
        assert_eq!(snap.status_message, "at 40");
    }

    #[test]
    fn test_status_update_accepts_out_of_order_stages_and_progress() {
        let mut snap = running();
        snap.apply(&status(95.0, Some("saving")));
        snap.apply(&status(20.0, Some("transcribing")));
        assert_eq!(snap.stage, Stage::Transcribing);
        assert_eq!(snap.progress, 20);
    }

    #[test]
    fn test_status_update_ignores_unknown_and_idle_labels() {
        let mut snap = running();
        assert!(snap.apply(&status(10.0, Some("warming_up"))).is_none());
        assert_eq!(snap.stage, Stage::LoadingModel);
        assert!(snap.apply(&status(11.0, Some("idle"))).is_none());
        assert!(snap.is_processing);
    }

    #[test]
    fn test_status_update_while_idle_does_not_start_processing() {
        let mut snap = TaskSnapshot::new();
        snap.apply(&status(50.0, Some("translating")));
        assert_eq!(snap.stage, Stage::Idle);
        assert!(!snap.is_processing);
        assert_eq!(snap.progress, 50);
    }

    #[test]
    fn test_cancelling_is_sticky_until_terminal() {
        let mut snap = running();
        snap.begin_cancel().unwrap();
        snap.apply(&status(70.0, Some("translating")));
        assert_eq!(snap.stage, Stage::Cancelling);
        assert_eq!(snap.status_message, CANCELLING_MESSAGE);
        assert_eq!(snap.progress, 70);

        snap.apply(&failed("Task cancelled by user", Some(true)));
        assert_eq!(snap.stage, Stage::Idle);
        assert!(!snap.is_processing);
        assert_eq!(snap.status_message, CANCELLED_MESSAGE);
        assert!(snap.last_error.is_none());
    }

    #[test]
    fn test_begin_cancel_requires_processing() {
        let mut snap = TaskSnapshot::new();
        let before = snap.clone();
        assert!(snap.begin_cancel().is_err());
        assert_eq!(snap, before);
    }

    #[test]
    fn test_completed_replaces_results() {
        let mut snap = running();
        let seg = Segment::new(0.0, 5.0, "hi").translated("salut");
        let t = snap.apply(&completed(vec![seg.clone()])).unwrap();
        assert_eq!(t.next, Stage::Idle);
        assert_eq!(snap.results, vec![seg]);
        assert_eq!(snap.progress, 100);
        assert_eq!(snap.output_path.as_deref(), Some("/v.srt"));
        assert_eq!(snap.status_message, COMPLETED_MESSAGE);
    }

    #[test]
    fn test_failed_messages_differ_by_cancel_flag() {
        let mut a = running();
        a.apply(&failed("disk full", None));
        let mut b = running();
        b.apply(&failed("disk full", Some(true)));
        assert_eq!(a.status_message, "Error: disk full");
        assert_eq!(b.status_message, CANCELLED_MESSAGE);
        assert_ne!(a.status_message, b.status_message);
        assert_eq!(a.last_error.as_ref().map(|e| e.message.as_str()), Some("disk full"));
    }

    #[test]
    fn test_failed_keeps_previous_results() {
        let mut snap = TaskSnapshot::new();
        snap.results = vec![Segment::new(0.0, 1.0, "kept")];
        snap.begin("job-2".to_string(), ResumeMode::UseAudio, now());
        snap.apply(&failed("network", None));
        assert_eq!(snap.results.len(), 1);
    }

    #[test]
    fn test_duplicate_terminal_is_idempotent() {
        let mut snap = running();
        let ev = completed(vec![Segment::new(0.0, 1.0, "a")]);
        assert!(snap.apply(&ev).is_some());
        let once = snap.clone();
        assert!(snap.apply(&ev).is_none());
        assert_eq!(snap, once);
    }

    #[test]
    fn test_reject_keeps_idle() {
        let mut snap = TaskSnapshot::new();
        snap.reject("File not found.");
        assert_eq!(snap.stage, Stage::Idle);
        assert_eq!(snap.status_message, "Error: File not found.");
    }

    #[test]
    fn test_processing_flag_tracks_stage_for_all_short_sequences() {
        let events = vec![
            status(10.0, Some("transcribing")),
            status(60.0, Some("translating")),
            status(95.0, Some("saving")),
            status(5.0, Some("idle")),
            status(7.0, Some("bogus")),
            completed(vec![Segment::new(0.0, 1.0, "x")]),
            failed("boom", None),
            failed("stop", Some(true)),
        ];

        for a in &events {
            for b in &events {
                for c in &events {
                    for start_running in [false, true] {
                        let mut snap = if start_running { running() } else { TaskSnapshot::new() };
                        for ev in [a, b, c] {
                            let was_processing = snap.is_processing;
                            snap.apply(ev);
                            assert_eq!(snap.is_processing, snap.stage != Stage::Idle);
                            // 処理中フラグを落とすのは終端イベントのみ
                            if was_processing && !snap.is_processing {
                                assert!(ev.is_terminal());
                            }
                        }
                    }
                }
            }
        }
    }

    #[test]
    fn test_activity_labels() {
        assert_eq!(Stage::Idle.activity_label(), "Start Production");
        assert_eq!(Stage::Translating.activity_label(), "Translating Text...");
        assert_eq!(Stage::from_label("loading_model"), Some(Stage::LoadingModel));
        assert_eq!(Stage::Saving.as_str(), "saving");
    }
}
