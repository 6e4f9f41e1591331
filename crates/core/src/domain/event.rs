use serde::{Deserialize, Serialize};

use super::job::Segment;

// ─── BridgeEvent ─────────────────────────────────────────────────

/// バックエンド（ジョブ実行側・インストーラ）からプッシュされるイベント。
///
/// ワイヤ形式は `{"event": "<name>", "data": {...}}`。
/// 旧名 `dep_install_*` も受け付ける。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum BridgeEvent {
    StatusUpdate(StatusUpdate),
    TaskCompleted(TaskCompleted),
    TaskFailed(TaskFailed),
    #[serde(alias = "dep_install_progress")]
    InstallProgress(InstallProgress),
    #[serde(alias = "dep_install_completed")]
    InstallCompleted(InstallFinished),
    #[serde(alias = "dep_install_failed")]
    InstallFailed(InstallFinished),
}

/// イベントの宛先スロット
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventSlot {
    Task,
    Install,
}

impl BridgeEvent {
    /// `onBackendEvent(name, data)` 形式の分割ペイロードから組み立てる
    pub fn from_parts(name: &str, data: serde_json::Value) -> Result<Self, serde_json::Error> {
        serde_json::from_value(serde_json::json!({ "event": name, "data": data }))
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::StatusUpdate(_) => "status_update",
            Self::TaskCompleted(_) => "task_completed",
            Self::TaskFailed(_) => "task_failed",
            Self::InstallProgress(_) => "install_progress",
            Self::InstallCompleted(_) => "install_completed",
            Self::InstallFailed(_) => "install_failed",
        }
    }

    pub fn slot(&self) -> EventSlot {
        match self {
            Self::StatusUpdate(_) | Self::TaskCompleted(_) | Self::TaskFailed(_) => EventSlot::Task,
            Self::InstallProgress(_) | Self::InstallCompleted(_) | Self::InstallFailed(_) => {
                EventSlot::Install
            }
        }
    }

    /// スロットのライフサイクルを終わらせるイベントかどうか
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::StatusUpdate(_) | Self::InstallProgress(_))
    }
}

// ─── Payloads ────────────────────────────────────────────────────

/// 非終端の進捗通知（last-write-wins）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusUpdate {
    #[serde(default)]
    pub message: String,
    pub progress: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stage: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskCompleted {
    pub segments: Vec<Segment>,
    /// 書き出した字幕ファイル
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub srt_path: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskFailed {
    #[serde(default)]
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cancelled: Option<bool>,
}

impl TaskFailed {
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.unwrap_or(false)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstallProgress {
    pub progress: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stage: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstallFinished {
    #[serde(default)]
    pub message: String,
}

/// 進捗値を 0..=100 に丸める。非有限値は 0。
pub fn clamp_progress(raw: f64) -> u8 {
    if !raw.is_finite() {
        return 0;
    }
    raw.round().clamp(0.0, 100.0) as u8
}
