mod events;
mod loopback;
pub mod readiness;

pub use events::{event_channel, EventEmitter, EventReceiver};
pub use loopback::LoopbackTransport;
pub use readiness::{ReadinessConfig, ReadinessGate, ReadySignal};

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::domain::error::AppError;
use crate::domain::job::ResumeMode;
use crate::domain::settings::GlobalConfig;

pub const STATUS_STARTED: &str = "started";
pub const STATUS_CANCELLING: &str = "cancelling";
pub const STATUS_IDLE: &str = "idle";
pub const STATUS_SUCCESS: &str = "success";
pub const STATUS_ERROR: &str = "error";

/// 実行側が「実行中のジョブがある」ときに返す拒否メッセージ
pub const EXECUTOR_BUSY_MESSAGE: &str = "A task is already running.";

/// コントローラ → ジョブ実行側/インストーラへのリクエスト
///
/// ワイヤ形式は `{"method": "<name>", "params": {...}}`。
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "method", content = "params", rename_all = "snake_case")]
pub enum BridgeRequest {
    StartTask {
        video_path: String,
        target_lang: String,
        resume_mode: ResumeMode,
    },
    CancelTask,
    CheckTaskResumePoint {
        video_path: String,
    },
    InstallDeps,
    CancelInstallDeps,
    CheckDepStatus,
    GetConfig,
    UpdateConfig {
        updates: serde_json::Value,
    },
}

impl BridgeRequest {
    pub fn method(&self) -> &'static str {
        match self {
            Self::StartTask { .. } => "start_task",
            Self::CancelTask => "cancel_task",
            Self::CheckTaskResumePoint { .. } => "check_task_resume_point",
            Self::InstallDeps => "install_deps",
            Self::CancelInstallDeps => "cancel_install_deps",
            Self::CheckDepStatus => "check_dep_status",
            Self::GetConfig => "get_config",
            Self::UpdateConfig { .. } => "update_config",
        }
    }
}

/// start/cancel/install 系の汎用応答
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallReply {
    pub status: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl CallReply {
    pub fn is(&self, status: &str) -> bool {
        self.status == status
    }

    /// 実行側のスロットが埋まっているという拒否か
    pub fn reports_busy(&self) -> bool {
        !self.is(STATUS_STARTED) && self.message.as_deref() == Some(EXECUTOR_BUSY_MESSAGE)
    }

    /// 拒否理由。メッセージが無ければステータスから組み立てる。
    pub fn rejection_message(&self) -> String {
        self.message
            .clone()
            .unwrap_or_else(|| format!("unexpected status: {}", self.status))
    }
}

/// `update_config` の応答
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfigReply {
    pub status: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config: Option<GlobalConfig>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// 通信路エラー
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("Bridge not ready")]
    NotReady,
    #[error("Bridge method not found: {0}")]
    MethodNotFound(String),
    #[error("Bridge call failed: {0}")]
    Call(String),
}

impl From<TransportError> for AppError {
    fn from(e: TransportError) -> Self {
        match e {
            TransportError::NotReady | TransportError::MethodNotFound(_) => {
                AppError::channel_unavailable(e.to_string())
            }
            TransportError::Call(_) => AppError::internal(e.to_string()),
        }
    }
}

/// 通信路 trait（プロセス間のRPC実装が満たす）
///
/// 実装は request/response のみを担当し、プッシュイベントは
/// `EventEmitter` 経由でコントローラへ流す。
#[async_trait]
pub trait BridgeTransport: Send + Sync {
    /// RPC を受け付けられる状態か
    fn is_ready(&self) -> bool;

    async fn call(&self, request: BridgeRequest) -> Result<serde_json::Value, TransportError>;
}

/// 応答JSONを型付きで取り出す
pub fn decode_reply<T: DeserializeOwned>(
    method: &str,
    value: serde_json::Value,
) -> Result<T, AppError> {
    serde_json::from_value(value)
        .map_err(|e| AppError::protocol(format!("{method} の応答を解釈できません: {e}")))
}
