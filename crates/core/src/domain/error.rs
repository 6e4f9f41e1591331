use serde::Serialize;

/// アプリケーション共通エラーコード
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ErrorCode {
    #[serde(rename = "E_CHANNEL_UNAVAILABLE")]
    ChannelUnavailable,
    #[serde(rename = "E_BUSY")]
    Busy,
    #[serde(rename = "E_JOB_FAILURE")]
    JobFailure,
    #[serde(rename = "E_JOB_REJECTED")]
    JobRejected,
    #[serde(rename = "E_CONFIG_REJECTED")]
    ConfigRejected,
    #[serde(rename = "E_INVALID_REQUEST")]
    InvalidRequest,
    #[serde(rename = "E_INVALID_STATE")]
    InvalidState,
    #[serde(rename = "E_PROTOCOL")]
    Protocol,
    #[serde(rename = "E_INTERNAL")]
    Internal,
}

/// アプリケーションエラー（呼び出し元への戻り値・スナップショット兼用）
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AppError {
    pub code: ErrorCode,
    pub message: String,
    pub recoverable: bool,
}

impl AppError {
    pub fn channel_unavailable(msg: impl Into<String>) -> Self {
        Self {
            code: ErrorCode::ChannelUnavailable,
            message: msg.into(),
            recoverable: true,
        }
    }

    pub fn busy(msg: impl Into<String>) -> Self {
        Self {
            code: ErrorCode::Busy,
            message: msg.into(),
            recoverable: true,
        }
    }

    /// ジョブの終端失敗。キャンセルはユーザー操作なので回復可能扱い。
    pub fn job_failure(msg: impl Into<String>, cancelled: bool) -> Self {
        Self {
            code: ErrorCode::JobFailure,
            message: msg.into(),
            recoverable: cancelled,
        }
    }

    pub fn job_rejected(msg: impl Into<String>) -> Self {
        Self {
            code: ErrorCode::JobRejected,
            message: msg.into(),
            recoverable: true,
        }
    }

    pub fn config_rejected(msg: impl Into<String>) -> Self {
        Self {
            code: ErrorCode::ConfigRejected,
            message: msg.into(),
            recoverable: true,
        }
    }

    pub fn invalid_request(msg: impl Into<String>) -> Self {
        Self {
            code: ErrorCode::InvalidRequest,
            message: msg.into(),
            recoverable: true,
        }
    }

    pub fn invalid_state(msg: impl Into<String>) -> Self {
        Self {
            code: ErrorCode::InvalidState,
            message: msg.into(),
            recoverable: true,
        }
    }

    pub fn protocol(msg: impl Into<String>) -> Self {
        Self {
            code: ErrorCode::Protocol,
            message: msg.into(),
            recoverable: false,
        }
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self {
            code: ErrorCode::Internal,
            message: msg.into(),
            recoverable: false,
        }
    }
}

impl std::fmt::Display for AppError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{:?}] {}", self.code, self.message)
    }
}

impl std::error::Error for AppError {}
