use serde::{Deserialize, Serialize};

use super::error::AppError;
use super::event::{clamp_progress, BridgeEvent};

pub const INSTALL_STARTING_MESSAGE: &str = "Starting installation...";

/// GPU ベンダー
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GpuVendor {
    Nvidia,
    Amd,
    Intel,
    Apple,
    #[default]
    #[serde(other)]
    Unknown,
}

/// `check_dep_status` の応答
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SystemStatus {
    #[serde(default)]
    pub gpu_vendor: GpuVendor,
    #[serde(default)]
    pub can_accelerate: bool,
    #[serde(default)]
    pub needs_install: bool,
}

/// 依存関係インストールのサブステートマシン。メインスロットとは独立。
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct InstallSnapshot {
    pub is_installing: bool,
    pub install_progress: u8,
    pub needs_install: bool,
    pub gpu_vendor: GpuVendor,
    pub can_accelerate: bool,
    /// インストーラからの最新メッセージ
    pub message: String,
}

impl InstallSnapshot {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn begin(&mut self) {
        self.is_installing = true;
        self.install_progress = 0;
        self.message = INSTALL_STARTING_MESSAGE.to_string();
    }

    pub(crate) fn ensure_cancellable(&self) -> Result<(), AppError> {
        if self.is_installing {
            Ok(())
        } else {
            Err(AppError::invalid_state("No installation is running."))
        }
    }

    /// 能力情報のみ更新する。進捗には触れない。
    pub(crate) fn apply_system_status(&mut self, status: &SystemStatus) {
        self.gpu_vendor = status.gpu_vendor;
        self.can_accelerate = status.can_accelerate;
        self.needs_install = status.needs_install;
    }

    /// インストールスロット宛のイベントを畳み込む。適用したら true。
    pub fn apply(&mut self, event: &BridgeEvent) -> bool {
        match event {
            BridgeEvent::InstallProgress(p) => {
                self.install_progress = clamp_progress(p.progress);
                if let Some(message) = p.message.as_deref().filter(|m| !m.is_empty()) {
                    self.message = message.to_string();
                }
            }
            BridgeEvent::InstallCompleted(done) => {
                self.is_installing = false;
                self.needs_install = false;
                self.install_progress = 100;
                self.message = done.message.clone();
            }
            BridgeEvent::InstallFailed(failed) => {
                self.is_installing = false;
                self.message = failed.message.clone();
            }
            _ => return false,
        }
        true
    }
}
