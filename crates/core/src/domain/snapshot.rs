use serde::Serialize;

use super::install::InstallSnapshot;
use super::task::TaskSnapshot;

/// 購読者に配る不変スナップショット（タスク + インストール）
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct AppSnapshot {
    pub task: TaskSnapshot,
    pub install: InstallSnapshot,
}

impl AppSnapshot {
    /// UI 共有の busy シグナル
    pub fn is_busy(&self) -> bool {
        self.task.is_processing || self.install.is_installing
    }

    pub fn activity_label(&self) -> &'static str {
        if self.install.is_installing && !self.task.is_processing {
            return "Installing...";
        }
        self.task.stage.activity_label()
    }

    /// 表示用メッセージ。インストール中はインストーラ側を優先する。
    pub fn status_message(&self) -> &str {
        if self.install.is_installing {
            &self.install.message
        } else {
            &self.task.status_message
        }
    }
}
