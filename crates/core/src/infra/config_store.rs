use parking_lot::RwLock;
use serde_json::Value;

use crate::domain::error::AppError;
use crate::domain::settings::GlobalConfig;

/// 設定ストアのエラー
#[derive(Debug, thiserror::Error)]
pub enum ConfigStoreError {
    #[error("Config update must be a JSON object")]
    NotAnObject,
    #[error("Invalid config document: {0}")]
    Invalid(#[from] serde_json::Error),
    #[error("Config validation failed: {0}")]
    Validation(String),
}

impl From<ConfigStoreError> for AppError {
    fn from(e: ConfigStoreError) -> Self {
        AppError::config_rejected(e.to_string())
    }
}

/// メモリ上の設定アクセサ。
///
/// 部分ドキュメントを再帰マージし、検証に通ったときだけ差し替える。
/// 失敗時は保持中の設定を一切変更しない。
pub struct MemoryConfigStore {
    config: RwLock<GlobalConfig>,
}

impl MemoryConfigStore {
    pub fn new(config: GlobalConfig) -> Self {
        Self {
            config: RwLock::new(config),
        }
    }

    pub fn get(&self) -> GlobalConfig {
        self.config.read().clone()
    }

    pub fn update(&self, updates: &Value) -> Result<GlobalConfig, ConfigStoreError> {
        if !updates.is_object() {
            return Err(ConfigStoreError::NotAnObject);
        }

        let mut config = self.config.write();
        let mut doc = serde_json::to_value(&*config)?;
        merge_patch(&mut doc, updates);

        let merged: GlobalConfig = serde_json::from_value(doc)?;
        merged.validate().map_err(ConfigStoreError::Validation)?;

        *config = merged.clone();
        log::info!("設定を更新しました");
        Ok(merged)
    }
}

impl Default for MemoryConfigStore {
    fn default() -> Self {
        Self::new(GlobalConfig::default())
    }
}

/// オブジェクトは再帰的にマージ、それ以外は上書き
pub fn merge_patch(target: &mut Value, patch: &Value) {
    let Value::Object(patch_map) = patch else {
        *target = patch.clone();
        return;
    };
    if !target.is_object() {
        *target = Value::Object(serde_json::Map::new());
    }
    if let Value::Object(target_map) = target {
        for (key, value) in patch_map {
            if value.is_object() {
                let slot = target_map
                    .entry(key.clone())
                    .or_insert_with(|| Value::Object(serde_json::Map::new()));
                merge_patch(slot, value);
            } else {
                target_map.insert(key.clone(), value.clone());
            }
        }
    }
}
