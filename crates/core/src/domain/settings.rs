use serde::{Deserialize, Serialize};

/// アプリケーション全体の設定ドキュメント
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct GlobalConfig {
    pub app: AppSection,
    pub whisper: WhisperSection,
    pub ai: AiSection,
}

/// アプリ全般
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppSection {
    /// UIテーマ (light/dark)
    pub theme: String,
    /// 字幕の出力先
    pub output_dir: String,
    pub ffmpeg_path: Option<String>,
    /// 依存関係ダウンロード用のミラー
    pub pypi_mirror: String,
    /// UI 言語 (en/zh)
    pub language: String,
    pub log_level: String,
    /// 翻訳先言語のデフォルト（JobRequest で未指定のとき）
    pub target_language: String,
}

/// 音声認識エンジン
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WhisperSection {
    pub model_size: String,
    /// cuda/cpu/auto
    pub device: String,
    /// 量子化 (int8, float16 ...)
    pub compute_type: String,
    /// 入力言語。None で自動判定
    pub language: Option<String>,
}

/// 翻訳API
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AiSection {
    pub api_key: String,
    pub base_url: String,
    pub model_name: String,
    pub temperature: f32,
    /// 1リクエストで翻訳する行数
    pub batch_size: u32,
    pub system_prompt: String,
    pub fallback_prompt: String,
}

impl Default for AppSection {
    fn default() -> Self {
        Self {
            theme: "dark".to_string(),
            output_dir: ".".to_string(),
            ffmpeg_path: None,
            pypi_mirror: "https://pypi.org".to_string(),
            language: "en".to_string(),
            log_level: "INFO".to_string(),
            target_language: "Chinese".to_string(),
        }
    }
}

impl Default for WhisperSection {
    fn default() -> Self {
        Self {
            model_size: "base".to_string(),
            device: "auto".to_string(),
            compute_type: "default".to_string(),
            language: None,
        }
    }
}

impl Default for AiSection {
    fn default() -> Self {
        Self {
            api_key: "sk-...".to_string(),
            base_url: "https://api.openai.com/v1".to_string(),
            model_name: "gpt-3.5-turbo".to_string(),
            temperature: 0.3,
            batch_size: 10,
            system_prompt: concat!(
                "You translate subtitle lines. Each input line starts with <L number>.\n",
                "Translate every line, keep the same <L number> prefix and line count.\n",
                "Do not merge, drop or add lines. Output only the translations.\n"
            )
            .to_string(),
            fallback_prompt: concat!(
                "Translate the single subtitle line into natural, concise text.\n",
                "Output only the translation.\n"
            )
            .to_string(),
        }
    }
}

impl GlobalConfig {
    /// 値域チェック。違反内容を返す。
    pub fn validate(&self) -> Result<(), String> {
        if self.ai.batch_size == 0 {
            return Err("ai.batch_size must be at least 1".to_string());
        }
        if !(0.0..=2.0).contains(&self.ai.temperature) {
            return Err(format!(
                "ai.temperature must be within 0.0..=2.0 (got {})",
                self.ai.temperature
            ));
        }
        if self.app.target_language.trim().is_empty() {
            return Err("app.target_language must not be empty".to_string());
        }
        Ok(())
    }
}
