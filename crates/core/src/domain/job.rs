use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// 再開モード。`Fresh` 以外はすべて「途中成果物からの再開」。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResumeMode {
    /// 既存の結果を破棄して最初から
    #[default]
    Fresh,
    /// 抽出済み音声を再利用
    UseAudio,
    /// 保存済みの書き起こしを再利用（翻訳から再開）
    UseTranscript,
}

impl ResumeMode {
    pub fn is_fresh(self) -> bool {
        self == Self::Fresh
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Fresh => "fresh",
            Self::UseAudio => "use_audio",
            Self::UseTranscript => "use_transcript",
        }
    }
}

/// ジョブ開始リクエスト（投入後は不変）
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobRequest {
    pub video_path: PathBuf,
    /// None の場合は設定の `app.target_language` を使う
    pub target_language: Option<String>,
    pub resume_mode: ResumeMode,
}

impl JobRequest {
    pub fn new(video_path: impl Into<PathBuf>) -> Self {
        Self {
            video_path: video_path.into(),
            target_language: None,
            resume_mode: ResumeMode::Fresh,
        }
    }

    pub fn with_language(mut self, language: impl Into<String>) -> Self {
        self.target_language = Some(language.into());
        self
    }

    pub fn with_resume_mode(mut self, mode: ResumeMode) -> Self {
        self.resume_mode = mode;
        self
    }
}

/// 前回の途中成果物の有無。コントローラ自身は永続化も強制もしない。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ResumePoint {
    pub has_audio: bool,
    pub has_transcript: bool,
}

impl ResumePoint {
    /// 最も進んだ成果物から再開するモードを提案する
    pub fn suggested_mode(&self) -> ResumeMode {
        if self.has_transcript {
            ResumeMode::UseTranscript
        } else if self.has_audio {
            ResumeMode::UseAudio
        } else {
            ResumeMode::Fresh
        }
    }
}

/// 字幕セグメント（秒単位、メディア内の時系列順）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Segment {
    pub start: f64,
    pub end: f64,
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub translated_text: Option<String>,
}

impl Segment {
    pub fn new(start: f64, end: f64, text: impl Into<String>) -> Self {
        Self {
            start,
            end,
            text: text.into(),
            translated_text: None,
        }
    }

    pub fn translated(mut self, text: impl Into<String>) -> Self {
        self.translated_text = Some(text.into());
        self
    }

    pub fn duration(&self) -> f64 {
        self.end - self.start
    }

    pub fn is_well_formed(&self) -> bool {
        self.start.is_finite() && self.end.is_finite() && self.end > self.start
    }
}
