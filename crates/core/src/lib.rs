//! 動画字幕パイプラインのタスク制御コア。
//!
//! 単一ジョブのライフサイクル、依存関係インストールのサブフロー、
//! バックエンドからのプッシュイベントの畳み込みを担う。
//! 実処理（音声抽出・書き起こし・翻訳）と通信路は外部コラボレータ。

pub mod domain;
pub mod infra;
pub mod usecase;
