use std::path::Path;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::watch;

use crate::domain::error::AppError;
use crate::domain::event::{BridgeEvent, EventSlot};
use crate::domain::install::SystemStatus;
use crate::domain::job::{JobRequest, ResumePoint};
use crate::domain::settings::GlobalConfig;
use crate::domain::snapshot::AppSnapshot;
use crate::domain::task::StageTransition;
use crate::infra::metrics::{JobOutcome, Metrics, MetricsSummary};
use crate::infra::transport::{
    decode_reply, BridgeRequest, BridgeTransport, CallReply, ConfigReply, ReadinessGate,
    STATUS_CANCELLING, STATUS_IDLE, STATUS_STARTED, STATUS_SUCCESS,
};

/// タスクコントローラ（メインスロット + インストールスロットの唯一の所有者）
///
/// 操作はすべて `&mut self` で直列化される。イベントの畳み込み
/// (`on_event`) は同期処理で、ロックを取らない。変更のたびに
/// `AppSnapshot` を watch チャネルへ配る。
pub struct TaskController {
    transport: Arc<dyn BridgeTransport>,
    readiness: ReadinessGate,
    snapshot: AppSnapshot,
    config: GlobalConfig,
    snapshot_tx: watch::Sender<AppSnapshot>,
    metrics: Arc<Metrics>,
}

impl TaskController {
    pub fn new(transport: Arc<dyn BridgeTransport>, readiness: ReadinessGate) -> Self {
        let snapshot = AppSnapshot::default();
        let (snapshot_tx, _rx) = watch::channel(snapshot.clone());
        Self {
            transport,
            readiness,
            snapshot,
            config: GlobalConfig::default(),
            snapshot_tx,
            metrics: Arc::new(Metrics::new()),
        }
    }

    // ==================== Observers ====================

    pub fn snapshot(&self) -> &AppSnapshot {
        &self.snapshot
    }

    /// スナップショットの変更通知を購読する
    pub fn subscribe(&self) -> watch::Receiver<AppSnapshot> {
        self.snapshot_tx.subscribe()
    }

    /// ローカルに保持している設定のコピー
    pub fn config(&self) -> &GlobalConfig {
        &self.config
    }

    pub fn metrics(&self) -> MetricsSummary {
        self.metrics.summary()
    }

    pub(crate) fn metrics_handle(&self) -> Arc<Metrics> {
        self.metrics.clone()
    }

    // ==================== Main slot ====================

    /// ジョブを開始する。完了は待たない（以降はイベントで進む）。
    pub async fn start_task(&mut self, request: JobRequest) -> Result<StageTransition, AppError> {
        if self.snapshot.task.is_processing {
            return Err(self.rejected(AppError::busy("A task is already running.")));
        }
        if self.snapshot.install.is_installing {
            return Err(self.rejected(AppError::busy("Dependency installation in progress.")));
        }

        let video_path = request.video_path.to_string_lossy().into_owned();
        if video_path.trim().is_empty() {
            return Err(self.rejected(AppError::invalid_request("Video path is empty.")));
        }
        let target_lang = request
            .target_language
            .clone()
            .filter(|lang| !lang.trim().is_empty())
            .unwrap_or_else(|| self.config.app.target_language.clone());

        log::info!(
            "タスク開始要求: {video_path} ({target_lang}, {})",
            request.resume_mode.as_str()
        );
        let request_msg = BridgeRequest::StartTask {
            video_path,
            target_lang,
            resume_mode: request.resume_mode,
        };
        let method = request_msg.method();
        let reply: CallReply = decode_reply(method, self.call(request_msg).await?)?;

        if reply.reports_busy() {
            log::warn!("実行側で別のタスクが実行中です");
            return Err(self.rejected(AppError::busy(reply.rejection_message())));
        }
        if !reply.is(STATUS_STARTED) {
            let message = reply.rejection_message();
            log::warn!("実行側がタスク開始を拒否しました: {message}");
            self.snapshot.task.reject(&message);
            self.publish();
            return Err(self.rejected(AppError::job_rejected(message)));
        }

        let job_id = uuid::Uuid::new_v4().to_string();
        let transition = self
            .snapshot
            .task
            .begin(job_id.clone(), request.resume_mode, Utc::now());
        self.metrics.inc_tasks_started();
        log::info!("タスク受理: job_id={job_id}");
        self.publish();
        Ok(transition)
    }

    /// キャンセルを要求する。終端イベントが届くまで Cancelling のまま。
    pub async fn cancel_task(&mut self) -> Result<StageTransition, AppError> {
        if !self.snapshot.task.is_processing {
            return Err(self.rejected(AppError::invalid_state("No task is running.")));
        }

        let request = BridgeRequest::CancelTask;
        let method = request.method();
        let reply: CallReply = decode_reply(method, self.call(request).await?)?;
        if reply.is(STATUS_IDLE) {
            log::warn!("実行側にキャンセル対象のタスクがありません");
            return Err(self.rejected(AppError::invalid_state(
                "Executor reports no running task.",
            )));
        }
        if !reply.is(STATUS_CANCELLING) {
            let message = reply.rejection_message();
            log::warn!("実行側がキャンセルを拒否しました: {message}");
            return Err(self.rejected(AppError::job_rejected(message)));
        }

        let transition = self.snapshot.task.begin_cancel()?;
        log::info!("タスクのキャンセルを要求しました");
        self.publish();
        Ok(transition)
    }

    /// 途中成果物の有無を問い合わせる（スナップショットは変えない）
    pub async fn check_resume_point(&mut self, video_path: &Path) -> Result<ResumePoint, AppError> {
        let request = BridgeRequest::CheckTaskResumePoint {
            video_path: video_path.to_string_lossy().into_owned(),
        };
        let method = request.method();
        decode_reply(method, self.call(request).await?)
    }

    // ==================== Install slot ====================

    pub async fn install_dependencies(&mut self) -> Result<(), AppError> {
        if self.snapshot.install.is_installing {
            return Err(self.rejected(AppError::busy("Installation already in progress.")));
        }
        if self.snapshot.task.is_processing {
            return Err(self.rejected(AppError::busy("A task is already running.")));
        }

        let request = BridgeRequest::InstallDeps;
        let method = request.method();
        let reply: CallReply = decode_reply(method, self.call(request).await?)?;
        if !reply.is(STATUS_STARTED) {
            let message = reply.rejection_message();
            log::warn!("インストール開始が拒否されました: {message}");
            self.snapshot.install.message = format!("Error: {message}");
            self.publish();
            return Err(self.rejected(AppError::job_rejected(message)));
        }

        self.snapshot.install.begin();
        self.metrics.inc_installs_started();
        log::info!("依存関係のインストールを開始しました");
        self.publish();
        Ok(())
    }

    /// インストールの中止を要求する。状態は install_failed イベントで変わる。
    pub async fn cancel_install(&mut self) -> Result<(), AppError> {
        if let Err(e) = self.snapshot.install.ensure_cancellable() {
            return Err(self.rejected(e));
        }
        let request = BridgeRequest::CancelInstallDeps;
        let method = request.method();
        let reply: CallReply = decode_reply(method, self.call(request).await?)?;
        if !reply.is(STATUS_CANCELLING) {
            let message = reply.rejection_message();
            log::warn!("実行側がインストール中止を拒否しました: {message}");
            return Err(self.rejected(AppError::job_rejected(message)));
        }
        log::info!("インストールの中止を要求しました");
        Ok(())
    }

    /// GPU 情報と要インストール判定を更新する
    pub async fn check_system_status(&mut self) -> Result<SystemStatus, AppError> {
        let request = BridgeRequest::CheckDepStatus;
        let method = request.method();
        let status: SystemStatus = decode_reply(method, self.call(request).await?)?;
        self.snapshot.install.apply_system_status(&status);
        self.publish();
        Ok(status)
    }

    // ==================== Config ====================

    pub async fn get_config(&mut self) -> Result<GlobalConfig, AppError> {
        let request = BridgeRequest::GetConfig;
        let method = request.method();
        let config: GlobalConfig = decode_reply(method, self.call(request).await?)?;
        self.config = config.clone();
        Ok(config)
    }

    /// 部分更新。成功応答のときだけローカルのコピーを差し替える。
    pub async fn update_config(
        &mut self,
        updates: serde_json::Value,
    ) -> Result<GlobalConfig, AppError> {
        let request = BridgeRequest::UpdateConfig { updates };
        let method = request.method();
        let reply: ConfigReply = decode_reply(method, self.call(request).await?)?;

        match reply.config {
            Some(config) if reply.status == STATUS_SUCCESS => {
                self.config = config.clone();
                Ok(config)
            }
            _ => {
                let message = reply
                    .message
                    .unwrap_or_else(|| format!("update_config status: {}", reply.status));
                log::warn!("設定更新が拒否されました: {message}");
                Err(self.rejected(AppError::config_rejected(message)))
            }
        }
    }

    // ==================== Events ====================

    /// プッシュイベントを畳み込む。ステージが変わった場合は遷移を返す。
    pub fn on_event(&mut self, event: BridgeEvent) -> Option<StageTransition> {
        log::debug!("イベント受信: {}", event.name());

        let transition = match event.slot() {
            EventSlot::Task => {
                let was_processing = self.snapshot.task.is_processing;
                let job_id = self.snapshot.task.job_id.clone();
                let started_at = self.snapshot.task.started_at;
                let transition = self.snapshot.task.apply(&event);
                if was_processing && !self.snapshot.task.is_processing {
                    self.record_job_end(&event, job_id, started_at);
                }
                transition
            }
            EventSlot::Install => {
                let was_installing = self.snapshot.install.is_installing;
                self.snapshot.install.apply(&event);
                if was_installing && !self.snapshot.install.is_installing {
                    let success = matches!(event, BridgeEvent::InstallCompleted(_));
                    self.metrics.record_install_finished(success);
                    log::info!("インストール終了: success={success}");
                }
                None
            }
        };

        if let Some(t) = transition {
            log::info!("ステージ遷移: {} → {}", t.prev.as_str(), t.next.as_str());
        }
        self.publish();
        transition
    }

    // ==================== Internals ====================

    /// 準備完了を待ってから呼び出す。待機が期限切れでも呼び出しは試す。
    async fn call(&mut self, request: BridgeRequest) -> Result<serde_json::Value, AppError> {
        let method = request.method();
        if !self.readiness.wait(self.transport.as_ref()).await {
            log::warn!("{method}: 通信路未準備のまま呼び出します");
        }
        match self.transport.call(request).await {
            Ok(value) => Ok(value),
            Err(e) => {
                log::error!("{method} の呼び出しに失敗: {e}");
                Err(self.rejected(e.into()))
            }
        }
    }

    fn rejected(&self, error: AppError) -> AppError {
        log::info!("要求を拒否: {error}");
        self.metrics.inc_rejection(error.code);
        error
    }

    fn record_job_end(
        &self,
        event: &BridgeEvent,
        job_id: Option<String>,
        started_at: Option<DateTime<Utc>>,
    ) {
        let outcome = match event {
            BridgeEvent::TaskCompleted(_) => JobOutcome::Completed,
            BridgeEvent::TaskFailed(f) if f.is_cancelled() => JobOutcome::Cancelled,
            _ => JobOutcome::Failed,
        };
        let duration_ms = started_at
            .map(|t| (Utc::now() - t).num_milliseconds().max(0) as u64)
            .unwrap_or(0);
        let job_id = job_id.unwrap_or_default();
        log::info!("タスク終了: job_id={job_id} outcome={outcome:?} ({duration_ms}ms)");
        self.metrics.record_job(&job_id, outcome, duration_ms);
    }

    fn publish(&self) {
        self.snapshot_tx.send_replace(self.snapshot.clone());
    }
}
