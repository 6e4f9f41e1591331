use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;

use super::task_controller::TaskController;
use crate::domain::error::AppError;
use crate::domain::install::SystemStatus;
use crate::domain::job::{JobRequest, ResumePoint};
use crate::domain::settings::GlobalConfig;
use crate::domain::snapshot::AppSnapshot;
use crate::domain::task::StageTransition;
use crate::infra::metrics::{Metrics, MetricsSummary};
use crate::infra::transport::EventReceiver;

const COMMAND_BUFFER: usize = 32;

type Reply<T> = oneshot::Sender<Result<T, AppError>>;

enum Command {
    StartTask(JobRequest, Reply<StageTransition>),
    CancelTask(Reply<StageTransition>),
    CheckResumePoint(PathBuf, Reply<ResumePoint>),
    InstallDependencies(Reply<()>),
    CancelInstall(Reply<()>),
    CheckSystemStatus(Reply<SystemStatus>),
    GetConfig(Reply<GlobalConfig>),
    UpdateConfig(serde_json::Value, Reply<GlobalConfig>),
}

/// コントローラを所有するアクタへのハンドル。
///
/// 操作はコマンドとして直列に処理され、プッシュイベントも同じループで
/// 畳み込まれる。イベントはコマンドより優先する。
#[derive(Clone)]
pub struct ControllerHandle {
    commands: mpsc::Sender<Command>,
    snapshot: watch::Receiver<AppSnapshot>,
    metrics: Arc<Metrics>,
}

impl ControllerHandle {
    /// アクタを起動する。全ハンドルが破棄されるとループは終了する。
    pub fn spawn(controller: TaskController, events: EventReceiver) -> (Self, JoinHandle<()>) {
        let (tx, rx) = mpsc::channel(COMMAND_BUFFER);
        let handle = Self {
            commands: tx,
            snapshot: controller.subscribe(),
            metrics: controller.metrics_handle(),
        };
        let task = tokio::spawn(run(controller, rx, events));
        (handle, task)
    }

    pub async fn start_task(&self, request: JobRequest) -> Result<StageTransition, AppError> {
        self.request(|reply| Command::StartTask(request, reply)).await
    }

    pub async fn cancel_task(&self) -> Result<StageTransition, AppError> {
        self.request(Command::CancelTask).await
    }

    pub async fn check_resume_point(
        &self,
        video_path: impl Into<PathBuf>,
    ) -> Result<ResumePoint, AppError> {
        let path = video_path.into();
        self.request(|reply| Command::CheckResumePoint(path, reply))
            .await
    }

    pub async fn install_dependencies(&self) -> Result<(), AppError> {
        self.request(Command::InstallDependencies).await
    }

    pub async fn cancel_install(&self) -> Result<(), AppError> {
        self.request(Command::CancelInstall).await
    }

    pub async fn check_system_status(&self) -> Result<SystemStatus, AppError> {
        self.request(Command::CheckSystemStatus).await
    }

    pub async fn get_config(&self) -> Result<GlobalConfig, AppError> {
        self.request(Command::GetConfig).await
    }

    pub async fn update_config(&self, updates: serde_json::Value) -> Result<GlobalConfig, AppError> {
        self.request(|reply| Command::UpdateConfig(updates, reply))
            .await
    }

    /// 最新スナップショットのコピー
    pub fn snapshot(&self) -> AppSnapshot {
        self.snapshot.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<AppSnapshot> {
        self.snapshot.clone()
    }

    pub fn metrics(&self) -> MetricsSummary {
        self.metrics.summary()
    }

    /// 条件を満たすスナップショットが公開されるまで待つ
    pub async fn wait_until<F>(&self, mut predicate: F) -> Result<AppSnapshot, AppError>
    where
        F: FnMut(&AppSnapshot) -> bool,
    {
        let mut rx = self.snapshot.clone();
        let snap = rx
            .wait_for(|s| predicate(s))
            .await
            .map_err(|_| AppError::internal("Controller has shut down."))?;
        Ok((*snap).clone())
    }

    async fn request<T>(
        &self,
        build: impl FnOnce(Reply<T>) -> Command,
    ) -> Result<T, AppError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.commands
            .send(build(reply_tx))
            .await
            .map_err(|_| AppError::internal("Controller has shut down."))?;
        reply_rx
            .await
            .map_err(|_| AppError::internal("Controller dropped the request."))?
    }
}

async fn run(
    mut controller: TaskController,
    mut commands: mpsc::Receiver<Command>,
    mut events: EventReceiver,
) {
    log::info!("コントローラを起動しました");
    let mut events_open = true;

    loop {
        tokio::select! {
            biased;
            event = events.recv(), if events_open => match event {
                Some(event) => {
                    controller.on_event(event);
                }
                None => {
                    log::warn!("イベントチャネルが閉じられました");
                    events_open = false;
                }
            },
            command = commands.recv() => match command {
                Some(command) => dispatch(&mut controller, command).await,
                None => break,
            },
        }
    }

    log::info!("コントローラを停止しました");
}

async fn dispatch(controller: &mut TaskController, command: Command) {
    // 受け手が既に居なくても処理は完了させる
    match command {
        Command::StartTask(request, reply) => {
            let _ = reply.send(controller.start_task(request).await);
        }
        Command::CancelTask(reply) => {
            let _ = reply.send(controller.cancel_task().await);
        }
        Command::CheckResumePoint(path, reply) => {
            let _ = reply.send(controller.check_resume_point(&path).await);
        }
        Command::InstallDependencies(reply) => {
            let _ = reply.send(controller.install_dependencies().await);
        }
        Command::CancelInstall(reply) => {
            let _ = reply.send(controller.cancel_install().await);
        }
        Command::CheckSystemStatus(reply) => {
            let _ = reply.send(controller.check_system_status().await);
        }
        Command::GetConfig(reply) => {
            let _ = reply.send(controller.get_config().await);
        }
        Command::UpdateConfig(updates, reply) => {
            let _ = reply.send(controller.update_config(updates).await);
        }
    }
}
