use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::Serialize;
use serde_json::{json, Value};

use super::events::EventEmitter;
use super::readiness::ReadySignal;
use super::{
    BridgeRequest, BridgeTransport, TransportError, STATUS_CANCELLING, STATUS_ERROR,
    STATUS_STARTED, STATUS_SUCCESS,
};
use crate::domain::event::BridgeEvent;
use crate::domain::install::SystemStatus;
use crate::domain::job::ResumePoint;
use crate::infra::config_store::MemoryConfigStore;

/// プロセス内の通信路。
///
/// ジョブ実行側の代役として受け取ったリクエストを記録し、既定の応答
/// （またはメソッドごとの差し替え応答）を返す。プッシュイベントは
/// `emit` で実行側になりきって送る。
pub struct LoopbackTransport {
    ready: AtomicBool,
    ready_signal: Option<ReadySignal>,
    calls: Mutex<Vec<BridgeRequest>>,
    replies: Mutex<HashMap<&'static str, Value>>,
    resume_point: Mutex<ResumePoint>,
    system_status: Mutex<SystemStatus>,
    config: Arc<MemoryConfigStore>,
    events: EventEmitter,
}

impl LoopbackTransport {
    pub fn new(events: EventEmitter) -> Self {
        Self {
            ready: AtomicBool::new(true),
            ready_signal: None,
            calls: Mutex::new(Vec::new()),
            replies: Mutex::new(HashMap::new()),
            resume_point: Mutex::new(ResumePoint::default()),
            system_status: Mutex::new(SystemStatus::default()),
            config: Arc::new(MemoryConfigStore::default()),
            events,
        }
    }

    /// 準備完了時に通知を出す
    pub fn with_ready_signal(mut self, signal: ReadySignal) -> Self {
        self.ready_signal = Some(signal);
        self
    }

    pub fn with_config_store(mut self, store: Arc<MemoryConfigStore>) -> Self {
        self.config = store;
        self
    }

    pub fn set_ready(&self, ready: bool) {
        self.ready.store(ready, Ordering::SeqCst);
        if ready {
            if let Some(signal) = &self.ready_signal {
                signal.notify_ready();
            }
        }
    }

    /// 特定メソッドの応答を差し替える
    pub fn reply_with(&self, method: &'static str, reply: Value) {
        self.replies.lock().insert(method, reply);
    }

    pub fn set_resume_point(&self, point: ResumePoint) {
        *self.resume_point.lock() = point;
    }

    pub fn set_system_status(&self, status: SystemStatus) {
        *self.system_status.lock() = status;
    }

    pub fn config_store(&self) -> Arc<MemoryConfigStore> {
        self.config.clone()
    }

    /// 実行側としてイベントを送る
    pub fn emit(&self, event: BridgeEvent) {
        self.events.emit(event);
    }

    pub fn calls(&self) -> Vec<BridgeRequest> {
        self.calls.lock().clone()
    }

    pub fn call_count(&self, method: &str) -> usize {
        self.calls.lock().iter().filter(|r| r.method() == method).count()
    }

    fn default_reply(&self, request: &BridgeRequest) -> Result<Value, TransportError> {
        let reply = match request {
            BridgeRequest::StartTask { video_path, .. } if video_path.is_empty() => {
                json!({"status": STATUS_ERROR, "message": "File not found."})
            }
            BridgeRequest::StartTask { .. } | BridgeRequest::InstallDeps => {
                json!({"status": STATUS_STARTED})
            }
            BridgeRequest::CancelTask | BridgeRequest::CancelInstallDeps => {
                json!({"status": STATUS_CANCELLING})
            }
            BridgeRequest::CheckTaskResumePoint { .. } => to_reply(*self.resume_point.lock())?,
            BridgeRequest::CheckDepStatus => to_reply(*self.system_status.lock())?,
            BridgeRequest::GetConfig => to_reply(self.config.get())?,
            BridgeRequest::UpdateConfig { updates } => match self.config.update(updates) {
                Ok(config) => json!({"status": STATUS_SUCCESS, "config": config}),
                Err(e) => json!({"status": STATUS_ERROR, "message": e.to_string()}),
            },
        };
        Ok(reply)
    }
}

fn to_reply<T: Serialize>(value: T) -> Result<Value, TransportError> {
    serde_json::to_value(value).map_err(|e| TransportError::Call(e.to_string()))
}

#[async_trait]
impl BridgeTransport for LoopbackTransport {
    fn is_ready(&self) -> bool {
        self.ready.load(Ordering::SeqCst)
    }

    async fn call(&self, request: BridgeRequest) -> Result<Value, TransportError> {
        if !self.is_ready() {
            return Err(TransportError::NotReady);
        }
        self.calls.lock().push(request.clone());

        let scripted = self.replies.lock().get(request.method()).cloned();
        match scripted {
            Some(reply) => Ok(reply),
            None => self.default_reply(&request),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::job::ResumeMode;
    use crate::infra::transport::event_channel;

    fn start_request(path: &str) -> BridgeRequest {
        BridgeRequest::StartTask {
            video_path: path.to_string(),
            target_lang: "French".to_string(),
            resume_mode: ResumeMode::Fresh,
        }
    }

    #[tokio::test]
    async fn test_records_calls_and_returns_defaults() {
        let (emitter, _rx) = event_channel();
        let transport = LoopbackTransport::new(emitter);

        let reply = transport.call(start_request("/v.mp4")).await.unwrap();
        assert_eq!(reply["status"], "started");
        let reply = transport.call(BridgeRequest::CancelTask).await.unwrap();
        assert_eq!(reply["status"], "cancelling");

        assert_eq!(transport.call_count("start_task"), 1);
        assert_eq!(transport.calls().len(), 2);
    }

    #[tokio::test]
    async fn test_not_ready_fails_without_recording() {
        let (emitter, _rx) = event_channel();
        let transport = LoopbackTransport::new(emitter);
        transport.set_ready(false);

        let err = transport.call(BridgeRequest::GetConfig).await.unwrap_err();
        assert!(matches!(err, TransportError::NotReady));
        assert!(transport.calls().is_empty());
    }

    #[tokio::test]
    async fn test_scripted_reply_overrides_default() {
        let (emitter, _rx) = event_channel();
        let transport = LoopbackTransport::new(emitter);
        transport.reply_with(
            "start_task",
            json!({"status": "error", "message": "A task is already running."}),
        );
        let reply = transport.call(start_request("/v.mp4")).await.unwrap();
        assert_eq!(reply["message"], "A task is already running.");
    }

    #[tokio::test]
    async fn test_update_config_uses_store() {
        let (emitter, _rx) = event_channel();
        let transport = LoopbackTransport::new(emitter);

        let ok = transport
            .call(BridgeRequest::UpdateConfig {
                updates: json!({"app": {"theme": "light"}}),
            })
            .await
            .unwrap();
        assert_eq!(ok["status"], "success");
        assert_eq!(ok["config"]["app"]["theme"], "light");

        let rejected = transport
            .call(BridgeRequest::UpdateConfig {
                updates: json!({"ai": {"temperature": 9.0}}),
            })
            .await
            .unwrap();
        assert_eq!(rejected["status"], "error");
        assert_eq!(transport.config_store().get().app.theme, "light");
    }

    #[tokio::test]
    async fn test_set_ready_fires_signal() {
        let (emitter, _rx) = event_channel();
        let signal = ReadySignal::new();
        let rx = signal.subscribe();
        let transport = LoopbackTransport::new(emitter).with_ready_signal(signal);
        transport.set_ready(false);
        assert!(!*rx.borrow());
        transport.set_ready(true);
        assert!(*rx.borrow());
    }

    #[test]
    fn test_emit_pushes_event() {
        let (emitter, mut rx) = event_channel();
        let transport = LoopbackTransport::new(emitter);
        transport.emit(BridgeEvent::InstallFailed(crate::domain::event::InstallFinished {
            message: "x".to_string(),
        }));
        assert_eq!(rx.try_recv().unwrap().name(), "install_failed");
    }
}
