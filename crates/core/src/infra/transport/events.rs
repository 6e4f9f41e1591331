use tokio::sync::mpsc;

use crate::domain::event::BridgeEvent;

/// コントローラ側の受信口
pub type EventReceiver = mpsc::UnboundedReceiver<BridgeEvent>;

/// プッシュイベント用チャネルを作る
pub fn event_channel() -> (EventEmitter, EventReceiver) {
    let (tx, rx) = mpsc::unbounded_channel();
    (EventEmitter { tx }, rx)
}

/// ジョブ実行側・インストーラ側の送信口（スレッド間で clone して使う）
#[derive(Debug, Clone)]
pub struct EventEmitter {
    tx: mpsc::UnboundedSender<BridgeEvent>,
}

impl EventEmitter {
    /// 統一イベント送信関数
    pub fn emit(&self, event: BridgeEvent) {
        let name = event.name();
        if self.tx.send(event).is_err() {
            log::error!("イベント送信失敗 [{name}]: 受信側が閉じています");
        }
    }

    /// `(name, data)` 形式の生イベントを解釈して送る。解釈できなければ破棄。
    pub fn emit_raw(&self, name: &str, data: serde_json::Value) -> bool {
        match BridgeEvent::from_parts(name, data) {
            Ok(event) => {
                self.emit(event);
                true
            }
            Err(e) => {
                log::warn!("不明なイベントを破棄しました [{name}]: {e}");
                false
            }
        }
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_emit_raw_forwards_decoded_event() {
        let (emitter, mut rx) = event_channel();
        assert!(emitter.emit_raw(
            "task_failed",
            serde_json::json!({"message": "Task cancelled by user", "cancelled": true}),
        ));
        let ev = rx.try_recv().unwrap();
        assert_eq!(ev.name(), "task_failed");
    }

    #[test]
    fn test_emit_raw_drops_malformed_event() {
        let (emitter, mut rx) = event_channel();
        assert!(!emitter.emit_raw("status_update", serde_json::json!({"message": "no progress"})));
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_emit_after_receiver_dropped_does_not_panic() {
        let (emitter, rx) = event_channel();
        drop(rx);
        assert!(emitter.is_closed());
        emitter.emit_raw("install_failed", serde_json::json!({"message": "x"}));
    }
}
