use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::{interval_at, sleep, Instant, MissedTickBehavior};

use super::BridgeTransport;

/// ポーリング間隔の下限（0 だと interval が作れない）
const MIN_POLL_INTERVAL: Duration = Duration::from_millis(1);

/// 準備完了待ちの設定
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReadinessConfig {
    /// ポーリング間隔
    pub poll_interval: Duration,
    /// 待機の上限。超えたら諦めて呼び出しを試す。
    pub timeout: Duration,
}

impl Default for ReadinessConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(100),
            timeout: Duration::from_secs(5),
        }
    }
}

/// 通信路側が能動的に出す「準備完了」通知
#[derive(Debug, Clone)]
pub struct ReadySignal {
    tx: Arc<watch::Sender<bool>>,
}

impl ReadySignal {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(false);
        Self { tx: Arc::new(tx) }
    }

    pub fn notify_ready(&self) {
        self.tx.send_replace(true);
    }

    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.tx.subscribe()
    }
}

impl Default for ReadySignal {
    fn default() -> Self {
        Self::new()
    }
}

/// 通信路の準備完了を待つゲート。
///
/// 定期ポーリングと準備完了通知の早い方で抜ける。どちらも来なければ
/// `timeout` 経過で抜け、その後の呼び出しが `ChannelUnavailable` で失敗する。
pub struct ReadinessGate {
    config: ReadinessConfig,
    signal: Option<watch::Receiver<bool>>,
}

impl ReadinessGate {
    pub fn new(mut config: ReadinessConfig) -> Self {
        if config.poll_interval < MIN_POLL_INTERVAL {
            log::warn!(
                "ポーリング間隔 {:?} は短すぎるため {:?} に補正します",
                config.poll_interval,
                MIN_POLL_INTERVAL
            );
            config.poll_interval = MIN_POLL_INTERVAL;
        }
        Self {
            config,
            signal: None,
        }
    }

    pub fn with_signal(mut self, signal: &ReadySignal) -> Self {
        self.signal = Some(signal.subscribe());
        self
    }

    pub fn config(&self) -> ReadinessConfig {
        self.config
    }

    /// 準備完了なら true、期限切れなら false
    pub async fn wait(&mut self, transport: &dyn BridgeTransport) -> bool {
        if transport.is_ready() || self.signalled() {
            return true;
        }

        let deadline = sleep(self.config.timeout);
        tokio::pin!(deadline);
        let mut ticker = interval_at(
            Instant::now() + self.config.poll_interval,
            self.config.poll_interval,
        );
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut signal_open = self.signal.is_some();

        loop {
            tokio::select! {
                _ = &mut deadline => {
                    let ready = transport.is_ready();
                    if !ready {
                        log::warn!(
                            "通信路が {}ms 以内に準備完了になりませんでした",
                            self.config.timeout.as_millis()
                        );
                    }
                    return ready;
                }
                _ = ticker.tick() => {
                    if transport.is_ready() {
                        return true;
                    }
                }
                changed = signal_changed(&mut self.signal), if signal_open => {
                    match changed {
                        Some(true) => return true,
                        Some(false) => {}
                        // 送信側が消えたら以後はポーリングのみ
                        None => signal_open = false,
                    }
                }
            }
        }
    }

    fn signalled(&self) -> bool {
        self.signal.as_ref().is_some_and(|rx| *rx.borrow())
    }
}

impl Default for ReadinessGate {
    fn default() -> Self {
        Self::new(ReadinessConfig::default())
    }
}

async fn signal_changed(signal: &mut Option<watch::Receiver<bool>>) -> Option<bool> {
    match signal {
        Some(rx) => {
            rx.changed().await.ok()?;
            let ready = *rx.borrow_and_update();
            Some(ready)
        }
        None => std::future::pending().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infra::transport::{BridgeRequest, TransportError};
    use std::sync::atomic::{AtomicBool, Ordering};

    struct FlagTransport {
        ready: AtomicBool,
    }

    impl FlagTransport {
        fn new(ready: bool) -> Arc<Self> {
            Arc::new(Self {
                ready: AtomicBool::new(ready),
            })
        }
    }

    #[async_trait::async_trait]
    impl BridgeTransport for FlagTransport {
        fn is_ready(&self) -> bool {
            self.ready.load(Ordering::SeqCst)
        }

        async fn call(&self, _request: BridgeRequest) -> Result<serde_json::Value, TransportError> {
            Err(TransportError::NotReady)
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_ready_transport_returns_immediately() {
        let transport = FlagTransport::new(true);
        let mut gate = ReadinessGate::default();
        let start = Instant::now();
        assert!(gate.wait(transport.as_ref()).await);
        assert_eq!(start.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn test_polling_detects_late_readiness() {
        let transport = FlagTransport::new(false);
        let flip = transport.clone();
        tokio::spawn(async move {
            sleep(Duration::from_millis(250)).await;
            flip.ready.store(true, Ordering::SeqCst);
        });

        let mut gate = ReadinessGate::default();
        let start = Instant::now();
        assert!(gate.wait(transport.as_ref()).await);
        let elapsed = start.elapsed();
        assert!(elapsed >= Duration::from_millis(250));
        assert!(elapsed <= Duration::from_millis(310));
    }

    #[tokio::test(start_paused = true)]
    async fn test_ready_signal_short_circuits_polling() {
        let transport = FlagTransport::new(false);
        let signal = ReadySignal::new();
        let mut gate = ReadinessGate::new(ReadinessConfig {
            poll_interval: Duration::from_secs(1),
            timeout: Duration::from_secs(5),
        })
        .with_signal(&signal);

        let notifier = signal.clone();
        tokio::spawn(async move {
            sleep(Duration::from_millis(30)).await;
            notifier.notify_ready();
        });

        let start = Instant::now();
        assert!(gate.wait(transport.as_ref()).await);
        assert!(start.elapsed() < Duration::from_secs(1));
    }

    #[tokio::test(start_paused = true)]
    async fn test_signal_fired_before_wait_counts() {
        let transport = FlagTransport::new(false);
        let signal = ReadySignal::new();
        signal.notify_ready();
        let mut gate = ReadinessGate::default().with_signal(&signal);
        assert!(gate.wait(transport.as_ref()).await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_never_ready_times_out() {
        let transport = FlagTransport::new(false);
        let mut gate = ReadinessGate::default();
        let start = Instant::now();
        assert!(!gate.wait(transport.as_ref()).await);
        let elapsed = start.elapsed();
        assert!(elapsed >= Duration::from_secs(5));
        assert!(elapsed < Duration::from_millis(5_100));
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_poll_interval_is_clamped() {
        let transport = FlagTransport::new(false);
        let mut gate = ReadinessGate::new(ReadinessConfig {
            poll_interval: Duration::ZERO,
            timeout: Duration::from_millis(50),
        });
        assert_eq!(gate.config().poll_interval, MIN_POLL_INTERVAL);

        let start = Instant::now();
        assert!(!gate.wait(transport.as_ref()).await);
        assert!(start.elapsed() >= Duration::from_millis(50));
    }

    #[tokio::test(start_paused = true)]
    async fn test_dropped_signal_falls_back_to_polling() {
        let transport = FlagTransport::new(false);
        let signal = ReadySignal::new();
        let mut gate = ReadinessGate::default().with_signal(&signal);
        drop(signal);

        let flip = transport.clone();
        tokio::spawn(async move {
            sleep(Duration::from_millis(400)).await;
            flip.ready.store(true, Ordering::SeqCst);
        });
        assert!(gate.wait(transport.as_ref()).await);
    }
}
