use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::controller::DispatchCoordinator;

/// 周期性回收超时跟踪上下文的后台任务
pub struct RetirementSweeper {
    coordinator: Arc<DispatchCoordinator>,
    interval: Duration,
}

impl RetirementSweeper {
    pub fn new(coordinator: Arc<DispatchCoordinator>, interval: Duration) -> Self {
        Self {
            coordinator,
            interval,
        }
    }

    /// 启动回收循环，收到关闭信号后退出
    pub fn spawn(self, mut shutdown_rx: broadcast::Receiver<()>) -> JoinHandle<()> {
        tokio::spawn(async move {
            info!("启动跟踪上下文回收任务，间隔 {:?}", self.interval);
            let mut ticker = tokio::time::interval(self.interval);
            // interval 的第一次 tick 立即完成
            ticker.tick().await;

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let retired = self.coordinator.sweep_expired(Instant::now());
                        if retired > 0 {
                            info!("回收了 {} 个超时的跟踪上下文", retired);
                        } else {
                            debug!("没有超时的跟踪上下文");
                        }
                    }
                    _ = shutdown_rx.recv() => {
                        info!("收到关闭信号，退出跟踪上下文回收任务");
                        break;
                    }
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sms_core::{FallbackConfig, SegmentationConfig, TrackingConfig};
    use sms_domain::{CompletionToken, ResultCode, SendRequest};
    use sms_infrastructure::InMemorySlotStore;
    use sms_testing_utils::RecordingTransport;

    #[tokio::test]
    async fn test_sweeper_retires_expired_and_stops() {
        let tracking = TrackingConfig {
            retirement_timeout_seconds: 1,
            sweep_interval_seconds: 1,
        };
        let coordinator = Arc::new(DispatchCoordinator::new(
            Arc::new(RecordingTransport::new()),
            Arc::new(InMemorySlotStore::new(4, 175)),
            SegmentationConfig::default(),
            &tracking,
            FallbackConfig::default(),
        ));

        let (token, receiver) = CompletionToken::channel();
        let handle = coordinator
            .send(SendRequest::text("10086", "hello").with_tokens(vec![token], vec![]))
            .await
            .unwrap();
        assert!(coordinator.tracker().contains(handle.message_id));

        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
        let task = RetirementSweeper::new(coordinator.clone(), Duration::from_millis(50))
            .spawn(shutdown_rx);

        let code = tokio::time::timeout(Duration::from_secs(5), receiver)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(code, ResultCode::Timeout);
        assert!(!coordinator.tracker().contains(handle.message_id));

        shutdown_tx.send(()).unwrap();
        tokio::time::timeout(Duration::from_secs(1), task)
            .await
            .unwrap()
            .unwrap();
    }
}
