use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{broadcast, Mutex};
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::{debug, info, warn};

/// 优雅关闭管理器
///
/// 后台任务订阅关闭信号，并把自己的句柄登记进来，
/// `shutdown_and_wait` 在给定时限内等待它们全部退出。
#[derive(Clone)]
pub struct ShutdownManager {
    shutdown_tx: broadcast::Sender<()>,
    is_shutdown: Arc<AtomicBool>,
    tasks: Arc<Mutex<Vec<JoinHandle<()>>>>,
}

impl ShutdownManager {
    pub fn new() -> Self {
        let (shutdown_tx, _) = broadcast::channel(16);

        Self {
            shutdown_tx,
            is_shutdown: Arc::new(AtomicBool::new(false)),
            tasks: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// 订阅关闭信号，已经关闭时返回立即触发的接收器
    pub fn subscribe(&self) -> broadcast::Receiver<()> {
        if self.is_shutdown() {
            let (tx, rx) = broadcast::channel(1);
            let _ = tx.send(());
            return rx;
        }
        self.shutdown_tx.subscribe()
    }

    pub async fn register_task(&self, handle: JoinHandle<()>) {
        self.tasks.lock().await.push(handle);
    }

    /// 触发关闭，重复调用是无操作
    pub fn shutdown(&self) {
        if self.is_shutdown.swap(true, Ordering::SeqCst) {
            debug!("关闭管理器已经触发过关闭");
            return;
        }

        debug!("发送关闭信号给 {} 个订阅者", self.shutdown_tx.receiver_count());
        // 没有订阅者时发送会失败，可以忽略
        let _ = self.shutdown_tx.send(());
        info!("关闭信号已发送");
    }

    /// 触发关闭并等待登记的任务退出，返回是否在时限内全部退出
    pub async fn shutdown_and_wait(&self, limit: Duration) -> bool {
        self.shutdown();

        let handles: Vec<JoinHandle<()>> = self.tasks.lock().await.drain(..).collect();
        let count = handles.len();
        let wait_all = async {
            for handle in handles {
                if let Err(e) = handle.await {
                    warn!("后台任务异常退出: {}", e);
                }
            }
        };

        match timeout(limit, wait_all).await {
            Ok(()) => {
                info!("{} 个后台任务已退出", count);
                true
            }
            Err(_) => {
                warn!("等待后台任务退出超时（{:?}）", limit);
                false
            }
        }
    }

    pub fn is_shutdown(&self) -> bool {
        self.is_shutdown.load(Ordering::SeqCst)
    }
}

impl Default for ShutdownManager {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_shutdown_manager_basic() {
        let manager = ShutdownManager::new();
        assert!(!manager.is_shutdown());

        let mut rx = manager.subscribe();
        manager.shutdown();

        let result = timeout(Duration::from_millis(100), rx.recv()).await;
        assert!(result.is_ok());
        assert!(manager.is_shutdown());
    }

    #[tokio::test]
    async fn test_multiple_subscribers() {
        let manager = ShutdownManager::new();
        let mut rx1 = manager.subscribe();
        let mut rx2 = manager.clone().subscribe();

        manager.shutdown();

        assert!(timeout(Duration::from_millis(100), rx1.recv()).await.is_ok());
        assert!(timeout(Duration::from_millis(100), rx2.recv()).await.is_ok());
    }

    #[tokio::test]
    async fn test_subscribe_after_shutdown() {
        let manager = ShutdownManager::new();
        manager.shutdown();
        manager.shutdown();

        let mut rx = manager.subscribe();
        let result = timeout(Duration::from_millis(100), rx.recv()).await;
        assert!(matches!(result, Ok(Ok(()))));
    }

    #[tokio::test]
    async fn test_shutdown_waits_for_registered_tasks() {
        let manager = ShutdownManager::new();
        let mut rx = manager.subscribe();
        manager
            .register_task(tokio::spawn(async move {
                let _ = rx.recv().await;
            }))
            .await;

        assert!(manager.shutdown_and_wait(Duration::from_secs(1)).await);
    }

    #[tokio::test]
    async fn test_shutdown_wait_times_out() {
        let manager = ShutdownManager::new();
        manager
            .register_task(tokio::spawn(async {
                tokio::time::sleep(Duration::from_secs(5)).await;
            }))
            .await;

        assert!(!manager.shutdown_and_wait(Duration::from_millis(50)).await);
    }
}
