use std::sync::Arc;

use anyhow::{Context, Result};
use sms_core::AppConfig;
use sms_dispatcher::{DispatchCoordinator, RetirementSweeper};
use sms_domain::Transport;
use sms_infrastructure::{create_slot_store, LoopbackTransport};
use tracing::info;

use crate::shutdown::ShutdownManager;

/// 组合根：按配置装配槽位存储、传输层和调度协调器
pub struct Application {
    config: AppConfig,
    coordinator: Arc<DispatchCoordinator>,
}

impl Application {
    /// 使用回环传输创建应用实例
    pub async fn new(config: AppConfig) -> Result<Self> {
        let transport = Arc::new(LoopbackTransport::new(config.fallback.ims_enabled));
        Self::with_transport(config, transport).await
    }

    pub async fn with_transport(config: AppConfig, transport: Arc<dyn Transport>) -> Result<Self> {
        info!(
            "初始化应用程序，槽位存储: {:?}，容量 {}",
            config.slot_store.backend, config.slot_store.capacity
        );

        let slot_store = create_slot_store(&config.slot_store)
            .await
            .context("创建槽位存储失败")?;

        let coordinator = DispatchCoordinator::new(
            transport,
            slot_store,
            config.segmentation.clone(),
            &config.tracking,
            config.fallback.clone(),
        );

        Ok(Self {
            config,
            coordinator: Arc::new(coordinator),
        })
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn coordinator(&self) -> Arc<DispatchCoordinator> {
        Arc::clone(&self.coordinator)
    }

    /// 启动后台回收任务，并登记到关闭管理器
    pub async fn start_background_tasks(&self, shutdown_manager: &ShutdownManager) {
        let sweeper =
            RetirementSweeper::new(self.coordinator(), self.config.tracking.sweep_interval());
        let handle = sweeper.spawn(shutdown_manager.subscribe());
        shutdown_manager.register_task(handle).await;
        info!(
            "后台任务已启动，回收间隔 {} 秒",
            self.config.tracking.sweep_interval_seconds
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sms_core::SlotStoreBackend;
    use sms_domain::SlotStatus;
    use std::time::Duration;

    #[tokio::test]
    async fn test_application_with_memory_store() {
        let app = Application::new(AppConfig::default()).await.unwrap();
        let coordinator = app.coordinator();

        assert!(coordinator
            .copy_message_to_icc(None, &[0x01], SlotStatus::Unread.wire_code() as i32)
            .await
            .unwrap());
        assert_eq!(coordinator.get_all_messages_from_icc().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_application_with_sqlite_store() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = AppConfig::default();
        config.slot_store.backend = SlotStoreBackend::Sqlite;
        config.slot_store.database_url =
            Some(format!("sqlite://{}", dir.path().join("icc.db").display()));

        let app = Application::new(config).await.unwrap();
        assert!(app
            .coordinator()
            .copy_message_to_icc(Some(&[0x07, 0x91]), &[0x01], 5)
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn test_background_tasks_stop_on_shutdown() {
        let app = Application::new(AppConfig::default()).await.unwrap();
        let shutdown_manager = ShutdownManager::new();
        app.start_background_tasks(&shutdown_manager).await;

        assert!(
            shutdown_manager
                .shutdown_and_wait(Duration::from_secs(1))
                .await
        );
    }
}
