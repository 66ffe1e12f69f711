//! Module Manager - 레지스트리 위의 얇은 운영 인터페이스
//!
//! 이름으로 개별 컴포넌트를 start/stop/restart 하고 목록을 보여준다.

use super::registry::ComponentRegistry;
use super::traits::ComponentKind;
use anvil_foundation::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;

/// 모듈 목록 항목
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModuleInfo {
    pub name: String,
    pub kind: ComponentKind,
    pub running: bool,
    pub healthy: bool,
    /// Extension 이 아니면 항상 true
    pub enabled: bool,
    pub priority: Option<i32>,
    pub dependencies: Vec<String>,
    pub connects_to: Vec<String>,
    pub required: bool,
    pub start_time: Option<DateTime<Utc>>,
    pub error: Option<String>,
}

/// 모듈 매니저
pub struct ModuleManager {
    registry: Arc<ComponentRegistry>,
}

impl ModuleManager {
    pub fn new(registry: Arc<ComponentRegistry>) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &Arc<ComponentRegistry> {
        &self.registry
    }

    /// 모듈 시작
    pub async fn start(&self, name: &str) -> Result<()> {
        self.registry.start_component(name).await
    }

    /// 모듈 종료
    pub async fn stop(&self, name: &str) -> Result<()> {
        self.registry.stop_component(name).await
    }

    /// 재시작 (stop 실패 시 start 하지 않음)
    pub async fn restart(&self, name: &str) -> Result<()> {
        info!("Restarting module {}", name);
        self.stop(name).await?;
        self.start(name).await
    }

    /// 시작 순서대로 모듈 목록
    pub async fn list_modules(&self) -> Vec<ModuleInfo> {
        let mut modules = Vec::new();
        for handle in self.registry.components().await {
            let Ok(status) = self.registry.get_status(handle.name()).await else {
                continue;
            };
            let ext = handle.as_extension();
            let bridge = handle.as_bridge();
            modules.push(ModuleInfo {
                name: status.name,
                kind: handle.kind(),
                running: status.running,
                healthy: status.healthy,
                enabled: !handle.is_disabled_extension(),
                priority: ext.map(|e| e.priority()),
                dependencies: handle.dependencies(),
                connects_to: bridge.map(|b| b.connects_to()).unwrap_or_default(),
                required: bridge.map_or(false, |b| b.is_required()),
                start_time: status.start_time,
                error: status.error,
            });
        }
        modules
    }
}
