//! Component Registry - 이름 기반 컴포넌트 저장소
//!
//! ## 시작 순서
//!
//! ```text
//! Core (등록 순) → Bridge (등록 순) → Extension (priority 오름차순)
//! ```
//!
//! 종료는 정확히 역순. 테이블은 하나의 RwLock 으로 보호하고,
//! 컴포넌트의 initialize/shutdown/health 는 락 밖에서 호출한다.

use super::graph::find_cycle;
use super::status::ComponentStatus;
use super::traits::{Bridge, Component, ComponentHandle, ComponentKind, Extension};
use anvil_foundation::{Error, Result};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, error, info, warn};

/// 등록 항목
struct Entry {
    handle: ComponentHandle,
    /// 등록 순서
    seq: u64,
}

#[derive(Default)]
struct RegistryState {
    entries: HashMap<String, Entry>,
    statuses: HashMap<String, ComponentStatus>,
    next_seq: u64,
}

impl RegistryState {
    /// Extension 의존성 그래프 (이름 -> 의존 대상)
    fn extension_edges(&self) -> HashMap<String, Vec<String>> {
        self.entries
            .iter()
            .filter_map(|(name, entry)| {
                entry
                    .handle
                    .as_extension()
                    .map(|ext| (name.clone(), ext.dependencies()))
            })
            .collect()
    }

    /// 시작 순서대로 정렬된 핸들
    fn startup_order(&self) -> Vec<ComponentHandle> {
        let mut entries: Vec<&Entry> = self.entries.values().collect();
        entries.sort_by_key(|e| e.seq);

        let by_kind = |kind: ComponentKind| -> Vec<&Entry> {
            entries
                .iter()
                .copied()
                .filter(|e| e.handle.kind() == kind)
                .collect()
        };

        let mut extensions = by_kind(ComponentKind::Extension);
        // stable sort: 같은 priority 는 등록 순 유지
        extensions.sort_by_key(|e| e.handle.as_extension().map_or(0, |x| x.priority()));

        by_kind(ComponentKind::Core)
            .into_iter()
            .chain(by_kind(ComponentKind::Bridge))
            .chain(extensions)
            .map(|e| e.handle.clone())
            .collect()
    }
}

/// 컴포넌트 레지스트리
pub struct ComponentRegistry {
    state: RwLock<RegistryState>,
}

impl ComponentRegistry {
    /// 새 레지스트리 생성
    pub fn new() -> Self {
        Self {
            state: RwLock::new(RegistryState::default()),
        }
    }

    // ========================================================================
    // 등록 / 해제
    // ========================================================================

    /// Core 컴포넌트 등록
    pub async fn register_core(&self, component: Arc<dyn Component>) -> Result<()> {
        self.register(ComponentHandle::Core(component)).await
    }

    /// Extension 등록 (의존성 순환이면 거부)
    pub async fn register_extension(&self, extension: Arc<dyn Extension>) -> Result<()> {
        self.register(ComponentHandle::Extension(extension)).await
    }

    /// Bridge 등록
    pub async fn register_bridge(&self, bridge: Arc<dyn Bridge>) -> Result<()> {
        self.register(ComponentHandle::Bridge(bridge)).await
    }

    /// 티어 태그가 붙은 핸들 등록
    pub async fn register(&self, handle: ComponentHandle) -> Result<()> {
        let name = handle.name().to_string();
        if name.is_empty() {
            return Err(Error::Validation("component name must not be empty".into()));
        }

        let mut state = self.state.write().await;

        if state.entries.contains_key(&name) {
            warn!("Component {} is already registered", name);
            return Err(Error::DuplicateName(name));
        }

        if let Some(ext) = handle.as_extension() {
            let mut edges = state.extension_edges();
            edges.insert(name.clone(), ext.dependencies());
            if let Some(cycle) = find_cycle(&name, &edges) {
                warn!("Rejected extension {}: dependency cycle {:?}", name, cycle);
                return Err(Error::DependencyCycle {
                    component: name,
                    cycle,
                });
            }
        }

        let seq = state.next_seq;
        state.next_seq += 1;

        let kind = handle.kind();
        state.entries.insert(name.clone(), Entry { handle, seq });
        state
            .statuses
            .insert(name.clone(), ComponentStatus::new(&name));

        info!("Registered {} component: {}", kind, name);
        Ok(())
    }

    /// 등록 해제 (상태 레코드도 함께 제거)
    pub async fn unregister(&self, name: &str) -> Result<ComponentHandle> {
        let mut state = self.state.write().await;
        let entry = state
            .entries
            .remove(name)
            .ok_or_else(|| Error::NotFound(format!("component {}", name)))?;
        state.statuses.remove(name);

        info!("Unregistered component: {}", name);
        Ok(entry.handle)
    }

    // ========================================================================
    // 조회
    // ========================================================================

    /// 세 티어 전체에서 조회
    pub async fn get_component(&self, name: &str) -> Result<ComponentHandle> {
        let state = self.state.read().await;
        state
            .entries
            .get(name)
            .map(|e| e.handle.clone())
            .ok_or_else(|| Error::NotFound(format!("component {}", name)))
    }

    /// 상태 조회
    pub async fn get_status(&self, name: &str) -> Result<ComponentStatus> {
        let state = self.state.read().await;
        state
            .statuses
            .get(name)
            .cloned()
            .ok_or_else(|| Error::NotFound(format!("component {}", name)))
    }

    /// 모든 상태 (이름순)
    pub async fn statuses(&self) -> Vec<ComponentStatus> {
        let state = self.state.read().await;
        let mut statuses: Vec<_> = state.statuses.values().cloned().collect();
        statuses.sort_by(|a, b| a.name.cmp(&b.name));
        statuses
    }

    /// 시작 순서대로 정렬된 핸들 목록
    pub async fn components(&self) -> Vec<ComponentHandle> {
        self.state.read().await.startup_order()
    }

    /// 시작 순서대로 정렬된 이름 목록
    pub async fn names(&self) -> Vec<String> {
        self.components()
            .await
            .iter()
            .map(|h| h.name().to_string())
            .collect()
    }

    pub async fn contains(&self, name: &str) -> bool {
        self.state.read().await.entries.contains_key(name)
    }

    pub async fn len(&self) -> usize {
        self.state.read().await.entries.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.state.read().await.entries.is_empty()
    }

    // ========================================================================
    // 라이프사이클
    // ========================================================================

    /// 전체 시작
    ///
    /// 실패 시 즉시 중단하며 이미 시작된 컴포넌트는 되돌리지 않는다.
    pub async fn initialize_all(&self) -> Result<()> {
        let order = self.components().await;
        info!("Initializing {} components", order.len());

        for handle in order {
            let name = handle.name().to_string();

            if handle.is_disabled_extension() {
                debug!("Skipping disabled extension: {}", name);
                continue;
            }

            if self.get_status(&name).await.map_or(false, |s| s.running) {
                debug!("Component {} already running", name);
                continue;
            }

            self.check_dependencies(&name, &handle.dependencies())
                .await?;
            self.start_handle(&handle).await?;
        }

        info!("All components initialized");
        Ok(())
    }

    /// 전체 종료 (역순)
    ///
    /// 하나가 실패해도 나머지는 계속 종료하고, 에러는 모아서 반환한다.
    pub async fn shutdown_all(&self) -> Result<()> {
        let mut order = self.components().await;
        order.reverse();
        info!("Shutting down {} components", order.len());

        let mut errors = Vec::new();
        for handle in order {
            if let Err(e) = self.stop_handle(&handle).await {
                error!("Component {} shutdown failed: {}", handle.name(), e);
                errors.push(format!("{}: {}", handle.name(), e));
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(Error::Aggregate(errors))
        }
    }

    /// 단일 컴포넌트 시작 (이미 실행 중이면 no-op)
    pub async fn start_component(&self, name: &str) -> Result<()> {
        let handle = self.get_component(name).await?;

        if handle.is_disabled_extension() {
            return Err(Error::invalid_state(name, "disabled", "start"));
        }
        if self.get_status(name).await?.running {
            debug!("Component {} already running", name);
            return Ok(());
        }

        self.check_dependencies(name, &handle.dependencies()).await?;
        self.start_handle(&handle).await
    }

    /// 단일 컴포넌트 종료
    pub async fn stop_component(&self, name: &str) -> Result<()> {
        let handle = self.get_component(name).await?;
        self.stop_handle(&handle).await
    }

    /// 실행 중인 컴포넌트의 health 재검사
    pub async fn refresh_health(&self) -> Vec<ComponentStatus> {
        for handle in self.components().await {
            let name = handle.name().to_string();
            if !self.get_status(&name).await.map_or(false, |s| s.running) {
                continue;
            }

            let result = handle.health().await;
            let mut state = self.state.write().await;
            if let Some(status) = state.statuses.get_mut(&name) {
                status.healthy = result.is_ok();
                status.error = result.err().map(|e| e.to_string());
            }
        }

        self.statuses().await
    }

    // ========================================================================
    // 내부
    // ========================================================================

    /// 의존 대상이 모두 Running AND Healthy 인지 확인
    async fn check_dependencies(&self, name: &str, dependencies: &[String]) -> Result<()> {
        let state = self.state.read().await;
        for dep in dependencies {
            match state.statuses.get(dep) {
                None => return Err(Error::dependency(name, dep, "not registered")),
                Some(status) if !status.running => {
                    return Err(Error::dependency(name, dep, "not running"))
                }
                Some(status) if !status.healthy => {
                    return Err(Error::dependency(name, dep, "not healthy"))
                }
                Some(_) => {}
            }
        }
        Ok(())
    }

    async fn start_handle(&self, handle: &ComponentHandle) -> Result<()> {
        let name = handle.name().to_string();
        debug!("Initializing {} component: {}", handle.kind(), name);

        if let Err(e) = handle.initialize().await {
            error!("Component {} failed to initialize: {}", name, e);
            self.update_status(&name, |s| s.mark_failed(e.to_string()))
                .await;
            return Err(Error::component(name, format!("initialize failed: {}", e)));
        }

        let health = handle.health().await;
        if let Err(e) = &health {
            warn!("Component {} started but is unhealthy: {}", name, e);
        }
        let error = health.as_ref().err().map(|e| e.to_string());
        self.update_status(&name, |s| s.mark_started(health.is_ok(), error))
            .await;

        info!("Component {} started", name);
        Ok(())
    }

    async fn stop_handle(&self, handle: &ComponentHandle) -> Result<()> {
        let name = handle.name().to_string();
        debug!("Shutting down component: {}", name);

        match handle.shutdown().await {
            Ok(()) => {
                self.update_status(&name, |s| s.mark_stopped()).await;
                info!("Component {} stopped", name);
                Ok(())
            }
            Err(e) => {
                let message = e.to_string();
                self.update_status(&name, |s| s.error = Some(message)).await;
                Err(e)
            }
        }
    }

    async fn update_status(&self, name: &str, f: impl FnOnce(&mut ComponentStatus)) {
        let mut state = self.state.write().await;
        if let Some(status) = state.statuses.get_mut(name) {
            f(status);
        }
    }
}

impl Default for ComponentRegistry {
    fn default() -> Self {
        Self::new()
    }
}
