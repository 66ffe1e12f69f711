//! Plugin Manager - 보안 게이트 + 설정 저장소 + 레지스트리 + 스케줄러
//!
//! - 모든 로드는 보안 검증을 먼저 통과해야 레지스트리에 도달한다
//! - Load / Unload / Restart 는 시간 제한 범위 안에서 실행되고, 진행 중인 작업의
//!   취소 토큰은 플러그인 이름별로 보관된다 (Unload 가 강제 취소에 사용)
//! - Enable / Disable 은 영속 설정의 enabled 값을 바꾸고, `load_on_enable` 이면
//!   로드/언로드까지 수행한다

use crate::config::PluginConfigStore;
use crate::discovery;
use crate::loader::{DylibLoader, PluginLoader};
use crate::registry::{PluginInfo, PluginRegistry, PluginStatus};
use crate::scheduler::PluginScheduler;
use crate::security::{PluginSecurity, SecurityPolicy, SecurityTables, SECURITY_TABLES_FILE};
use anvil_component::ComponentRegistry;
use anvil_foundation::{Error, HostConfig, JsonStore, Logger, Result, RuntimeConfig};
use serde::Serialize;
use serde_json::json;
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// 주기적 재검색 작업 이름
pub const DISCOVERY_TASK: &str = "plugin-discovery";

/// Unload 가 진행 중인 로드를 기다릴 때의 폴링 간격
const LOADING_POLL: Duration = Duration::from_millis(20);

type Operations = Arc<RwLock<HashMap<String, (u64, CancellationToken)>>>;

// ============================================================================
// 조회 타입
// ============================================================================

/// 헬스 프로브 결과
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PluginHealth {
    Healthy,
    Unhealthy(String),
    Timeout,
    NotLoaded,
}

impl fmt::Display for PluginHealth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Healthy => write!(f, "healthy"),
            Self::Unhealthy(reason) => write!(f, "unhealthy: {}", reason),
            Self::Timeout => write!(f, "health check timed out"),
            Self::NotLoaded => write!(f, "not loaded"),
        }
    }
}

/// 의존성 상태
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DependencyState {
    Missing,
    Present(PluginStatus),
}

impl fmt::Display for DependencyState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Missing => write!(f, "missing"),
            Self::Present(status) => write!(f, "{}", status),
        }
    }
}

/// PluginInfo + 헬스 + 의존성 상태
#[derive(Debug, Clone)]
pub struct PluginDetails {
    pub info: PluginInfo,
    /// 영속 설정의 enabled 값
    pub enabled: bool,
    pub health: PluginHealth,
    pub dependencies: Vec<(String, DependencyState)>,
}

/// 상태별 집계
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PluginSummary {
    pub total: usize,
    pub unloaded: usize,
    pub loading: usize,
    pub loaded: usize,
    pub active: usize,
    pub error: usize,
    pub disabled: usize,
}

impl PluginSummary {
    fn count(&mut self, status: PluginStatus) {
        self.total += 1;
        let slot = match status {
            PluginStatus::Unloaded => &mut self.unloaded,
            PluginStatus::Loading => &mut self.loading,
            PluginStatus::Loaded => &mut self.loaded,
            PluginStatus::Active => &mut self.active,
            PluginStatus::Error => &mut self.error,
            PluginStatus::Disabled => &mut self.disabled,
        };
        *slot += 1;
    }
}

// ============================================================================
// PluginManager
// ============================================================================

/// 플러그인 매니저
pub struct PluginManager {
    registry: Arc<PluginRegistry>,
    security: Arc<PluginSecurity>,
    config_store: Arc<PluginConfigStore>,
    scheduler: Arc<PluginScheduler>,
    components: Arc<ComponentRegistry>,
    logger: Arc<dyn Logger>,
    host_config: Arc<HostConfig>,
    runtime: RuntimeConfig,
    /// 진행 중인 작업의 취소 토큰 (이름 → (작업 id, 토큰))
    ///
    /// 타임아웃으로 호출자가 먼저 돌아가도 작업이 끝날 때까지 남아 있다.
    operations: Operations,
    next_operation: AtomicU64,
}

impl PluginManager {
    pub fn new(
        components: Arc<ComponentRegistry>,
        logger: Arc<dyn Logger>,
        host_config: Arc<HostConfig>,
        runtime: RuntimeConfig,
    ) -> Self {
        let security = PluginSecurity::new(SecurityPolicy::from_runtime(&runtime));
        let config_store = PluginConfigStore::new(host_config.plugin_config_dir.clone());
        let registry = PluginRegistry::new(
            Arc::new(DylibLoader::new()),
            Arc::clone(&components),
            Arc::clone(&logger),
            Arc::clone(&host_config),
        )
        .with_search_paths(search_paths(&runtime));

        Self {
            registry: Arc::new(registry),
            security: Arc::new(security),
            config_store: Arc::new(config_store),
            scheduler: Arc::new(PluginScheduler::new()),
            components,
            logger,
            host_config,
            runtime,
            operations: Arc::new(RwLock::new(HashMap::new())),
            next_operation: AtomicU64::new(0),
        }
    }

    /// 빌더: 로더 교체 (등록된 플러그인이 없을 때만 의미 있음)
    pub fn with_loader(mut self, loader: Arc<dyn PluginLoader>) -> Self {
        self.registry = Arc::new(
            PluginRegistry::new(
                loader,
                Arc::clone(&self.components),
                Arc::clone(&self.logger),
                Arc::clone(&self.host_config),
            )
            .with_search_paths(search_paths(&self.runtime)),
        );
        self
    }

    // ========================================================================
    // 접근자
    // ========================================================================

    pub fn registry(&self) -> &Arc<PluginRegistry> {
        &self.registry
    }

    pub fn security(&self) -> &Arc<PluginSecurity> {
        &self.security
    }

    pub fn config_store(&self) -> &Arc<PluginConfigStore> {
        &self.config_store
    }

    pub fn scheduler(&self) -> &Arc<PluginScheduler> {
        &self.scheduler
    }

    pub fn components(&self) -> &Arc<ComponentRegistry> {
        &self.components
    }

    pub fn runtime_config(&self) -> &RuntimeConfig {
        &self.runtime
    }

    // ========================================================================
    // 초기화 / 종료
    // ========================================================================

    /// 설정 적재 → 보안 초기화 → (검색) → (자동 로드) → 스케줄러 시작 → (주기 검색)
    pub async fn initialize(&self) -> Result<()> {
        let configs = self.config_store.load_all().await?;

        let tables: Option<SecurityTables> =
            JsonStore::new(&self.host_config.data_dir).load_optional(SECURITY_TABLES_FILE)?;
        self.security.initialize(tables).await?;

        if self.runtime.auto_discover {
            self.discover_plugins().await?;
        }

        if self.runtime.auto_load_enabled {
            for name in self.config_store.enabled_plugins().await {
                if !self.registry.contains(&name).await {
                    debug!("Enabled plugin {} has not been discovered", name);
                    continue;
                }
                if let Err(e) = self.load_plugin(&name).await {
                    warn!("Auto-load of plugin {} failed: {}", name, e);
                }
            }
        }

        self.scheduler.start().await;

        if let Some(interval) = self.runtime.discovery_interval() {
            if self.scheduler.get(DISCOVERY_TASK).await.is_err() {
                let registry = Arc::clone(&self.registry);
                self.scheduler
                    .schedule_repeating(DISCOVERY_TASK, interval, move || {
                        let registry = Arc::clone(&registry);
                        async move { registry.discover().await.map(|_| ()) }
                    })
                    .await?;
            }
        }

        let summary = self.summary().await;
        self.logger.info(
            "plugin manager initialized",
            &[
                ("configs", json!(configs)),
                ("plugins", json!(summary.total)),
                ("active", json!(summary.active)),
            ],
        );
        Ok(())
    }

    /// 모든 토큰 취소 → 스케줄러 정지 → 남은 플러그인 언로드 (실패는 로그만)
    pub async fn shutdown(&self) -> Result<()> {
        for (name, (_, token)) in self.operations.write().await.drain() {
            debug!("Cancelling in-flight operation for plugin {}", name);
            token.cancel();
        }

        self.scheduler.stop().await;

        let timeout = self.runtime.operation_timeout();
        let mut failures = 0usize;
        for info in self.registry.list().await {
            if !info.status.is_loaded() {
                continue;
            }
            let name = info.name().to_string();
            match tokio::time::timeout(timeout, self.registry.unload(&name)).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    failures += 1;
                    warn!("Unloading plugin {} during shutdown failed: {}", name, e);
                }
                Err(_) => {
                    failures += 1;
                    warn!("Unloading plugin {} during shutdown timed out", name);
                }
            }
        }

        info!("Plugin manager shut down ({} unload failures)", failures);
        Ok(())
    }

    // ========================================================================
    // 검색 / 조회
    // ========================================================================

    /// 검색 경로 스캔, 새로 등록된 이름 반환
    pub async fn discover_plugins(&self) -> Result<Vec<String>> {
        let added = self.registry.discover().await?;
        for name in &added {
            let config = self.config_store.get_plugin_config(name).await?;
            self.registry
                .set_enabled_flag(name, config.is_enabled())
                .await;
        }
        Ok(added)
    }

    pub async fn list_plugins(&self) -> Vec<PluginInfo> {
        self.registry.list().await
    }

    pub async fn summary(&self) -> PluginSummary {
        let mut summary = PluginSummary::default();
        for info in self.registry.list().await {
            summary.count(info.status);
        }
        summary
    }

    /// PluginInfo + 제한 시간 헬스 프로브 + 의존성 상태
    pub async fn get_plugin_info(&self, name: &str) -> Result<PluginDetails> {
        let info = self.registry.get(name).await?;
        let enabled = self.config_store.get_plugin_config(name).await?.is_enabled();

        let health = match info.component() {
            None => PluginHealth::NotLoaded,
            Some(component) => {
                match tokio::time::timeout(self.runtime.health_timeout(), component.health()).await
                {
                    Ok(Ok(())) => PluginHealth::Healthy,
                    Ok(Err(e)) => PluginHealth::Unhealthy(e.to_string()),
                    Err(_) => PluginHealth::Timeout,
                }
            }
        };

        let mut dependencies = Vec::with_capacity(info.manifest.dependencies.len());
        for dependency in &info.manifest.dependencies {
            let state = match self.registry.status(dependency).await {
                Ok(status) => DependencyState::Present(status),
                Err(_) => DependencyState::Missing,
            };
            dependencies.push((dependency.clone(), state));
        }

        Ok(PluginDetails {
            info,
            enabled,
            health,
            dependencies,
        })
    }

    // ========================================================================
    // 로드 / 언로드 / 재시작
    // ========================================================================

    /// 보안 검증 → 로드 → 활성화 (시간 제한)
    pub async fn load_plugin(&self, name: &str) -> Result<()> {
        let registry = Arc::clone(&self.registry);
        let security = Arc::clone(&self.security);
        let owned = name.to_string();
        self.bounded(name, "load", move |token| {
            load_and_activate(registry, security, owned, token)
        })
        .await
    }

    /// 진행 중인 작업을 취소하고 언로드 (시간 제한)
    ///
    /// 취소된 로드가 아직 Loading 이면 그 로드가 끝날 때까지 기다린 뒤 내린다.
    pub async fn unload_plugin(&self, name: &str) -> Result<()> {
        self.cancel_in_flight(name).await;
        let registry = Arc::clone(&self.registry);
        let owned = name.to_string();
        self.bounded(name, "unload", move |_| async move {
            while registry.status(&owned).await? == PluginStatus::Loading {
                tokio::time::sleep(LOADING_POLL).await;
            }
            registry.unload(&owned).await
        })
        .await
    }

    /// 언로드 → 잠시 대기 → 로드. 언로드 실패 시 로드하지 않음
    pub async fn restart_plugin(&self, name: &str) -> Result<()> {
        let registry = Arc::clone(&self.registry);
        let security = Arc::clone(&self.security);
        let delay = self.runtime.restart_delay();
        let owned = name.to_string();
        self.bounded(name, "restart", move |token| async move {
            registry.unload(&owned).await?;
            tokio::time::sleep(delay).await;
            load_and_activate(registry, security, owned, token).await
        })
        .await
    }

    // ========================================================================
    // 활성화 / 비활성화
    // ========================================================================

    /// enabled 저장 후, Disabled 면 복귀시키고 `load_on_enable` 이면 로드
    pub async fn enable_plugin(&self, name: &str) -> Result<()> {
        self.config_store.set_enabled(name, true).await?;
        self.registry.set_enabled_flag(name, true).await;
        info!("Plugin {} enabled", name);

        match self.registry.status(name).await {
            Ok(PluginStatus::Disabled) => {
                self.registry.enable(name).await?;
                self.registry.activate(name).await
            }
            Ok(PluginStatus::Unloaded | PluginStatus::Error) if self.runtime.load_on_enable => {
                self.load_plugin(name).await
            }
            _ => Ok(()),
        }
    }

    /// enabled=false 저장 후, `load_on_enable` 이면 언로드, 아니면 Disabled 로 전환
    pub async fn disable_plugin(&self, name: &str) -> Result<()> {
        self.config_store.set_enabled(name, false).await?;
        self.registry.set_enabled_flag(name, false).await;
        info!("Plugin {} disabled", name);

        match self.registry.status(name).await {
            Ok(status) if status.is_loaded() && self.runtime.load_on_enable => {
                self.unload_plugin(name).await
            }
            Ok(PluginStatus::Loaded | PluginStatus::Active) => self.registry.disable(name).await,
            _ => Ok(()),
        }
    }

    // ========================================================================
    // 시간 제한 범위
    // ========================================================================

    /// 작업을 별도 태스크로 띄우고 타임아웃/취소와 경쟁시킴
    ///
    /// 타임아웃 후에도 태스크는 계속 진행되며, 그 토큰은 태스크가 끝날 때까지
    /// 등록된 채로 남는다. 뒤이은 Unload 가 이 토큰으로 작업을 취소한다.
    async fn bounded<T, F, Fut>(&self, name: &str, operation: &str, body: F) -> Result<T>
    where
        F: FnOnce(CancellationToken) -> Fut,
        Fut: Future<Output = Result<T>> + Send + 'static,
        T: Send + 'static,
    {
        let (id, token) = self.begin(name).await;
        let timeout = self.runtime.operation_timeout();

        let work = body(token.clone());
        let operations = Arc::clone(&self.operations);
        let owner = name.to_string();
        let mut task = tokio::spawn(async move {
            let result = work.await;
            release(&operations, &owner, id).await;
            result
        });

        tokio::select! {
            joined = &mut task => match joined {
                Ok(result) => result,
                Err(e) => {
                    release(&self.operations, name, id).await;
                    Err(Error::Internal(format!(
                        "plugin {}: {} task failed: {}",
                        name, operation, e
                    )))
                }
            },
            _ = token.cancelled() => {
                Err(Error::Cancelled(format!("plugin {}: {}", name, operation)))
            }
            _ = tokio::time::sleep(timeout) => {
                warn!("Plugin {} {} still running after {:?}", name, operation, timeout);
                Err(Error::Timeout(format!(
                    "plugin {}: {} did not finish within {:?}",
                    name, operation, timeout
                )))
            }
        }
    }

    /// 새 토큰 등록. 같은 이름의 이전 작업은 취소
    async fn begin(&self, name: &str) -> (u64, CancellationToken) {
        let id = self.next_operation.fetch_add(1, Ordering::Relaxed);
        let token = CancellationToken::new();
        let replaced = self
            .operations
            .write()
            .await
            .insert(name.to_string(), (id, token.clone()));
        if let Some((previous, old)) = replaced {
            debug!("Operation {} for plugin {} superseded", previous, name);
            old.cancel();
        }
        (id, token)
    }

    async fn cancel_in_flight(&self, name: &str) {
        if let Some((_, token)) = self.operations.write().await.remove(name) {
            info!("Cancelling in-flight operation for plugin {}", name);
            token.cancel();
        }
    }

    #[cfg(test)]
    async fn in_flight(&self, name: &str) -> bool {
        self.operations.read().await.contains_key(name)
    }
}

/// 작업 종료 시 자기 토큰만 제거
async fn release(operations: &Operations, name: &str, id: u64) {
    let mut operations = operations.write().await;
    if operations.get(name).map_or(false, |(current, _)| *current == id) {
        operations.remove(name);
    }
}

/// 런타임 설정 경로를 기본 경로 앞에 둠
fn search_paths(runtime: &RuntimeConfig) -> Vec<PathBuf> {
    let mut paths = runtime.search_paths.clone();
    for path in discovery::default_search_paths() {
        if !paths.contains(&path) {
            paths.push(path);
        }
    }
    paths
}

/// 보안 게이트 → 레지스트리 로드 → 활성화
async fn load_and_activate(
    registry: Arc<PluginRegistry>,
    security: Arc<PluginSecurity>,
    name: String,
    token: CancellationToken,
) -> Result<()> {
    if token.is_cancelled() {
        return Err(Error::Cancelled(format!("plugin {}: load", name)));
    }
    security.validate_plugin(&name).await?;
    let info = registry.get(&name).await?;
    if let Some(path) = info.file_path() {
        security.validate_plugin_file(info.name(), path).await?;
    }

    registry.load(&name).await?;
    if token.is_cancelled() {
        registry.unload(&name).await?;
        return Err(Error::Cancelled(format!("plugin {}: load", name)));
    }
    registry.activate(&name).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loader::{static_factory, LoadedModule};
    use crate::manifest::PluginManifest;
    use anvil_component::{Component, ComponentHandle, Extension};
    use anvil_foundation::NoopLogger;
    use async_trait::async_trait;
    use std::path::Path;
    use tempfile::TempDir;

    struct Gadget {
        name: String,
        start_delay: Duration,
    }

    #[async_trait]
    impl Component for Gadget {
        fn name(&self) -> &str {
            &self.name
        }

        async fn initialize(&self) -> Result<()> {
            tokio::time::sleep(self.start_delay).await;
            Ok(())
        }

        async fn shutdown(&self) -> Result<()> {
            Ok(())
        }
    }

    impl Extension for Gadget {}

    /// 바이너리를 여는 데 오래 걸리는 로더
    struct SlowLoader {
        delay: Duration,
    }

    #[async_trait]
    impl PluginLoader for SlowLoader {
        fn loader_type(&self) -> &str {
            "slow"
        }

        async fn load(
            &self,
            manifest: &PluginManifest,
            _path: &Path,
            _logger: Arc<dyn Logger>,
            _config: Arc<HostConfig>,
        ) -> Result<LoadedModule> {
            tokio::time::sleep(self.delay).await;
            Ok(LoadedModule {
                component: ComponentHandle::Extension(Arc::new(Gadget {
                    name: manifest.name.clone(),
                    start_delay: Duration::ZERO,
                })),
                handle: None,
            })
        }
    }

    fn runtime() -> RuntimeConfig {
        RuntimeConfig {
            auto_discover: false,
            auto_load_enabled: true,
            load_on_enable: true,
            discovery_interval_secs: 0,
            operation_timeout_secs: 2,
            restart_delay_ms: 10,
            search_paths: Vec::new(),
            ..RuntimeConfig::default()
        }
    }

    fn manager(temp: &TempDir, runtime: RuntimeConfig) -> PluginManager {
        let host = HostConfig::default()
            .with_data_dir(temp.path().join("data"))
            .with_plugin_config_dir(temp.path().join("plugins"));
        PluginManager::new(
            Arc::new(ComponentRegistry::new()),
            Arc::new(NoopLogger),
            Arc::new(host),
            runtime,
        )
    }

    async fn add_gadget(manager: &PluginManager, name: &'static str, start_delay: Duration) {
        manager
            .registry()
            .register_builtin(
                PluginManifest::new(name),
                static_factory(move |_, _| {
                    Ok(ComponentHandle::Extension(Arc::new(Gadget {
                        name: name.to_string(),
                        start_delay,
                    })))
                }),
            )
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_load_activates_and_summary() {
        let temp = TempDir::new().unwrap();
        let manager = manager(&temp, runtime());
        add_gadget(&manager, "gadget", Duration::ZERO).await;
        add_gadget(&manager, "idle", Duration::ZERO).await;

        manager.load_plugin("gadget").await.unwrap();
        assert_eq!(
            manager.registry().status("gadget").await.unwrap(),
            PluginStatus::Active
        );

        let summary = manager.summary().await;
        assert_eq!(summary.total, 2);
        assert_eq!(summary.active, 1);
        assert_eq!(summary.unloaded, 1);
    }

    #[tokio::test]
    async fn test_blacklist_blocks_registry_call() {
        let temp = TempDir::new().unwrap();
        let manager = manager(&temp, runtime());
        add_gadget(&manager, "gadget", Duration::ZERO).await;
        manager.security().add_to_blacklist("GADGET").await;

        let err = manager.load_plugin("gadget").await.unwrap_err();
        assert!(err.is_security());
        assert_eq!(
            manager.registry().status("gadget").await.unwrap(),
            PluginStatus::Unloaded
        );
    }

    #[tokio::test]
    async fn test_load_times_out() {
        let temp = TempDir::new().unwrap();
        let manager = manager(
            &temp,
            RuntimeConfig {
                operation_timeout_secs: 1,
                ..runtime()
            },
        );
        add_gadget(&manager, "sluggish", Duration::from_secs(30)).await;

        let err = manager.load_plugin("sluggish").await.unwrap_err();
        assert!(err.is_timeout());
    }

    #[tokio::test]
    async fn test_unload_cancels_timed_out_load() {
        let temp = TempDir::new().unwrap();
        let bin = temp.path().join("bin");
        std::fs::create_dir_all(&bin).unwrap();
        std::fs::write(
            bin.join(format!("slow.{}", std::env::consts::DLL_EXTENSION)),
            b"slow",
        )
        .unwrap();

        let manager = manager(
            &temp,
            RuntimeConfig {
                operation_timeout_secs: 1,
                search_paths: vec![bin],
                ..runtime()
            },
        )
        .with_loader(Arc::new(SlowLoader {
            delay: Duration::from_millis(1500),
        }));
        manager.discover_plugins().await.unwrap();

        let err = manager.load_plugin("slow").await.unwrap_err();
        assert!(err.is_timeout());
        // 로더는 아직 돌고 있고 토큰도 남아 있음
        assert_eq!(
            manager.registry().status("slow").await.unwrap(),
            PluginStatus::Loading
        );
        assert!(manager.in_flight("slow").await);

        manager.unload_plugin("slow").await.unwrap();
        tokio::time::sleep(Duration::from_millis(300)).await;

        assert_eq!(
            manager.registry().status("slow").await.unwrap(),
            PluginStatus::Unloaded
        );
        assert!(!manager.components().contains("slow").await);
        assert!(!manager.in_flight("slow").await);
    }

    #[tokio::test]
    async fn test_new_operation_supersedes_previous() {
        let temp = TempDir::new().unwrap();
        let manager = manager(&temp, runtime());

        let (_, first) = manager.begin("gadget").await;
        let (_, second) = manager.begin("gadget").await;
        assert!(first.is_cancelled());
        assert!(!second.is_cancelled());

        manager.cancel_in_flight("gadget").await;
        assert!(second.is_cancelled());
        assert!(!manager.in_flight("gadget").await);
    }

    #[tokio::test]
    async fn test_details_report_health_and_dependencies() {
        let temp = TempDir::new().unwrap();
        let manager = manager(&temp, runtime());
        manager
            .registry()
            .register_builtin(
                PluginManifest::new("needy")
                    .with_dependency("gadget")
                    .with_dependency("ghost"),
                static_factory(|_, _| Err("not today".to_string())),
            )
            .await
            .unwrap();
        add_gadget(&manager, "gadget", Duration::ZERO).await;
        manager.load_plugin("gadget").await.unwrap();

        let details = manager.get_plugin_info("needy").await.unwrap();
        assert_eq!(details.health, PluginHealth::NotLoaded);
        assert!(details.enabled);
        assert_eq!(
            details.dependencies,
            vec![
                (
                    "gadget".to_string(),
                    DependencyState::Present(PluginStatus::Active)
                ),
                ("ghost".to_string(), DependencyState::Missing),
            ]
        );

        let details = manager.get_plugin_info("gadget").await.unwrap();
        assert_eq!(details.health, PluginHealth::Healthy);
    }

    #[tokio::test]
    async fn test_restart_cycles_component() {
        let temp = TempDir::new().unwrap();
        let manager = manager(&temp, runtime());
        add_gadget(&manager, "gadget", Duration::ZERO).await;
        manager.load_plugin("gadget").await.unwrap();

        manager.restart_plugin("gadget").await.unwrap();
        let info = manager.registry().get("gadget").await.unwrap();
        assert_eq!(info.status, PluginStatus::Active);
        assert!(manager.components().contains("gadget").await);
    }

    #[tokio::test]
    async fn test_shutdown_unloads_everything() {
        let temp = TempDir::new().unwrap();
        let manager = manager(&temp, runtime());
        add_gadget(&manager, "gadget", Duration::ZERO).await;
        manager.initialize().await.unwrap();
        manager.load_plugin("gadget").await.unwrap();

        manager.shutdown().await.unwrap();
        assert_eq!(
            manager.registry().status("gadget").await.unwrap(),
            PluginStatus::Unloaded
        );
        assert!(!manager.scheduler().is_running().await);
        assert!(manager.components().is_empty().await);
    }
}
