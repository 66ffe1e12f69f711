//! Plugin Registry - 플러그인 상태 머신과 로드 경로
//!
//! ## 상태 전이
//!
//! ```text
//! Unloaded ─► Loading ─► Loaded ◄─► Active
//!    ▲           │         ▲  │        │
//!    │           ▼         │  ▼        ▼
//!    │         Error ──────┘ Disabled ◄┘      (Error 에서 재로드 허용)
//!    └──────── unload (Loaded / Active / Disabled)
//! ```
//!
//! 로드된 컴포넌트는 선언된 티어대로 ComponentRegistry 에 등록된다.

use crate::discovery::{self, DiscoveredPlugin};
use crate::loader::{LoadedModule, ModuleHandle, PluginComponent, PluginLoader, StaticFactory};
use crate::manifest::{PluginManifest, PluginMetadata, PluginType};
use anvil_component::ComponentRegistry;
use anvil_foundation::{Error, HostConfig, Logger, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, error, info, warn};

// ============================================================================
// PluginStatus
// ============================================================================

/// 플러그인 상태
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PluginStatus {
    Unloaded,
    Loading,
    Loaded,
    Active,
    Error,
    Disabled,
}

impl PluginStatus {
    /// 컴포넌트 값을 들고 있는 상태인지
    pub fn is_loaded(&self) -> bool {
        matches!(self, Self::Loaded | Self::Active | Self::Disabled)
    }

    /// 허용된 전이인지
    pub fn can_transition_to(&self, to: PluginStatus) -> bool {
        use PluginStatus::*;
        matches!(
            (*self, to),
            (Unloaded, Loading)
                | (Error, Loading)
                | (Loading, Loaded)
                | (Loading, Error)
                | (Loaded, Active)
                | (Active, Loaded)
                | (Loaded, Disabled)
                | (Active, Disabled)
                | (Disabled, Loaded)
                | (Loaded, Unloaded)
                | (Active, Unloaded)
                | (Disabled, Unloaded)
        )
    }
}

impl fmt::Display for PluginStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Unloaded => "unloaded",
            Self::Loading => "loading",
            Self::Loaded => "loaded",
            Self::Active => "active",
            Self::Error => "error",
            Self::Disabled => "disabled",
        };
        write!(f, "{}", s)
    }
}

// ============================================================================
// PluginInfo
// ============================================================================

/// 플러그인 출처
#[derive(Clone)]
pub enum PluginSource {
    /// 디스크의 동적 라이브러리
    File(PathBuf),
    /// 호스트에 내장된 팩토리
    Builtin(StaticFactory),
}

/// 플러그인 정보 (언로드 시 삭제되지 않고 Unloaded 로 돌아감)
#[derive(Clone)]
pub struct PluginInfo {
    pub metadata: PluginMetadata,
    pub manifest: PluginManifest,
    pub source: PluginSource,
    pub load_time: Option<DateTime<Utc>>,
    pub last_used: Option<DateTime<Utc>>,
    pub usage_count: u64,
    pub status: PluginStatus,
    pub last_error: Option<String>,
    component: Option<PluginComponent>,
    module: Option<ModuleHandle>,
}

impl PluginInfo {
    fn new(manifest: PluginManifest, source: PluginSource) -> Self {
        Self {
            metadata: PluginMetadata::from(&manifest),
            manifest,
            source,
            load_time: None,
            last_used: None,
            usage_count: 0,
            status: PluginStatus::Unloaded,
            last_error: None,
            component: None,
            module: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.metadata.name
    }

    pub fn file_path(&self) -> Option<&PathBuf> {
        match &self.source {
            PluginSource::File(path) => Some(path),
            PluginSource::Builtin(_) => None,
        }
    }

    pub fn is_builtin(&self) -> bool {
        matches!(self.source, PluginSource::Builtin(_))
    }

    /// 로드된 컴포넌트
    pub fn component(&self) -> Option<&PluginComponent> {
        self.component.as_ref()
    }

    /// 동적 라이브러리 핸들을 붙잡고 있는지
    pub fn has_module(&self) -> bool {
        self.module.is_some()
    }

    fn transition(&mut self, to: PluginStatus, operation: &str) -> Result<()> {
        if !self.status.can_transition_to(to) {
            return Err(Error::invalid_state(self.name(), self.status, operation));
        }
        debug!("Plugin {}: {} -> {}", self.metadata.name, self.status, to);
        self.status = to;
        Ok(())
    }
}

impl fmt::Debug for PluginInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PluginInfo")
            .field("name", &self.metadata.name)
            .field("type", &self.metadata.plugin_type)
            .field("status", &self.status)
            .field("file_path", &self.file_path())
            .field("usage_count", &self.usage_count)
            .field("last_error", &self.last_error)
            .finish()
    }
}

// ============================================================================
// PluginRegistry
// ============================================================================

/// 플러그인 레지스트리
pub struct PluginRegistry {
    plugins: RwLock<HashMap<String, PluginInfo>>,
    search_paths: RwLock<Vec<PathBuf>>,
    loader: Arc<dyn PluginLoader>,
    components: Arc<ComponentRegistry>,
    logger: Arc<dyn Logger>,
    host_config: Arc<HostConfig>,
}

impl PluginRegistry {
    pub fn new(
        loader: Arc<dyn PluginLoader>,
        components: Arc<ComponentRegistry>,
        logger: Arc<dyn Logger>,
        host_config: Arc<HostConfig>,
    ) -> Self {
        Self {
            plugins: RwLock::new(HashMap::new()),
            search_paths: RwLock::new(discovery::default_search_paths()),
            loader,
            components,
            logger,
            host_config,
        }
    }

    /// 빌더: 검색 경로 교체
    pub fn with_search_paths(self, paths: Vec<PathBuf>) -> Self {
        Self {
            search_paths: RwLock::new(paths),
            ..self
        }
    }

    pub fn components(&self) -> &Arc<ComponentRegistry> {
        &self.components
    }

    // ========================================================================
    // 검색 경로
    // ========================================================================

    pub async fn search_paths(&self) -> Vec<PathBuf> {
        self.search_paths.read().await.clone()
    }

    /// 끝에 추가 (이미 있으면 무시)
    pub async fn add_search_path(&self, path: impl Into<PathBuf>) {
        let path = path.into();
        let mut paths = self.search_paths.write().await;
        if !paths.contains(&path) {
            paths.push(path);
        }
    }

    /// 앞쪽 우선순위로 추가
    pub async fn prepend_search_path(&self, path: impl Into<PathBuf>) {
        let path = path.into();
        let mut paths = self.search_paths.write().await;
        paths.retain(|p| p != &path);
        paths.insert(0, path);
    }

    pub async fn remove_search_path(&self, path: &std::path::Path) -> bool {
        let mut paths = self.search_paths.write().await;
        let before = paths.len();
        paths.retain(|p| p != path);
        paths.len() != before
    }

    // ========================================================================
    // 디스커버리 / 등록
    // ========================================================================

    /// 검색 경로를 스캔해 새 플러그인을 Unloaded 로 등록
    ///
    /// 이미 알려진 이름은 건드리지 않는다. 새로 등록된 이름을 반환.
    pub async fn discover(&self) -> Result<Vec<String>> {
        let paths = self.search_paths().await;
        let found = tokio::task::spawn_blocking(move || discovery::scan(&paths))
            .await
            .map_err(|e| Error::Internal(format!("discovery task failed: {}", e)))?;

        let mut added = Vec::new();
        let mut plugins = self.plugins.write().await;
        for DiscoveredPlugin { manifest, path, .. } in found {
            if plugins.contains_key(&manifest.name) {
                continue;
            }
            let name = manifest.name.clone();
            plugins.insert(
                name.clone(),
                PluginInfo::new(manifest, PluginSource::File(path)),
            );
            added.push(name);
        }

        if !added.is_empty() {
            info!("Discovered {} new plugins: {:?}", added.len(), added);
        }
        Ok(added)
    }

    /// 경로를 직접 지정해 등록 (디스커버리와 같은 매니페스트 규칙)
    pub async fn register_file(&self, path: impl Into<PathBuf>) -> Result<String> {
        let path = path.into();
        let found = discovery::inspect(&path).ok_or_else(|| {
            Error::Validation(format!("not a usable plugin file: {}", path.display()))
        })?;

        let name = found.manifest.name.clone();
        let mut plugins = self.plugins.write().await;
        if plugins.contains_key(&name) {
            return Err(Error::DuplicateName(name));
        }
        plugins.insert(name.clone(), PluginInfo::new(found.manifest, PluginSource::File(path)));
        Ok(name)
    }

    /// 내장 플러그인 등록 (Unloaded, 로드 시 팩토리 호출)
    pub async fn register_builtin(
        &self,
        manifest: PluginManifest,
        factory: StaticFactory,
    ) -> Result<()> {
        manifest.validate()?;
        let name = manifest.name.clone();
        let mut plugins = self.plugins.write().await;
        if plugins.contains_key(&name) {
            return Err(Error::DuplicateName(name));
        }
        plugins.insert(name.clone(), PluginInfo::new(manifest, PluginSource::Builtin(factory)));
        info!("Registered builtin plugin: {}", name);
        Ok(())
    }

    // ========================================================================
    // 조회
    // ========================================================================

    pub async fn get(&self, name: &str) -> Result<PluginInfo> {
        self.plugins
            .read()
            .await
            .get(name)
            .cloned()
            .ok_or_else(|| Error::NotFound(format!("plugin {}", name)))
    }

    pub async fn status(&self, name: &str) -> Result<PluginStatus> {
        self.get(name).await.map(|info| info.status)
    }

    pub async fn component(&self, name: &str) -> Option<PluginComponent> {
        self.plugins
            .read()
            .await
            .get(name)
            .and_then(|info| info.component.clone())
    }

    /// 이름순 목록
    pub async fn list(&self) -> Vec<PluginInfo> {
        let mut list: Vec<_> = self.plugins.read().await.values().cloned().collect();
        list.sort_by(|a, b| a.metadata.name.cmp(&b.metadata.name));
        list
    }

    pub async fn names(&self) -> Vec<String> {
        self.list()
            .await
            .into_iter()
            .map(|info| info.metadata.name)
            .collect()
    }

    pub async fn contains(&self, name: &str) -> bool {
        self.plugins.read().await.contains_key(name)
    }

    /// 사용 기록
    pub async fn mark_used(&self, name: &str) -> Result<()> {
        let mut plugins = self.plugins.write().await;
        let info = plugins
            .get_mut(name)
            .ok_or_else(|| Error::NotFound(format!("plugin {}", name)))?;
        info.last_used = Some(Utc::now());
        info.usage_count += 1;
        Ok(())
    }

    /// 메타데이터의 enabled 값 갱신 (영속 설정의 거울)
    pub async fn set_enabled_flag(&self, name: &str, enabled: bool) {
        if let Some(info) = self.plugins.write().await.get_mut(name) {
            info.metadata.enabled = enabled;
        }
    }

    // ========================================================================
    // 로드 / 언로드
    // ========================================================================

    /// 로드: Unloaded|Error → Loading → Loaded|Error
    pub async fn load(&self, name: &str) -> Result<()> {
        let (manifest, source) = {
            let mut plugins = self.plugins.write().await;
            let info = plugins
                .get_mut(name)
                .ok_or_else(|| Error::NotFound(format!("plugin {}", name)))?;
            info.transition(PluginStatus::Loading, "load")?;
            (info.manifest.clone(), info.source.clone())
        };

        info!("Loading plugin {} (v{})", name, manifest.version);

        match self.load_module(&manifest, &source).await {
            Ok(loaded) => {
                let mut plugins = self.plugins.write().await;
                match plugins.get_mut(name) {
                    Some(info) => {
                        info.component = Some(loaded.component);
                        info.module = loaded.handle;
                        info.load_time = Some(Utc::now());
                        info.last_error = None;
                        info.transition(PluginStatus::Loaded, "load")?;
                        info!("Plugin {} loaded", name);
                        Ok(())
                    }
                    None => Err(Error::NotFound(format!("plugin {}", name))),
                }
            }
            Err(e) => {
                error!("Plugin {} failed to load: {}", name, e);
                let mut plugins = self.plugins.write().await;
                if let Some(info) = plugins.get_mut(name) {
                    info.last_error = Some(e.to_string());
                    info.transition(PluginStatus::Error, "load")?;
                }
                Err(e)
            }
        }
    }

    /// 호환성 검사 → 팩토리 호출 → 티어 검사 → ComponentRegistry 등록
    async fn load_module(
        &self,
        manifest: &PluginManifest,
        source: &PluginSource,
    ) -> Result<LoadedModule> {
        manifest.check_host_compatibility(&self.host_config.host_version)?;

        let logger = Arc::clone(&self.logger);
        let config = Arc::clone(&self.host_config);
        let mut loaded = match source {
            PluginSource::File(path) => self.loader.load(manifest, path, logger, config).await?,
            PluginSource::Builtin(factory) => LoadedModule {
                component: factory(logger, config).map_err(|e| {
                    Error::load_failure(&manifest.name, format!("factory error: {}", e))
                })?,
                handle: None,
            },
        };

        if loaded.component.name() != manifest.name {
            return Err(Error::load_failure(
                &manifest.name,
                format!(
                    "component name {} does not match plugin name",
                    loaded.component.name()
                ),
            ));
        }

        loaded.component = check_tier(manifest, loaded.component)?;
        self.components
            .register(loaded.component.clone())
            .await
            .map_err(|e| Error::load_failure(&manifest.name, e.to_string()))?;

        Ok(loaded)
    }

    /// 언로드: 등록 해제 → Shutdown (실패는 로그만) → 참조 해제 → Unloaded
    ///
    /// Unloaded / Error 상태에서는 아무것도 하지 않는다.
    pub async fn unload(&self, name: &str) -> Result<()> {
        let (component, module) = {
            let mut plugins = self.plugins.write().await;
            let info = plugins
                .get_mut(name)
                .ok_or_else(|| Error::NotFound(format!("plugin {}", name)))?;
            if matches!(info.status, PluginStatus::Unloaded | PluginStatus::Error) {
                debug!("Plugin {} is not loaded", name);
                return Ok(());
            }
            info.transition(PluginStatus::Unloaded, "unload")?;
            (info.component.take(), info.module.take())
        };

        if let Err(e) = self.components.unregister(name).await {
            debug!("Plugin {} was not in the component registry: {}", name, e);
        }

        if let Some(component) = component {
            if let Err(e) = component.shutdown().await {
                warn!("Plugin {} shutdown failed: {}", name, e);
            }
            drop(component);
        }
        drop(module);

        info!("Plugin {} unloaded", name);
        Ok(())
    }

    // ========================================================================
    // 활성화 / 비활성화
    // ========================================================================

    /// Loaded → Active (컴포넌트 시작)
    ///
    /// 시작 실패 시 언로드로 되돌리고 에러를 기록한다.
    pub async fn activate(&self, name: &str) -> Result<()> {
        self.expect_status(name, &[PluginStatus::Loaded], "activate")
            .await?;

        if let Err(e) = self.components.start_component(name).await {
            error!("Plugin {} failed to start: {}", name, e);
            self.unload(name).await?;
            if let Some(info) = self.plugins.write().await.get_mut(name) {
                info.last_error = Some(e.to_string());
            }
            return Err(e);
        }

        self.set_status(name, PluginStatus::Active, "activate").await
    }

    /// Active → Loaded (컴포넌트 정지)
    pub async fn deactivate(&self, name: &str) -> Result<()> {
        self.expect_status(name, &[PluginStatus::Active], "deactivate")
            .await?;
        self.components.stop_component(name).await?;
        self.set_status(name, PluginStatus::Loaded, "deactivate")
            .await
    }

    /// Loaded|Active → Disabled (로드 상태 유지)
    pub async fn disable(&self, name: &str) -> Result<()> {
        let status = self
            .expect_status(name, &[PluginStatus::Loaded, PluginStatus::Active], "disable")
            .await?;
        if status == PluginStatus::Active {
            self.components.stop_component(name).await?;
        }
        self.set_status(name, PluginStatus::Disabled, "disable")
            .await
    }

    /// Disabled → Loaded
    pub async fn enable(&self, name: &str) -> Result<()> {
        self.set_status(name, PluginStatus::Loaded, "enable").await
    }

    async fn expect_status(
        &self,
        name: &str,
        allowed: &[PluginStatus],
        operation: &str,
    ) -> Result<PluginStatus> {
        let status = self.status(name).await?;
        if !allowed.contains(&status) {
            return Err(Error::invalid_state(name, status, operation));
        }
        Ok(status)
    }

    async fn set_status(&self, name: &str, to: PluginStatus, operation: &str) -> Result<()> {
        let mut plugins = self.plugins.write().await;
        let info = plugins
            .get_mut(name)
            .ok_or_else(|| Error::NotFound(format!("plugin {}", name)))?;
        info.transition(to, operation)
    }
}

/// 선언된 티어와 실제 값 비교
///
/// Core 선언은 어떤 값이든 Core 로 등록하고, Extension/Bridge 는 같은 티어여야 한다.
fn check_tier(manifest: &PluginManifest, component: PluginComponent) -> Result<PluginComponent> {
    let actual = component.kind();
    match manifest.plugin_type {
        PluginType::Core => Ok(component.into_core()),
        declared if declared == actual => Ok(component),
        declared => Err(Error::load_failure(
            &manifest.name,
            format!("declared {} but component provides {}", declared, actual),
        )),
    }
}
