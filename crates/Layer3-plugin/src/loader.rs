//! Plugin Loader - 팩토리 호출로 컴포넌트를 얻는 단계
//!
//! ## ABI 계약
//!
//! 플러그인 바이너리는 두 심볼을 export 한다:
//!
//! - `ANVIL_PLUGIN_ABI_VERSION: u32` (호스트의 [`ABI_VERSION`] 과 같아야 함)
//! - `anvil_plugin_create(Arc<dyn Logger>, Arc<HostConfig>) -> Result<PluginComponent, String>`
//!
//! [`declare_plugin!`](crate::declare_plugin) 매크로가 두 심볼을 모두 만든다.
//! 호스트와 플러그인은 같은 컴파일러와 같은 `anvil-*` 버전으로 빌드되어야 한다.

use crate::manifest::PluginManifest;
use anvil_component::{Bridge, Component, ComponentHandle, Extension};
use anvil_foundation::{Error, HostConfig, Logger, Result};
use async_trait::async_trait;
use libloading::Library;
use std::any::Any;
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info};

/// 현재 호스트 ABI 버전
pub const ABI_VERSION: u32 = 1;

/// ABI 버전 심볼 이름
pub const ABI_VERSION_SYMBOL: &str = "ANVIL_PLUGIN_ABI_VERSION";

/// 기본 팩토리 심볼 이름
pub const DEFAULT_ENTRY_POINT: &str = "anvil_plugin_create";

/// 플러그인이 만들어 내는 값 (티어 태그 포함)
pub type PluginComponent = ComponentHandle;

/// 팩토리 시그니처
pub type PluginFactoryFn =
    fn(Arc<dyn Logger>, Arc<HostConfig>) -> std::result::Result<PluginComponent, String>;

/// 클로저 팩토리 (정적 링크 플러그인용)
pub type StaticFactory = Arc<
    dyn Fn(Arc<dyn Logger>, Arc<HostConfig>) -> std::result::Result<PluginComponent, String>
        + Send
        + Sync,
>;

/// 클로저를 [`StaticFactory`] 로 감싼다
pub fn static_factory<F>(factory: F) -> StaticFactory
where
    F: Fn(Arc<dyn Logger>, Arc<HostConfig>) -> std::result::Result<PluginComponent, String>
        + Send
        + Sync
        + 'static,
{
    Arc::new(factory)
}

/// 로드된 모듈 핸들 (동적 라이브러리 등)
pub type ModuleHandle = Arc<dyn Any + Send + Sync>;

/// 로드 결과
pub struct LoadedModule {
    pub component: PluginComponent,
    pub handle: Option<ModuleHandle>,
}

impl std::fmt::Debug for LoadedModule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoadedModule")
            .field("component", &self.component)
            .field("has_handle", &self.handle.is_some())
            .finish()
    }
}

// ============================================================================
// PluginLoader trait
// ============================================================================

/// 로더 추상화
#[async_trait]
pub trait PluginLoader: Send + Sync {
    fn loader_type(&self) -> &str;

    /// 바이너리를 열고 팩토리를 호출
    async fn load(
        &self,
        manifest: &PluginManifest,
        path: &Path,
        logger: Arc<dyn Logger>,
        config: Arc<HostConfig>,
    ) -> Result<LoadedModule>;
}

// ============================================================================
// DylibLoader - libloading
// ============================================================================

/// 동적 라이브러리 로더
pub struct DylibLoader {
    abi_version: u32,
}

impl DylibLoader {
    pub fn new() -> Self {
        Self {
            abi_version: ABI_VERSION,
        }
    }

    /// 기대하는 ABI 버전을 바꾼다 (호스트 업그레이드 검증용)
    pub fn with_abi_version(mut self, abi_version: u32) -> Self {
        self.abi_version = abi_version;
        self
    }

    pub fn abi_version(&self) -> u32 {
        self.abi_version
    }

    fn load_blocking(
        abi_version: u32,
        name: &str,
        entry_point: &str,
        path: &Path,
        logger: Arc<dyn Logger>,
        config: Arc<HostConfig>,
    ) -> Result<LoadedModule> {
        // SAFETY: 라이브러리 초기화 코드가 실행된다. 보안 게이트를 통과한 파일만 여기에 온다.
        let library = unsafe { Library::new(path) }
            .map_err(|e| Error::load_failure(name, format!("open {}: {}", path.display(), e)))?;

        let version = unsafe {
            let symbol = library
                .get::<*const u32>(symbol_bytes(ABI_VERSION_SYMBOL).as_slice())
                .map_err(|e| Error::load_failure(name, format!("missing ABI version: {}", e)))?;
            **symbol
        };
        if version != abi_version {
            return Err(Error::load_failure(
                name,
                format!("ABI version mismatch: expected {}, found {}", abi_version, version),
            ));
        }

        let factory: PluginFactoryFn = unsafe {
            *library
                .get::<PluginFactoryFn>(symbol_bytes(entry_point).as_slice())
                .map_err(|e| {
                    Error::load_failure(name, format!("missing entry point {}: {}", entry_point, e))
                })?
        };

        let component = factory(logger, config)
            .map_err(|e| Error::load_failure(name, format!("factory error: {}", e)))?;

        let library = Arc::new(library);
        Ok(LoadedModule {
            component: bind_to_library(component, Arc::clone(&library)),
            handle: Some(library as ModuleHandle),
        })
    }
}

impl Default for DylibLoader {
    fn default() -> Self {
        Self::new()
    }
}

fn symbol_bytes(symbol: &str) -> Vec<u8> {
    let mut bytes = symbol.as_bytes().to_vec();
    bytes.push(0);
    bytes
}

#[async_trait]
impl PluginLoader for DylibLoader {
    fn loader_type(&self) -> &str {
        "dylib"
    }

    async fn load(
        &self,
        manifest: &PluginManifest,
        path: &Path,
        logger: Arc<dyn Logger>,
        config: Arc<HostConfig>,
    ) -> Result<LoadedModule> {
        let name = manifest.name.clone();
        let entry_point = manifest.entry_point.clone();
        let path = path.to_path_buf();
        let abi_version = self.abi_version;

        debug!("Opening plugin library {}", path.display());
        let task_name = name.clone();
        let loaded = tokio::task::spawn_blocking(move || {
            Self::load_blocking(abi_version, &task_name, &entry_point, &path, logger, config)
        })
        .await
        .map_err(|e| Error::load_failure(&name, format!("loader panicked: {}", e)))??;

        info!("Plugin library loaded: {}", name);
        Ok(loaded)
    }
}

/// 라이브러리를 붙잡고 있는 컴포넌트
///
/// `inner` 가 먼저 drop 되어야 하므로 필드 순서를 바꾸지 말 것.
struct LibraryBound {
    inner: ComponentHandle,
    _library: Arc<Library>,
}

fn bind_to_library(component: ComponentHandle, library: Arc<Library>) -> ComponentHandle {
    let kind = component.kind();
    let bound = Arc::new(LibraryBound {
        inner: component,
        _library: library,
    });
    match kind {
        anvil_component::ComponentKind::Core => ComponentHandle::Core(bound),
        anvil_component::ComponentKind::Extension => ComponentHandle::Extension(bound),
        anvil_component::ComponentKind::Bridge => ComponentHandle::Bridge(bound),
    }
}

#[async_trait]
impl Component for LibraryBound {
    fn name(&self) -> &str {
        self.inner.name()
    }

    async fn initialize(&self) -> Result<()> {
        self.inner.initialize().await
    }

    async fn shutdown(&self) -> Result<()> {
        self.inner.shutdown().await
    }

    async fn health(&self) -> Result<()> {
        self.inner.health().await
    }
}

impl Extension for LibraryBound {
    fn dependencies(&self) -> Vec<String> {
        self.inner.dependencies()
    }

    fn is_enabled(&self) -> bool {
        !self.inner.is_disabled_extension()
    }

    fn priority(&self) -> i32 {
        self.inner.as_extension().map_or(100, |e| e.priority())
    }
}

impl Bridge for LibraryBound {
    fn connects_to(&self) -> Vec<String> {
        self.inner
            .as_bridge()
            .map(|b| b.connects_to())
            .unwrap_or_default()
    }

    fn is_required(&self) -> bool {
        self.inner.as_bridge().map_or(false, |b| b.is_required())
    }
}

// ============================================================================
// StaticLoader - 이름 -> 팩토리
// ============================================================================

/// 정적으로 링크된 팩토리 로더
pub struct StaticLoader {
    factories: RwLock<HashMap<String, StaticFactory>>,
}

impl StaticLoader {
    pub fn new() -> Self {
        Self {
            factories: RwLock::new(HashMap::new()),
        }
    }

    /// 빌더: 팩토리 추가
    pub fn with_factory<F>(self, name: impl Into<String>, factory: F) -> Self
    where
        F: Fn(Arc<dyn Logger>, Arc<HostConfig>) -> std::result::Result<PluginComponent, String>
            + Send
            + Sync
            + 'static,
    {
        let factories = RwLock::new({
            let mut map = self.factories.into_inner();
            map.insert(name.into(), static_factory(factory));
            map
        });
        Self { factories }
    }

    pub async fn register<F>(&self, name: impl Into<String>, factory: F)
    where
        F: Fn(Arc<dyn Logger>, Arc<HostConfig>) -> std::result::Result<PluginComponent, String>
            + Send
            + Sync
            + 'static,
    {
        self.factories
            .write()
            .await
            .insert(name.into(), static_factory(factory));
    }

    pub async fn contains(&self, name: &str) -> bool {
        self.factories.read().await.contains_key(name)
    }
}

impl Default for StaticLoader {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PluginLoader for StaticLoader {
    fn loader_type(&self) -> &str {
        "static"
    }

    async fn load(
        &self,
        manifest: &PluginManifest,
        _path: &Path,
        logger: Arc<dyn Logger>,
        config: Arc<HostConfig>,
    ) -> Result<LoadedModule> {
        let factory = self
            .factories
            .read()
            .await
            .get(&manifest.name)
            .cloned()
            .ok_or_else(|| Error::load_failure(&manifest.name, "no factory registered"))?;

        let component = factory(logger, config)
            .map_err(|e| Error::load_failure(&manifest.name, format!("factory error: {}", e)))?;
        Ok(LoadedModule {
            component,
            handle: None,
        })
    }
}

// ============================================================================
// declare_plugin!
// ============================================================================

/// 플러그인 크레이트에서 ABI 심볼을 선언
///
/// ```ignore
/// fn create(logger: Arc<dyn Logger>, config: Arc<HostConfig>) -> Result<PluginComponent, String> {
///     Ok(ComponentHandle::Extension(Arc::new(Markdown::new(logger, config))))
/// }
///
/// anvil_plugin::declare_plugin!(create);
/// ```
#[macro_export]
macro_rules! declare_plugin {
    ($factory:path) => {
        #[no_mangle]
        pub static ANVIL_PLUGIN_ABI_VERSION: u32 = $crate::loader::ABI_VERSION;

        #[no_mangle]
        pub fn anvil_plugin_create(
            logger: ::std::sync::Arc<dyn $crate::Logger>,
            config: ::std::sync::Arc<$crate::HostConfig>,
        ) -> ::std::result::Result<$crate::PluginComponent, ::std::string::String> {
            let factory: $crate::loader::PluginFactoryFn = $factory;
            factory(logger, config)
        }
    };
}
