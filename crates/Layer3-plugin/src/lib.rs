//! # anvil-plugin
//!
//! 동적 라이브러리 플러그인 런타임.
//!
//! ```text
//!                 ┌──────────────────────────────┐
//!                 │        PluginManager         │  timeout / cancel / enable
//!                 └──────────────────────────────┘
//!        │              │               │              │
//! ┌────────────┐ ┌─────────────┐ ┌────────────┐ ┌─────────────┐
//! │  Security  │ │ ConfigStore │ │  Registry  │ │  Scheduler  │
//! └────────────┘ └─────────────┘ └────────────┘ └─────────────┘
//!                                   │      │
//!                          discovery   loader (libloading)
//!                                   │
//!                      anvil-component ComponentRegistry
//! ```
//!
//! 플러그인 작성자는 [`declare_plugin!`] 으로 ABI 심볼을 내보낸다.

pub mod config;
pub mod discovery;
pub mod loader;
pub mod manager;
pub mod manifest;
pub mod registry;
pub mod scheduler;
pub mod security;

// ============================================================================
// Manifest / Config
// ============================================================================
pub use config::{
    AdvancedConfig, FileSystemAccess, NetworkAccess, PluginConfig, PluginConfigStore,
    ResourceLimits, RetryConfig,
};
pub use manifest::{PluginManifest, PluginMetadata, PluginType, PluginVersion};

// ============================================================================
// Loading
// ============================================================================
pub use discovery::{default_search_paths, DiscoveredPlugin};
pub use loader::{
    static_factory, DylibLoader, LoadedModule, PluginComponent, PluginFactoryFn, PluginLoader,
    StaticFactory, StaticLoader, ABI_VERSION, DEFAULT_ENTRY_POINT,
};
pub use registry::{PluginInfo, PluginRegistry, PluginSource, PluginStatus};

// ============================================================================
// Runtime
// ============================================================================
pub use manager::{
    DependencyState, PluginDetails, PluginHealth, PluginManager, PluginSummary, DISCOVERY_TASK,
};
pub use scheduler::{PluginScheduler, SchedulerStats, TaskInfo};
pub use security::{hash_file, PluginSecurity, SecurityPolicy, SecurityTables};

// declare_plugin! 이 참조하는 타입
pub use anvil_component::ComponentHandle;
pub use anvil_foundation::{HostConfig, Logger};
