//! Plugin Config Store - 플러그인별 설정 문서
//!
//! 플러그인 이름 하나당 `<name>.json` 문서 하나. 캐시 + 파일을 함께 갱신한다.
//!
//! 리소스 제한 필드(메모리, CPU, 동시 작업 수, 소켓 등)는 검증되고 저장되지만
//! 런타임이 강제하지 않는 선언용 메타데이터다.

use crate::manifest::{validate_plugin_name, PluginMetadata, PluginType};
use anvil_foundation::{Error, JsonStore, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::path::PathBuf;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

// ============================================================================
// PluginConfig 모델
// ============================================================================

/// 플러그인 설정 문서
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PluginConfig {
    pub metadata: PluginMetadata,
    #[serde(default)]
    pub settings: HashMap<String, Value>,
    #[serde(default)]
    pub advanced: AdvancedConfig,
}

impl PluginConfig {
    /// 안전한 기본값으로 생성
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            metadata: PluginMetadata {
                name: name.clone(),
                plugin_type: PluginType::Extension,
                version: "0.1.0".into(),
                description: String::new(),
                dependencies: Vec::new(),
                optional: false,
                enabled: true,
            },
            settings: HashMap::new(),
            advanced: AdvancedConfig::for_plugin(&name),
        }
    }

    pub fn name(&self) -> &str {
        &self.metadata.name
    }

    pub fn is_enabled(&self) -> bool {
        self.metadata.enabled
    }

    /// 문서 검증
    pub fn validate(&self) -> Result<()> {
        let name = self.metadata.name.trim();
        if name.is_empty() {
            return Err(Error::Validation("plugin config name must not be empty".into()));
        }
        validate_plugin_name(&self.metadata.name)?;
        let advanced = &self.advanced;
        if advanced.memory_limit_mb == 0 {
            return Err(Error::Validation(format!(
                "plugin {}: memory limit must be positive",
                name
            )));
        }
        if !(0.0..=1.0).contains(&advanced.cpu_limit) {
            return Err(Error::Validation(format!(
                "plugin {}: cpu limit {} outside [0, 1]",
                name, advanced.cpu_limit
            )));
        }
        if advanced.timeout_secs == 0 {
            return Err(Error::Validation(format!(
                "plugin {}: timeout must be positive",
                name
            )));
        }
        Ok(())
    }
}

/// 고급 설정
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AdvancedConfig {
    pub load_order: i32,
    pub memory_limit_mb: u64,
    /// 0.0 ~ 1.0
    pub cpu_limit: f64,
    pub timeout_secs: u64,
    pub retry: RetryConfig,
    pub resource_limits: ResourceLimits,
    pub environment: HashMap<String, String>,
    pub network_access: NetworkAccess,
    pub file_system_access: FileSystemAccess,
}

impl AdvancedConfig {
    fn for_plugin(name: &str) -> Self {
        Self {
            file_system_access: FileSystemAccess::for_plugin(name),
            ..Self::default()
        }
    }
}

impl Default for AdvancedConfig {
    fn default() -> Self {
        Self {
            load_order: 100,
            memory_limit_mb: 256,
            cpu_limit: 0.5,
            timeout_secs: 30,
            retry: RetryConfig::default(),
            resource_limits: ResourceLimits::default(),
            environment: HashMap::new(),
            network_access: NetworkAccess::default(),
            file_system_access: FileSystemAccess::default(),
        }
    }
}

/// 재시도 정책 (플러그인이 스스로 사용, 런타임은 재시도하지 않음)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RetryConfig {
    pub enabled: bool,
    pub max_attempts: u32,
    pub interval_secs: u64,
    pub backoff: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            max_attempts: 3,
            interval_secs: 5,
            backoff: 2.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ResourceLimits {
    pub max_concurrent_tasks: u32,
    pub max_files: u32,
    pub max_sockets: u32,
    pub disk_quota_mb: u64,
}

impl Default for ResourceLimits {
    fn default() -> Self {
        Self {
            max_concurrent_tasks: 10,
            max_files: 100,
            max_sockets: 10,
            disk_quota_mb: 100,
        }
    }
}

/// 네트워크 접근 (기본 거부)
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct NetworkAccess {
    pub allowed: bool,
    pub allowed_hosts: Vec<String>,
    pub blocked_hosts: Vec<String>,
    pub allowed_ports: Vec<u16>,
    pub require_https: bool,
}

/// 파일시스템 접근
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct FileSystemAccess {
    pub read_only_paths: Vec<PathBuf>,
    pub writable_paths: Vec<PathBuf>,
    pub forbidden_paths: Vec<PathBuf>,
    pub temp_dir_access: bool,
}

impl FileSystemAccess {
    fn for_plugin(name: &str) -> Self {
        Self {
            writable_paths: vec![std::env::temp_dir().join("anvil-plugins").join(name)],
            ..Self::default()
        }
    }
}

impl Default for FileSystemAccess {
    fn default() -> Self {
        Self {
            read_only_paths: vec![PathBuf::from(".")],
            writable_paths: Vec::new(),
            forbidden_paths: ["/etc", "/sys", "/proc", "~/.ssh"]
                .iter()
                .map(PathBuf::from)
                .collect(),
            temp_dir_access: true,
        }
    }
}

// ============================================================================
// PluginConfigStore
// ============================================================================

/// 플러그인 설정 저장소
pub struct PluginConfigStore {
    store: JsonStore,
    cache: RwLock<HashMap<String, PluginConfig>>,
}

/// 이름 → 설정 파일명. 저장소 밖을 가리키는 이름은 거부
fn file_name(name: &str) -> Result<String> {
    validate_plugin_name(name)?;
    Ok(format!("{}.json", name))
}

impl PluginConfigStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            store: JsonStore::new(dir),
            cache: RwLock::new(HashMap::new()),
        }
    }

    pub fn dir(&self) -> &std::path::Path {
        self.store.base_dir()
    }

    /// 디렉토리의 모든 문서를 캐시에 적재 (잘못된 문서는 건너뜀)
    pub async fn load_all(&self) -> Result<usize> {
        let files = self.store.list("json")?;
        let mut loaded = 0;
        let mut cache = self.cache.write().await;

        for file in files {
            match self.store.load::<PluginConfig>(&file) {
                Ok(config) => match config.validate() {
                    Ok(()) => {
                        cache.insert(config.metadata.name.clone(), config);
                        loaded += 1;
                    }
                    Err(e) => warn!("Ignoring plugin config {}: {}", file, e),
                },
                Err(e) => warn!("Ignoring plugin config {}: {}", file, e),
            }
        }

        info!("Loaded {} plugin configs from {}", loaded, self.dir().display());
        Ok(loaded)
    }

    /// 캐시 → 파일 → 기본값 순서로 조회 (기본값은 저장하지 않음)
    pub async fn get_plugin_config(&self, name: &str) -> Result<PluginConfig> {
        if let Some(config) = self.cache.read().await.get(name) {
            return Ok(config.clone());
        }

        if let Some(config) = self.store.load_optional::<PluginConfig>(&file_name(name)?)? {
            config.validate()?;
            self.cache
                .write()
                .await
                .insert(name.to_string(), config.clone());
            return Ok(config);
        }

        debug!("No config for plugin {}, using defaults", name);
        Ok(PluginConfig::new(name))
    }

    /// 검증 후 캐시 + 파일에 저장
    pub async fn save_plugin_config(&self, config: PluginConfig) -> Result<()> {
        config.validate()?;
        let name = config.metadata.name.clone();

        let mut cache = self.cache.write().await;
        self.store.save(&file_name(&name)?, &config)?;
        cache.insert(name.clone(), config);
        debug!("Saved config for plugin {}", name);
        Ok(())
    }

    /// 현재 설정을 읽어 수정 후 저장
    pub async fn update_plugin_config<F>(&self, name: &str, f: F) -> Result<PluginConfig>
    where
        F: FnOnce(&mut PluginConfig),
    {
        let mut config = self.get_plugin_config(name).await?;
        f(&mut config);
        config.metadata.name = name.to_string();
        self.save_plugin_config(config.clone()).await?;
        Ok(config)
    }

    pub async fn set_enabled(&self, name: &str, enabled: bool) -> Result<PluginConfig> {
        self.update_plugin_config(name, |c| c.metadata.enabled = enabled)
            .await
    }

    pub async fn set_setting(&self, name: &str, key: &str, value: Value) -> Result<()> {
        self.update_plugin_config(name, |c| {
            c.settings.insert(key.to_string(), value);
        })
        .await
        .map(|_| ())
    }

    pub async fn get_setting(&self, name: &str, key: &str) -> Result<Option<Value>> {
        Ok(self.get_plugin_config(name).await?.settings.get(key).cloned())
    }

    /// 캐시와 파일 모두 삭제
    pub async fn delete_plugin_config(&self, name: &str) -> Result<()> {
        let file = file_name(name)?;
        let mut cache = self.cache.write().await;
        cache.remove(name);
        self.store.remove(&file)?;
        info!("Deleted config for plugin {}", name);
        Ok(())
    }

    /// 캐시된 설정 목록 (이름순)
    pub async fn list(&self) -> Vec<PluginConfig> {
        let cache = self.cache.read().await;
        let mut configs: Vec<_> = cache.values().cloned().collect();
        configs.sort_by(|a, b| a.metadata.name.cmp(&b.metadata.name));
        configs
    }

    /// 캐시 기준 enabled 인 플러그인 이름
    pub async fn enabled_plugins(&self) -> Vec<String> {
        self.list()
            .await
            .into_iter()
            .filter(|c| c.is_enabled())
            .map(|c| c.metadata.name)
            .collect()
    }
}
