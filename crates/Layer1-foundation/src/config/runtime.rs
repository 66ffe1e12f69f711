//! Runtime Config - 플러그인 매니저 동작 설정
//!
//! 글로벌(~/.config/anvil/runtime.json) + 프로젝트(.anvil/runtime.json) 병합.

use crate::storage::JsonStore;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

/// 설정 파일명
pub const RUNTIME_CONFIG_FILE: &str = "runtime.json";

// ============================================================================
// SecurityLevel
// ============================================================================

/// 보안 레벨 (낮음 → 엄격)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SecurityLevel {
    Low,
    Moderate,
    High,
    Strict,
}

impl Default for SecurityLevel {
    fn default() -> Self {
        Self::Moderate
    }
}

impl std::fmt::Display for SecurityLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Low => write!(f, "low"),
            Self::Moderate => write!(f, "moderate"),
            Self::High => write!(f, "high"),
            Self::Strict => write!(f, "strict"),
        }
    }
}

impl FromStr for SecurityLevel {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "low" => Ok(Self::Low),
            "moderate" | "medium" => Ok(Self::Moderate),
            "high" => Ok(Self::High),
            "strict" => Ok(Self::Strict),
            other => Err(Error::Config(format!("Unknown security level: {}", other))),
        }
    }
}

// ============================================================================
// RuntimeConfig
// ============================================================================

/// 플러그인 런타임 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RuntimeConfig {
    /// 초기화 시 디스커버리 수행
    pub auto_discover: bool,

    /// 초기화 시 enabled 상태인 플러그인 자동 로드
    pub auto_load_enabled: bool,

    /// Enable/Disable 시 Load/Unload 도 함께 수행
    pub load_on_enable: bool,

    /// 주기적 재탐색 간격 (0 = 비활성화)
    pub discovery_interval_secs: u64,

    /// Load/Unload/Restart 타임아웃
    pub operation_timeout_secs: u64,

    /// Health 프로브 타임아웃
    pub health_timeout_secs: u64,

    /// Restart 시 Unload 와 Load 사이 대기
    pub restart_delay_ms: u64,

    /// 보안 레벨
    pub security_level: SecurityLevel,

    /// 신뢰 해시 검사
    pub require_hash_check: bool,

    /// 서명 요구
    pub require_signature: bool,

    /// 로컬 미서명 플러그인 허용
    pub allow_unsigned_local: bool,

    /// 최대 플러그인 크기 (MB)
    pub max_plugin_size_mb: u64,

    /// 추가 검색 경로 (기본 경로 앞에 삽입)
    pub search_paths: Vec<PathBuf>,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            auto_discover: true,
            auto_load_enabled: true,
            load_on_enable: true,
            discovery_interval_secs: 300,
            operation_timeout_secs: 30,
            health_timeout_secs: 5,
            restart_delay_ms: 500,
            security_level: SecurityLevel::Moderate,
            require_hash_check: true,
            require_signature: false,
            allow_unsigned_local: true,
            max_plugin_size_mb: 100,
            search_paths: Vec::new(),
        }
    }
}

impl RuntimeConfig {
    pub fn new() -> Self {
        Self::default()
    }

    // ========================================================================
    // Load / Save
    // ========================================================================

    /// 글로벌 + 프로젝트 병합 로드
    pub fn load() -> Result<Self> {
        let mut config = Self::new();

        if let Ok(global) = JsonStore::global() {
            if let Some(global_config) = global.load_optional::<RuntimeConfig>(RUNTIME_CONFIG_FILE)? {
                config = global_config;
            }
        }

        // 프로젝트 문서는 부분 문서로 읽어 적힌 키만 덮어씀
        if let Ok(project) = JsonStore::current_project() {
            if let Some(overlay) = project.load_optional::<Value>(RUNTIME_CONFIG_FILE)? {
                config.merge(overlay)?;
            }
        }

        Ok(config)
    }

    /// 특정 저장소에서 로드
    pub fn load_from(store: &JsonStore) -> Result<Self> {
        Ok(store
            .load_optional::<RuntimeConfig>(RUNTIME_CONFIG_FILE)?
            .unwrap_or_default())
    }

    /// 글로벌 설정 저장
    pub fn save_global(&self) -> Result<()> {
        let store = JsonStore::global()?;
        store.save(RUNTIME_CONFIG_FILE, self)
    }

    /// 부분 JSON 문서 병합
    ///
    /// 문서에 적힌 키만 덮어쓴다. 빠진 키는 기본값이 아니라 현재 값을 유지.
    /// `searchPaths` 는 교체하지 않고 앞에 추가.
    pub fn merge(&mut self, overlay: Value) -> Result<()> {
        let Value::Object(mut fields) = overlay else {
            return Err(Error::Config(
                "runtime config overlay must be a JSON object".into(),
            ));
        };
        let search_paths: Vec<PathBuf> = match fields.remove("searchPaths") {
            Some(paths) => serde_json::from_value(paths)?,
            None => Vec::new(),
        };

        let mut current = serde_json::to_value(&*self)?;
        if let Value::Object(current_fields) = &mut current {
            current_fields.extend(fields);
        }
        let mut merged: RuntimeConfig = serde_json::from_value(current)?;
        merged.prepend_search_paths(search_paths);
        *self = merged;
        Ok(())
    }

    /// 검색 경로를 앞에 추가 (중복 제거, 새 경로 우선)
    pub fn prepend_search_paths(&mut self, paths: Vec<PathBuf>) {
        let mut search_paths = paths;
        for path in self.search_paths.drain(..) {
            if !search_paths.contains(&path) {
                search_paths.push(path);
            }
        }
        self.search_paths = search_paths;
    }

    // ========================================================================
    // Duration 접근자
    // ========================================================================

    pub fn discovery_interval(&self) -> Option<Duration> {
        (self.discovery_interval_secs > 0).then(|| Duration::from_secs(self.discovery_interval_secs))
    }

    pub fn operation_timeout(&self) -> Duration {
        Duration::from_secs(self.operation_timeout_secs.max(1))
    }

    pub fn health_timeout(&self) -> Duration {
        Duration::from_secs(self.health_timeout_secs.max(1))
    }

    pub fn restart_delay(&self) -> Duration {
        Duration::from_millis(self.restart_delay_ms)
    }

    pub fn max_plugin_size_bytes(&self) -> u64 {
        self.max_plugin_size_mb.saturating_mul(1024 * 1024)
    }
}
