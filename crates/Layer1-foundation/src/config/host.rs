//! Host Config - 호스트가 컴포넌트/플러그인에 주입하는 설정 값
//!
//! 기능 플래그, 경로, 호스트 버전. 런타임이 직접 만들지 않고 호스트가 넘겨준다.

use crate::storage::APP_DIR;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::path::PathBuf;

/// 호스트 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HostConfig {
    /// 호스트 버전 (플러그인 호환성 검사용)
    #[serde(default = "default_host_version")]
    pub host_version: String,

    /// 데이터 디렉토리
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    /// 플러그인별 설정 문서 디렉토리
    #[serde(default = "default_plugin_config_dir")]
    pub plugin_config_dir: PathBuf,

    /// 기능 플래그
    #[serde(default)]
    pub features: HashMap<String, bool>,

    /// 자유 형식 설정
    #[serde(default)]
    pub settings: HashMap<String, Value>,
}

fn default_host_version() -> String {
    env!("CARGO_PKG_VERSION").to_string()
}

fn default_data_dir() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(APP_DIR)
}

fn default_plugin_config_dir() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(APP_DIR)
        .join("plugins")
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            host_version: default_host_version(),
            data_dir: default_data_dir(),
            plugin_config_dir: default_plugin_config_dir(),
            features: HashMap::new(),
            settings: HashMap::new(),
        }
    }
}

impl HostConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// 기능 플래그 확인 (없으면 false)
    pub fn feature(&self, name: &str) -> bool {
        self.features.get(name).copied().unwrap_or(false)
    }

    /// 설정 값 조회
    pub fn setting(&self, key: &str) -> Option<&Value> {
        self.settings.get(key)
    }

    pub fn with_host_version(mut self, version: impl Into<String>) -> Self {
        self.host_version = version.into();
        self
    }

    pub fn with_plugin_config_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.plugin_config_dir = dir.into();
        self
    }

    pub fn with_data_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.data_dir = dir.into();
        self
    }

    pub fn with_feature(mut self, name: impl Into<String>, enabled: bool) -> Self {
        self.features.insert(name.into(), enabled);
        self
    }

    pub fn with_setting(mut self, key: impl Into<String>, value: Value) -> Self {
        self.settings.insert(key.into(), value);
        self
    }
}
