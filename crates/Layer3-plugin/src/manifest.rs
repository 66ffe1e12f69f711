//! Plugin Manifest - 로드 전에 읽는 플러그인 메타데이터
//!
//! 바이너리 옆의 `<stem>.json` 에서 읽거나, 없으면 파일 이름으로 합성한다.

use crate::loader::DEFAULT_ENTRY_POINT;
use anvil_component::ComponentKind;
use anvil_foundation::{Error, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::cmp::Ordering;
use std::collections::HashMap;
use std::fmt;
use std::path::Path;

/// 플러그인 티어 (컴포넌트 티어와 동일)
pub type PluginType = ComponentKind;

// ============================================================================
// PluginVersion
// ============================================================================

/// 플러그인/호스트 버전 (major.minor.patch)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PluginVersion {
    pub major: u32,
    pub minor: u32,
    pub patch: u32,
}

impl PluginVersion {
    pub fn new(major: u32, minor: u32, patch: u32) -> Self {
        Self {
            major,
            minor,
            patch,
        }
    }

    /// 버전 문자열 파싱 ("1.2.3", "v1.2", "1.2.3-beta" 허용)
    pub fn parse(s: &str) -> Option<Self> {
        let core = s.trim().trim_start_matches('v');
        let core = core.split(['-', '+']).next()?;

        let mut parts = core.split('.');
        let major = parts.next()?.parse().ok()?;
        let minor = parts.next().map_or(Some(0), |p| p.parse().ok())?;
        let patch = parts.next().map_or(Some(0), |p| p.parse().ok())?;
        if parts.next().is_some() {
            return None;
        }

        Some(Self::new(major, minor, patch))
    }

    /// 같은 메이저 버전이면 호환
    pub fn is_compatible_with(&self, other: &PluginVersion) -> bool {
        self.major == other.major
    }
}

impl Ord for PluginVersion {
    fn cmp(&self, other: &Self) -> Ordering {
        (self.major, self.minor, self.patch).cmp(&(other.major, other.minor, other.patch))
    }
}

impl PartialOrd for PluginVersion {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for PluginVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

impl Default for PluginVersion {
    fn default() -> Self {
        Self::new(0, 1, 0)
    }
}

// ============================================================================
// PluginManifest
// ============================================================================

/// 플러그인 매니페스트
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PluginManifest {
    pub name: String,

    #[serde(default = "default_version")]
    pub version: String,

    #[serde(default)]
    pub description: String,

    #[serde(default)]
    pub author: Option<String>,

    #[serde(default)]
    pub license: Option<String>,

    /// 팩토리 심볼 이름
    #[serde(default = "default_entry_point")]
    pub entry_point: String,

    /// 선언된 티어
    #[serde(default, rename = "type")]
    pub plugin_type: PluginType,

    #[serde(default)]
    pub dependencies: Vec<String>,

    /// 의존성 미충족 시에도 호스트가 계속 진행해도 되는지
    #[serde(default)]
    pub optional: bool,

    #[serde(default)]
    pub settings: HashMap<String, Value>,

    #[serde(default)]
    pub permissions: Vec<String>,

    #[serde(default)]
    pub min_host_version: Option<String>,

    #[serde(default)]
    pub max_host_version: Option<String>,
}

fn default_version() -> String {
    PluginVersion::default().to_string()
}

fn default_entry_point() -> String {
    DEFAULT_ENTRY_POINT.to_string()
}

impl PluginManifest {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: default_version(),
            description: String::new(),
            author: None,
            license: None,
            entry_point: default_entry_point(),
            plugin_type: PluginType::Extension,
            dependencies: Vec::new(),
            optional: false,
            settings: HashMap::new(),
            permissions: Vec::new(),
            min_host_version: None,
            max_host_version: None,
        }
    }

    /// 파일 이름으로 매니페스트 합성
    pub fn synthesize(name: impl Into<String>, path: &Path) -> Self {
        let name = name.into();
        let description = format!("Plugin loaded from {}", path.display());
        Self::new(name).with_description(description)
    }

    /// JSON 매니페스트 읽기
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let manifest: Self = serde_json::from_str(&content).map_err(|e| {
            Error::Validation(format!("manifest {}: {}", path.display(), e))
        })?;
        manifest.validate()?;
        Ok(manifest)
    }

    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(Error::Validation("manifest name must not be empty".into()));
        }
        validate_plugin_name(&self.name)?;
        if self.entry_point.trim().is_empty() {
            return Err(Error::Validation(format!(
                "manifest {}: entry point must not be empty",
                self.name
            )));
        }
        Ok(())
    }

    /// 호스트 버전이 선언된 범위 안에 있는지 확인
    pub fn check_host_compatibility(&self, host_version: &str) -> Result<()> {
        if self.min_host_version.is_none() && self.max_host_version.is_none() {
            return Ok(());
        }

        let host = PluginVersion::parse(host_version).ok_or_else(|| {
            Error::load_failure(&self.name, format!("unparsable host version {}", host_version))
        })?;

        let bound = |raw: &str| {
            PluginVersion::parse(raw).ok_or_else(|| {
                Error::load_failure(&self.name, format!("unparsable version bound {}", raw))
            })
        };

        if let Some(min) = &self.min_host_version {
            if host < bound(min)? {
                return Err(Error::load_failure(
                    &self.name,
                    format!("requires host >= {}, running {}", min, host),
                ));
            }
        }
        if let Some(max) = &self.max_host_version {
            if host > bound(max)? {
                return Err(Error::load_failure(
                    &self.name,
                    format!("requires host <= {}, running {}", max, host),
                ));
            }
        }
        Ok(())
    }

    pub fn with_description(mut self, desc: impl Into<String>) -> Self {
        self.description = desc.into();
        self
    }

    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = version.into();
        self
    }

    pub fn with_type(mut self, plugin_type: PluginType) -> Self {
        self.plugin_type = plugin_type;
        self
    }

    pub fn with_dependency(mut self, name: impl Into<String>) -> Self {
        self.dependencies.push(name.into());
        self
    }

    pub fn with_entry_point(mut self, symbol: impl Into<String>) -> Self {
        self.entry_point = symbol.into();
        self
    }

    pub fn with_host_range(mut self, min: Option<&str>, max: Option<&str>) -> Self {
        self.min_host_version = min.map(String::from);
        self.max_host_version = max.map(String::from);
        self
    }
}

/// 플러그인 이름 검사
///
/// 이름은 설정 파일명과 작업 디렉터리에 그대로 쓰이므로 한 경로 구성요소여야 한다.
/// 구분자, `..`, 선행 `.` 는 거부.
pub fn validate_plugin_name(name: &str) -> Result<()> {
    let invalid = name.is_empty()
        || name.contains(['/', '\\', '\0'])
        || name.contains("..")
        || name.starts_with('.');
    if invalid {
        return Err(Error::Validation(format!("invalid plugin name {:?}", name)));
    }
    Ok(())
}

// ============================================================================
// PluginMetadata - PluginInfo 가 들고 있는 요약
// ============================================================================

/// 플러그인 메타데이터
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PluginMetadata {
    pub name: String,
    #[serde(rename = "type")]
    pub plugin_type: PluginType,
    pub version: String,
    pub description: String,
    pub dependencies: Vec<String>,
    pub optional: bool,
    pub enabled: bool,
}

impl From<&PluginManifest> for PluginMetadata {
    fn from(manifest: &PluginManifest) -> Self {
        Self {
            name: manifest.name.clone(),
            plugin_type: manifest.plugin_type,
            version: manifest.version.clone(),
            description: manifest.description.clone(),
            dependencies: manifest.dependencies.clone(),
            optional: manifest.optional,
            enabled: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_version_parse() {
        let v = PluginVersion::parse("1.2.3").unwrap();
        assert_eq!(v, PluginVersion::new(1, 2, 3));
        assert_eq!(PluginVersion::parse("v2.1").unwrap(), PluginVersion::new(2, 1, 0));
        assert_eq!(
            PluginVersion::parse("0.4.0-beta.1").unwrap(),
            PluginVersion::new(0, 4, 0)
        );
        assert!(PluginVersion::parse("1.2.3.4").is_none());
        assert!(PluginVersion::parse("x.y").is_none());
    }

    #[test]
    fn test_version_ordering() {
        assert!(PluginVersion::new(1, 10, 0) > PluginVersion::new(1, 9, 9));
        assert!(PluginVersion::new(1, 0, 0).is_compatible_with(&PluginVersion::new(1, 4, 0)));
        assert!(!PluginVersion::new(1, 0, 0).is_compatible_with(&PluginVersion::new(2, 0, 0)));
    }

    #[test]
    fn test_manifest_defaults_from_json() {
        let manifest: PluginManifest = serde_json::from_str(r#"{ "name": "md" }"#).unwrap();
        assert_eq!(manifest.plugin_type, PluginType::Extension);
        assert_eq!(manifest.entry_point, DEFAULT_ENTRY_POINT);
        assert_eq!(manifest.version, "0.1.0");
    }

    #[test]
    fn test_manifest_type_field() {
        let manifest: PluginManifest =
            serde_json::from_str(r#"{ "name": "net", "type": "bridge", "dependencies": ["a"] }"#)
                .unwrap();
        assert_eq!(manifest.plugin_type, PluginType::Bridge);
        assert_eq!(manifest.dependencies, vec!["a"]);
    }

    #[test]
    fn test_from_file_rejects_empty_name() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("bad.json");
        std::fs::write(&path, r#"{ "name": "" }"#).unwrap();
        assert!(matches!(
            PluginManifest::from_file(&path),
            Err(Error::Validation(_))
        ));
    }

    #[test]
    fn test_name_must_be_single_path_component() {
        for name in ["../../escaped", "a/b", "a\\b", "..", ".hidden", "x..y"] {
            assert!(
                PluginManifest::new(name).validate().is_err(),
                "{} accepted",
                name
            );
        }
        assert!(PluginManifest::new("net-bridge_2").validate().is_ok());

        let temp = TempDir::new().unwrap();
        let path = temp.path().join("net.json");
        std::fs::write(&path, r#"{ "name": "../../escaped" }"#).unwrap();
        assert!(matches!(
            PluginManifest::from_file(&path),
            Err(Error::Validation(_))
        ));
    }

    #[test]
    fn test_host_compatibility() {
        let manifest = PluginManifest::new("x").with_host_range(Some("1.2.0"), Some("1.9.9"));
        assert!(manifest.check_host_compatibility("1.5.0").is_ok());
        assert!(manifest.check_host_compatibility("1.1.0").is_err());
        assert!(manifest.check_host_compatibility("2.0.0").is_err());

        let open = PluginManifest::new("y");
        assert!(open.check_host_compatibility("garbage").is_ok());
    }
}
