//! Plugin Security Gate - 로드 전 파일/이름 검증
//!
//! ## 검사 순서 (첫 위반에서 중단)
//!
//! ```text
//! traversal → 존재 → 제한 경로 → 확장자 → 크기 → 서명 정책 → 해시
//! ```
//!
//! 정책, 신뢰 해시, 블랙리스트는 하나의 `PluginSecurity` 인스턴스가 소유한다.
//! 영속화는 호출자 몫이며 [`SecurityTables`] 로 import/export 한다.

use anvil_foundation::{Error, Result, RuntimeConfig, SecurityLevel};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::{HashMap, HashSet};
use std::path::{Component, Path, PathBuf};
use tokio::io::AsyncReadExt;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

/// 보안 테이블 저장 파일명
pub const SECURITY_TABLES_FILE: &str = "security.json";

// ============================================================================
// SecurityPolicy
// ============================================================================

/// 보안 정책
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SecurityPolicy {
    pub level: SecurityLevel,
    pub require_signature: bool,
    pub require_hash_check: bool,
    pub allow_unsigned_local: bool,
    /// 바이트 단위
    pub max_plugin_size: u64,
    /// 점 없는 소문자 확장자
    pub allowed_extensions: Vec<String>,
    pub restricted_paths: Vec<PathBuf>,
}

impl Default for SecurityPolicy {
    fn default() -> Self {
        Self::from_runtime(&RuntimeConfig::default())
    }
}

impl SecurityPolicy {
    /// 런타임 설정에서 정책 생성
    pub fn from_runtime(config: &RuntimeConfig) -> Self {
        Self {
            level: config.security_level,
            require_signature: config.require_signature,
            require_hash_check: config.require_hash_check,
            allow_unsigned_local: config.allow_unsigned_local,
            max_plugin_size: config.max_plugin_size_bytes(),
            allowed_extensions: vec!["so".into(), "dylib".into(), "dll".into()],
            restricted_paths: ["/etc", "/sys", "/proc", "/dev", "/boot"]
                .iter()
                .map(PathBuf::from)
                .collect(),
        }
    }

    pub fn with_level(mut self, level: SecurityLevel) -> Self {
        self.level = level;
        self
    }

    pub fn with_max_plugin_size(mut self, bytes: u64) -> Self {
        self.max_plugin_size = bytes;
        self
    }

    pub fn with_hash_check(mut self, required: bool) -> Self {
        self.require_hash_check = required;
        self
    }

    pub fn with_restricted_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.restricted_paths.push(path.into());
        self
    }

    /// 신뢰 해시가 없을 때 실패시키는 레벨인지
    fn missing_hash_is_fatal(&self) -> bool {
        self.level >= SecurityLevel::High
    }
}

/// 신뢰 해시 + 블랙리스트 스냅샷
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SecurityTables {
    /// 플러그인 이름 -> SHA-256 hex
    #[serde(default)]
    pub trusted_hashes: HashMap<String, String>,
    #[serde(default)]
    pub blacklist: Vec<String>,
}

// ============================================================================
// PluginSecurity
// ============================================================================

/// 보안 게이트
pub struct PluginSecurity {
    policy: RwLock<SecurityPolicy>,
    trusted_hashes: RwLock<HashMap<String, String>>,
    /// 소문자로 정규화된 이름
    blacklist: RwLock<HashSet<String>>,
}

impl PluginSecurity {
    pub fn new(policy: SecurityPolicy) -> Self {
        Self {
            policy: RwLock::new(policy),
            trusted_hashes: RwLock::new(HashMap::new()),
            blacklist: RwLock::new(HashSet::new()),
        }
    }

    /// 정책 점검 후 저장된 테이블 적재
    pub async fn initialize(&self, tables: Option<SecurityTables>) -> Result<()> {
        {
            let policy = self.policy.read().await;
            if policy.allowed_extensions.is_empty() {
                return Err(Error::Config("security policy allows no plugin extensions".into()));
            }
            if policy.max_plugin_size == 0 {
                return Err(Error::Config("security policy max plugin size is zero".into()));
            }
            info!(
                "Plugin security initialized (level={}, hash_check={}, max_size={})",
                policy.level, policy.require_hash_check, policy.max_plugin_size
            );
        }

        if let Some(tables) = tables {
            self.import(tables).await;
        }
        Ok(())
    }

    pub async fn policy(&self) -> SecurityPolicy {
        self.policy.read().await.clone()
    }

    /// 레벨만 변경 (이미 로드된 플러그인은 재검증하지 않음)
    pub async fn set_security_level(&self, level: SecurityLevel) {
        let mut policy = self.policy.write().await;
        if policy.level != level {
            info!("Security level changed: {} -> {}", policy.level, level);
            policy.level = level;
        }
    }

    // ========================================================================
    // 검증
    // ========================================================================

    /// 이름 검증 (블랙리스트만)
    pub async fn validate_plugin(&self, name: &str) -> Result<()> {
        if self.is_blacklisted(name).await {
            warn!("Rejected blacklisted plugin: {}", name);
            return Err(Error::security(name, "blacklisted"));
        }
        Ok(())
    }

    /// 파일 검증
    ///
    /// `name` 은 등록된 플러그인 이름 (매니페스트 기준). 신뢰 해시는 이 이름으로 찾는다.
    pub async fn validate_plugin_file(&self, name: &str, path: &Path) -> Result<()> {
        let policy = self.policy.read().await.clone();

        if path.components().any(|c| matches!(c, Component::ParentDir)) {
            return Err(Error::security(name, "path traversal rejected"));
        }

        let metadata = tokio::fs::metadata(path)
            .await
            .map_err(|_| Error::security(name, format!("file not found: {}", path.display())))?;
        if !metadata.is_file() {
            return Err(Error::security(name, "not a regular file"));
        }

        let canonical = tokio::fs::canonicalize(path)
            .await
            .unwrap_or_else(|_| path.to_path_buf());
        if let Some(restricted) = policy
            .restricted_paths
            .iter()
            .find(|r| path.starts_with(r) || canonical.starts_with(r))
        {
            return Err(Error::security(
                name,
                format!("restricted path {}", restricted.display()),
            ));
        }

        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase)
            .unwrap_or_default();
        if !policy.allowed_extensions.contains(&extension) {
            return Err(Error::security(
                name,
                format!("extension {:?} not allowed", extension),
            ));
        }

        if metadata.len() > policy.max_plugin_size {
            return Err(Error::security(
                name,
                format!(
                    "size {} exceeds limit {}",
                    metadata.len(),
                    policy.max_plugin_size
                ),
            ));
        }

        // 서명 체계가 없으므로 로컬 미서명 허용 여부로만 판단
        if policy.require_signature && !policy.allow_unsigned_local {
            return Err(Error::security(name, "unsigned plugin"));
        }

        if policy.require_hash_check {
            self.check_hash(name, path, &policy).await?;
        }

        debug!("Plugin file {} passed validation", path.display());
        Ok(())
    }

    async fn check_hash(&self, name: &str, path: &Path, policy: &SecurityPolicy) -> Result<()> {
        let expected = self.trusted_hashes.read().await.get(name).cloned();

        let Some(expected) = expected else {
            if policy.missing_hash_is_fatal() {
                return Err(Error::security(name, "no trusted hash registered"));
            }
            warn!(
                "Plugin {} has no trusted hash; accepted at level {}",
                name, policy.level
            );
            return Ok(());
        };

        let actual = hash_file(path).await?;
        if !actual.eq_ignore_ascii_case(&expected) {
            return Err(Error::security(name, "hash mismatch"));
        }
        Ok(())
    }

    // ========================================================================
    // 테이블 조작
    // ========================================================================

    pub async fn add_trusted_hash(&self, name: impl Into<String>, hash: impl Into<String>) {
        let name = name.into();
        debug!("Trusted hash registered for {}", name);
        self.trusted_hashes
            .write()
            .await
            .insert(name, hash.into().to_ascii_lowercase());
    }

    pub async fn remove_trusted_hash(&self, name: &str) -> bool {
        self.trusted_hashes.write().await.remove(name).is_some()
    }

    pub async fn trusted_hash(&self, name: &str) -> Option<String> {
        self.trusted_hashes.read().await.get(name).cloned()
    }

    pub async fn add_to_blacklist(&self, name: &str) {
        info!("Plugin {} blacklisted", name);
        self.blacklist.write().await.insert(name.to_lowercase());
    }

    pub async fn remove_from_blacklist(&self, name: &str) -> bool {
        self.blacklist.write().await.remove(&name.to_lowercase())
    }

    pub async fn is_blacklisted(&self, name: &str) -> bool {
        self.blacklist.read().await.contains(&name.to_lowercase())
    }

    /// 테이블 병합 적재
    pub async fn import(&self, tables: SecurityTables) {
        let hashes = tables.trusted_hashes.len();
        let blocked = tables.blacklist.len();
        for (name, hash) in tables.trusted_hashes {
            self.add_trusted_hash(name, hash).await;
        }
        let mut blacklist = self.blacklist.write().await;
        blacklist.extend(tables.blacklist.iter().map(|n| n.to_lowercase()));
        debug!("Imported {} trusted hashes, {} blacklist entries", hashes, blocked);
    }

    /// 현재 테이블 스냅샷
    pub async fn export(&self) -> SecurityTables {
        let mut blacklist: Vec<_> = self.blacklist.read().await.iter().cloned().collect();
        blacklist.sort();
        SecurityTables {
            trusted_hashes: self.trusted_hashes.read().await.clone(),
            blacklist,
        }
    }
}

impl Default for PluginSecurity {
    fn default() -> Self {
        Self::new(SecurityPolicy::default())
    }
}

/// 파일의 SHA-256 (소문자 hex)
pub async fn hash_file(path: &Path) -> Result<String> {
    let mut file = tokio::fs::File::open(path).await?;
    let mut hasher = Sha256::new();
    let mut buf = vec![0u8; 64 * 1024];
    loop {
        let n = file.read(&mut buf).await?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(hex::encode(hasher.finalize()))
}
