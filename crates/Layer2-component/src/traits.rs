//! Component traits - 세 가지 capability 티어
//!
//! - `Component` (Core): 최소 단위. 다른 모든 티어는 Component 이다.
//! - `Extension`: 의존성, 활성화 여부, 우선순위를 가진 Component
//! - `Bridge`: 여러 Extension 을 연결하는 Component

use anvil_foundation::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

// ============================================================================
// ComponentKind - 티어 구분
// ============================================================================

/// 컴포넌트 티어
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ComponentKind {
    Core,
    Extension,
    Bridge,
}

impl Default for ComponentKind {
    fn default() -> Self {
        Self::Extension
    }
}

impl fmt::Display for ComponentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Core => write!(f, "core"),
            Self::Extension => write!(f, "extension"),
            Self::Bridge => write!(f, "bridge"),
        }
    }
}

// ============================================================================
// Component Traits
// ============================================================================

/// Core 컴포넌트
///
/// 이름은 프로세스 전체에서 유일해야 한다.
#[async_trait]
pub trait Component: Send + Sync {
    /// 컴포넌트 이름
    fn name(&self) -> &str;

    /// 시작
    async fn initialize(&self) -> Result<()>;

    /// 종료
    async fn shutdown(&self) -> Result<()>;

    /// 상태 검사 (Ok = healthy)
    async fn health(&self) -> Result<()> {
        Ok(())
    }
}

/// Extension 컴포넌트
#[async_trait]
pub trait Extension: Component {
    /// 먼저 Running + Healthy 여야 하는 컴포넌트 이름들
    fn dependencies(&self) -> Vec<String> {
        Vec::new()
    }

    /// false 면 InitializeAll 에서 건너뜀
    fn is_enabled(&self) -> bool {
        true
    }

    /// 낮을수록 먼저 시작
    fn priority(&self) -> i32 {
        100
    }
}

/// Bridge 컴포넌트
#[async_trait]
pub trait Bridge: Component {
    /// 연결하는 Extension 이름들
    fn connects_to(&self) -> Vec<String> {
        Vec::new()
    }

    /// 필수 브리지 여부
    fn is_required(&self) -> bool {
        false
    }
}

// ============================================================================
// ComponentHandle - 티어 태그가 붙은 컴포넌트 값
// ============================================================================

/// 레지스트리가 저장하는 컴포넌트 핸들
#[derive(Clone)]
pub enum ComponentHandle {
    Core(Arc<dyn Component>),
    Extension(Arc<dyn Extension>),
    Bridge(Arc<dyn Bridge>),
}

impl ComponentHandle {
    pub fn kind(&self) -> ComponentKind {
        match self {
            Self::Core(_) => ComponentKind::Core,
            Self::Extension(_) => ComponentKind::Extension,
            Self::Bridge(_) => ComponentKind::Bridge,
        }
    }

    pub fn name(&self) -> &str {
        match self {
            Self::Core(c) => c.name(),
            Self::Extension(e) => e.name(),
            Self::Bridge(b) => b.name(),
        }
    }

    pub async fn initialize(&self) -> Result<()> {
        match self {
            Self::Core(c) => c.initialize().await,
            Self::Extension(e) => e.initialize().await,
            Self::Bridge(b) => b.initialize().await,
        }
    }

    pub async fn shutdown(&self) -> Result<()> {
        match self {
            Self::Core(c) => c.shutdown().await,
            Self::Extension(e) => e.shutdown().await,
            Self::Bridge(b) => b.shutdown().await,
        }
    }

    pub async fn health(&self) -> Result<()> {
        match self {
            Self::Core(c) => c.health().await,
            Self::Extension(e) => e.health().await,
            Self::Bridge(b) => b.health().await,
        }
    }

    pub fn as_extension(&self) -> Option<&Arc<dyn Extension>> {
        match self {
            Self::Extension(e) => Some(e),
            _ => None,
        }
    }

    pub fn as_bridge(&self) -> Option<&Arc<dyn Bridge>> {
        match self {
            Self::Bridge(b) => Some(b),
            _ => None,
        }
    }

    /// Extension 의 의존성 (다른 티어는 빈 목록)
    pub fn dependencies(&self) -> Vec<String> {
        self.as_extension()
            .map(|e| e.dependencies())
            .unwrap_or_default()
    }

    /// Extension 이 비활성화 상태인지
    pub fn is_disabled_extension(&self) -> bool {
        self.as_extension().map_or(false, |e| !e.is_enabled())
    }

    /// Core 티어로 취급되는 핸들로 변환
    ///
    /// Extension/Bridge 값은 Component 메서드만 노출하는 어댑터로 감싼다.
    pub fn into_core(self) -> Self {
        match self {
            Self::Core(_) => self,
            other => Self::Core(Arc::new(CoreView(other))),
        }
    }
}

/// 상위 티어 값을 Core 로 노출하는 어댑터
struct CoreView(ComponentHandle);

#[async_trait]
impl Component for CoreView {
    fn name(&self) -> &str {
        self.0.name()
    }

    async fn initialize(&self) -> Result<()> {
        self.0.initialize().await
    }

    async fn shutdown(&self) -> Result<()> {
        self.0.shutdown().await
    }

    async fn health(&self) -> Result<()> {
        self.0.health().await
    }
}

impl fmt::Debug for ComponentHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ComponentHandle")
            .field("kind", &self.kind())
            .field("name", &self.name())
            .finish()
    }
}

impl From<Arc<dyn Component>> for ComponentHandle {
    fn from(c: Arc<dyn Component>) -> Self {
        Self::Core(c)
    }
}

impl From<Arc<dyn Extension>> for ComponentHandle {
    fn from(e: Arc<dyn Extension>) -> Self {
        Self::Extension(e)
    }
}

impl From<Arc<dyn Bridge>> for ComponentHandle {
    fn from(b: Arc<dyn Bridge>) -> Self {
        Self::Bridge(b)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Plain;

    #[async_trait]
    impl Component for Plain {
        fn name(&self) -> &str {
            "plain"
        }

        async fn initialize(&self) -> Result<()> {
            Ok(())
        }

        async fn shutdown(&self) -> Result<()> {
            Ok(())
        }
    }

    #[async_trait]
    impl Extension for Plain {}

    #[tokio::test]
    async fn test_extension_defaults() {
        let ext: Arc<dyn Extension> = Arc::new(Plain);
        assert!(ext.is_enabled());
        assert_eq!(ext.priority(), 100);
        assert!(ext.dependencies().is_empty());
        assert!(ext.health().await.is_ok());
    }

    #[test]
    fn test_handle_kind_and_name() {
        let handle = ComponentHandle::from(Arc::new(Plain) as Arc<dyn Extension>);
        assert_eq!(handle.kind(), ComponentKind::Extension);
        assert_eq!(handle.name(), "plain");
        assert!(handle.as_bridge().is_none());
        assert!(!handle.is_disabled_extension());
    }

    #[tokio::test]
    async fn test_into_core_keeps_name() {
        let handle = ComponentHandle::from(Arc::new(Plain) as Arc<dyn Extension>).into_core();
        assert_eq!(handle.kind(), ComponentKind::Core);
        assert_eq!(handle.name(), "plain");
        assert!(handle.initialize().await.is_ok());
    }

    #[test]
    fn test_kind_serde() {
        let kind: ComponentKind = serde_json::from_str("\"bridge\"").unwrap();
        assert_eq!(kind, ComponentKind::Bridge);
        assert_eq!(ComponentKind::default(), ComponentKind::Extension);
    }
}
