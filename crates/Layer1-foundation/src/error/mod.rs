//! Error types for Anvil
//!
//! 컴포넌트 런타임과 플러그인 시스템의 모든 에러를 중앙에서 관리

use thiserror::Error;

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

/// Anvil 에러 타입
#[derive(Error, Debug)]
pub enum Error {
    // ========================================================================
    // 등록 / 조회
    // ========================================================================
    #[error("Duplicate name: {0} is already registered")]
    DuplicateName(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Already exists: {0}")]
    AlreadyExists(String),

    // ========================================================================
    // 의존성
    // ========================================================================
    #[error("{component}: dependency {dependency} unsatisfied ({reason})")]
    DependencyUnsatisfied {
        component: String,
        dependency: String,
        reason: String,
    },

    #[error("{component}: dependency cycle detected ({})", .cycle.join(" -> "))]
    DependencyCycle { component: String, cycle: Vec<String> },

    // ========================================================================
    // 컴포넌트 / 플러그인 라이프사이클
    // ========================================================================
    #[error("{name}: {message}")]
    Component { name: String, message: String },

    #[error("plugin {plugin}: load failed: {reason}")]
    LoadFailure { plugin: String, reason: String },

    #[error("plugin {plugin}: {reason}")]
    SecurityRejected { plugin: String, reason: String },

    #[error("{name}: invalid state {state} for {operation}")]
    InvalidState {
        name: String,
        state: String,
        operation: String,
    },

    // ========================================================================
    // 실행 관련
    // ========================================================================
    #[error("Timeout: {0}")]
    Timeout(String),

    #[error("Cancelled: {0}")]
    Cancelled(String),

    // ========================================================================
    // 설정 / 검증
    // ========================================================================
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Validation error: {0}")]
    Validation(String),

    // ========================================================================
    // 종료 경로 에러 모음
    // ========================================================================
    #[error("{} error(s) during teardown: {}", .0.len(), .0.join("; "))]
    Aggregate(Vec<String>),

    // ========================================================================
    // 외부 에러 변환
    // ========================================================================
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    // ========================================================================
    // 기타
    // ========================================================================
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// 재시도 가능한 에러인지 확인
    ///
    /// 런타임은 스스로 재시도하지 않는다. 호출자가 판단하기 위한 힌트.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::Timeout(_) | Error::Cancelled(_))
    }

    /// 보안 게이트에서 거부된 에러인지 확인
    pub fn is_security(&self) -> bool {
        matches!(self, Error::SecurityRejected { .. })
    }

    /// 타임아웃 에러인지 확인
    pub fn is_timeout(&self) -> bool {
        matches!(self, Error::Timeout(_))
    }

    /// 플러그인 로드 실패 헬퍼
    pub fn load_failure(plugin: impl Into<String>, reason: impl Into<String>) -> Self {
        Error::LoadFailure {
            plugin: plugin.into(),
            reason: reason.into(),
        }
    }

    /// 보안 거부 헬퍼
    pub fn security(plugin: impl Into<String>, reason: impl Into<String>) -> Self {
        Error::SecurityRejected {
            plugin: plugin.into(),
            reason: reason.into(),
        }
    }

    /// 컴포넌트 실패 헬퍼
    pub fn component(name: impl Into<String>, message: impl Into<String>) -> Self {
        Error::Component {
            name: name.into(),
            message: message.into(),
        }
    }

    /// 잘못된 상태 전이 헬퍼
    pub fn invalid_state(
        name: impl Into<String>,
        state: impl std::fmt::Display,
        operation: impl Into<String>,
    ) -> Self {
        Error::InvalidState {
            name: name.into(),
            state: state.to_string(),
            operation: operation.into(),
        }
    }

    /// 의존성 미충족 헬퍼
    pub fn dependency(
        component: impl Into<String>,
        dependency: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Error::DependencyUnsatisfied {
            component: component.into(),
            dependency: dependency.into(),
            reason: reason.into(),
        }
    }
}

// ============================================================================
// From 구현 (추가 변환)
// ============================================================================

impl From<String> for Error {
    fn from(s: String) -> Self {
        Error::Internal(s)
    }
}

impl From<&str> for Error {
    fn from(s: &str) -> Self {
        Error::Internal(s.to_string())
    }
}
