//! # anvil-foundation
//!
//! Foundation layer for Anvil:
//! - Error: 공통 에러 타입 (컴포넌트/플러그인 에러 분류)
//! - Logging: 호스트가 주입하는 Logger capability
//! - Config: HostConfig (주입 값), RuntimeConfig (매니저 설정)
//! - Storage: JsonStore (문서 단위 원자적 저장)
//!
//! ## 아키텍처
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │  anvil-plugin   (Security / Config / Registry / ...)    │
//! │                     │                                   │
//! │  anvil-component (Core / Extension / Bridge registry)   │
//! │                     │                                   │
//! │  anvil-foundation (Error, Logger, Config, JsonStore)    │
//! └─────────────────────────────────────────────────────────┘
//! ```

pub mod config;
pub mod error;
pub mod logging;
pub mod storage;

// ============================================================================
// Error
// ============================================================================
pub use error::{Error, Result};

// ============================================================================
// Logging
// ============================================================================
pub use logging::{render_fields, LogField, LogLevel, Logger, NoopLogger, TracingLogger};

// ============================================================================
// Config (설정)
// ============================================================================
pub use config::{HostConfig, RuntimeConfig, SecurityLevel, RUNTIME_CONFIG_FILE};

// ============================================================================
// Storage (저장소)
// ============================================================================
pub use storage::{JsonStore, APP_DIR, PROJECT_DIR};
