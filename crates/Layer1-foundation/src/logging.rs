//! Logger capability - 호스트가 주입하는 로깅 인터페이스
//!
//! 런타임 내부는 `tracing` 매크로를 직접 사용하고,
//! 플러그인 팩토리에는 이 `Logger` 트레이트 객체를 넘긴다.

use serde_json::Value;
use std::fmt;
use std::sync::Arc;

/// 로그 레벨
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum LogLevel {
    Debug,
    Info,
    Warn,
    Error,
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Debug => write!(f, "debug"),
            Self::Info => write!(f, "info"),
            Self::Warn => write!(f, "warn"),
            Self::Error => write!(f, "error"),
        }
    }
}

/// 구조화된 key/value 필드
pub type LogField<'a> = (&'a str, Value);

/// 로깅 capability
///
/// 메시지 + 구조화 데이터. 구현체는 Send + Sync 여야 하며
/// 동적 로드된 플러그인과 공유된다.
pub trait Logger: Send + Sync {
    /// 모든 레벨이 거쳐가는 단일 진입점
    fn log(&self, level: LogLevel, message: &str, fields: &[LogField<'_>]);

    fn debug(&self, message: &str, fields: &[LogField<'_>]) {
        self.log(LogLevel::Debug, message, fields);
    }

    fn info(&self, message: &str, fields: &[LogField<'_>]) {
        self.log(LogLevel::Info, message, fields);
    }

    fn warn(&self, message: &str, fields: &[LogField<'_>]) {
        self.log(LogLevel::Warn, message, fields);
    }

    fn error(&self, message: &str, fields: &[LogField<'_>]) {
        self.log(LogLevel::Error, message, fields);
    }
}

/// 필드를 `key=value` 형태로 렌더링
pub fn render_fields(fields: &[LogField<'_>]) -> String {
    fields
        .iter()
        .map(|(key, value)| match value {
            Value::String(s) => format!("{}={}", key, s),
            other => format!("{}={}", key, other),
        })
        .collect::<Vec<_>>()
        .join(" ")
}

// ============================================================================
// TracingLogger - tracing 으로 전달
// ============================================================================

/// `tracing` 기반 기본 Logger
#[derive(Debug, Clone)]
pub struct TracingLogger {
    /// 로그 출처 (플러그인 이름 등)
    source: String,
}

impl TracingLogger {
    pub fn new(source: impl Into<String>) -> Self {
        Self {
            source: source.into(),
        }
    }

    /// 공유 가능한 트레이트 객체로 생성
    pub fn shared(source: impl Into<String>) -> Arc<dyn Logger> {
        Arc::new(Self::new(source))
    }

    pub fn source(&self) -> &str {
        &self.source
    }
}

impl Default for TracingLogger {
    fn default() -> Self {
        Self::new("anvil")
    }
}

impl Logger for TracingLogger {
    fn log(&self, level: LogLevel, message: &str, fields: &[LogField<'_>]) {
        let rendered = render_fields(fields);
        match level {
            LogLevel::Debug => tracing::debug!(source = %self.source, fields = %rendered, "{}", message),
            LogLevel::Info => tracing::info!(source = %self.source, fields = %rendered, "{}", message),
            LogLevel::Warn => tracing::warn!(source = %self.source, fields = %rendered, "{}", message),
            LogLevel::Error => tracing::error!(source = %self.source, fields = %rendered, "{}", message),
        }
    }
}

/// 아무것도 기록하지 않는 Logger
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopLogger;

impl Logger for NoopLogger {
    fn log(&self, _level: LogLevel, _message: &str, _fields: &[LogField<'_>]) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::Mutex;

    #[derive(Default)]
    struct CaptureLogger {
        lines: Mutex<Vec<String>>,
    }

    impl Logger for CaptureLogger {
        fn log(&self, level: LogLevel, message: &str, fields: &[LogField<'_>]) {
            self.lines
                .lock()
                .unwrap()
                .push(format!("{} {} {}", level, message, render_fields(fields)));
        }
    }

    #[test]
    fn test_render_fields() {
        let rendered = render_fields(&[("plugin", json!("foo")), ("attempt", json!(2))]);
        assert_eq!(rendered, "plugin=foo attempt=2");
    }

    #[test]
    fn test_default_methods_route_through_log() {
        let logger = CaptureLogger::default();
        logger.warn("hash missing", &[("plugin", json!("foo"))]);
        logger.debug("tick", &[]);

        let lines = logger.lines.lock().unwrap();
        assert_eq!(lines[0], "warn hash missing plugin=foo");
        assert_eq!(lines[1], "debug tick ");
    }
}
