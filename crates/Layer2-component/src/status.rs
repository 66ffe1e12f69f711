//! Component status - 레지스트리가 관리하는 상태 레코드

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// 컴포넌트 상태
///
/// 등록 시 (false, false) 로 생성되고 레지스트리의 start/stop 경로에서만 변경된다.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComponentStatus {
    pub name: String,
    pub running: bool,
    pub healthy: bool,
    pub start_time: Option<DateTime<Utc>>,
    pub error: Option<String>,
}

impl ComponentStatus {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            running: false,
            healthy: false,
            start_time: None,
            error: None,
        }
    }

    /// 의존 대상으로 쓸 수 있는 상태인지 (Running AND Healthy)
    pub fn is_ready(&self) -> bool {
        self.running && self.healthy
    }

    pub(crate) fn mark_started(&mut self, healthy: bool, error: Option<String>) {
        self.running = true;
        self.healthy = healthy;
        self.start_time = Some(Utc::now());
        self.error = error;
    }

    pub(crate) fn mark_stopped(&mut self) {
        self.running = false;
        self.healthy = false;
        self.error = None;
    }

    pub(crate) fn mark_failed(&mut self, error: impl Into<String>) {
        self.running = false;
        self.healthy = false;
        self.error = Some(error.into());
    }
}
