//! Config - 설정 관리
//!
//! - `host.rs` - HostConfig (플러그인에 주입되는 설정 값)
//! - `runtime.rs` - RuntimeConfig (플러그인 매니저 동작 설정)

mod host;
mod runtime;

pub use host::HostConfig;
pub use runtime::{RuntimeConfig, SecurityLevel, RUNTIME_CONFIG_FILE};
