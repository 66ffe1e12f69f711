//! Storage module for Anvil
//!
//! - `json`: JSON - 문서 단위 파일 저장/로드 (플러그인 설정, 런타임 설정)

mod json;

pub use json::{JsonStore, APP_DIR, PROJECT_DIR};
