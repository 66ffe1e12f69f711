//! JSON 저장소

mod store;

pub use store::{JsonStore, APP_DIR, PROJECT_DIR};
