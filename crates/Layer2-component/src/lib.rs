//! # anvil-component
//!
//! 컴포넌트 모델과 의존성 순서 기반 라이프사이클 레지스트리.
//!
//! ## 티어
//!
//! ```text
//! ┌────────────┐   ┌────────────┐   ┌──────────────────────┐
//! │    Core    │ → │   Bridge   │ → │ Extension (priority) │   시작 순서
//! └────────────┘   └────────────┘   └──────────────────────┘
//!                     ← 종료는 역순
//! ```
//!
//! - [`ComponentRegistry`]: 등록, 조회, InitializeAll / ShutdownAll
//! - [`ModuleManager`]: 개별 모듈 start / stop / restart

pub mod graph;
pub mod module;
pub mod registry;
pub mod status;
pub mod traits;

pub use graph::find_cycle;
pub use module::{ModuleInfo, ModuleManager};
pub use registry::ComponentRegistry;
pub use status::ComponentStatus;
pub use traits::{Bridge, Component, ComponentHandle, ComponentKind, Extension};
