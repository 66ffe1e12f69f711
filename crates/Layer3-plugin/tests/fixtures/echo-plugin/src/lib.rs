//! 로더 테스트용 동적 플러그인
//!
//! 호스트와 다른 tokio 복사본을 쓰게 되므로 컴포넌트 안에서 런타임 API 를 부르지 않는다.

use anvil_component::{Component, ComponentHandle, Extension};
use anvil_foundation::{HostConfig, Logger, Result};
use anvil_plugin::PluginComponent;
use async_trait::async_trait;
use std::sync::Arc;

struct Echo {
    logger: Arc<dyn Logger>,
}

#[async_trait]
impl Component for Echo {
    fn name(&self) -> &str {
        "echo"
    }

    async fn initialize(&self) -> Result<()> {
        self.logger.info("echo plugin initialized", &[]);
        Ok(())
    }

    async fn shutdown(&self) -> Result<()> {
        Ok(())
    }
}

impl Extension for Echo {
    fn priority(&self) -> i32 {
        42
    }
}

fn create(
    logger: Arc<dyn Logger>,
    _config: Arc<HostConfig>,
) -> std::result::Result<PluginComponent, String> {
    Ok(ComponentHandle::Extension(Arc::new(Echo { logger })))
}

anvil_plugin::declare_plugin!(create);
