//! 매니저 / 보안 / 스케줄러 통합 테스트

use anvil_component::{Component, ComponentHandle, ComponentRegistry, Extension};
use anvil_foundation::{
    Error, HostConfig, NoopLogger, Result, RuntimeConfig, SecurityLevel,
};
use anvil_plugin::{
    hash_file, PluginConfigStore, PluginManager, PluginManifest, PluginScheduler, PluginSecurity,
    PluginStatus, SecurityPolicy, StaticLoader, DISCOVERY_TASK,
};
use async_trait::async_trait;
use std::env::consts::DLL_EXTENSION;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

struct Echo;

#[async_trait]
impl Component for Echo {
    fn name(&self) -> &str {
        "echo"
    }

    async fn initialize(&self) -> Result<()> {
        Ok(())
    }

    async fn shutdown(&self) -> Result<()> {
        Ok(())
    }
}

impl Extension for Echo {}

fn write_binary(dir: &Path, stem: &str) -> PathBuf {
    std::fs::create_dir_all(dir).unwrap();
    let path = dir.join(format!("{}.{}", stem, DLL_EXTENSION));
    std::fs::write(&path, b"not really a shared object").unwrap();
    path
}

fn runtime(search_path: PathBuf) -> RuntimeConfig {
    RuntimeConfig {
        auto_discover: false,
        auto_load_enabled: true,
        load_on_enable: true,
        discovery_interval_secs: 0,
        operation_timeout_secs: 5,
        restart_delay_ms: 10,
        require_hash_check: false,
        search_paths: vec![search_path],
        ..RuntimeConfig::default()
    }
}

fn host(temp: &TempDir) -> Arc<HostConfig> {
    Arc::new(
        HostConfig::default()
            .with_data_dir(temp.path().join("data"))
            .with_plugin_config_dir(temp.path().join("config")),
    )
}

fn echo_loader() -> StaticLoader {
    StaticLoader::new()
        .with_factory("echo", |_, _| Ok(ComponentHandle::Extension(Arc::new(Echo))))
        .with_factory("broken", |_, _| Err("missing api key".to_string()))
}

fn manager(temp: &TempDir, runtime: RuntimeConfig) -> PluginManager {
    PluginManager::new(
        Arc::new(ComponentRegistry::new()),
        Arc::new(NoopLogger),
        host(temp),
        runtime,
    )
    .with_loader(Arc::new(echo_loader()))
}

// ============================================================================
// Security
// ============================================================================

#[tokio::test]
async fn traversal_is_rejected_at_every_level() {
    for level in [
        SecurityLevel::Low,
        SecurityLevel::Moderate,
        SecurityLevel::High,
        SecurityLevel::Strict,
    ] {
        for hash_check in [false, true] {
            let security = PluginSecurity::new(
                SecurityPolicy::default()
                    .with_level(level)
                    .with_hash_check(hash_check),
            );
            let err = security
                .validate_plugin_file("evil", Path::new("../evil.so"))
                .await
                .unwrap_err();
            assert!(err.is_security(), "{:?} at {}", err, level);
            assert!(err.to_string().contains("path traversal"));
        }
    }
}

#[tokio::test]
async fn missing_hash_depends_on_level() {
    let temp = TempDir::new().unwrap();
    let path = write_binary(temp.path(), "md");

    let strict = PluginSecurity::new(
        SecurityPolicy::default()
            .with_level(SecurityLevel::Strict)
            .with_hash_check(true),
    );
    let err = strict.validate_plugin_file("md", &path).await.unwrap_err();
    assert!(err.to_string().contains("no trusted hash"));

    let moderate = PluginSecurity::new(
        SecurityPolicy::default()
            .with_level(SecurityLevel::Moderate)
            .with_hash_check(true),
    );
    moderate.validate_plugin_file("md", &path).await.unwrap();

    // 등록된 해시가 맞으면 Strict 에서도 통과
    strict.add_trusted_hash("md", hash_file(&path).await.unwrap()).await;
    strict.validate_plugin_file("md", &path).await.unwrap();

    strict.add_trusted_hash("md", "00".repeat(32)).await;
    let err = strict.validate_plugin_file("md", &path).await.unwrap_err();
    assert_eq!(err.to_string(), "plugin md: hash mismatch");
}

#[tokio::test]
async fn sidecar_manifest_name_keys_trusted_hash() {
    let temp = TempDir::new().unwrap();
    let plugins = temp.path().join("plugins");
    let path = write_binary(&plugins, "net");
    std::fs::write(plugins.join("net.json"), r#"{ "name": "echo" }"#).unwrap();
    let digest = hash_file(&path).await.unwrap();

    // Strict: 매니페스트 이름으로 등록된 해시만 인정
    let strict = manager(
        &temp,
        RuntimeConfig {
            security_level: SecurityLevel::Strict,
            require_hash_check: true,
            ..runtime(plugins.clone())
        },
    );
    assert!(strict
        .discover_plugins()
        .await
        .unwrap()
        .contains(&"echo".to_string()));
    strict.security().add_trusted_hash("echo", digest.clone()).await;
    strict.load_plugin("echo").await.unwrap();
    assert_eq!(
        strict.registry().status("echo").await.unwrap(),
        PluginStatus::Active
    );

    // 파일 이름(net)으로 맞는 해시를 넣어도 echo 의 해시가 틀리면 거부
    let moderate = manager(
        &temp,
        RuntimeConfig {
            security_level: SecurityLevel::Moderate,
            require_hash_check: true,
            ..runtime(plugins)
        },
    );
    moderate.discover_plugins().await.unwrap();
    moderate.security().add_trusted_hash("net", digest).await;
    moderate.security().add_trusted_hash("echo", "00".repeat(32)).await;
    let err = moderate.load_plugin("echo").await.unwrap_err();
    assert_eq!(err.to_string(), "plugin echo: hash mismatch");
    assert!(!moderate.components().contains("echo").await);
}

// ============================================================================
// Manager
// ============================================================================

#[tokio::test]
async fn factory_error_leaves_error_status() {
    let temp = TempDir::new().unwrap();
    let plugins = temp.path().join("plugins");
    write_binary(&plugins, "broken");
    let manager = manager(&temp, runtime(plugins));

    let added = manager.discover_plugins().await.unwrap();
    assert!(added.contains(&"broken".to_string()));

    let err = manager.load_plugin("broken").await.unwrap_err();
    assert!(matches!(err, Error::LoadFailure { .. }));
    assert!(err.to_string().contains("factory error: missing api key"));

    let info = manager.registry().get("broken").await.unwrap();
    assert_eq!(info.status, PluginStatus::Error);
    assert!(info.last_error.is_some());
    assert!(!manager.components().contains("broken").await);
}

#[tokio::test]
async fn file_plugin_load_and_unload() {
    let temp = TempDir::new().unwrap();
    let plugins = temp.path().join("plugins");
    write_binary(&plugins, "echo");
    let manager = manager(&temp, runtime(plugins));
    manager.discover_plugins().await.unwrap();

    manager.load_plugin("echo").await.unwrap();
    assert_eq!(
        manager.registry().status("echo").await.unwrap(),
        PluginStatus::Active
    );
    assert!(manager.components().get_status("echo").await.unwrap().is_ready());

    manager.unload_plugin("echo").await.unwrap();
    assert_eq!(
        manager.registry().status("echo").await.unwrap(),
        PluginStatus::Unloaded
    );
    assert!(!manager.components().contains("echo").await);
}

#[tokio::test]
async fn oversized_file_never_reaches_loader() {
    let temp = TempDir::new().unwrap();
    let plugins = temp.path().join("plugins");
    let path = write_binary(&plugins, "echo");
    std::fs::write(&path, vec![0u8; 2 * 1024 * 1024]).unwrap();

    let manager = manager(
        &temp,
        RuntimeConfig {
            max_plugin_size_mb: 1,
            ..runtime(plugins)
        },
    );
    manager.discover_plugins().await.unwrap();

    let err = manager.load_plugin("echo").await.unwrap_err();
    assert!(err.is_security());
    assert_eq!(
        manager.registry().status("echo").await.unwrap(),
        PluginStatus::Unloaded
    );
}

#[tokio::test]
async fn enable_disable_persists_and_loads() {
    let temp = TempDir::new().unwrap();
    let plugins = temp.path().join("plugins");
    write_binary(&plugins, "echo");
    let manager = manager(&temp, runtime(plugins));
    manager.discover_plugins().await.unwrap();

    manager.enable_plugin("echo").await.unwrap();
    assert_eq!(
        manager.registry().status("echo").await.unwrap(),
        PluginStatus::Active
    );

    manager.disable_plugin("echo").await.unwrap();
    assert_eq!(
        manager.registry().status("echo").await.unwrap(),
        PluginStatus::Unloaded
    );
    assert!(!manager.get_plugin_info("echo").await.unwrap().enabled);

    // 새 저장소로 다시 읽어도 유지
    let store = PluginConfigStore::new(temp.path().join("config"));
    assert_eq!(store.load_all().await.unwrap(), 1);
    assert!(!store.get_plugin_config("echo").await.unwrap().is_enabled());
}

#[tokio::test]
async fn disable_without_load_on_enable_keeps_component() {
    let temp = TempDir::new().unwrap();
    let plugins = temp.path().join("plugins");
    write_binary(&plugins, "echo");
    let manager = manager(
        &temp,
        RuntimeConfig {
            load_on_enable: false,
            ..runtime(plugins)
        },
    );
    manager.discover_plugins().await.unwrap();
    manager.load_plugin("echo").await.unwrap();

    manager.disable_plugin("echo").await.unwrap();
    assert_eq!(
        manager.registry().status("echo").await.unwrap(),
        PluginStatus::Disabled
    );
    assert!(manager.components().contains("echo").await);

    manager.enable_plugin("echo").await.unwrap();
    assert_eq!(
        manager.registry().status("echo").await.unwrap(),
        PluginStatus::Active
    );
}

#[tokio::test]
async fn initialize_auto_loads_enabled_plugins() {
    let temp = TempDir::new().unwrap();
    let plugins = temp.path().join("plugins");
    write_binary(&plugins, "echo");
    write_binary(&plugins, "broken");

    let store = PluginConfigStore::new(temp.path().join("config"));
    store.set_enabled("echo", true).await.unwrap();
    store.set_enabled("broken", true).await.unwrap();

    let manager = manager(
        &temp,
        RuntimeConfig {
            auto_discover: true,
            discovery_interval_secs: 60,
            ..runtime(plugins)
        },
    );
    manager.initialize().await.unwrap();

    // broken 의 실패는 초기화를 막지 않음
    assert_eq!(
        manager.registry().status("echo").await.unwrap(),
        PluginStatus::Active
    );
    assert_eq!(
        manager.registry().status("broken").await.unwrap(),
        PluginStatus::Error
    );
    assert!(manager.scheduler().get(DISCOVERY_TASK).await.is_ok());

    manager.shutdown().await.unwrap();
    assert!(!manager.scheduler().is_running().await);
    assert!(manager.components().is_empty().await);
}

#[tokio::test]
async fn restart_returns_to_active() {
    let temp = TempDir::new().unwrap();
    let manager = manager(&temp, runtime(temp.path().join("none")));
    manager
        .registry()
        .register_builtin(
            PluginManifest::new("echo"),
            anvil_plugin::static_factory(|_, _| Ok(ComponentHandle::Extension(Arc::new(Echo)))),
        )
        .await
        .unwrap();

    manager.load_plugin("echo").await.unwrap();
    manager.restart_plugin("echo").await.unwrap();
    assert_eq!(
        manager.registry().status("echo").await.unwrap(),
        PluginStatus::Active
    );
    assert_eq!(manager.components().len().await, 1);
}

// ============================================================================
// Scheduler
// ============================================================================

#[tokio::test(start_paused = true)]
async fn repeating_task_runs_at_least_twice() {
    let scheduler = PluginScheduler::new();
    let runs = Arc::new(AtomicU64::new(0));
    let counter = Arc::clone(&runs);
    scheduler
        .schedule_repeating("tick", Duration::from_secs(2), move || {
            let counter = Arc::clone(&counter);
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok::<(), Error>(())
            }
        })
        .await
        .unwrap();

    scheduler.start().await;
    tokio::time::sleep(Duration::from_secs(7)).await;
    scheduler.stop().await;

    let info = scheduler.get("tick").await.unwrap();
    assert!(info.run_count >= 2);
    assert_eq!(info.run_count, runs.load(Ordering::SeqCst));
    let last_run = info.last_run.unwrap();
    assert!(info.next_run > last_run);
}
