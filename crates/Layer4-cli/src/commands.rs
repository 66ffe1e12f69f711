//! 서브커맨드 구현

use anvil_component::ComponentRegistry;
use anvil_foundation::{HostConfig, JsonStore, RuntimeConfig, TracingLogger};
use anvil_plugin::discovery::{inspect, plugin_name_from_path};
use anvil_plugin::security::SECURITY_TABLES_FILE;
use anvil_plugin::{hash_file, PluginDetails, PluginManager, PluginSecurity, SecurityPolicy, SecurityTables};
use anyhow::{Context as _, Result};
use serde_json::Value;
use std::path::Path;
use std::sync::Arc;

/// 커맨드 공통 입력
pub struct Context {
    pub host: Arc<HostConfig>,
    pub runtime: RuntimeConfig,
}

impl Context {
    /// 일회성 실행용 매니저 (자동 로드 / 주기 검색 끔)
    fn manager(&self) -> PluginManager {
        let runtime = RuntimeConfig {
            auto_load_enabled: false,
            discovery_interval_secs: 0,
            ..self.runtime.clone()
        };
        PluginManager::new(
            Arc::new(ComponentRegistry::new()),
            TracingLogger::shared("plugin"),
            Arc::clone(&self.host),
            runtime,
        )
    }

    fn data_store(&self) -> JsonStore {
        JsonStore::new(&self.host.data_dir)
    }

    fn security_tables(&self) -> Result<Option<SecurityTables>> {
        self.data_store()
            .load_optional(SECURITY_TABLES_FILE)
            .context("failed to read security tables")
    }
}

// ============================================================================
// list / discover / info
// ============================================================================

pub async fn list(ctx: &Context) -> Result<()> {
    let manager = ctx.manager();
    manager.config_store().load_all().await?;
    manager.discover_plugins().await?;

    let plugins = manager.list_plugins().await;
    if plugins.is_empty() {
        println!("No plugins found.");
        return Ok(());
    }

    println!("\n🔌 Plugins\n");
    println!(
        "{:<20} {:<10} {:<10} {:<10} {:<8} {}",
        "NAME", "TYPE", "VERSION", "STATUS", "ENABLED", "PATH"
    );
    println!("{}", "-".repeat(80));
    for info in plugins {
        let enabled = manager
            .config_store()
            .get_plugin_config(info.name())
            .await?
            .is_enabled();
        let location = info
            .file_path()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "(builtin)".to_string());
        println!(
            "{:<20} {:<10} {:<10} {:<10} {:<8} {}",
            info.name(),
            info.metadata.plugin_type.to_string(),
            info.metadata.version,
            info.status.to_string(),
            if enabled { "yes" } else { "no" },
            location
        );
    }

    let summary = manager.summary().await;
    println!("\nTotal: {}", summary.total);
    Ok(())
}

pub async fn discover(ctx: &Context) -> Result<()> {
    let manager = ctx.manager();

    println!("Search paths:");
    for path in manager.registry().search_paths().await {
        let marker = if path.is_dir() { "✓" } else { " " };
        println!("  {} {}", marker, path.display());
    }

    let added = manager.discover_plugins().await?;
    if added.is_empty() {
        println!("\nNo plugins discovered.");
    } else {
        println!("\nDiscovered {} plugins:", added.len());
        for name in added {
            println!("  - {}", name);
        }
    }
    Ok(())
}

pub async fn info(ctx: &Context, name: &str) -> Result<()> {
    let manager = ctx.manager();
    manager.config_store().load_all().await?;
    manager.discover_plugins().await?;

    let details = manager.get_plugin_info(name).await?;
    print_details(&details);
    Ok(())
}

fn print_details(details: &PluginDetails) {
    let info = &details.info;
    println!("\n{} v{} ({})", info.name(), info.metadata.version, info.metadata.plugin_type);
    if !info.metadata.description.is_empty() {
        println!("  {}", info.metadata.description);
    }
    println!("  status:   {}", info.status);
    println!("  enabled:  {}", details.enabled);
    println!("  health:   {}", details.health);
    if let Some(path) = info.file_path() {
        println!("  path:     {}", path.display());
    }
    if let Some(error) = &info.last_error {
        println!("  error:    {}", error);
    }
    if !details.dependencies.is_empty() {
        println!("  dependencies:");
        for (dependency, state) in &details.dependencies {
            println!("    - {} ({})", dependency, state);
        }
    }
}

// ============================================================================
// validate / hash
// ============================================================================

pub async fn validate(ctx: &Context, path: &Path) -> Result<()> {
    let security = PluginSecurity::new(SecurityPolicy::from_runtime(&ctx.runtime));
    security.initialize(ctx.security_tables()?).await?;

    // 사이드카 매니페스트가 있으면 그 이름이 신뢰 해시의 키
    let name = inspect(path)
        .map(|found| found.manifest.name)
        .or_else(|| plugin_name_from_path(path))
        .unwrap_or_else(|| path.display().to_string());
    security.validate_plugin(&name).await?;
    security.validate_plugin_file(&name, path).await?;

    println!(
        "✓ {} passed validation (level {})",
        path.display(),
        ctx.runtime.security_level
    );
    Ok(())
}

pub async fn hash(ctx: &Context, path: &Path, trust: Option<&str>) -> Result<()> {
    let digest = hash_file(path).await?;
    println!("{}  {}", digest, path.display());

    if let Some(name) = trust {
        let store = ctx.data_store();
        let mut tables = ctx.security_tables()?.unwrap_or_default();
        tables.trusted_hashes.insert(name.to_string(), digest);
        store
            .save(SECURITY_TABLES_FILE, &tables)
            .context("failed to save security tables")?;
        println!("✓ Trusted hash registered for {}", name);
    }
    Ok(())
}

// ============================================================================
// config
// ============================================================================

pub async fn config_show(ctx: &Context, name: &str) -> Result<()> {
    let manager = ctx.manager();
    let config = manager.config_store().get_plugin_config(name).await?;
    println!("{}", serde_json::to_string_pretty(&config)?);
    Ok(())
}

pub async fn config_set(ctx: &Context, name: &str, key: &str, raw: &str) -> Result<()> {
    let value = serde_json::from_str::<Value>(raw).unwrap_or_else(|_| Value::String(raw.to_string()));
    let manager = ctx.manager();
    manager.config_store().set_setting(name, key, value).await?;
    println!("✓ {}.{} updated", name, key);
    Ok(())
}

pub async fn config_enable(ctx: &Context, name: &str, enabled: bool) -> Result<()> {
    let manager = ctx.manager();
    manager.config_store().set_enabled(name, enabled).await?;
    println!(
        "✓ {} {}",
        name,
        if enabled { "enabled" } else { "disabled" }
    );
    Ok(())
}

// ============================================================================
// load
// ============================================================================

pub async fn load(ctx: &Context, name: &str, wait: bool) -> Result<()> {
    let manager = ctx.manager();
    manager.initialize().await?;
    if !manager.registry().contains(name).await {
        manager.discover_plugins().await?;
    }

    let result = run_loaded(&manager, name, wait).await;
    manager.shutdown().await?;
    result
}

async fn run_loaded(manager: &PluginManager, name: &str, wait: bool) -> Result<()> {
    manager
        .load_plugin(name)
        .await
        .with_context(|| format!("failed to load {}", name))?;
    print_details(&manager.get_plugin_info(name).await?);

    if wait {
        println!("\nRunning. Press Ctrl-C to stop.");
        tokio::signal::ctrl_c().await?;
    }
    Ok(())
}
