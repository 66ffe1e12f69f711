//! Plugin Discovery - 검색 경로에서 플러그인 바이너리 찾기
//!
//! 플랫폼 동적 라이브러리 확장자(`so` / `dylib` / `dll`)만 대상으로 하고
//! 숨김 파일, 백업 파일, 테스트 이름 파일은 건너뛴다.
//! 매니페스트는 바이너리 옆의 `<stem>.json` 또는 `<name>.json`.

use crate::manifest::PluginManifest;
use ignore::WalkBuilder;
use std::env::consts::DLL_EXTENSION;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// 검색 경로 아래로 내려가는 최대 깊이 (플러그인별 하위 디렉토리 허용)
const MAX_DEPTH: usize = 2;

/// 발견된 플러그인
#[derive(Debug, Clone)]
pub struct DiscoveredPlugin {
    pub manifest: PluginManifest,
    pub path: PathBuf,
    /// 디스크에서 읽은 매니페스트 경로 (합성이면 None)
    pub manifest_path: Option<PathBuf>,
}

/// 기본 검색 경로 (사용자 → 시스템 → 상대 경로)
pub fn default_search_paths() -> Vec<PathBuf> {
    let mut paths = Vec::new();
    if let Some(home) = dirs::home_dir() {
        paths.push(home.join(".anvil").join("plugins"));
    }
    paths.push(PathBuf::from("/usr/local/lib/anvil/plugins"));
    paths.push(PathBuf::from("/usr/lib/anvil/plugins"));
    paths.push(PathBuf::from("plugins"));
    paths
}

/// 파일 이름에서 플러그인 이름 추출 (unix 에서는 `lib` 접두사 제거)
pub fn plugin_name_from_path(path: &Path) -> Option<String> {
    let stem = path.file_stem()?.to_str()?;
    let name = if cfg!(unix) {
        stem.strip_prefix("lib").filter(|s| !s.is_empty()).unwrap_or(stem)
    } else {
        stem
    };
    (!name.is_empty()).then(|| name.to_string())
}

/// 플러그인 바이너리 후보인지
pub fn is_plugin_candidate(path: &Path) -> bool {
    let Some(file_name) = path.file_name().and_then(|n| n.to_str()) else {
        return false;
    };
    if file_name.starts_with('.') || file_name.ends_with('~') {
        return false;
    }
    if path.extension().and_then(|e| e.to_str()) != Some(DLL_EXTENSION) {
        return false;
    }

    let stem = path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or_default()
        .to_ascii_lowercase();
    let is_backup = [".bak", ".orig", ".old"].iter().any(|s| stem.contains(s));
    let is_test = stem == "test"
        || stem.starts_with("test_")
        || stem.starts_with("test-")
        || stem.ends_with("_test")
        || stem.ends_with("-test");

    !is_backup && !is_test
}

/// 바이너리 옆의 매니페스트 경로 후보
fn manifest_candidates(path: &Path, name: &str) -> Vec<PathBuf> {
    let mut candidates = vec![path.with_extension("json")];
    if let Some(dir) = path.parent() {
        let by_name = dir.join(format!("{}.json", name));
        if !candidates.contains(&by_name) {
            candidates.push(by_name);
        }
    }
    candidates
}

/// 단일 바이너리 → DiscoveredPlugin
///
/// 매니페스트가 있지만 읽을 수 없으면 None (경고 로그).
pub fn inspect(path: &Path) -> Option<DiscoveredPlugin> {
    let name = plugin_name_from_path(path)?;

    for candidate in manifest_candidates(path, &name) {
        if !candidate.is_file() {
            continue;
        }
        return match PluginManifest::from_file(&candidate) {
            Ok(manifest) => Some(DiscoveredPlugin {
                manifest,
                path: path.to_path_buf(),
                manifest_path: Some(candidate),
            }),
            Err(e) => {
                warn!("Skipping plugin {}: {}", path.display(), e);
                None
            }
        };
    }

    let manifest = PluginManifest::synthesize(name, path);
    if let Err(e) = manifest.validate() {
        warn!("Skipping plugin {}: {}", path.display(), e);
        return None;
    }
    Some(DiscoveredPlugin {
        manifest,
        path: path.to_path_buf(),
        manifest_path: None,
    })
}

/// 검색 경로 순서대로 스캔 (블로킹)
///
/// 같은 이름이 여러 경로에 있으면 앞선 경로가 우선.
pub fn scan(search_paths: &[PathBuf]) -> Vec<DiscoveredPlugin> {
    let mut found: Vec<DiscoveredPlugin> = Vec::new();

    for root in search_paths {
        if !root.is_dir() {
            continue;
        }

        let walker = WalkBuilder::new(root)
            .hidden(true)
            .git_ignore(false)
            .git_global(false)
            .git_exclude(false)
            .max_depth(Some(MAX_DEPTH))
            .sort_by_file_name(|a, b| a.cmp(b))
            .build();

        for entry in walker {
            let entry = match entry {
                Ok(e) => e,
                Err(e) => {
                    debug!("Walk error under {}: {}", root.display(), e);
                    continue;
                }
            };

            let path = entry.path();
            if !entry.file_type().map_or(false, |t| t.is_file()) || !is_plugin_candidate(path) {
                continue;
            }

            if let Some(plugin) = inspect(path) {
                if found.iter().any(|p| p.manifest.name == plugin.manifest.name) {
                    debug!(
                        "Plugin {} shadowed by earlier search path: {}",
                        plugin.manifest.name,
                        path.display()
                    );
                    continue;
                }
                debug!("Found plugin {} at {}", plugin.manifest.name, path.display());
                found.push(plugin);
            }
        }
    }

    found
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn lib_name(stem: &str) -> String {
        format!("{}.{}", stem, DLL_EXTENSION)
    }

    fn touch(dir: &Path, file: &str) -> PathBuf {
        let path = dir.join(file);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).unwrap();
        }
        std::fs::write(&path, b"\x7fELF").unwrap();
        path
    }

    #[test]
    fn test_candidate_filter() {
        assert!(is_plugin_candidate(Path::new(&lib_name("markdown"))));
        assert!(!is_plugin_candidate(Path::new(&lib_name(".hidden"))));
        assert!(!is_plugin_candidate(Path::new(&lib_name("markdown.bak"))));
        assert!(!is_plugin_candidate(Path::new(&lib_name("markdown_test"))));
        assert!(!is_plugin_candidate(Path::new(&lib_name("test_markdown"))));
        assert!(!is_plugin_candidate(Path::new(&format!("{}~", lib_name("md")))));
        assert!(!is_plugin_candidate(Path::new("markdown.txt")));
    }

    #[cfg(unix)]
    #[test]
    fn test_lib_prefix_stripped() {
        assert_eq!(
            plugin_name_from_path(Path::new("/x/libmarkdown.so")).as_deref(),
            Some("markdown")
        );
        assert_eq!(plugin_name_from_path(Path::new("lib.so")).as_deref(), Some("lib"));
    }

    #[test]
    fn test_scan_synthesizes_manifest() {
        let temp = TempDir::new().unwrap();
        touch(temp.path(), &lib_name("markdown"));
        touch(temp.path(), "README.md");

        let found = scan(&[temp.path().to_path_buf()]);
        assert_eq!(found.len(), 1);
        let plugin = &found[0];
        assert_eq!(plugin.manifest.name, "markdown");
        assert_eq!(plugin.manifest.plugin_type, crate::manifest::PluginType::Extension);
        assert!(plugin.manifest_path.is_none());
    }

    #[test]
    fn test_scan_reads_sidecar_manifest() {
        let temp = TempDir::new().unwrap();
        touch(temp.path(), &lib_name("net"));
        std::fs::write(
            temp.path().join("net.json"),
            r#"{ "name": "network", "type": "bridge", "version": "2.0.0" }"#,
        )
        .unwrap();

        let found = scan(&[temp.path().to_path_buf()]);
        assert_eq!(found[0].manifest.name, "network");
        assert_eq!(found[0].manifest.version, "2.0.0");
        assert!(found[0].manifest_path.is_some());
    }

    #[test]
    fn test_scan_skips_broken_manifest_and_hidden_dirs() {
        let temp = TempDir::new().unwrap();
        touch(temp.path(), &lib_name("broken"));
        std::fs::write(temp.path().join("broken.json"), "{ nope").unwrap();
        touch(&temp.path().join(".cache"), &lib_name("hidden"));
        touch(&temp.path().join("nested"), &lib_name("deep"));

        let found = scan(&[temp.path().to_path_buf()]);
        let names: Vec<_> = found.iter().map(|p| p.manifest.name.as_str()).collect();
        assert_eq!(names, vec!["deep"]);
    }

    #[test]
    fn test_scan_skips_escaping_manifest_name() {
        let temp = TempDir::new().unwrap();
        touch(temp.path(), &lib_name("net"));
        std::fs::write(temp.path().join("net.json"), r#"{ "name": "../../escaped" }"#).unwrap();
        touch(temp.path(), &lib_name("ok"));

        let found = scan(&[temp.path().to_path_buf()]);
        let names: Vec<_> = found.iter().map(|p| p.manifest.name.as_str()).collect();
        assert_eq!(names, vec!["ok"]);
    }

    #[test]
    fn test_earlier_search_path_wins() {
        let first = TempDir::new().unwrap();
        let second = TempDir::new().unwrap();
        let winner = touch(first.path(), &lib_name("dup"));
        touch(second.path(), &lib_name("dup"));

        let found = scan(&[
            first.path().to_path_buf(),
            PathBuf::from("/definitely/missing"),
            second.path().to_path_buf(),
        ]);
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].path, winner);
    }
}
