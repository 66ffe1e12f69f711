//! Dependency graph - Extension 의존성 순환 검사

use std::collections::{HashMap, HashSet};

/// `start` 에서 출발해 다시 `start` 로 돌아오는 경로를 찾는다.
///
/// 반환 값은 `[start, ..., start]` 형태의 순환 경로.
/// 그래프에 없는 노드는 리프로 취급한다.
pub fn find_cycle(start: &str, edges: &HashMap<String, Vec<String>>) -> Option<Vec<String>> {
    let mut path = vec![start.to_string()];
    let mut visited = HashSet::new();
    if visit(start, start, edges, &mut path, &mut visited) {
        Some(path)
    } else {
        None
    }
}

fn visit(
    start: &str,
    node: &str,
    edges: &HashMap<String, Vec<String>>,
    path: &mut Vec<String>,
    visited: &mut HashSet<String>,
) -> bool {
    let Some(deps) = edges.get(node) else {
        return false;
    };

    for dep in deps {
        if dep == start {
            path.push(dep.clone());
            return true;
        }
        if !visited.insert(dep.clone()) {
            continue;
        }
        path.push(dep.clone());
        if visit(start, dep, edges, path, visited) {
            return true;
        }
        path.pop();
    }

    false
}
