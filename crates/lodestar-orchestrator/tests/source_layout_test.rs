//! The workspace sources stay within the rustfmt width they are written to.

use ignore::WalkBuilder;
use std::path::{Path, PathBuf};

fn workspace_root() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("../..")
}

fn max_width(root: &Path) -> usize {
    let config = std::fs::read_to_string(root.join("rustfmt.toml")).unwrap();
    let table: toml::Table = toml::from_str(&config).unwrap();
    usize::try_from(table["max_width"].as_integer().unwrap()).unwrap()
}

/// rustfmt never splits a string literal, so a line holding only one may run long.
fn is_literal_line(line: &str) -> bool {
    let trimmed = line.trim_start();
    trimmed.starts_with('"') || line.contains("r#\"")
}

#[test]
fn test_sources_fit_configured_width() {
    let root = workspace_root();
    let width = max_width(&root);
    assert_eq!(width, 100);

    let mut overlong = Vec::new();
    let walk = WalkBuilder::new(root.join("crates")).add(root.join("apps")).build();
    for entry in walk {
        let entry = entry.unwrap();
        let path = entry.path();
        if path.extension().and_then(|ext| ext.to_str()) != Some("rs")
            || path.components().any(|c| c.as_os_str() == "target")
        {
            continue;
        }
        let content = std::fs::read_to_string(path).unwrap();
        for (index, line) in content.lines().enumerate() {
            if line.chars().count() > width && !is_literal_line(line) {
                overlong.push(format!("{}:{}", path.display(), index + 1));
            }
        }
    }
    assert!(overlong.is_empty(), "lines wider than {width}: {overlong:#?}");
}
