//! Every workspace member inherits the workspace version, and the internal
//! path dependencies pin that same version.

use std::path::{Path, PathBuf};

const MEMBERS: [&str; 4] = [
    "crates/arena-core",
    "crates/arena-state",
    "crates/arena-cli",
    "crates/arenad",
];

fn workspace_root() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR"))
        .parent()
        .unwrap()
        .parent()
        .unwrap()
        .to_path_buf()
}

fn manifest(dir: &Path) -> toml::Value {
    let text = std::fs::read_to_string(dir.join("Cargo.toml")).unwrap();
    text.parse().unwrap()
}

fn workspace_version() -> String {
    manifest(&workspace_root())["workspace"]["package"]["version"]
        .as_str()
        .unwrap()
        .to_string()
}

#[test]
fn members_inherit_workspace_version() {
    let root = workspace_root();
    for member in MEMBERS {
        let doc = manifest(&root.join(member));
        let inherited = doc["package"]["version"]
            .get("workspace")
            .and_then(toml::Value::as_bool);
        assert_eq!(
            inherited,
            Some(true),
            "{member} should use version.workspace = true"
        );
    }
}

#[test]
fn workspace_members_are_listed() {
    let doc = manifest(&workspace_root());
    let members: Vec<&str> = doc["workspace"]["members"]
        .as_array()
        .unwrap()
        .iter()
        .filter_map(toml::Value::as_str)
        .collect();
    for member in MEMBERS {
        assert!(members.contains(&member), "{member} missing from workspace");
    }
}

#[test]
fn internal_dependencies_pin_workspace_version() {
    let doc = manifest(&workspace_root());
    let ws_version = workspace_version();
    for name in ["arena-core", "arena-state"] {
        let pinned = doc["workspace"]["dependencies"][name]["version"]
            .as_str()
            .unwrap();
        assert_eq!(pinned, ws_version, "{name} pins {pinned}, workspace is {ws_version}");
    }
}

#[test]
fn workspace_version_matches_cargo_pkg() {
    assert_eq!(workspace_version(), env!("CARGO_PKG_VERSION"));
}
