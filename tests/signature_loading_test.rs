use classhound::signatures::{Entry, SignatureLoader};
use classhound::{HoundError, SuspicionLevel};
use std::fs;
use std::sync::Arc;
use tempfile::TempDir;

fn write(dir: &TempDir, relative: &str, contents: &str) {
    let path = dir.path().join(relative);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    fs::write(path, contents).unwrap();
}

fn document(identifier: &str, level: &str) -> String {
    format!(
        r#"{{
  "archetype": {{"level": "{}", "identifier": "{}", "description": "test"}},
  "code-patterns": {{"v": [{{"op": "EQUALS NOP"}}, "**", {{"op": "EQUALS POP"}}]}}
}}"#,
        level, identifier
    )
}

#[test]
fn test_load_dir_collects_good_and_bad_files() {
    let dir = TempDir::new().unwrap();
    write(&dir, "a/first.json", &document("first", "WEAK"));
    write(&dir, "b/second.json", &document("second", "MAXIMUM"));
    write(&dir, "b/broken.yml", "archetype: [not, a, mapping]\n");
    write(&dir, "c/readme.md", "# ignored");

    let report = SignatureLoader::new().load_dir(dir.path()).unwrap();
    let ids: Vec<_> = report
        .signatures
        .iter()
        .map(|s| s.archetype().identifier.clone())
        .collect();
    assert_eq!(ids, vec!["first", "second"]);
    assert_eq!(report.failures.len(), 1);
    assert!(report.failures[0].path.ends_with("b/broken.yml"));
    assert!(report.failures[0].error.is_format_error());
    assert!(!report.is_clean());
}

#[test]
fn test_duplicate_archetype_reported_for_later_file() {
    let dir = TempDir::new().unwrap();
    write(&dir, "1.json", &document("same", "WEAK"));
    write(&dir, "2.json", &document("same", "STRONG"));

    let report = SignatureLoader::new().load_dir(dir.path()).unwrap();
    assert_eq!(report.signatures.len(), 1);
    assert_eq!(report.signatures[0].archetype().level, SuspicionLevel::Weak);
    assert_eq!(report.failures.len(), 1);
    assert!(report.failures[0].path.ends_with("2.json"));
    assert!(matches!(
        report.failures[0].error,
        HoundError::DuplicateArchetype { ref identifier } if identifier == "same"
    ));
}

#[test]
fn test_load_dir_missing_directory() {
    let err = SignatureLoader::new().load_dir("/nonexistent/signatures").unwrap_err();
    assert!(matches!(err, HoundError::PathNotFound { .. }));
}

#[test]
fn test_load_file_yaml_and_json_equivalent() {
    let dir = TempDir::new().unwrap();
    write(&dir, "sig.json", &document("equiv", "MEDIUM"));
    write(
        &dir,
        "sig.yaml",
        "archetype:\n  level: MEDIUM\n  identifier: equiv\n  description: test\ncode-patterns:\n  v:\n    - op: EQUALS NOP\n    - \"**\"\n    - op: EQUALS POP\n",
    );

    let loader = SignatureLoader::new();
    let json = loader.load_file(dir.path().join("sig.json")).unwrap();
    let yaml = loader.load_file(dir.path().join("sig.yaml")).unwrap();
    assert_eq!(json, yaml);
    assert_eq!(json.variant("v").map(|v| v[1].clone()), Some(Entry::unbounded_run()));
}

#[test]
fn test_load_paths_mixes_files_and_directories() {
    let dir = TempDir::new().unwrap();
    write(&dir, "set/a.json", &document("a", "WEAK"));
    write(&dir, "set/b.json", &document("b", "WEAK"));
    write(&dir, "single.json", &document("c", "WEAK"));

    let loader = SignatureLoader::new();
    let report = loader.load_paths(&[
        dir.path().join("set"),
        dir.path().join("single.json"),
        dir.path().join("missing.json"),
    ]);
    assert_eq!(report.signatures.len(), 3);
    assert_eq!(report.failures.len(), 1);
    assert!(matches!(report.failures[0].error, HoundError::PathNotFound { .. }));
}

#[test]
fn test_shared_cache_across_loaders() {
    let dir = TempDir::new().unwrap();
    let regex_doc = r#"{
      "archetype": {"level": "WEAK", "identifier": "r", "description": ""},
      "code-patterns": {"v": [{"op": "REGEX_FULL_MATCH INVOKE.*"}]}
    }"#;
    write(&dir, "r.json", regex_doc);

    let first = SignatureLoader::new();
    let second = SignatureLoader::with_cache(Arc::clone(first.cache()));
    first.load_file(dir.path().join("r.json")).unwrap();
    second.load_file(dir.path().join("r.json")).unwrap();
    assert_eq!(first.cache().len(), 1);

    let isolated = SignatureLoader::new();
    assert!(isolated.cache().is_empty());
}
