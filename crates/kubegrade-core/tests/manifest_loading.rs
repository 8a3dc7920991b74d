//! Loading submission directories from disk.

use std::fs;
use std::path::{Path, PathBuf};

use kubegrade_cluster::{ResourceKind, ResourceRef};
use kubegrade_core::{LoadError, ManifestLoader};

fn fixture_dir() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures/complete")
}

#[test]
fn test_loads_files_in_name_order() {
    let submission = ManifestLoader::default().load_dir(&fixture_dir()).unwrap();
    let kinds: Vec<&str> = submission.documents().iter().map(|d| d.kind.as_str()).collect();
    // configmap.yaml, deployment.yaml, secret.yaml, service.yml; README.txt is ignored
    assert_eq!(kinds, ["ConfigMap", "Deployment", "Secret", "Service"]);
    assert_eq!(submission.len(), 4);
    assert_eq!(submission.digest().len(), 64);
}

#[test]
fn test_digest_is_stable_and_content_sensitive() {
    let loader = ManifestLoader::default();
    let a = loader.load_dir(&fixture_dir()).unwrap();
    let b = loader.load_dir(&fixture_dir()).unwrap();
    assert_eq!(a.digest(), b.digest());

    let dir = tempfile::tempdir().unwrap();
    for entry in fs::read_dir(fixture_dir()).unwrap() {
        let path = entry.unwrap().path();
        let text = fs::read_to_string(&path).unwrap().replace("replicas: 2", "replicas: 3");
        fs::write(dir.path().join(path.file_name().unwrap()), text).unwrap();
    }
    let c = loader.load_dir(dir.path()).unwrap();
    assert_ne!(a.digest(), c.digest());
}

#[test]
fn test_missing_name_names_the_file() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(
        dir.path().join("a-ok.yaml"),
        "kind: ConfigMap\nmetadata:\n  name: cfg\n",
    )
    .unwrap();
    fs::write(
        dir.path().join("b-broken.yaml"),
        "apiVersion: apps/v1\nkind: Deployment\nmetadata:\n  labels: {app: web}\n",
    )
    .unwrap();

    let err = ManifestLoader::default().load_dir(dir.path()).unwrap_err();
    assert!(matches!(err, LoadError::MissingField { field: "metadata.name", .. }));
    assert!(err.to_string().contains("b-broken.yaml"));
    assert_eq!(err.path(), Some(&dir.path().join("b-broken.yaml")));
}

#[test]
fn test_duplicate_resource_cites_both_sources() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("one.yaml"), "kind: Service\nmetadata: {name: web}\n").unwrap();
    fs::write(dir.path().join("two.yaml"), "kind: Service\nmetadata: {name: web}\n").unwrap();

    let err = ManifestLoader::default().load_dir(dir.path()).unwrap_err();
    let LoadError::Duplicate { resource, first, second } = err else {
        panic!("expected a duplicate error, got {err}");
    };
    assert_eq!(resource, ResourceRef::new(ResourceKind::Service, "default", "web"));
    assert!(first.contains("one.yaml"));
    assert!(second.contains("two.yaml"));
}

#[test]
fn test_same_name_in_other_namespace_is_not_a_duplicate() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(
        dir.path().join("svc.yaml"),
        "kind: Service\nmetadata: {name: web}\n---\nkind: Service\nmetadata: {name: web, namespace: staging}\n",
    )
    .unwrap();
    let submission = ManifestLoader::default().load_dir(dir.path()).unwrap();
    assert_eq!(submission.len(), 2);
}

#[test]
fn test_custom_default_namespace() {
    let submission = ManifestLoader::new("grading").load_dir(&fixture_dir()).unwrap();
    assert!(submission.documents().iter().all(|d| d.namespace == "grading"));
}

#[test]
fn test_empty_directory_is_an_error() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("notes.md"), "# nothing here").unwrap();
    fs::write(dir.path().join("blank.yaml"), "---\n").unwrap();
    let err = ManifestLoader::default().load_dir(dir.path()).unwrap_err();
    assert!(matches!(err, LoadError::Empty(_)));
}

#[test]
fn test_missing_directory_is_io_error() {
    let err = ManifestLoader::default()
        .load_dir(Path::new("/definitely/not/here"))
        .unwrap_err();
    assert!(matches!(err, LoadError::Io { .. }));
}

#[test]
fn test_json_manifest_is_accepted() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(
        dir.path().join("cm.json"),
        r#"{"apiVersion": "v1", "kind": "ConfigMap", "metadata": {"name": "cfg"}, "data": {"A": "1"}}"#,
    )
    .unwrap();
    let submission = ManifestLoader::default().load_dir(dir.path()).unwrap();
    assert!(submission.config_map("cfg").is_some());
}
