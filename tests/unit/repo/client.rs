use super::*;
use std::collections::HashMap;

use parking_lot::Mutex;

use crate::repo::catalog::DirCatalog;

/// In-memory catalog whose files can be swapped between calls.
#[derive(Default)]
struct MemCatalog {
    files: Mutex<HashMap<(String, String), Vec<u8>>>,
}

impl MemCatalog {
    fn put(&self, app: &str, path: &str, bytes: &[u8]) {
        self.files
            .lock()
            .insert((app.to_owned(), path.to_owned()), bytes.to_vec());
    }

    fn listing(&self, app: &str, assets: &[&str]) {
        let listing = serde_json::json!({
            "id": app,
            "name": format!("{app} app"),
            "source": format!("{app}.star"),
            "assets": assets,
            "revision": "r1",
        });
        self.put(app, "manifest.json", listing.to_string().as_bytes());
    }
}

impl Catalog for MemCatalog {
    fn describe(&self, app: &AppId) -> FrameloopResult<CatalogApp> {
        let bytes = self.fetch(app, "manifest.json")?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    fn fetch(&self, app: &AppId, path: &str) -> FrameloopResult<Vec<u8>> {
        self.files
            .lock()
            .get(&(app.to_string(), path.to_owned()))
            .cloned()
            .ok_or_else(|| FrameloopError::download(format!("{path}: not found")))
    }
}

fn temp_root() -> std::path::PathBuf {
    let dir = std::env::temp_dir().join(format!("frameloop_repo_{}", unique_suffix()));
    std::fs::create_dir_all(&dir).unwrap();
    dir
}

fn id(s: &str) -> AppId {
    AppId::new(s).unwrap()
}

#[test]
fn install_places_source_and_assets() {
    let root = temp_root();
    let catalog = Arc::new(MemCatalog::default());
    catalog.listing("clock", &["img/face.png", "./font.bin"]);
    catalog.put("clock", "clock.star", b"def main(): pass");
    catalog.put("clock", "img/face.png", b"png");
    catalog.put("clock", "font.bin", b"font");

    let client = RepositoryClient::new(AppLayout::new(root.join("apps")), catalog);
    let record = client.install(&id("clock"), None).unwrap();
    assert_eq!(record.source_file, "clock.star");
    assert_eq!(record.assets, vec!["img/face.png", "font.bin"]);
    assert_eq!(record.revision.as_deref(), Some("r1"));
    assert!(record.enabled);

    let layout = client.layout();
    assert_eq!(
        std::fs::read(layout.source_path(&id("clock"), "clock.star")).unwrap(),
        b"def main(): pass"
    );
    assert_eq!(std::fs::read(layout.assets_dir(&id("clock")).join("img/face.png")).unwrap(), b"png");

    let staging_entries = std::fs::read_dir(layout.staging_root())
        .map(|d| d.count())
        .unwrap_or(0);
    assert_eq!(staging_entries, 0);
    let _ = std::fs::remove_dir_all(&root);
}

#[test]
fn failed_update_leaves_previous_version_intact() {
    let root = temp_root();
    let catalog = Arc::new(MemCatalog::default());
    catalog.listing("clock", &[]);
    catalog.put("clock", "clock.star", b"v1");
    let client = RepositoryClient::new(AppLayout::new(root.join("apps")), Arc::clone(&catalog) as Arc<dyn Catalog>);
    client.install(&id("clock"), None).unwrap();

    // v2 lists an asset that is empty: the install must fail without touching v1.
    catalog.listing("clock", &["big.bin"]);
    catalog.put("clock", "clock.star", b"v2");
    catalog.put("clock", "big.bin", b"");
    let err = client.install(&id("clock"), None).unwrap_err();
    assert!(matches!(err, FrameloopError::Download(_)));

    let src = client.layout().source_path(&id("clock"), "clock.star");
    assert_eq!(std::fs::read(src).unwrap(), b"v1");
    let _ = std::fs::remove_dir_all(&root);
}

#[test]
fn update_preserves_config_and_record_settings() {
    let root = temp_root();
    let catalog = Arc::new(MemCatalog::default());
    catalog.listing("clock", &[]);
    catalog.put("clock", "clock.star", b"v1");
    let client = RepositoryClient::new(AppLayout::new(root.join("apps")), Arc::clone(&catalog) as Arc<dyn Catalog>);
    let mut first = client.install(&id("clock"), None).unwrap();
    std::fs::write(client.layout().config_path(&id("clock")), b"{\"units\":\"f\"}").unwrap();

    first.enabled = false;
    first.display_secs = Some(3);
    catalog.put("clock", "clock.star", b"v2");
    let second = client.install(&id("clock"), Some(&first)).unwrap();
    assert!(!second.enabled);
    assert_eq!(second.display_secs, Some(3));
    assert_eq!(
        std::fs::read(client.layout().config_path(&id("clock"))).unwrap(),
        b"{\"units\":\"f\"}"
    );
    assert_eq!(
        std::fs::read(client.layout().source_path(&id("clock"), "clock.star")).unwrap(),
        b"v2"
    );
    let _ = std::fs::remove_dir_all(&root);
}

#[test]
fn bad_listings_are_download_errors() {
    let root = temp_root();
    let catalog = Arc::new(MemCatalog::default());
    let client = RepositoryClient::new(AppLayout::new(root.join("apps")), Arc::clone(&catalog) as Arc<dyn Catalog>);

    // Missing listing.
    assert!(matches!(client.install(&id("ghost"), None), Err(FrameloopError::Download(_))));

    // Listing for a different id.
    catalog.listing("other", &[]);
    let mislabeled = catalog.files.lock().get(&("other".to_owned(), "manifest.json".to_owned())).cloned().unwrap();
    catalog.put("clock", "manifest.json", &mislabeled);
    assert!(matches!(client.install(&id("clock"), None), Err(FrameloopError::Download(_))));

    // Non-UTF-8 source.
    catalog.listing("bin", &[]);
    catalog.put("bin", "bin.star", &[0xff, 0xfe, 0x00]);
    assert!(matches!(client.install(&id("bin"), None), Err(FrameloopError::Download(_))));

    // Traversal in asset paths.
    catalog.listing("evil", &["../../etc/passwd"]);
    catalog.put("evil", "evil.star", b"x");
    assert!(client.install(&id("evil"), None).is_err());
    assert!(!client.layout().app_dir(&id("evil")).exists());

    let _ = std::fs::remove_dir_all(&root);
}

#[test]
fn remove_files_deletes_directory() {
    let root = temp_root();
    let catalog = Arc::new(MemCatalog::default());
    catalog.listing("clock", &[]);
    catalog.put("clock", "clock.star", b"v1");
    let client = RepositoryClient::new(AppLayout::new(root.join("apps")), catalog);
    client.install(&id("clock"), None).unwrap();

    assert!(client.remove_files(&id("clock")).unwrap());
    assert!(!client.layout().app_dir(&id("clock")).exists());
    assert!(!client.remove_files(&id("clock")).unwrap());
    client.clean_staging().unwrap();
    assert!(!client.layout().staging_root().exists());
    let _ = std::fs::remove_dir_all(&root);
}

#[test]
fn dir_catalog_reads_mirror_layout() {
    let root = temp_root();
    let mirror = root.join("mirror");
    std::fs::create_dir_all(mirror.join("clock")).unwrap();
    std::fs::write(
        mirror.join("clock/manifest.json"),
        r#"{"id":"clock","name":"Clock","source":"clock.star"}"#,
    )
    .unwrap();
    std::fs::write(mirror.join("clock/clock.star"), b"def main(): pass").unwrap();

    let client = RepositoryClient::new(AppLayout::new(root.join("apps")), Arc::new(DirCatalog::new(&mirror)));
    let record = client.install(&id("clock"), None).unwrap();
    assert_eq!(record.name, "Clock");
    assert!(record.assets.is_empty());
    assert!(matches!(client.install(&id("missing"), None), Err(FrameloopError::Download(_))));
    let _ = std::fs::remove_dir_all(&root);
}

#[test]
fn offline_client_cannot_install() {
    let root = temp_root();
    let client = RepositoryClient::offline(AppLayout::new(root.join("apps")));
    assert!(matches!(client.install(&id("clock"), None), Err(FrameloopError::Config(_))));
    assert!(!client.remove_files(&id("clock")).unwrap());
    let _ = std::fs::remove_dir_all(&root);
}
