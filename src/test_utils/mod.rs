//! Test helpers shared by unit and integration tests.
//!
//! Compiled for `cfg(test)` and for the `test-utils` feature, which the
//! integration suite enables through the crate's dev-dependency on itself.

use ed25519_dalek::{Signer, SigningKey};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Once;
use tracing::Level;
use tracing_subscriber::EnvFilter;
use zip::write::SimpleFileOptions;

use crate::models::{Release, parse_tag_version};
use crate::repository::{FeedAsset, FeedEntry};
use crate::repository::folder::FOLDER_FEED_FILE;
use crate::verification::{file_digest, signature_path};

static INIT_LOGGING: Once = Once::new();

/// Initialize tracing for tests, honoring `RUST_LOG` when no level is given.
pub fn init_test_logging(level: Option<Level>) {
    INIT_LOGGING.call_once(|| {
        let filter = if let Some(level) = level {
            EnvFilter::new(level.to_string())
        } else if std::env::var("RUST_LOG").is_ok() {
            EnvFilter::from_default_env()
        } else {
            return;
        };

        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .with_target(true)
            .try_init();
    });
}

/// Writes a zip archive with the given `(name, content)` entries.
pub fn write_zip(path: &Path, entries: &[(&str, &[u8])]) {
    let file = std::fs::File::create(path).expect("create zip");
    let mut zip = zip::ZipWriter::new(file);
    let options = SimpleFileOptions::default();
    for (name, content) in entries {
        zip.start_file(*name, options).expect("start zip entry");
        zip.write_all(content).expect("write zip entry");
    }
    zip.finish().expect("finish zip");
}

/// Deterministic Ed25519 key for tests.
pub fn test_signing_key(seed: u8) -> SigningKey {
    SigningKey::from_bytes(&[seed; 32])
}

/// Writes a base64 detached signature for `file` next to it.
pub fn sign_file(key: &SigningKey, file: &Path) {
    use base64::Engine as _;
    let digest = file_digest(file).expect("digest file");
    let signature = key.sign(&digest);
    std::fs::write(
        signature_path(file),
        base64::engine::general_purpose::STANDARD.encode(signature.to_bytes()),
    )
    .expect("write signature");
}

pub const TEST_MODULE_BYTES: &[u8] = b"MZ localization module";
pub const TEST_GLOBAL_INI: &str = "data/Localization/korean_(south_korea)/global.ini";

/// Builds localization package zips.
///
/// The default package holds the core module and one `global.ini`.
#[derive(Debug, Clone)]
pub struct PackageBuilder {
    wrapper: Option<String>,
    files: Vec<(String, Vec<u8>)>,
    signer: Option<SigningKey>,
}

impl Default for PackageBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl PackageBuilder {
    pub fn new() -> Self {
        Self {
            wrapper: None,
            files: vec![
                ("Bin64/dbghelp.dll".to_string(), TEST_MODULE_BYTES.to_vec()),
                (TEST_GLOBAL_INI.to_string(), b"ui_Title=Star Citizen".to_vec()),
            ],
            signer: None,
        }
    }

    /// Nest every entry under `dir/`, like GitHub source archives.
    pub fn wrapped(mut self, dir: &str) -> Self {
        self.wrapper = Some(dir.to_string());
        self
    }

    pub fn file(mut self, name: &str, content: &[u8]) -> Self {
        self.files.retain(|(n, _)| n != name);
        self.files.push((name.to_string(), content.to_vec()));
        self
    }

    pub fn without(mut self, name: &str) -> Self {
        self.files.retain(|(n, _)| n != name);
        self
    }

    /// Sign the core module with `key` and include `dbghelp.dll.sig`.
    pub fn signed_with(mut self, key: &SigningKey) -> Self {
        self.signer = Some(key.clone());
        self
    }

    pub fn write(&self, path: &Path) -> PathBuf {
        let mut files = self.files.clone();
        if let Some(key) = &self.signer {
            let module = files
                .iter()
                .find(|(n, _)| n == "Bin64/dbghelp.dll")
                .map(|(_, c)| c.clone())
                .expect("signed package needs a core module");
            let scratch = tempfile::NamedTempFile::new().expect("temp file");
            std::fs::write(scratch.path(), &module).expect("write module");
            let signature = key.sign(&file_digest(scratch.path()).expect("digest"));
            files.push(("Bin64/dbghelp.dll.sig".to_string(), signature.to_bytes().to_vec()));
        }

        let named: Vec<(String, Vec<u8>)> = files
            .into_iter()
            .map(|(n, c)| match &self.wrapper {
                Some(w) => (format!("{w}/{n}"), c),
                None => (n, c),
            })
            .collect();
        let entries: Vec<(&str, &[u8])> =
            named.iter().map(|(n, c)| (n.as_str(), c.as_slice())).collect();
        write_zip(path, &entries);
        path.to_path_buf()
    }
}

/// Release with a source archive URL, for filter and selection tests.
pub fn release(tag: &str, prerelease: bool) -> Release {
    Release {
        tag: tag.to_string(),
        name: tag.to_string(),
        version: parse_tag_version(tag).expect("test tag must carry a version"),
        prerelease,
        published_at: None,
        assets: vec![],
        source_archive_url: Some(format!("https://example.test/{tag}.zip")),
    }
}

/// Feed entry pointing at a package path relative to a folder repository.
pub fn feed_entry(tag: &str, prerelease: bool, package: &str) -> FeedEntry {
    FeedEntry {
        tag_name: tag.to_string(),
        name: Some(format!("Release {tag}")),
        prerelease,
        draft: false,
        published_at: None,
        zipball_url: Some(package.to_string()),
        assets: vec![],
    }
}

/// Writes `releases.json` for a folder repository.
pub fn write_folder_feed(root: &Path, entries: &[FeedEntry]) {
    std::fs::create_dir_all(root).expect("create feed dir");
    std::fs::write(
        root.join(FOLDER_FEED_FILE),
        serde_json::to_string_pretty(entries).expect("serialize feed"),
    )
    .expect("write feed");
}

/// Creates a folder repository with one default package per tag under `packages/`.
pub fn folder_repository(root: &Path, tags: &[&str]) {
    std::fs::create_dir_all(root.join("packages")).expect("create packages dir");
    let mut entries = Vec::new();
    for tag in tags {
        let rel = format!("packages/{tag}.zip");
        PackageBuilder::new()
            .file(TEST_GLOBAL_INI, format!("version={tag}").as_bytes())
            .wrapped("localization-main")
            .write(&root.join(&rel));
        entries.push(feed_entry(tag, false, &rel));
    }
    write_folder_feed(root, &entries);
}

/// Creates a folder feed of application releases, each carrying `asset_name`.
///
/// Every package holds a single `sctools` file with the content `binary {tag}`.
pub fn app_repository(root: &Path, tags: &[&str], asset_name: &str) {
    let mut entries = Vec::new();
    for tag in tags {
        let rel = format!("packages/{tag}/{asset_name}");
        let path = root.join(&rel);
        std::fs::create_dir_all(path.parent().expect("asset parent")).expect("create asset dir");
        write_zip(&path, &[("sctools", format!("binary {tag}").as_bytes())]);
        let mut entry = feed_entry(tag, false, &rel);
        entry.zipball_url = None;
        entry.assets.push(FeedAsset {
            name: asset_name.to_string(),
            browser_download_url: rel,
            size: 0,
        });
        entries.push(entry);
    }
    write_folder_feed(root, &entries);
}
