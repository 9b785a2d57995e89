//! Composer v2 repositories (`<url>/p2/<vendor>/<name>.json`).

use anyhow::{Context, Result};
use reqwest::StatusCode;
use reqwest::blocking::Client;
use serde_json::{Map, Value};
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, warn};

use super::retry::{check_retryable, with_retry};
use super::{Package, PackageEntry, PackageSource};
use crate::runtime::Runtime;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
const UNSET: &str = "__unset";

pub struct ComposerRepository<'a, R: Runtime> {
    runtime: &'a R,
    client: Client,
    base_url: String,
    cache_dir: Option<PathBuf>,
}

impl<'a, R: Runtime> ComposerRepository<'a, R> {
    /// `cache_root` is normally `<user cache>/wpsync/repo`; responses are kept
    /// there per repository and served when the network fails.
    pub fn new(runtime: &'a R, base_url: &str, cache_root: Option<PathBuf>) -> Result<Self> {
        let client = Client::builder()
            .user_agent(concat!("wpsync/", env!("CARGO_PKG_VERSION")))
            .timeout(REQUEST_TIMEOUT)
            .build()
            .context("Failed to create HTTP client")?;
        let base_url = base_url.trim_end_matches('/').to_string();
        let cache_dir = cache_root.map(|root| root.join(cache_key(&base_url)));
        Ok(Self {
            runtime,
            client,
            base_url,
            cache_dir,
        })
    }

    fn metadata_url(&self, package: &str) -> String {
        format!("{}/p2/{}.json", self.base_url, package)
    }

    fn cache_path(&self, package: &str) -> Option<PathBuf> {
        self.cache_dir
            .as_ref()
            .map(|dir| dir.join(format!("{}.json", package.replace('/', "~"))))
    }

    /// The metadata document, or `None` when the repository has no such package.
    fn fetch(&self, package: &str) -> Result<Option<String>> {
        let url = self.metadata_url(package);
        with_retry(&format!("GET {}", url), || {
            let response = self.client.get(&url).send()?;
            if response.status() == StatusCode::NOT_FOUND {
                return Ok(None);
            }
            let response = response.error_for_status().map_err(check_retryable)?;
            Ok(Some(response.text()?))
        })
    }

    fn store(&self, package: &str, body: &str) {
        let Some(path) = self.cache_path(package) else {
            return;
        };
        let stored = path
            .parent()
            .map_or(Ok(()), |dir| self.runtime.create_dir_all(dir))
            .and_then(|_| self.runtime.write(&path, body.as_bytes()));
        if let Err(e) = stored {
            debug!("Could not cache {:?}: {:#}", path, e);
        }
    }

    fn cached(&self, package: &str) -> Option<String> {
        let path = self.cache_path(package)?;
        if !self.runtime.exists(&path) {
            return None;
        }
        self.runtime.read_to_string(&path).ok()
    }
}

impl<R: Runtime> PackageSource for ComposerRepository<'_, R> {
    fn describe(&self) -> String {
        self.base_url.clone()
    }

    #[tracing::instrument(skip(self))]
    fn versions(&self, package: &str) -> Result<Vec<Package>> {
        match self.fetch(package) {
            Ok(Some(body)) => {
                self.store(package, &body);
                parse_metadata(&body, package)
            }
            Ok(None) => Ok(Vec::new()),
            Err(e) => match self.cached(package) {
                Some(body) => {
                    warn!(
                        "{} unreachable ({:#}), using cached metadata for {}",
                        self.base_url, e, package
                    );
                    parse_metadata(&body, package)
                }
                None => Err(e),
            },
        }
    }
}

fn cache_key(url: &str) -> String {
    let stripped = url
        .trim_start_matches("https://")
        .trim_start_matches("http://");
    stripped
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '.' { c } else { '-' })
        .collect()
}

/// Versions of `package` from a p2 metadata document, expanding the
/// `composer/2.0` minified form where each entry only lists changed keys.
fn parse_metadata(body: &str, package: &str) -> Result<Vec<Package>> {
    let document: Value =
        serde_json::from_str(body).with_context(|| format!("Invalid metadata for {}", package))?;
    let Some(entries) = document
        .get("packages")
        .and_then(|packages| packages.get(package))
        .and_then(Value::as_array)
    else {
        return Ok(Vec::new());
    };
    let minified = document.get("minified").and_then(Value::as_str) == Some("composer/2.0");

    let mut current = Map::new();
    let mut packages = Vec::with_capacity(entries.len());
    for entry in entries {
        let Some(fields) = entry.as_object() else {
            continue;
        };
        if minified {
            for (key, value) in fields {
                if value.as_str() == Some(UNSET) {
                    current.remove(key);
                } else {
                    current.insert(key.clone(), value.clone());
                }
            }
        } else {
            current = fields.clone();
        }
        current
            .entry("name")
            .or_insert_with(|| Value::String(package.to_string()));

        match serde_json::from_value::<PackageEntry>(Value::Object(current.clone())) {
            Ok(entry) => packages.push(Package::from(entry)),
            Err(e) => debug!("Skipping malformed version of {}: {}", package, e),
        }
    }
    Ok(packages)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::{MockRuntime, RealRuntime};
    use tempfile::tempdir;

    const SEO_TOOL: &str = r#"{
        "minified": "composer/2.0",
        "packages": {
            "wpackagist-plugin/seo-tool": [
                {"name": "wpackagist-plugin/seo-tool", "version": "3.2.0", "version_normalized": "3.2.0.0", "type": "wordpress-plugin"},
                {"version": "3.1.0", "version_normalized": "3.1.0.0"},
                {"version": "dev-trunk", "version_normalized": "dev-trunk", "type": "__unset"}
            ]
        }
    }"#;

    #[test]
    fn test_parse_minified_metadata() {
        let versions = parse_metadata(SEO_TOOL, "wpackagist-plugin/seo-tool").unwrap();
        assert_eq!(versions.len(), 3);
        assert_eq!(versions[1].name, "wpackagist-plugin/seo-tool");
        assert_eq!(versions[1].pretty_version, "3.1.0");
        assert_eq!(versions[1].package_type.as_deref(), Some("wordpress-plugin"));
        assert_eq!(versions[2].package_type, None);
    }

    #[test]
    fn test_parse_unknown_package() {
        assert!(parse_metadata(SEO_TOOL, "wpackagist-plugin/other").unwrap().is_empty());
        assert!(parse_metadata("not json", "a/b").is_err());
    }

    #[test]
    fn test_cache_key() {
        assert_eq!(cache_key("https://wpackagist.org"), "wpackagist.org");
        assert_eq!(cache_key("http://127.0.0.1:8080/repo"), "127.0.0.1-8080-repo");
    }

    #[test]
    fn test_versions_from_server() {
        let mut server = mockito::Server::new();
        let _m = server
            .mock("GET", "/p2/wpackagist-plugin/seo-tool.json")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(SEO_TOOL)
            .create();

        let runtime = MockRuntime::new();
        let repo = ComposerRepository::new(&runtime, &server.url(), None).unwrap();
        let versions = repo.versions("wpackagist-plugin/seo-tool").unwrap();
        assert_eq!(versions.len(), 3);
    }

    #[test]
    fn test_missing_package_is_empty() {
        let mut server = mockito::Server::new();
        let _m = server
            .mock("GET", "/p2/wpackagist-plugin/nope.json")
            .with_status(404)
            .create();

        let runtime = MockRuntime::new();
        let repo = ComposerRepository::new(&runtime, &server.url(), None).unwrap();
        assert!(repo.versions("wpackagist-plugin/nope").unwrap().is_empty());
    }

    #[test]
    fn test_client_error_is_reported() {
        let mut server = mockito::Server::new();
        let mock = server
            .mock("GET", "/p2/wpackagist-plugin/secret.json")
            .with_status(401)
            .expect(1)
            .create();

        let runtime = MockRuntime::new();
        let repo = ComposerRepository::new(&runtime, &server.url(), None).unwrap();
        let err = repo.versions("wpackagist-plugin/secret").unwrap_err();
        assert!(err.to_string().contains("Authentication failed"));
        mock.assert();
    }

    #[test]
    fn test_cache_is_written_and_used_offline() {
        let cache = tempdir().unwrap();
        let runtime = RealRuntime;

        let mut server = mockito::Server::new();
        let url = server.url();
        {
            let _m = server
                .mock("GET", "/p2/wpackagist-plugin/seo-tool.json")
                .with_status(200)
                .with_body(SEO_TOOL)
                .create();
            let repo =
                ComposerRepository::new(&runtime, &url, Some(cache.path().to_path_buf())).unwrap();
            assert_eq!(repo.versions("wpackagist-plugin/seo-tool").unwrap().len(), 3);
        }

        let _m = server
            .mock("GET", "/p2/wpackagist-plugin/seo-tool.json")
            .with_status(403)
            .create();
        let repo = ComposerRepository::new(&runtime, &url, Some(cache.path().to_path_buf())).unwrap();
        let versions = repo.versions("wpackagist-plugin/seo-tool").unwrap();
        assert_eq!(versions.len(), 3);
    }
}
