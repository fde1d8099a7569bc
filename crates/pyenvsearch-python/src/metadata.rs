//! Installed distribution metadata.
//!
//! Reads `*.dist-info` and `*.egg-info` directories: the RFC 822 style
//! `METADATA` / `PKG-INFO` header block, and the import names a distribution
//! provides (`top_level.txt`, falling back to `RECORD`).

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::env::normalize_distribution_name;

// ============================================================================
// Installed Packages
// ============================================================================

/// One installed distribution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstalledPackage {
    /// Distribution name as recorded in its metadata.
    pub name: String,
    /// Version, when recorded.
    pub version: Option<String>,
    /// The `*.dist-info` / `*.egg-info` directory.
    pub info_dir: PathBuf,
}

impl InstalledPackage {
    /// Parse the metadata file inside the info directory.
    pub fn metadata(&self) -> Option<DistributionMetadata> {
        read_metadata_file(&self.info_dir)
    }

    /// Top-level import names this distribution installs.
    pub fn top_level_names(&self) -> Vec<String> {
        top_level_names(&self.info_dir)
    }
}

/// Scan site-packages directories for installed distributions.
///
/// Sorted by normalized name; when the same distribution appears in more than
/// one directory the first directory wins.
pub fn scan_distributions(site_packages: &[PathBuf]) -> Vec<InstalledPackage> {
    let mut seen = BTreeSet::new();
    let mut packages = Vec::new();

    for dir in site_packages {
        let Ok(entries) = fs::read_dir(dir) else {
            continue;
        };
        let mut info_dirs: Vec<PathBuf> = entries
            .flatten()
            .map(|entry| entry.path())
            .filter(|path| is_info_dir(path))
            .collect();
        info_dirs.sort();

        for info_dir in info_dirs {
            let Some(package) = read_installed_package(&info_dir) else {
                continue;
            };
            if seen.insert(normalize_distribution_name(&package.name)) {
                packages.push(package);
            }
        }
    }

    packages.sort_by_key(|pkg| normalize_distribution_name(&pkg.name));
    debug!(count = packages.len(), "scanned installed distributions");
    packages
}

fn is_info_dir(path: &Path) -> bool {
    path.is_dir()
        && path
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext == "dist-info" || ext == "egg-info")
}

/// Build an `InstalledPackage` from metadata, or from the directory name
/// (`name-version.dist-info`) when the metadata file is missing.
fn read_installed_package(info_dir: &Path) -> Option<InstalledPackage> {
    if let Some(meta) = read_metadata_file(info_dir) {
        if let Some(name) = meta.name {
            return Some(InstalledPackage {
                name,
                version: meta.version,
                info_dir: info_dir.to_path_buf(),
            });
        }
    }

    let stem = info_dir.file_stem()?.to_str()?;
    let (name, version) = match stem.split_once('-') {
        Some((name, rest)) => {
            // egg-info names carry a "-py3.11" suffix after the version
            let version = rest.split('-').next().unwrap_or(rest);
            (name.to_string(), Some(version.to_string()))
        }
        None => (stem.to_string(), None),
    };
    Some(InstalledPackage {
        name,
        version,
        info_dir: info_dir.to_path_buf(),
    })
}

// ============================================================================
// Metadata Parsing
// ============================================================================

/// Fields of a distribution's core metadata used by the CLI.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DistributionMetadata {
    pub name: Option<String>,
    pub version: Option<String>,
    pub summary: Option<String>,
    pub home_page: Option<String>,
    /// `Project-URL` entries as `(label, url)`.
    pub project_urls: Vec<(String, String)>,
    /// Long description (message body or `Description` header).
    pub description: Option<String>,
}

/// Read `METADATA` (wheels) or `PKG-INFO` (eggs) from an info directory.
pub fn read_metadata_file(info_dir: &Path) -> Option<DistributionMetadata> {
    ["METADATA", "PKG-INFO"]
        .iter()
        .map(|file| info_dir.join(file))
        .find_map(|path| fs::read_to_string(path).ok())
        .map(|content| parse_metadata(&content))
}

/// Parse an RFC 822 style metadata document.
///
/// Headers end at the first blank line; the remaining text is the long
/// description. Continuation lines (leading whitespace) extend the previous
/// header.
pub fn parse_metadata(content: &str) -> DistributionMetadata {
    let mut meta = DistributionMetadata::default();
    let mut headers: Vec<(String, String)> = Vec::new();
    let mut lines = content.lines();

    for line in lines.by_ref() {
        if line.trim().is_empty() {
            break;
        }
        if line.starts_with(' ') || line.starts_with('\t') {
            if let Some((_, value)) = headers.last_mut() {
                value.push('\n');
                value.push_str(line.trim());
            }
            continue;
        }
        if let Some((key, value)) = line.split_once(':') {
            headers.push((key.trim().to_string(), value.trim().to_string()));
        }
    }

    for (key, value) in headers {
        if value.is_empty() || value == "UNKNOWN" {
            continue;
        }
        match key.to_ascii_lowercase().as_str() {
            "name" => meta.name = Some(value),
            "version" => meta.version = Some(value),
            "summary" => meta.summary = Some(value),
            "home-page" => meta.home_page = Some(value),
            "project-url" => {
                if let Some((label, url)) = value.split_once(',') {
                    meta.project_urls
                        .push((label.trim().to_string(), url.trim().to_string()));
                }
            }
            "description" => meta.description = Some(value),
            _ => {}
        }
    }

    let body: String = lines.collect::<Vec<_>>().join("\n");
    let body = body.trim();
    if !body.is_empty() {
        meta.description = Some(body.to_string());
    }
    meta
}

// ============================================================================
// Import Names
// ============================================================================

/// Import names provided by a distribution.
///
/// Prefers `top_level.txt`; otherwise derives first path segments from
/// `RECORD`, ignoring the info directories and `__pycache__`.
pub fn top_level_names(info_dir: &Path) -> Vec<String> {
    if let Ok(content) = fs::read_to_string(info_dir.join("top_level.txt")) {
        let names: Vec<String> = content
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(str::to_string)
            .collect();
        if !names.is_empty() {
            return names;
        }
    }

    let Ok(record) = fs::read_to_string(info_dir.join("RECORD")) else {
        return Vec::new();
    };
    let mut names = BTreeSet::new();
    for line in record.lines() {
        let path = line.split(',').next().unwrap_or("").trim();
        if path.is_empty() || path.starts_with("..") || path.starts_with('/') {
            continue;
        }
        let first = path.split('/').next().unwrap_or(path);
        if first.ends_with(".dist-info")
            || first.ends_with(".egg-info")
            || first.ends_with(".data")
            || first == "__pycache__"
        {
            continue;
        }
        let name = if let Some(stem) = first.strip_suffix(".py") {
            stem
        } else if path.contains('/') {
            first
        } else if let Some((stem, _)) = first.split_once('.') {
            // extension modules: name.cpython-311-x86_64-linux-gnu.so
            if first.ends_with(".so") || first.ends_with(".pyd") {
                stem
            } else {
                continue;
            }
        } else {
            continue;
        };
        names.insert(name.to_string());
    }
    names.into_iter().collect()
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const SAMPLE: &str = "Metadata-Version: 2.1
Name: beautifulsoup4
Version: 4.12.2
Summary: Screen-scraping library
Home-page: https://www.crummy.com/software/BeautifulSoup/bs4/
Project-URL: Source, https://git.launchpad.net/beautifulsoup
License: MIT
Keywords: HTML
  XML

Beautiful Soup is a library that makes it easy to scrape information
from web pages.
";

    #[test]
    fn parse_headers_and_body() {
        let meta = parse_metadata(SAMPLE);
        assert_eq!(meta.name.as_deref(), Some("beautifulsoup4"));
        assert_eq!(meta.version.as_deref(), Some("4.12.2"));
        assert_eq!(meta.summary.as_deref(), Some("Screen-scraping library"));
        assert_eq!(
            meta.project_urls,
            vec![(
                "Source".to_string(),
                "https://git.launchpad.net/beautifulsoup".to_string()
            )]
        );
        assert!(meta
            .description
            .as_deref()
            .unwrap()
            .starts_with("Beautiful Soup is a library"));
    }

    #[test]
    fn unknown_values_are_dropped() {
        let meta = parse_metadata("Name: x\nHome-page: UNKNOWN\n");
        assert_eq!(meta.home_page, None);
    }

    #[test]
    fn top_level_txt_wins() {
        let temp = TempDir::new().unwrap();
        fs::write(temp.path().join("top_level.txt"), "bs4\n\n").unwrap();
        fs::write(temp.path().join("RECORD"), "other/__init__.py,,\n").unwrap();
        assert_eq!(top_level_names(temp.path()), vec!["bs4"]);
    }

    #[test]
    fn record_fallback() {
        let temp = TempDir::new().unwrap();
        fs::write(
            temp.path().join("RECORD"),
            "yaml/__init__.py,sha256=x,10\n\
             yaml/__pycache__/x.pyc,,\n\
             _yaml.cpython-311-x86_64-linux-gnu.so,,\n\
             six.py,,\n\
             PyYAML-6.0.dist-info/METADATA,,\n\
             ../../bin/tool,,\n",
        )
        .unwrap();
        assert_eq!(top_level_names(temp.path()), vec!["_yaml", "six", "yaml"]);
    }

    #[test]
    fn scan_reads_names_and_falls_back_to_dir_name() {
        let temp = TempDir::new().unwrap();
        let site = temp.path().to_path_buf();
        let a = site.join("Zeta_Pkg-2.0.dist-info");
        fs::create_dir_all(&a).unwrap();
        fs::write(a.join("METADATA"), "Name: Zeta-Pkg\nVersion: 2.0\n").unwrap();
        let b = site.join("alpha-0.1-py3.11.egg-info");
        fs::create_dir_all(&b).unwrap();

        let packages = scan_distributions(&[site]);
        assert_eq!(packages.len(), 2);
        assert_eq!(packages[0].name, "alpha");
        assert_eq!(packages[0].version.as_deref(), Some("0.1"));
        assert_eq!(packages[1].name, "Zeta-Pkg");
        assert_eq!(packages[1].version.as_deref(), Some("2.0"));
    }

    #[test]
    fn scan_deduplicates_across_directories() {
        let first = TempDir::new().unwrap();
        let second = TempDir::new().unwrap();
        for (dir, version) in [(first.path(), "1.0"), (second.path(), "2.0")] {
            let info = dir.join(format!("demo-{}.dist-info", version));
            fs::create_dir_all(&info).unwrap();
            fs::write(info.join("METADATA"), format!("Name: demo\nVersion: {}\n", version)).unwrap();
        }
        let packages =
            scan_distributions(&[first.path().to_path_buf(), second.path().to_path_buf()]);
        assert_eq!(packages.len(), 1);
        assert_eq!(packages[0].version.as_deref(), Some("1.0"));
    }
}
