//! Documentation summary for a resolved package.
//!
//! Gathers what is readable without importing anything: the distribution's
//! core metadata, the package's module docstring and a README shipped inside
//! the package directory. Missing pieces stay `None`.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use pyenvsearch_core::text::{excerpt, first_paragraph};

use crate::env::EnvironmentInfo;
use crate::metadata::DistributionMetadata;
use crate::outline::parse_file;
use crate::packages::PackageLocation;

/// Long descriptions are cut to this many characters.
pub const DESCRIPTION_EXCERPT_CHARS: usize = 1500;

/// README excerpts are cut to this many characters.
pub const README_EXCERPT_CHARS: usize = 2000;

const README_STEMS: &[&str] = &["readme"];
const README_EXTENSIONS: &[&str] = &["", "md", "rst", "txt"];

/// A labelled project link.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectUrl {
    pub label: String,
    pub url: String,
}

/// Head of a README file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReadmeExcerpt {
    pub path: PathBuf,
    pub excerpt: String,
}

/// Everything `docs <pkg>` shows.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackageDocs {
    pub name: String,
    pub import_name: String,
    pub path: PathBuf,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub distribution: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub home_page: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub project_urls: Vec<ProjectUrl>,
    /// First paragraph of the package's module docstring.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub module_doc: Option<String>,
    /// Head of the distribution's long description.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub readme: Option<ReadmeExcerpt>,
}

impl PackageDocs {
    /// Whether nothing beyond the location was found.
    pub fn is_empty(&self) -> bool {
        self.summary.is_none()
            && self.home_page.is_none()
            && self.project_urls.is_empty()
            && self.module_doc.is_none()
            && self.description.is_none()
            && self.readme.is_none()
    }
}

/// Collect documentation for a resolved package.
pub fn package_docs(location: &PackageLocation, env: Option<&EnvironmentInfo>) -> PackageDocs {
    let metadata = distribution_metadata(location, env).unwrap_or_default();

    let name = metadata
        .name
        .clone()
        .or_else(|| location.distribution.clone())
        .unwrap_or_else(|| location.import_name.clone());

    PackageDocs {
        name,
        import_name: location.import_name.clone(),
        path: location.path.clone(),
        distribution: location.distribution.clone(),
        version: location.version.clone().or(metadata.version),
        summary: metadata.summary,
        home_page: metadata.home_page,
        project_urls: metadata
            .project_urls
            .into_iter()
            .map(|(label, url)| ProjectUrl { label, url })
            .collect(),
        module_doc: module_docstring(location),
        description: metadata
            .description
            .map(|text| excerpt(&text, DESCRIPTION_EXCERPT_CHARS)),
        readme: location
            .is_dir()
            .then(|| find_readme(&location.path))
            .flatten(),
    }
}

fn distribution_metadata(
    location: &PackageLocation,
    env: Option<&EnvironmentInfo>,
) -> Option<DistributionMetadata> {
    let env = env?;
    let dist_name = location.distribution.as_deref()?;
    let installed = env.distribution(dist_name)?;
    debug!(info_dir = %installed.info_dir.display(), "reading distribution metadata");
    installed.metadata()
}

fn module_docstring(location: &PackageLocation) -> Option<String> {
    let file = location.module_file()?;
    if !file.is_file() {
        return None;
    }
    match parse_file(&file) {
        Ok(outline) => outline.docstring.as_deref().and_then(first_paragraph),
        Err(e) => {
            warn!(file = %file.display(), error = %e, "cannot read module docstring");
            None
        }
    }
}

fn is_readme(file_name: &str) -> bool {
    let lower = file_name.to_lowercase();
    let (stem, ext) = lower.split_once('.').unwrap_or((lower.as_str(), ""));
    README_STEMS.contains(&stem) && README_EXTENSIONS.contains(&ext)
}

/// First README-like file directly inside `dir`, by sorted name.
pub fn find_readme(dir: &Path) -> Option<ReadmeExcerpt> {
    let mut candidates: Vec<PathBuf> = fs::read_dir(dir)
        .ok()?
        .flatten()
        .map(|entry| entry.path())
        .filter(|path| path.is_file())
        .filter(|path| {
            path.file_name()
                .and_then(|name| name.to_str())
                .is_some_and(is_readme)
        })
        .collect();
    candidates.sort();

    candidates.into_iter().find_map(|path| {
        let text = fs::read_to_string(&path).ok()?;
        let text = text.trim();
        if text.is_empty() {
            return None;
        }
        Some(ReadmeExcerpt {
            excerpt: excerpt(text, README_EXCERPT_CHARS),
            path,
        })
    })
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::env::{EnvironmentInfo, ResolutionSource};
    use crate::metadata::scan_distributions;
    use crate::packages::resolve_package;
    use tempfile::TempDir;

    fn write(path: &Path, content: &str) {
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
    }

    fn fixture() -> (TempDir, EnvironmentInfo) {
        let temp = TempDir::new().unwrap();
        let site = temp.path().join("site-packages");
        write(
            &site.join("demo/__init__.py"),
            "\"\"\"Demo toolkit.\n\nSpans two\nparagraphs.\n\"\"\"\n\nVALUE = 1\n",
        );
        write(&site.join("demo/README.md"), "# Demo\n\nUsage notes.\n");
        write(
            &site.join("demo-2.0.1.dist-info/METADATA"),
            concat!(
                "Metadata-Version: 2.1\n",
                "Name: demo\n",
                "Version: 2.0.1\n",
                "Summary: A demo package\n",
                "Home-page: https://example.org/demo\n",
                "Project-URL: Source, https://example.org/demo/src\n",
                "\n",
                "Long description body.\n",
            ),
        );
        write(&site.join("demo-2.0.1.dist-info/top_level.txt"), "demo\n");
        write(&site.join("bare.py"), "x = 1\n");

        let site_packages = vec![site];
        let env = EnvironmentInfo {
            interpreter: None,
            prefix: Some(temp.path().to_path_buf()),
            source: ResolutionSource::CliVenv,
            version: None,
            packages: scan_distributions(&site_packages),
            site_packages,
        };
        (temp, env)
    }

    #[test]
    fn collects_metadata_docstring_and_readme() {
        let (_temp, env) = fixture();
        let location = resolve_package("demo", Some(&env)).unwrap();
        let docs = package_docs(&location, Some(&env));

        assert_eq!(docs.name, "demo");
        assert_eq!(docs.version.as_deref(), Some("2.0.1"));
        assert_eq!(docs.summary.as_deref(), Some("A demo package"));
        assert_eq!(docs.home_page.as_deref(), Some("https://example.org/demo"));
        assert_eq!(
            docs.project_urls,
            vec![ProjectUrl {
                label: "Source".to_string(),
                url: "https://example.org/demo/src".to_string(),
            }]
        );
        assert_eq!(docs.module_doc.as_deref(), Some("Demo toolkit."));
        assert_eq!(docs.description.as_deref(), Some("Long description body."));
        let readme = docs.readme.unwrap();
        assert!(readme.path.ends_with("README.md"));
        assert!(readme.excerpt.contains("Usage notes."));
    }

    #[test]
    fn bare_module_has_only_location() {
        let (_temp, env) = fixture();
        let location = resolve_package("bare", Some(&env)).unwrap();
        let docs = package_docs(&location, Some(&env));
        assert_eq!(docs.name, "bare");
        assert!(docs.is_empty());
    }

    #[test]
    fn readme_name_matching() {
        assert!(is_readme("README"));
        assert!(is_readme("readme.rst"));
        assert!(is_readme("README.md"));
        assert!(!is_readme("README.html"));
        assert!(!is_readme("readme_old.md"));
    }
}
