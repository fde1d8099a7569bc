//! On-disk environment fixtures.

use std::fs;
use std::path::{Path, PathBuf};

use tempfile::TempDir;

const MODULE_SOURCE: &str = "\
\"\"\"Helpers for pkg.\"\"\"

class Foo:
    pass

def bar():
    pass
";

/// A project directory holding `.venv` with one installed package, `pkg`.
pub struct VenvFixture {
    pub dir: TempDir,
}

impl VenvFixture {
    pub fn new() -> Self {
        let dir = TempDir::new().expect("create temp dir");
        let venv = dir.path().join(".venv");
        let site = venv.join("lib").join("python3.11").join("site-packages");
        let pkg = site.join("pkg");
        fs::create_dir_all(&pkg).expect("create package dir");
        fs::write(
            venv.join("pyvenv.cfg"),
            "home = /usr/bin\ninclude-system-site-packages = false\nversion = 3.11.4\n",
        )
        .expect("write pyvenv.cfg");
        fs::write(pkg.join("__init__.py"), "").expect("write __init__.py");
        fs::write(pkg.join("mod.py"), MODULE_SOURCE).expect("write mod.py");
        VenvFixture { dir }
    }

    /// Project root (the working directory for runs).
    pub fn root(&self) -> &Path {
        self.dir.path()
    }

    /// Installed location of `pkg`.
    pub fn package_dir(&self) -> PathBuf {
        self.root()
            .join(".venv/lib/python3.11/site-packages/pkg")
    }
}

/// An empty directory, usable as a `$PATH` with nothing on it.
pub fn empty_dir() -> TempDir {
    TempDir::new().expect("create temp dir")
}
