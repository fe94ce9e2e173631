//! Android project directory
//!
//! Only the Gradle wrapper is looked for. Build files are never parsed; the
//! application package comes from configuration.

use droidbar_core::error::{Error, ErrorCode, Result};
use std::path::{Path, PathBuf};

/// Gradle wrapper file name for this platform
pub const WRAPPER: &str = if cfg!(windows) { "gradlew.bat" } else { "gradlew" };

/// A project root that contains a Gradle wrapper
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AndroidProject {
    root: PathBuf,
}

impl AndroidProject {
    /// Open `dir` as an Android project
    pub fn open(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref();
        if !dir.is_dir() {
            return Err(Error::new(
                ErrorCode::ProjectNotFound,
                format!("Project directory not found: {}", dir.display()),
            )
            .with_suggestion("Pass --project or set project.path in .droidbar.toml"));
        }

        let root = dir.canonicalize().unwrap_or_else(|_| dir.to_path_buf());
        if !root.join(WRAPPER).is_file() {
            return Err(Error::new(
                ErrorCode::GradleWrapperMissing,
                format!("No {} in {}", WRAPPER, root.display()),
            )
            .with_suggestion("Point droidbar at the project root that contains the Gradle wrapper"));
        }

        Ok(Self { root })
    }

    /// Project root directory
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Full path of the Gradle wrapper
    pub fn wrapper_path(&self) -> PathBuf {
        self.root.join(WRAPPER)
    }

    /// How the wrapper is invoked from the project root
    pub fn wrapper_invocation(&self) -> &'static str {
        if cfg!(windows) { "gradlew.bat" } else { "./gradlew" }
    }
}
