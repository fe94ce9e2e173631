//! Android-specific commands for droidbar
//!
//! This crate forwards fixed command lines to the Android tooling:
//! - Gradle wrapper tasks (`assembleDebug`, `installDebug`)
//! - adb app launch and logcat streaming
//! - a single logcat session per owner that can be toggled on and off

#![warn(missing_docs)]

pub mod adb;
pub mod gradle;
pub mod logcat;
pub mod project;

pub use adb::Adb;
pub use gradle::Gradle;
pub use logcat::LogTail;
pub use project::AndroidProject;

#[cfg(all(test, unix))]
pub(crate) mod testing {
    use std::os::unix::fs::PermissionsExt;
    use std::path::{Path, PathBuf};

    /// Write an executable shell script into `dir`
    pub fn script(dir: &Path, name: &str, body: &str) -> PathBuf {
        let path = dir.join(name);
        std::fs::write(&path, format!("#!/bin/sh\n{}\n", body)).unwrap();
        let mut perms = std::fs::metadata(&path).unwrap().permissions();
        perms.set_mode(0o755);
        std::fs::set_permissions(&path, perms).unwrap();
        path
    }
}
