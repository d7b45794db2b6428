use crate::error::{GitError, GitResult};
use std::path::Path;
use std::process::Command;

/// Oldest git whose `status` accepts `--renames`
const MIN_GIT_VERSION: (u32, u32) = (2, 18);

/// Represents a git version
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct GitVersion {
    pub major: u32,
    pub minor: u32,
    pub patch: u32,
}

impl GitVersion {
    /// Ask the given git binary for its version
    pub fn detect<P: AsRef<Path>>(program: P) -> GitResult<Self> {
        let program = program.as_ref();
        let output = Command::new(program)
            .arg("--version")
            .output()
            .map_err(|source| GitError::SpawnFailure {
                program: program.display().to_string(),
                source,
            })?;

        if !output.status.success() {
            return Err(GitError::ParseError(format!(
                "{} --version exited with {}",
                program.display(),
                output.status
            )));
        }

        Self::parse(&String::from_utf8_lossy(&output.stdout))
    }

    /// Parse git version from string like "git version 2.39.2"
    pub fn parse(version_str: &str) -> GitResult<Self> {
        // "git version X.Y.Z", possibly with a suffix such as ".windows.1"
        let parts: Vec<&str> = version_str.split_whitespace().collect();

        if parts.len() < 3 || parts[0] != "git" || parts[1] != "version" {
            return Err(GitError::ParseError(format!(
                "Unexpected git version format: {}",
                version_str.trim()
            )));
        }

        let nums: Vec<&str> = parts[2].split('.').collect();
        if nums.len() < 2 {
            return Err(GitError::ParseError(format!(
                "Invalid version number format: {}",
                parts[2]
            )));
        }

        let major = nums[0]
            .parse::<u32>()
            .map_err(|_| GitError::ParseError(format!("Invalid major version: {}", nums[0])))?;
        let minor = nums[1]
            .parse::<u32>()
            .map_err(|_| GitError::ParseError(format!("Invalid minor version: {}", nums[1])))?;
        let patch = nums
            .get(2)
            .and_then(|p| p.parse::<u32>().ok())
            .unwrap_or(0);

        Ok(GitVersion { major, minor, patch })
    }

    /// Check if this version meets minimum requirements
    pub fn is_supported(&self) -> bool {
        (self.major, self.minor) >= MIN_GIT_VERSION
    }

    /// Detect the version and reject binaries that are too old
    pub fn validate<P: AsRef<Path>>(program: P) -> GitResult<Self> {
        let version = Self::detect(program)?;

        if !version.is_supported() {
            return Err(GitError::GitVersionTooOld(version.to_string()));
        }

        Ok(version)
    }
}

impl std::fmt::Display for GitVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_standard_version() {
        let version = GitVersion::parse("git version 2.39.2\n").unwrap();
        assert_eq!(version, GitVersion { major: 2, minor: 39, patch: 2 });
    }

    #[test]
    fn test_parse_version_with_suffix() {
        let version = GitVersion::parse("git version 2.39.2.windows.1").unwrap();
        assert_eq!(version.patch, 2);
    }

    #[test]
    fn test_parse_version_no_patch() {
        let version = GitVersion::parse("git version 2.39").unwrap();
        assert_eq!(version.patch, 0);
    }

    #[test]
    fn test_parse_invalid_format() {
        assert!(GitVersion::parse("version 2.39.2").is_err());
        assert!(GitVersion::parse("git version two").is_err());
        assert!(GitVersion::parse("").is_err());
    }

    #[test]
    fn test_is_supported() {
        assert!(GitVersion { major: 2, minor: 18, patch: 0 }.is_supported());
        assert!(GitVersion { major: 3, minor: 0, patch: 0 }.is_supported());
        assert!(!GitVersion { major: 2, minor: 17, patch: 9 }.is_supported());
        assert!(!GitVersion { major: 1, minor: 99, patch: 0 }.is_supported());
    }

    #[test]
    fn test_detect_missing_binary() {
        let err = GitVersion::detect("/nonexistent/git-binary").unwrap_err();
        assert!(matches!(err, GitError::SpawnFailure { .. }));
    }

    #[test]
    fn test_detect_installed_git() {
        let version = GitVersion::detect("git").unwrap();
        assert!(version.major >= 2);
    }
}
