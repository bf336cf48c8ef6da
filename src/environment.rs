//! Runtime description reported in the User-Agent header.

use std::fs;

/// Language and platform details sent to the service for diagnostics.
///
/// The client does not look at the host on its own; a value is passed in at
/// construction. [`EnvironmentInfo::detect`] builds one for the current host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnvironmentInfo {
    /// e.g. `Rust/1.75`
    pub language: String,
    pub os: String,
    pub arch: String,
    pub release: String,
}

impl EnvironmentInfo {
    pub fn new(
        language: impl Into<String>,
        os: impl Into<String>,
        arch: impl Into<String>,
        release: impl Into<String>,
    ) -> Self {
        Self {
            language: language.into(),
            os: os.into(),
            arch: arch.into(),
            release: release.into(),
        }
    }

    /// Describes the running host. The kernel release is read from
    /// `/proc/sys/kernel/osrelease` where available and is `unknown` elsewhere.
    pub fn detect() -> Self {
        let language = match option_env!("CARGO_PKG_RUST_VERSION") {
            Some(version) if !version.is_empty() => format!("Rust/{version}"),
            _ => "Rust".to_string(),
        };
        let release = fs::read_to_string("/proc/sys/kernel/osrelease")
            .map(|release| release.trim().to_string())
            .ok()
            .filter(|release| !release.is_empty())
            .unwrap_or_else(|| "unknown".to_string());

        Self::new(
            language,
            std::env::consts::OS,
            std::env::consts::ARCH,
            release,
        )
    }

    /// `<os>/<arch>/<release>`
    pub fn platform(&self) -> String {
        format!("{}/{}/{}", self.os, self.arch, self.release)
    }

    /// Formats the full User-Agent value for an application.
    pub fn user_agent(&self, application_name: &str, application_version: &str) -> String {
        format!(
            "{application_name}/{application_version} (Language={}; Platform={})",
            self.language,
            self.platform()
        )
    }
}
