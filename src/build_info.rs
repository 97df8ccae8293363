//! Build information captured at compile time.

/// Package version from Cargo.toml.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Short git commit hash (7 chars).
pub const BUILD_HASH: &str = env!("BUILD_HASH");

/// Full version string including hash and dirty indicator.
///
/// Format: `0.1.0 (abc1234)` or `0.1.0 (abc1234*)` if dirty.
pub const LONG_VERSION: &str = env!("BUILD_VERSION");

/// `User-Agent` sent with outbound requests.
#[must_use]
pub fn user_agent() -> String {
    format!("beastmode/{VERSION}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn long_version_starts_with_package_version() {
        assert!(LONG_VERSION.starts_with(VERSION));
        assert!(LONG_VERSION.contains(BUILD_HASH));
    }
}
