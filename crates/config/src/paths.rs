//! Fixed filesystem paths and well-known ports
//!
//! Everything switches on development mode: the daemon and CLI of a
//! development build must never touch the system database, cache or
//! ports of a production install.

use std::path::PathBuf;

/// API port (TCP)
pub const API_PORT: u16 = 9876;
/// API port in development mode
pub const API_PORT_DEV: u16 = 9877;
/// Discovery broadcast port (UDP)
pub const DISCOVERY_PORT: u16 = 9878;
/// Discovery broadcast port in development mode
pub const DISCOVERY_PORT_DEV: u16 = 9879;

/// Magic prefix of a discovery datagram
pub const DISCOVERY_MAGIC: &[u8; 6] = b"URPMD1";

/// Legacy media configuration, imported read-only
pub const LEGACY_CFG: &str = "/etc/urpmi/urpmi.cfg";

/// Base state directory for the given mode
#[must_use]
pub fn base_dir(development: bool) -> PathBuf {
    if development {
        PathBuf::from("/var/lib/urpm-dev")
    } else {
        PathBuf::from("/var/lib/urpm")
    }
}

/// Catalog database file
#[must_use]
pub fn catalog_db(development: bool) -> PathBuf {
    base_dir(development).join("packages.db")
}

/// Package cache root; artifacts live one directory per media short id
#[must_use]
pub fn cache_dir(development: bool) -> PathBuf {
    base_dir(development).join("cache").join("packages")
}

/// Daemon pid file
#[must_use]
pub fn pid_file(development: bool) -> PathBuf {
    if development {
        base_dir(true).join("urpmd.pid")
    } else {
        PathBuf::from("/run/urpmd.pid")
    }
}

/// Configuration file location
#[must_use]
pub fn config_file(development: bool) -> PathBuf {
    if development {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("urpm")
            .join("urpm.toml")
    } else {
        PathBuf::from("/etc/urpm/urpm.toml")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dev_paths_never_alias_system_paths() {
        assert_ne!(catalog_db(false), catalog_db(true));
        assert_ne!(cache_dir(false), cache_dir(true));
        assert_ne!(pid_file(false), pid_file(true));
        assert_ne!(API_PORT, API_PORT_DEV);
        assert_ne!(DISCOVERY_PORT, DISCOVERY_PORT_DEV);
    }
}
