//! Host-installed global settings
//!
//! Host adapters (a browser harness bridge, an embedding application) can
//! install settings once per process; every suite declared afterwards uses
//! them as its base layer.

use std::sync::OnceLock;
use tracing::warn;

use super::SuiteSettingsSpec;

static GLOBAL_SETTINGS: OnceLock<SuiteSettingsSpec> = OnceLock::new();

/// Install process-wide settings. Returns `false` if settings were already installed.
pub fn install_global_settings(spec: SuiteSettingsSpec) -> bool {
    let installed = GLOBAL_SETTINGS.set(spec).is_ok();
    if !installed {
        warn!("Global suite settings were already installed; keeping the first");
    }
    installed
}

pub fn global_settings() -> Option<&'static SuiteSettingsSpec> {
    GLOBAL_SETTINGS.get()
}
