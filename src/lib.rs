//! Workspace facade crate.
//!
//! Exposes the feature flags that map to the individual workspace crates
//! (`core-transfer`, `core-runtime`, `provider-google-drive`). Host
//! applications can depend on `drive-transfer-workspace` and enable the
//! documented features without wiring each crate individually.

#[cfg(feature = "desktop-shims")]
pub use core_runtime;
#[cfg(feature = "desktop-shims")]
pub use core_transfer;
#[cfg(feature = "desktop-shims")]
pub use provider_google_drive;

/// Engine talking to the Drive API with the configured HTTP client and
/// token files.
#[cfg(feature = "desktop-shims")]
pub fn drive_engine(config: core_runtime::config::TransferConfig) -> core_transfer::DriveEngine {
    use std::sync::Arc;

    let factory = Arc::new(provider_google_drive::GoogleDriveStoreFactory::new(
        Arc::clone(&config.http_client),
    ));
    core_transfer::DriveEngine::with_file_credentials(config, factory)
}
