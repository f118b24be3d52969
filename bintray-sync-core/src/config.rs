use tracing::{debug, info};

/// Options for a full synchronise run that do not come from the manifest entries.
#[derive(Debug, Clone, Default)]
pub struct SynchroniseOptions {
    /// Delete every declared package and repository before reconciling.
    pub cleanup: bool,
    /// Passphrase handed to the service when signing versions.
    pub gpg_passphrase: Option<String>,
}

impl SynchroniseOptions {
    pub fn trace_loaded(&self) {
        info!(
            cleanup = self.cleanup,
            gpg_passphrase_set = self.gpg_passphrase.is_some(),
            "Loaded SynchroniseOptions"
        );
        debug!(cleanup = self.cleanup, "SynchroniseOptions loaded (full debug)");
    }
}
