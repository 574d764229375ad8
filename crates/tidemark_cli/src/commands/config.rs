//! Config command implementation.

use super::{open_state, CommandResult};
use std::path::Path;
use std::time::Duration;
use tidemark_sync_engine::{SyncConfig, SyncConfigPatch};

/// Runs the config command. With no changes, prints the current config.
pub fn run(path: &Path, patch: SyncConfigPatch, format: &str) -> CommandResult<()> {
    let config = apply(path, &patch)?;

    match format {
        "json" => println!("{}", serde_json::to_string_pretty(&config)?),
        _ => {
            println!("globally_enabled:  {}", config.globally_enabled);
            println!("auto_sync_enabled: {}", config.auto_sync_enabled);
            println!("sync_interval_ms:  {}", config.sync_interval.as_millis());
        }
    }
    Ok(())
}

/// Applies `patch` to the persisted config and returns the result.
pub fn apply(path: &Path, patch: &SyncConfigPatch) -> CommandResult<SyncConfig> {
    let (_, state) = open_state(path)?;
    let current = state.load_config();
    if patch.is_empty() {
        return Ok(current);
    }

    let next = patch.apply(&current);
    next.validate()?;
    state.save_config(&next)?;
    tracing::info!("Updated sync config at {:?}", path);
    Ok(next)
}

/// Builds a patch from command-line flags.
pub fn patch_from_flags(
    auto_sync: Option<bool>,
    interval_ms: Option<u64>,
    enabled: Option<bool>,
) -> SyncConfigPatch {
    SyncConfigPatch {
        auto_sync_enabled: auto_sync,
        sync_interval: interval_ms.map(Duration::from_millis),
        globally_enabled: enabled,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_patch_is_persisted() {
        let dir = tempfile::tempdir().unwrap();

        let shown = apply(dir.path(), &SyncConfigPatch::new()).unwrap();
        assert_eq!(shown, SyncConfig::default());

        let patch = patch_from_flags(Some(false), Some(60_000), None);
        apply(dir.path(), &patch).unwrap();

        let reloaded = apply(dir.path(), &SyncConfigPatch::new()).unwrap();
        assert!(!reloaded.auto_sync_enabled);
        assert!(reloaded.globally_enabled);
        assert_eq!(reloaded.sync_interval, Duration::from_secs(60));
    }

    #[test]
    fn invalid_interval_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let patch = patch_from_flags(None, Some(5), None);
        assert!(apply(dir.path(), &patch).is_err());
        assert_eq!(
            apply(dir.path(), &SyncConfigPatch::new()).unwrap(),
            SyncConfig::default()
        );
    }
}
