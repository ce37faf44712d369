use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Writes raw telemetry responses to `debug_<LABEL>_ajax.json` so a bad
/// payload can be inspected after the fact. Failures are logged, never
/// propagated.
#[derive(Debug, Clone)]
pub struct DebugDump {
    dir: Option<PathBuf>,
}

impl DebugDump {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: Some(dir.into()),
        }
    }

    pub fn disabled() -> Self {
        Self { dir: None }
    }

    pub fn path_for(&self, label: &str) -> Option<PathBuf> {
        self.dir
            .as_deref()
            .map(|dir| dir.join(format!("debug_{}_ajax.json", label)))
    }

    pub async fn record(&self, label: &str, body: &str) {
        let Some(path) = self.path_for(label) else {
            return;
        };

        match write(&path, body).await {
            Ok(()) => debug!("Saved response to {}", path.display()),
            Err(e) => warn!("Could not save debug response to {}: {}", path.display(), e),
        }
    }
}

async fn write(path: &Path, body: &str) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    tokio::fs::write(path, body).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_record_writes_and_overwrites() {
        let dir = tempfile::tempdir().unwrap();
        let dump = DebugDump::new(dir.path().join("dumps"));

        dump.record("MILL_1", "{\"first\":true}").await;
        dump.record("MILL_1", "not json at all").await;

        let path = dump.path_for("MILL_1").unwrap();
        assert!(path.ends_with("debug_MILL_1_ajax.json"));
        assert_eq!(std::fs::read_to_string(path).unwrap(), "not json at all");
    }

    #[tokio::test]
    async fn test_disabled_writes_nothing() {
        let dump = DebugDump::disabled();
        assert!(dump.path_for("MILL_2").is_none());
        dump.record("MILL_2", "ignored").await;
    }

    #[tokio::test]
    async fn test_unwritable_dir_is_not_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("file");
        std::fs::write(&blocker, "x").unwrap();

        // parent "directory" is a regular file
        let dump = DebugDump::new(blocker.join("sub"));
        dump.record("MILL_1", "body").await;
        assert!(!blocker.join("sub").exists());
    }
}
