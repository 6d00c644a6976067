use crate::{
    error::{Result, TavlaError},
    storage::{Snapshot, Storage},
};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::debug;

/// File-based storage implementation.
///
/// The whole snapshot is written to a sibling temp file and renamed over
/// `state.json`, so a crash mid-write leaves the previous state intact.
pub struct FileStorage {
    root_path: PathBuf,
}

impl FileStorage {
    const TAVLA_DIR: &'static str = ".tavla";
    const STATE_FILE: &'static str = "state.json";
    const TEMP_FILE: &'static str = "state.json.tmp";

    /// Creates a new FileStorage instance under the given directory
    pub fn new(project_root: impl AsRef<Path>) -> Self {
        Self {
            root_path: project_root.as_ref().join(Self::TAVLA_DIR),
        }
    }

    fn state_file(&self) -> PathBuf {
        self.root_path.join(Self::STATE_FILE)
    }

    fn temp_file(&self) -> PathBuf {
        self.root_path.join(Self::TEMP_FILE)
    }

    async fn ensure_directory_exists(&self, path: &Path) -> Result<()> {
        if !path.exists() {
            fs::create_dir_all(path).await?;
        }
        Ok(())
    }
}

#[async_trait]
impl Storage for FileStorage {
    async fn initialize(&self) -> Result<()> {
        // Create .tavla directory
        self.ensure_directory_exists(&self.root_path).await?;

        // Create empty state if it doesn't exist
        if !self.state_file().exists() {
            self.persist(&Snapshot::default()).await?;
        }

        // Create .gitignore
        let gitignore_path = self.root_path.join(".gitignore");
        if !gitignore_path.exists() {
            fs::write(gitignore_path, "*.tmp\n").await?;
        }

        Ok(())
    }

    async fn load(&self) -> Result<Snapshot> {
        let state_file = self.state_file();

        if !state_file.exists() {
            return Err(TavlaError::StorageError(format!(
                "no state file at {}",
                state_file.display()
            )));
        }

        let contents = fs::read_to_string(&state_file).await?;
        let snapshot: Snapshot = serde_json::from_str(&contents)?;

        Ok(snapshot)
    }

    async fn persist(&self, snapshot: &Snapshot) -> Result<()> {
        self.ensure_directory_exists(&self.root_path).await?;

        let json = serde_json::to_string_pretty(snapshot)?;
        let temp_file = self.temp_file();

        fs::write(&temp_file, json).await?;
        fs::rename(&temp_file, self.state_file()).await?;

        debug!(path = %self.state_file().display(), "persisted snapshot");
        Ok(())
    }

    async fn is_initialized(&self) -> bool {
        self.root_path.exists() && self.state_file().exists()
    }
}
