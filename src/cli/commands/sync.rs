use anyhow::Result;

use super::{Backends, Command};
use crate::config::TrackerConfig;
use crate::model::RunKey;

/// Save a run unchanged. Repairs half-written linkage and lets the mirror
/// catch up after earlier failures.
pub struct SyncCommand {
    pub key: RunKey,
    pub config: TrackerConfig,
    pub dry_run: bool,
}

impl Command for SyncCommand {
    async fn execute(&self) -> Result<()> {
        println!("🔁 Syncing {}", self.key);
        let backends = Backends::connect(&self.config, self.dry_run)?;
        let mut session = backends.open_session(&self.key).await?;
        backends.save(&mut session).await
    }
}
