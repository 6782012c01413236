use anyhow::{Context, Result};

use super::{Backends, Command};
use crate::config::TrackerConfig;
use crate::model::{RunKey, StepStatus};

pub struct StatusCommand {
    pub key: RunKey,
    pub layer: String,
    pub substep: String,
    pub step: String,
    pub to: String,
    pub config: TrackerConfig,
    pub dry_run: bool,
}

impl Command for StatusCommand {
    async fn execute(&self) -> Result<()> {
        let status: StepStatus = self
            .to
            .parse()
            .with_context(|| format!("'{}' is not a step status", self.to))?;

        let backends = Backends::connect(&self.config, self.dry_run)?;
        let mut session = backends.open_session(&self.key).await?;

        let outcome = session.set_step_status(&self.layer, &self.substep, &self.step, status)?;
        println!(
            "🔄 {} / {} / {}: {} → {}",
            self.layer, self.substep, self.step, outcome.old, outcome.new
        );
        if let Some(uid) = &outcome.entity_uid {
            println!("   🏷️  Record updated: {uid}");
        }

        backends.save(&mut session).await
    }
}
