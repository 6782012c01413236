use anyhow::{bail, Result};

use super::{Backends, Command};
use crate::config::TrackerConfig;
use crate::model::{Run, RunKey};
use crate::registry::default_flow;
use crate::session::RunSession;
use crate::timestamp::{date_only, now_string};

pub struct InitCommand {
    pub key: RunKey,
    pub device: String,
    pub creator: String,
    pub config: TrackerConfig,
    pub dry_run: bool,
}

impl InitCommand {
    pub fn new(key: RunKey, device: String, creator: String, config: TrackerConfig) -> Self {
        Self {
            key,
            device,
            creator,
            config,
            dry_run: false,
        }
    }

    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }
}

impl Command for InitCommand {
    async fn execute(&self) -> Result<()> {
        println!("🆕 Creating {} ({})", self.key, self.key.doc_id());

        let backends = Backends::connect(&self.config, self.dry_run)?;
        match backends.source().get(&self.key.doc_id()).await {
            Ok(_) => bail!("run document '{}' already exists", self.key.doc_id()),
            Err(e) if e.is_not_found() => {}
            Err(e) => return Err(e.into()),
        }

        let now = now_string(backends.utc_offset_minutes);
        let created = date_only(&now).unwrap_or(now);
        let run = Run::new(self.key.clone(), &self.device, &self.creator, &created).with_layers(default_flow());
        let mut session = RunSession::create(run).with_utc_offset(backends.utc_offset_minutes);

        backends.save(&mut session).await?;
        println!("💡 Next: fab-tracker show --class {} --run {}", self.key.class, self.key.run_no);
        Ok(())
    }
}
