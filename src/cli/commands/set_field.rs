use anyhow::{bail, Result};

use super::{Backends, Command};
use crate::cli::StageArg;
use crate::config::TrackerConfig;
use crate::metadata::MetaScope;
use crate::model::RunKey;
use crate::registry::{EntityKind, EntityRegistry};

pub struct SetFieldCommand {
    pub key: RunKey,
    pub stage: StageArg,
    pub entity: Option<String>,
    pub field: String,
    pub value: String,
    pub config: TrackerConfig,
    pub dry_run: bool,
}

/// Find an entity by uid, label or numbered display label
fn resolve_entity(registry: &EntityRegistry, kind: EntityKind, needle: &str) -> Option<String> {
    let entities = match kind {
        EntityKind::Chip => &registry.chips,
        EntityKind::Fridge => &registry.fridges,
    };
    let needle = needle.trim();
    entities
        .iter()
        .find(|entity| entity.uid == needle)
        .or_else(|| entities.iter().find(|entity| entity.display_label.eq_ignore_ascii_case(needle)))
        .map(|entity| entity.uid.clone())
}

impl Command for SetFieldCommand {
    async fn execute(&self) -> Result<()> {
        let backends = Backends::connect(&self.config, self.dry_run)?;
        let mut session = backends.open_session(&self.key).await?;

        let entity_kind = match self.stage {
            StageArg::Design => None,
            StageArg::Fab => None,
            StageArg::Package => Some(EntityKind::Chip),
            StageArg::Measure => Some(EntityKind::Fridge),
        };

        match (entity_kind, self.entity.as_deref()) {
            (None, _) => {
                let scope = if self.stage == StageArg::Design {
                    MetaScope::Design
                } else {
                    MetaScope::Fab
                };
                session.set_stage_field(scope, &self.field, &self.value)?;
                println!("✍️  {} {} = '{}'", scope.name(), self.field, self.value);
            }
            (Some(kind), Some(needle)) => {
                let registry = EntityRegistry::from_layers(&session.run().layers)?;
                let uid = resolve_entity(&registry, kind, needle).unwrap_or_else(|| needle.trim().to_string());
                session.set_entity_field(kind, &uid, &self.field, &self.value)?;
                println!("✍️  {} {} {} = '{}'", kind, uid, self.field, self.value);
            }
            (Some(kind), None) => bail!("--entity is required for {kind} fields"),
        }

        backends.save(&mut session).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::default_flow;

    #[test]
    fn test_resolve_entity_by_uid_or_label() {
        let registry = EntityRegistry::from_layers(&default_flow()).unwrap();
        assert_eq!(
            resolve_entity(&registry, EntityKind::Fridge, "bluefors").as_deref(),
            Some("fridge_default_bluefors")
        );
        assert_eq!(
            resolve_entity(&registry, EntityKind::Chip, "chip_default_c01").as_deref(),
            Some("chip_default_c01")
        );
        assert_eq!(resolve_entity(&registry, EntityKind::Chip, "C09"), None);
    }
}
