use anyhow::Result;

use super::{Backends, Command};
use crate::config::TrackerConfig;
use crate::model::{MetaRecord, RunKey, StepStatus};
use crate::registry::{EntityKind, EntityRegistry};

pub struct ShowCommand {
    pub key: RunKey,
    pub config: TrackerConfig,
}

impl ShowCommand {
    pub fn new(key: RunKey, config: TrackerConfig) -> Self {
        Self { key, config }
    }
}

fn status_icon(status: StepStatus) -> &'static str {
    match status {
        StepStatus::Pending => "⏳",
        StepStatus::InProgress => "🔄",
        StepStatus::Done => "✅",
        StepStatus::Terminate => "⛔",
        StepStatus::Delivery(_) => "🚚",
        StepStatus::Store(_) => "📦",
    }
}

fn print_record(title: &str, record: &MetaRecord) {
    let filled: Vec<(&str, &str)> = record.iter().filter(|(_, value)| !value.trim().is_empty()).collect();
    if filled.is_empty() {
        println!("   {title}: (empty)");
        return;
    }
    println!("   {title}:");
    for (key, value) in filled {
        println!("      {key} = {value}");
    }
}

impl Command for ShowCommand {
    async fn execute(&self) -> Result<()> {
        let backends = Backends::connect(&self.config, false)?;
        let session = backends.open_session(&self.key).await?;
        let run = session.run();

        println!("📋 {} ({})", run.key, session.doc_id());
        println!("   🔬 Device: {}", run.device_name);
        println!("   👤 Creator: {}  📅 Created: {}", run.creator, run.created_date);
        println!();

        for layer in &run.layers {
            println!("🧱 {}", layer.name);
            for substep in &layer.substeps {
                let uid = substep.chip_uid.as_deref().or(substep.fridge_uid.as_deref());
                match uid {
                    Some(uid) => println!("   ▸ {} [{}]", substep.label_or_name(), uid),
                    None => println!("   ▸ {}", substep.label_or_name()),
                }
                for step in &substep.steps {
                    println!("      {} {:<12} {}", status_icon(step.status), step.name, step.status);
                }
            }
        }

        println!();
        println!("🗂️  Metadata");
        print_record("design", &run.metadata.design);
        print_record("fab", &run.metadata.fab);

        // entity labels come from the flow; stale records show their uid
        let registry = EntityRegistry::from_layers(&run.layers).ok();
        let label = |kind: EntityKind, uid: &str| {
            registry
                .as_ref()
                .and_then(|registry| registry.get(kind, uid))
                .map(|entity| format!("{} {} ({})", kind, entity.display_label, uid))
                .unwrap_or_else(|| format!("{kind} {uid}"))
        };
        for (uid, record) in &run.metadata.chips {
            print_record(&label(EntityKind::Chip, uid), record);
        }
        for (uid, record) in &run.metadata.fridges {
            print_record(&label(EntityKind::Fridge, uid), record);
        }
        Ok(())
    }
}
