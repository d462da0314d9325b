//! Prompt assembly — compose the system prompt from the three active
//! layers and capture the snapshot recorded into the trace.

use std::sync::Arc;

use chrono::Utc;

use nexus_domain::error::{Error, Result};
use nexus_domain::layer::LayerType;
use nexus_domain::trace::PromptSnapshot;
use nexus_store::PromptLayerStore;

pub struct PromptAssembler {
    layers: Arc<PromptLayerStore>,
}

#[derive(Debug)]
pub struct AssembledPrompt {
    pub system_prompt: String,
    pub snapshot: PromptSnapshot,
}

impl PromptAssembler {
    pub fn new(layers: Arc<PromptLayerStore>) -> Self {
        Self { layers }
    }

    /// Resolve the active identity, instructions, and safety layers and
    /// compose them in that order. A missing active layer fails with
    /// `NO_ACTIVE_PROMPT` naming the layer type.
    pub async fn assemble(&self, project_id: &str) -> Result<AssembledPrompt> {
        let active = self.layers.active_layers(project_id).await;

        let mut resolved = Vec::with_capacity(3);
        for layer_type in LayerType::ALL {
            let layer = active
                .get(&layer_type)
                .ok_or_else(|| Error::NoActivePrompt(layer_type.as_str().to_string()))?;
            resolved.push(layer.clone());
        }

        let system_prompt = resolved
            .iter()
            .map(|l| l.content.as_str())
            .collect::<Vec<_>>()
            .join("\n\n");

        let snapshot = PromptSnapshot {
            identity_version: resolved[0].version,
            instructions_version: resolved[1].version,
            safety_version: resolved[2].version,
            composed_system_prompt: system_prompt.clone(),
            assembled_at: Utc::now(),
        };

        Ok(AssembledPrompt {
            system_prompt,
            snapshot,
        })
    }
}
