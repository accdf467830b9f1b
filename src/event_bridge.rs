//! Context-Aware Event Bridge — C7.
//!
//! Wraps a downstream `EventListener` and injects orchestrator phase/step/iteration/agent-name
//! into every forwarded event's metadata, without filtering or synthesizing events (§4.7).

use std::error::Error as StdError;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::event::{EventListener, RuntimeEvent};

/// The orchestrator state threaded into every bridged event (§3 OrchestratorContext, §4.7).
#[derive(Debug, Clone, Default)]
pub struct BridgeState {
    pub phase: Option<String>,
    pub step: Option<u32>,
    pub iteration: Option<u32>,
    pub agent_name: Option<String>,
}

/// Forwards events to an inner listener, stamping them with the current orchestrator context.
pub struct ContextAwareEventBridge {
    inner: Arc<dyn EventListener>,
    state: RwLock<BridgeState>,
}

impl ContextAwareEventBridge {
    pub fn new(inner: Arc<dyn EventListener>) -> Self {
        Self {
            inner,
            state: RwLock::new(BridgeState::default()),
        }
    }

    pub async fn set_phase(&self, phase: impl Into<String>) {
        self.state.write().await.phase = Some(phase.into());
    }

    pub async fn set_step(&self, step: u32) {
        self.state.write().await.step = Some(step);
    }

    pub async fn set_iteration(&self, iteration: u32) {
        self.state.write().await.iteration = Some(iteration);
    }

    pub async fn set_agent_name(&self, name: impl Into<String>) {
        self.state.write().await.agent_name = Some(name.into());
    }

    pub async fn snapshot(&self) -> BridgeState {
        self.state.read().await.clone()
    }
}

#[async_trait]
impl EventListener for ContextAwareEventBridge {
    async fn handle_event(&self, event: &RuntimeEvent) -> Result<(), Box<dyn StdError + Send + Sync>> {
        let mut stamped = event.clone();
        let state = self.state.read().await;

        if let Some(phase) = &state.phase {
            stamped
                .metadata
                .insert("orchestrator_phase".to_string(), serde_json::json!(phase));
        }
        if let Some(step) = state.step {
            stamped
                .metadata
                .insert("orchestrator_step".to_string(), serde_json::json!(step));
        }
        if let Some(iteration) = state.iteration {
            stamped
                .metadata
                .insert("orchestrator_iteration".to_string(), serde_json::json!(iteration));
        }
        if let Some(agent_name) = &state.agent_name {
            stamped
                .metadata
                .insert("orchestrator_agent_name".to_string(), serde_json::json!(agent_name));
        }

        self.inner.handle_event(&stamped).await
    }
}
