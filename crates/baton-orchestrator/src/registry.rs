//! Agent registry.
//!
//! An explicit value handed to every component that needs it. Agents are
//! registered once, kept in registration order, and never removed while
//! the process runs.

use baton_abstraction::{CapabilitySet, ExecutionAgent};
use std::fmt;
use std::sync::{Arc, PoisonError, RwLock};
use thiserror::Error;
use tracing::debug;

/// Registry errors.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RegistryError {
    /// An agent with this ID is already registered.
    #[error("Agent '{0}' is already registered")]
    Duplicate(String),

    /// The agent reported an empty ID.
    #[error("Agent ID must not be empty")]
    EmptyId,
}

/// What decision logic may know about an agent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgentProfile {
    /// The agent's unique ID.
    pub id: String,
    /// Advertised capability tags.
    pub capabilities: CapabilitySet,
    /// Position in registration order (0-based).
    pub order: usize,
}

impl AgentProfile {
    /// Returns `true` if this agent provides every required capability.
    #[must_use]
    pub fn satisfies(&self, required: &CapabilitySet) -> bool {
        required.is_subset(&self.capabilities)
    }
}

/// Registry of execution agents.
pub struct AgentRegistry {
    /// Agents in registration order.
    agents: RwLock<Vec<Arc<dyn ExecutionAgent>>>,
}

impl fmt::Debug for AgentRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AgentRegistry")
            .field("agent_count", &self.len())
            .finish_non_exhaustive()
    }
}

impl AgentRegistry {
    /// Creates a new empty agent registry.
    #[must_use]
    pub fn new() -> Self {
        Self { agents: RwLock::new(Vec::new()) }
    }

    /// Registers an agent.
    ///
    /// # Errors
    /// Returns an error if the ID is empty or already taken.
    pub fn register(&self, agent: Arc<dyn ExecutionAgent>) -> Result<(), RegistryError> {
        let id = agent.id().to_string();
        if id.is_empty() {
            return Err(RegistryError::EmptyId);
        }

        let mut agents = self.agents.write().unwrap_or_else(PoisonError::into_inner);
        if agents.iter().any(|a| a.id() == id) {
            return Err(RegistryError::Duplicate(id));
        }

        debug!(
            agent_id = %id,
            capabilities = ?agent.capabilities(),
            order = agents.len(),
            "Registering agent"
        );
        agents.push(agent);
        Ok(())
    }

    /// Retrieves an agent by ID.
    #[must_use]
    pub fn get(&self, id: &str) -> Option<Arc<dyn ExecutionAgent>> {
        self.agents
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .find(|a| a.id() == id)
            .cloned()
    }

    /// Profiles of every agent, in registration order.
    #[must_use]
    pub fn profiles(&self) -> Vec<AgentProfile> {
        self.agents
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .enumerate()
            .map(|(order, agent)| AgentProfile {
                id: agent.id().to_string(),
                capabilities: agent.capabilities().clone(),
                order,
            })
            .collect()
    }

    /// Profiles of agents providing every `required` capability, in
    /// registration order.
    #[must_use]
    pub fn compatible(&self, required: &CapabilitySet) -> Vec<AgentProfile> {
        self.profiles().into_iter().filter(|p| p.satisfies(required)).collect()
    }

    /// Returns the number of registered agents.
    #[must_use]
    pub fn len(&self) -> usize {
        self.agents.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// Returns `true` if no agents are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for AgentRegistry {
    fn default() -> Self {
        Self::new()
    }
}
