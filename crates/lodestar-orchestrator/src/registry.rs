//! Tool registry: maps tool ids to factories over an immutable dependency bundle.

use lodestar_abstraction::ModelProvider;
use lodestar_core::{Logger, RepositoryAccess};
use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use crate::run::RunSettings;
use crate::tool::{Tool, ToolId};
use crate::tools::CommentsTool;

/// Everything a tool may depend on, fixed at construction.
#[derive(Clone)]
pub struct ToolDeps {
    pub workspace_root: PathBuf,
    pub provider: Option<Arc<dyn ModelProvider>>,
    pub repository: Arc<dyn RepositoryAccess>,
    pub logger: Arc<Logger>,
    pub settings: RunSettings,
}

impl fmt::Debug for ToolDeps {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ToolDeps")
            .field("workspace_root", &self.workspace_root)
            .field("provider", &self.provider.as_ref().map(|p| p.provider_id().to_string()))
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}

/// Builds a fully initialized tool from its dependencies.
pub type ToolFactory = Arc<dyn Fn(&ToolDeps) -> Box<dyn Tool> + Send + Sync>;

/// One registered tool.
#[derive(Clone)]
pub struct ToolRegistration {
    pub id: ToolId,
    pub description: String,
    /// The runner resolves a provider (with retry) before constructing it.
    pub requires_model: bool,
    factory: ToolFactory,
}

impl fmt::Debug for ToolRegistration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ToolRegistration")
            .field("id", &self.id)
            .field("description", &self.description)
            .field("requires_model", &self.requires_model)
            .finish_non_exhaustive()
    }
}

impl ToolRegistration {
    pub fn new<F>(
        id: ToolId,
        description: impl Into<String>,
        requires_model: bool,
        factory: F,
    ) -> Self
    where
        F: Fn(&ToolDeps) -> Box<dyn Tool> + Send + Sync + 'static,
    {
        Self { id, description: description.into(), requires_model, factory: Arc::new(factory) }
    }

    /// Constructs the tool.
    #[must_use]
    pub fn build(&self, deps: &ToolDeps) -> Box<dyn Tool> {
        (self.factory)(deps)
    }
}

/// Registry of available tools.
#[derive(Debug, Clone, Default)]
pub struct ToolRegistry {
    tools: HashMap<ToolId, ToolRegistration>,
}

impl ToolRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry holding the tools shipped with this crate.
    #[must_use]
    pub fn with_builtin_tools() -> Self {
        let mut registry = Self::new();
        registry.register(ToolRegistration::new(
            ToolId::Comments,
            "Reports TODO, FIXME, HACK and XXX markers",
            false,
            |_| Box::new(CommentsTool::new()),
        ));
        registry
    }

    /// Registers a tool, replacing any previous registration for its id.
    pub fn register(&mut self, registration: ToolRegistration) -> &mut Self {
        tracing::debug!(tool_id = %registration.id, "Registering tool");
        self.tools.insert(registration.id, registration);
        self
    }

    #[must_use]
    pub fn get(&self, id: ToolId) -> Option<&ToolRegistration> {
        self.tools.get(&id)
    }

    #[must_use]
    pub fn contains(&self, id: ToolId) -> bool {
        self.tools.contains_key(&id)
    }

    /// Registrations sorted by id.
    #[must_use]
    pub fn list(&self) -> Vec<&ToolRegistration> {
        let mut tools: Vec<_> = self.tools.values().collect();
        tools.sort_by_key(|r| r.id);
        tools
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.tools.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::run::tests::StepTool;

    #[test]
    fn test_builtin_registry() {
        let registry = ToolRegistry::with_builtin_tools();
        let comments = registry.get(ToolId::Comments).unwrap();
        assert!(!comments.requires_model);
        assert!(!registry.contains(ToolId::Commit));
    }

    #[test]
    fn test_register_replaces_and_lists_sorted() {
        let mut registry = ToolRegistry::new();
        let step = |id: ToolId, description: &'static str, steps: usize| {
            ToolRegistration::new(id, description, false, move |_| {
                Box::new(StepTool::new(id, steps))
            })
        };
        registry
            .register(step(ToolId::Tldr, "first", 1))
            .register(step(ToolId::Lint, "lint", 1))
            .register(step(ToolId::Tldr, "second", 2));

        assert_eq!(registry.len(), 2);
        let ids: Vec<_> = registry.list().into_iter().map(|r| r.id).collect();
        assert_eq!(ids, vec![ToolId::Lint, ToolId::Tldr]);
        assert_eq!(registry.get(ToolId::Tldr).unwrap().description, "second");
    }
}
