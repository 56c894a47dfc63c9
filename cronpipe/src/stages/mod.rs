//! Stage trait and implementations.
//!
//! A stage is one unit of business logic in the fixed pipeline. The
//! orchestrator hands it no arguments; configuration is the stage's own
//! concern. A stage either returns a [`StageResult`] (optionally carrying
//! recoverable errors) or fails with a [`StageError`].

mod result;

pub use result::{StageResult, ERRORS_KEY};

use crate::core::StageName;
use crate::errors::StageError;
use async_trait::async_trait;
use std::collections::HashMap;
use std::fmt::Debug;
use std::future::Future;
use std::marker::PhantomData;
use std::sync::Arc;

/// Trait for pipeline stages.
#[async_trait]
pub trait Stage: Send + Sync + Debug {
    /// Returns the name of the stage.
    fn name(&self) -> StageName;

    /// Runs the stage to completion.
    ///
    /// # Returns
    ///
    /// The stage's structured result, or a fatal error.
    async fn run(&self) -> Result<StageResult, StageError>;
}

/// An async function-based stage.
pub struct FnStage<F, Fut>
where
    F: Fn() -> Fut + Send + Sync,
    Fut: Future<Output = Result<StageResult, StageError>> + Send,
{
    name: StageName,
    func: F,
    _phantom: PhantomData<fn() -> Fut>,
}

impl<F, Fut> FnStage<F, Fut>
where
    F: Fn() -> Fut + Send + Sync,
    Fut: Future<Output = Result<StageResult, StageError>> + Send,
{
    /// Creates a new function-based stage.
    pub const fn new(name: StageName, func: F) -> Self {
        Self {
            name,
            func,
            _phantom: PhantomData,
        }
    }
}

impl<F, Fut> Debug for FnStage<F, Fut>
where
    F: Fn() -> Fut + Send + Sync,
    Fut: Future<Output = Result<StageResult, StageError>> + Send,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FnStage").field("name", &self.name).finish()
    }
}

#[async_trait]
impl<F, Fut> Stage for FnStage<F, Fut>
where
    F: Fn() -> Fut + Send + Sync,
    Fut: Future<Output = Result<StageResult, StageError>> + Send,
{
    fn name(&self) -> StageName {
        self.name
    }

    async fn run(&self) -> Result<StageResult, StageError> {
        (self.func)().await
    }
}

/// A stage that does nothing and returns an empty result.
#[derive(Debug, Clone)]
pub struct NoOpStage {
    name: StageName,
}

impl NoOpStage {
    /// Creates a new no-op stage.
    #[must_use]
    pub const fn new(name: StageName) -> Self {
        Self { name }
    }
}

#[async_trait]
impl Stage for NoOpStage {
    fn name(&self) -> StageName {
        self.name
    }

    async fn run(&self) -> Result<StageResult, StageError> {
        Ok(StageResult::new())
    }
}

/// Lookup table from stage name to implementation.
#[derive(Debug, Clone, Default)]
pub struct StageRegistry {
    stages: HashMap<StageName, Arc<dyn Stage>>,
}

impl StageRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a stage under its own name, replacing any previous one.
    pub fn register(&mut self, stage: Arc<dyn Stage>) -> &mut Self {
        self.stages.insert(stage.name(), stage);
        self
    }

    /// Builder-style registration.
    #[must_use]
    pub fn with(mut self, stage: Arc<dyn Stage>) -> Self {
        self.register(stage);
        self
    }

    /// Gets the stage registered for `name`.
    #[must_use]
    pub fn get(&self, name: StageName) -> Option<Arc<dyn Stage>> {
        self.stages.get(&name).cloned()
    }

    /// Returns true if every pipeline stage has an implementation.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        StageName::PIPELINE_ORDER
            .iter()
            .all(|name| self.stages.contains_key(name))
    }

    /// Stages with no registered implementation, in pipeline order.
    #[must_use]
    pub fn missing(&self) -> Vec<StageName> {
        StageName::PIPELINE_ORDER
            .into_iter()
            .filter(|name| !self.stages.contains_key(name))
            .collect()
    }

    /// Returns the number of registered stages.
    #[must_use]
    pub fn len(&self) -> usize {
        self.stages.len()
    }

    /// Returns true if no stage is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }
}
