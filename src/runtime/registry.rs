use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;

use super::WorkflowHandler;
use crate::OrchestrationContext;

/// Function wrapper that implements `WorkflowHandler`.
pub struct FnWorkflow<F, Fut>(pub F)
where
    F: Fn(OrchestrationContext, String) -> Fut + Send + Sync + 'static,
    Fut: std::future::Future<Output = Result<String, String>> + Send + 'static;

#[async_trait]
impl<F, Fut> WorkflowHandler for FnWorkflow<F, Fut>
where
    F: Fn(OrchestrationContext, String) -> Fut + Send + Sync + 'static,
    Fut: std::future::Future<Output = Result<String, String>> + Send + 'static,
{
    async fn invoke(&self, ctx: OrchestrationContext, input: String) -> Result<String, String> {
        (self.0)(ctx, input).await
    }
}

/// Immutable registry mapping workflow names to routine handlers.
#[derive(Clone, Default)]
pub struct WorkflowRegistry {
    inner: Arc<HashMap<String, Arc<dyn WorkflowHandler>>>,
}

impl WorkflowRegistry {
    pub fn builder() -> WorkflowRegistryBuilder {
        WorkflowRegistryBuilder {
            map: HashMap::new(),
            errors: Vec::new(),
        }
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn WorkflowHandler>> {
        self.inner.get(name).cloned()
    }

    pub fn list_workflow_names(&self) -> Vec<String> {
        self.inner.keys().cloned().collect()
    }
}

impl std::fmt::Debug for WorkflowRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkflowRegistry")
            .field("workflows", &self.inner.keys().collect::<Vec<_>>())
            .finish()
    }
}

pub struct WorkflowRegistryBuilder {
    map: HashMap<String, Arc<dyn WorkflowHandler>>,
    errors: Vec<String>,
}

impl WorkflowRegistryBuilder {
    pub fn register<F, Fut>(mut self, name: impl Into<String>, f: F) -> Self
    where
        F: Fn(OrchestrationContext, String) -> Fut + Send + Sync + 'static,
        Fut: std::future::Future<Output = Result<String, String>> + Send + 'static,
    {
        let name = name.into();
        if self.map.contains_key(&name) {
            self.errors
                .push(format!("duplicate workflow registration: {name}"));
            return self;
        }
        self.map.insert(name, Arc::new(FnWorkflow(f)));
        self
    }

    pub fn register_typed<In, Out, F, Fut>(self, name: impl Into<String>, f: F) -> Self
    where
        In: serde::de::DeserializeOwned + Send + 'static,
        Out: serde::Serialize + Send + 'static,
        F: Fn(OrchestrationContext, In) -> Fut + Send + Sync + Clone + 'static,
        Fut: std::future::Future<Output = Result<Out, String>> + Send + 'static,
    {
        let wrapper = move |ctx: OrchestrationContext, input_s: String| {
            let f_inner = f.clone();
            async move {
                let input: In = crate::codec::decode(&input_s)?;
                let out: Out = f_inner(ctx, input).await?;
                crate::codec::encode(&out)
            }
        };
        self.register(name, wrapper)
    }

    pub fn build(self) -> WorkflowRegistry {
        WorkflowRegistry {
            inner: Arc::new(self.map),
        }
    }

    pub fn build_result(self) -> Result<WorkflowRegistry, String> {
        if self.errors.is_empty() {
            Ok(WorkflowRegistry {
                inner: Arc::new(self.map),
            })
        } else {
            Err(self.errors.join("; "))
        }
    }
}

// ---------------- Activity registry

/// Trait implemented by activity handlers the engine can invoke.
#[async_trait]
pub trait ActivityHandler: Send + Sync {
    async fn invoke(&self, input: String) -> Result<String, String>;
}

pub struct FnActivity<F, Fut>(pub F)
where
    F: Fn(String) -> Fut + Send + Sync + 'static,
    Fut: std::future::Future<Output = Result<String, String>> + Send + 'static;

#[async_trait]
impl<F, Fut> ActivityHandler for FnActivity<F, Fut>
where
    F: Fn(String) -> Fut + Send + Sync + 'static,
    Fut: std::future::Future<Output = Result<String, String>> + Send + 'static,
{
    async fn invoke(&self, input: String) -> Result<String, String> {
        (self.0)(input).await
    }
}

#[derive(Clone, Default)]
pub struct ActivityRegistry {
    inner: Arc<HashMap<String, Arc<dyn ActivityHandler>>>,
}

pub struct ActivityRegistryBuilder {
    map: HashMap<String, Arc<dyn ActivityHandler>>,
}

impl ActivityRegistry {
    pub fn builder() -> ActivityRegistryBuilder {
        ActivityRegistryBuilder { map: HashMap::new() }
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn ActivityHandler>> {
        self.inner.get(name).cloned()
    }
}

impl ActivityRegistryBuilder {
    pub fn register<F, Fut>(mut self, name: impl Into<String>, f: F) -> Self
    where
        F: Fn(String) -> Fut + Send + Sync + 'static,
        Fut: std::future::Future<Output = Result<String, String>> + Send + 'static,
    {
        self.map.insert(name.into(), Arc::new(FnActivity(f)));
        self
    }

    pub fn register_typed<In, Out, F, Fut>(mut self, name: impl Into<String>, f: F) -> Self
    where
        In: serde::de::DeserializeOwned + Send + 'static,
        Out: serde::Serialize + Send + 'static,
        F: Fn(In) -> Fut + Send + Sync + 'static,
        Fut: std::future::Future<Output = Result<Out, String>> + Send + 'static,
    {
        let f_shared = Arc::new(f);
        let wrapper = move |input_s: String| {
            let f_inner = f_shared.clone();
            async move {
                let input: In = crate::codec::decode(&input_s)?;
                let out: Out = (f_inner)(input).await?;
                crate::codec::encode(&out)
            }
        };
        self.map.insert(name.into(), Arc::new(FnActivity(wrapper)));
        self
    }

    pub fn build(self) -> ActivityRegistry {
        ActivityRegistry {
            inner: Arc::new(self.map),
        }
    }
}
