use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;
use tracing::{info, warn};

// ---------------------------------------------------------------------------
// Lifecycle trait
// ---------------------------------------------------------------------------

/// Minimal start/stop lifecycle for long-lived components.
#[async_trait]
pub trait Lifecycle: Send + Sync {
    /// Unique component name, used in logs.
    fn name(&self) -> &'static str;

    /// Brings the component into service.
    async fn start(&self) -> anyhow::Result<()>;

    /// Takes the component out of service and releases its resources.
    async fn stop(&self) -> anyhow::Result<()>;
}

// ---------------------------------------------------------------------------
// LifecycleRegistry
// ---------------------------------------------------------------------------

/// Starts components in registration order and stops them in reverse.
#[derive(Default)]
pub struct LifecycleRegistry {
    components: RwLock<Vec<Arc<dyn Lifecycle>>>,
}

impl LifecycleRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, component: Arc<dyn Lifecycle>) {
        self.components.write().push(component);
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.components.read().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.components.read().is_empty()
    }

    /// Starts every component in registration order.
    ///
    /// # Errors
    ///
    /// Returns the first `start()` failure; components after it are not started.
    pub async fn start_all(&self) -> anyhow::Result<()> {
        let components = self.components.read().clone();
        for component in &components {
            component.start().await?;
            info!(component = component.name(), "component started");
        }
        Ok(())
    }

    /// Stops every component in reverse registration order.
    ///
    /// A failing `stop()` is logged and does not prevent the remaining
    /// components from stopping.
    ///
    /// # Errors
    ///
    /// Returns the first failure encountered, after all components were asked to stop.
    pub async fn stop_all(&self) -> anyhow::Result<()> {
        let components = self.components.read().clone();
        let mut first_error = None;
        for component in components.iter().rev() {
            match component.stop().await {
                Ok(()) => info!(component = component.name(), "component stopped"),
                Err(err) => {
                    warn!(component = component.name(), error = %err, "component failed to stop");
                    first_error.get_or_insert(err);
                }
            }
        }
        first_error.map_or(Ok(()), Err)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
