use anyhow::Result;
use async_trait::async_trait;

/// Loads a script into the host process for foreground mode.
///
/// This is the seam the task runner plugs its module system into. The
/// loaded code drives its own lifecycle; the supervisor only records the
/// resulting handle and never fires the completion signal on its behalf.
#[async_trait]
pub trait ModuleLoader: Send + Sync {
    async fn load(&self, script: &str) -> Result<()>;
}
