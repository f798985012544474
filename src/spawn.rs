use std::future::IntoFuture;

use futures::task::Spawn;

/// The worker pool: hands runnable operations to a tokio runtime.
#[derive(Clone, Debug)]
pub struct TokioSpawn {
    tokio: tokio::runtime::Handle,
}

impl TokioSpawn {
    /// Spawn onto the runtime this is called from.
    ///
    /// # Panics
    ///
    /// Panics when called outside of a tokio runtime.
    pub fn new() -> Self {
        Self {
            tokio: tokio::runtime::Handle::current(),
        }
    }

    pub fn from_handle(handle: tokio::runtime::Handle) -> Self {
        Self { tokio: handle }
    }
}

impl Default for TokioSpawn {
    fn default() -> Self {
        Self::new()
    }
}

impl Spawn for TokioSpawn {
    fn spawn_obj(
        &self,
        future: futures::task::FutureObj<'static, ()>,
    ) -> Result<(), futures::task::SpawnError> {
        drop(self.tokio.spawn(future.into_future()));
        Ok(())
    }
}
