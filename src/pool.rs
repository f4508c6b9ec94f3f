//! A bounded pool of named engine factories.
//!
//! Checkout blocks until a capacity permit is free, then builds a fully initialized session
//! (handshake and readiness already complete) from the named factory. The permit is not
//! released when the caller drops its handle to the session -- it is released when the session
//! itself is disposed, which is the only point at which the engine process is actually gone and
//! the slot can be reused.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tracing::trace;

use crate::cancel::CancelToken;
use crate::error::{Error, Result};
use crate::transport::{ProcessSpec, ProcessTransport};
use crate::uci::UciSession;

/// Builds a ready [`UciSession`] on demand. Implementations decide what "ready" means for their
/// engine: at minimum, ready enough that `position`/`go` can follow immediately.
#[async_trait]
pub trait EngineFactory: Send + Sync {
    async fn spawn(&self) -> Result<Arc<UciSession>>;
}

/// The common case: a factory that spawns a process and drives it through handshake and
/// readiness before handing the session to the pool's caller.
pub struct ProcessEngineFactory {
    pub spec: ProcessSpec,
}

#[async_trait]
impl EngineFactory for ProcessEngineFactory {
    async fn spawn(&self) -> Result<Arc<UciSession>> {
        let transport = ProcessTransport::start(self.spec.clone()).await?;
        let session = UciSession::new(Arc::new(transport));
        session.start()?;
        session.handshake(CancelToken::never()).await?;
        session.wait_ready(CancelToken::never()).await?;
        Ok(session)
    }
}

/// A registry of named engine factories bounded by a total concurrent-checkout capacity.
pub struct Pool {
    semaphore: Arc<Semaphore>,
    factories: HashMap<String, Arc<dyn EngineFactory>>,
}

impl Pool {
    pub fn new(capacity: usize) -> Self {
        Self {
            semaphore: Arc::new(Semaphore::new(capacity)),
            factories: HashMap::new(),
        }
    }

    pub fn register(&mut self, name: impl Into<String>, factory: Arc<dyn EngineFactory>) {
        self.factories.insert(name.into(), factory);
    }

    fn factory(&self, name: &str) -> Result<Arc<dyn EngineFactory>> {
        self.factories
            .get(name)
            .cloned()
            .ok_or_else(|| Error::NoSuchEngine(name.to_owned()))
    }

    /// Blocks until a capacity permit is free (or `cancel` fires), then spawns and returns an
    /// initialized session.
    #[tracing::instrument(skip(self, cancel), fields(name = %name))]
    pub async fn checkout(&self, name: &str, cancel: CancelToken) -> Result<Arc<UciSession>> {
        let factory = self.factory(name)?;

        let permit = tokio::select! {
            _ = cancel.cancelled() => return Err(Error::Cancelled),
            permit = Arc::clone(&self.semaphore).acquire_owned() => {
                permit.map_err(|_| Error::Terminated)?
            }
        };

        self.finish_checkout(factory, permit).await
    }

    /// Like [`Pool::checkout`], but returns `Ok(None)` immediately instead of waiting when no
    /// capacity is currently free.
    pub async fn try_checkout(&self, name: &str) -> Result<Option<Arc<UciSession>>> {
        let factory = self.factory(name)?;

        let permit = match Arc::clone(&self.semaphore).try_acquire_owned() {
            Ok(permit) => permit,
            Err(_) => return Ok(None),
        };

        self.finish_checkout(factory, permit).await.map(Some)
    }

    async fn finish_checkout(
        &self,
        factory: Arc<dyn EngineFactory>,
        permit: OwnedSemaphorePermit,
    ) -> Result<Arc<UciSession>> {
        let session = match factory.spawn().await {
            Ok(session) => session,
            Err(err) => {
                drop(permit);
                return Err(err);
            }
        };

        let notify = session.disposed_signal();
        tokio::spawn(async move {
            notify.notified().await;
            trace!("pool slot released");
            drop(permit);
        });

        Ok(session)
    }

    pub fn available_permits(&self) -> usize {
        self.semaphore.available_permits()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::EngineTransport;
    use std::sync::Mutex;

    struct FakeTransport {
        outbound: Mutex<Vec<String>>,
        inbound: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl EngineTransport for FakeTransport {
        async fn write_line(&self, line: &str) -> Result<()> {
            self.outbound.lock().unwrap().push(line.to_owned());
            Ok(())
        }

        async fn read_line(&self) -> Result<Option<String>> {
            Ok(self.inbound.lock().unwrap().pop())
        }

        async fn dispose(&self) -> Result<()> {
            Ok(())
        }
    }

    struct FakeFactory;

    #[async_trait]
    impl EngineFactory for FakeFactory {
        async fn spawn(&self) -> Result<Arc<UciSession>> {
            let transport = Arc::new(FakeTransport {
                outbound: Mutex::new(Vec::new()),
                inbound: Mutex::new(vec!["readyok".into(), "uciok".into()]),
            });
            let session = UciSession::new(transport);
            session.start()?;
            session.handshake(CancelToken::never()).await?;
            session.wait_ready(CancelToken::never()).await?;
            Ok(session)
        }
    }

    #[tokio::test]
    async fn checkout_rejects_unknown_name() {
        let pool = Pool::new(1);
        let err = pool.checkout("ghost", CancelToken::never()).await.unwrap_err();
        assert!(matches!(err, Error::NoSuchEngine(_)));
    }

    #[tokio::test]
    async fn checkout_releases_permit_on_dispose() {
        let mut pool = Pool::new(1);
        pool.register("fake", Arc::new(FakeFactory));

        let session = pool.checkout("fake", CancelToken::never()).await.unwrap();
        assert_eq!(pool.available_permits(), 0);
        assert!(pool.try_checkout("fake").await.unwrap().is_none());

        session.dispose().await.unwrap();
        // The release task runs on its own schedule; give it a turn.
        tokio::task::yield_now().await;
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        assert_eq!(pool.available_permits(), 1);
    }
}
