//! Session lifecycle: owns the pipeline from connect to teardown.
//!
//! `ConsoleSession::connect` builds the HTTP client, loads the initial
//! snapshot (the one point where channel identity is established), and
//! spawns the streaming consumer. The session is the explicit owner of the
//! shared state — nothing here is ambient or global — and closing it
//! releases the stream subscription on every exit path: `close()` is
//! idempotent, and `Drop` covers abnormal teardown. Command submitters
//! spawned from a session share its closed flag, so a command completing
//! after teardown has its result discarded instead of mutating a dead store.

use crate::command::Commander;
use crate::config::Settings;
use crate::error::Result;
use crate::snapshot::load_snapshot;
use crate::state::DeviceStateStore;
use crate::stream::StreamConsumer;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::debug;

pub struct ConsoleSession {
    store: DeviceStateStore,
    commander: Commander,
    shutdown: watch::Sender<bool>,
    consumer: Option<JoinHandle<()>>,
}

impl ConsoleSession {
    /// Connect to the control server: fetch the snapshot, then subscribe to
    /// the delta stream. Fails (without spawning anything) if the snapshot
    /// cannot be loaded.
    pub async fn connect(settings: Settings) -> Result<Self> {
        let http = reqwest::Client::builder()
            .connect_timeout(settings.connect_timeout())
            .build()?;

        let store = DeviceStateStore::new();
        load_snapshot(&http, &settings, &store).await?;

        let (shutdown, shutdown_rx) = watch::channel(false);
        let consumer = StreamConsumer::new(
            http.clone(),
            &settings,
            store.clone(),
            shutdown_rx.clone(),
        );
        let handle = tokio::spawn(consumer.run());

        let commander = Commander::new(http, settings, store.clone(), shutdown_rx);

        Ok(Self {
            store,
            commander,
            shutdown,
            consumer: Some(handle),
        })
    }

    /// The session's device state store.
    pub fn store(&self) -> &DeviceStateStore {
        &self.store
    }

    /// A command submitter bound to this session's store and teardown flag.
    pub fn commander(&self) -> Commander {
        self.commander.clone()
    }

    /// Signal shutdown and wait for the stream consumer to release its
    /// connection. Safe to call more than once.
    pub async fn close(&mut self) {
        let _ = self.shutdown.send(true);
        if let Some(handle) = self.consumer.take() {
            debug!("closing session, awaiting stream consumer");
            let _ = handle.await;
        }
    }
}

impl Drop for ConsoleSession {
    fn drop(&mut self) {
        // abnormal teardown: still signal and release the subscription
        let _ = self.shutdown.send(true);
        if let Some(handle) = self.consumer.take() {
            handle.abort();
        }
    }
}
