//! The extension root object and call dispatcher.
//!
//! One `Extension` lives per host process. Every host call lands in
//! [`Extension::call`] as `<mode>:<payload>` and routes on the mode byte:
//!
//! | mode | action |
//! |---|---|
//! | `0` | synchronous protocol call, inline or ticketed result |
//! | `1` | fire-and-forget protocol call |
//! | `2` | asynchronous protocol call with ticket |
//! | `5` | poll a ticket |
//! | `9` | admin: VERSION / LOCK / DATABASE / ADD |
//!
//! The host thread never blocks on I/O except on the synchronous path,
//! which runs the handler inline by design.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, error, info};

use crate::config::{self, Settings};
use crate::db::{DbPool, DbSettings};
use crate::error::{ExtError, Result};
use crate::ids::IdAllocator;
use crate::logging::{self, WorkerGuard};
use crate::protocols::{Context, ProtocolRegistry};
use crate::results::{ResultStore, CHUNK_RESERVE};
use crate::wire;
use crate::workers::WorkerPool;

/// Wire-visible version, answered by `9:VERSION`.
pub const WIRE_VERSION: &str = "16";

/// Error marker stored for a deferred call whose handler failed.
const ASYNC_FAILURE: &str = "Error";

pub struct Extension {
    ctx: Arc<Context>,
    registry: Arc<ProtocolRegistry>,
    ids: Arc<IdAllocator>,
    results: Arc<ResultStore>,
    workers: Mutex<Option<WorkerPool>>,
    worker_threads: usize,
    locked: AtomicBool,
    stopped: AtomicBool,
}

impl Extension {
    /// Full startup as the embedding shim runs it: discover the config in
    /// the working directory, install the logger, apply the config-file
    /// randomization, start the workers.
    ///
    /// A missing config file is fatal; the caller exits the process.
    pub fn start() -> Result<(Self, WorkerGuard)> {
        let cwd = Path::new(".");
        let discovered = Settings::discover(cwd);
        let level = discovered
            .as_ref()
            .map(|d| d.settings.log_level.clone())
            .unwrap_or_default();
        let guard = logging::init(cwd, &level)?;
        info!(version = WIRE_VERSION, "extension starting");

        let found = match discovered {
            Ok(found) => found,
            Err(e) => {
                error!("unable to find {}", config::CONFIG_FILE);
                return Err(e);
            }
        };
        info!(path = %found.path.display(), "configuration loaded");

        if found.settings.randomize_config && !found.randomized {
            // only randomized once, discovery picks the renamed file up on
            // the next start
            let renamed = config::randomize_config_file(&found.path)?;
            info!(path = %renamed.display(), "configuration file randomized");
        }

        Ok((Self::with_settings(found.settings), guard))
    }

    /// Wire up an extension from already-loaded settings. Used by tests and
    /// embedders that manage logging themselves.
    pub fn with_settings(settings: Settings) -> Self {
        let worker_threads = settings.worker_threads();
        let ids = Arc::new(IdAllocator::new());
        Self {
            ctx: Arc::new(Context::new(settings)),
            registry: Arc::new(ProtocolRegistry::new()),
            results: Arc::new(ResultStore::new(ids.clone())),
            ids,
            workers: Mutex::new(Some(WorkerPool::new(worker_threads))),
            worker_threads,
            locked: AtomicBool::new(false),
            stopped: AtomicBool::new(false),
        }
    }

    /// Handle one host call. `out_cap` is the host's output buffer
    /// capacity; paged results are sliced to fit it.
    pub fn call(&self, input: &str, out_cap: usize) -> String {
        debug!(input, "host call");
        if input.len() <= 2 {
            return ExtError::MessageTooShort.to_wire();
        }
        let result = match input.as_bytes()[0] {
            b'0' => self.sync_call(input, out_cap),
            b'1' => self.oneway_call(input),
            b'2' => self.ticketed_call(input),
            b'5' => self.poll(input, out_cap),
            b'9' => return self.admin(input),
            _ => Err(ExtError::InvalidMessage),
        };
        result.unwrap_or_else(|e| {
            debug!(input, error = %e, "call failed");
            e.to_wire()
        })
    }

    /// Mode 0: run the handler inline. A result that fits the buffer goes
    /// back directly as `[1, …]`; anything larger is parked and answered
    /// with a ticket.
    fn sync_call(&self, input: &str, out_cap: usize) -> Result<String> {
        let (protocol, data) = wire::split_call(input).ok_or(ExtError::InvalidFormat)?;
        let handler = self.registry.get(protocol).ok_or(ExtError::UnknownProtocol)?;

        let result = catch_unwind(AssertUnwindSafe(|| handler.call(&self.ctx, data)))
            .map_err(|_| {
                error!(protocol, "handler panicked");
                ExtError::InvalidMessage
            })?
            .map_err(|e| {
                error!(protocol, error = %e, "handler failed");
                ExtError::InvalidMessage
            })?;

        if result.len() <= out_cap.saturating_sub(CHUNK_RESERVE) {
            Ok(wire::inline(&result))
        } else {
            let id = self.ids.allocate();
            // stored without a pending marker: a racing poll sees "nothing
            // to fetch" rather than [3]
            self.results.complete(id, &result);
            Ok(wire::ticket(id))
        }
    }

    /// Mode 1: enqueue and answer `[1]` immediately. Whether the protocol
    /// exists is the worker's problem; a missing name is tolerated there.
    fn oneway_call(&self, input: &str) -> Result<String> {
        let (protocol, data) = wire::split_call(input).ok_or(ExtError::InvalidFormat)?;
        let registry = self.registry.clone();
        let ctx = self.ctx.clone();
        let protocol = protocol.to_string();
        let data = data.to_string();
        self.enqueue(Box::new(move || {
            if let Some(handler) = registry.get(&protocol) {
                if let Err(e) = handler.call(&ctx, &data) {
                    error!(protocol = %protocol, error = %e, "one-way call failed");
                }
            }
        }));
        Ok(wire::OK.to_string())
    }

    /// Mode 2: allocate a ticket, mark it pending *before* the task can
    /// run, enqueue, and answer `[2,"<id>"]`. Unknown protocol frees the
    /// tentative id.
    fn ticketed_call(&self, input: &str) -> Result<String> {
        let (protocol, data) = wire::split_call(input).ok_or(ExtError::InvalidFormat)?;
        let id = self.ids.allocate();
        let Some(handler) = self.registry.get(protocol) else {
            self.ids.free(id);
            return Err(ExtError::UnknownProtocol);
        };
        self.results.begin(id);

        let ctx = self.ctx.clone();
        let results = self.results.clone();
        let name = protocol.to_string();
        let data = data.to_string();
        self.enqueue(Box::new(move || {
            match catch_unwind(AssertUnwindSafe(|| handler.call(&ctx, &data))) {
                Ok(Ok(result)) => results.complete(id, &result),
                Ok(Err(e)) => {
                    error!(protocol = %name, error = %e, "deferred call failed");
                    results.fail(id, ASYNC_FAILURE);
                }
                Err(_) => {
                    error!(protocol = %name, "deferred call panicked");
                    results.fail(id, ASYNC_FAILURE);
                }
            }
        }));
        Ok(wire::ticket(id))
    }

    /// Mode 5: non-blocking poll of a ticket.
    fn poll(&self, input: &str, out_cap: usize) -> Result<String> {
        let id: u32 = input
            .get(2..)
            .and_then(|s| s.parse().ok())
            .ok_or(ExtError::InvalidMessage)?;
        Ok(self.results.fetch(id, out_cap))
    }

    /// Mode 9, keyed by token count. Once locked, every admin call is a
    /// silent no-op.
    fn admin(&self, input: &str) -> String {
        if self.locked.load(Ordering::Relaxed) {
            return String::new();
        }
        let tokens: Vec<&str> = input.split(':').collect();
        match tokens.len() {
            2 => match tokens[1] {
                "VERSION" => WIRE_VERSION.to_string(),
                "LOCK" => {
                    self.locked.store(true, Ordering::Relaxed);
                    info!("admin channel locked");
                    String::new()
                }
                _ => String::new(),
            },
            3 => self
                .connect_database(tokens[2])
                .map(|_| wire::OK.to_string())
                .unwrap_or_else(|e| e.to_wire()),
            4 => self.add_protocol(tokens[2], tokens[3], ""),
            5 => self.add_protocol(tokens[2], tokens[3], tokens[4]),
            _ => ExtError::InvalidFormat.to_wire(),
        }
    }

    fn add_protocol(&self, kind: &str, name: &str, init_data: &str) -> String {
        match self.registry.add(&self.ctx, kind, name, init_data) {
            Ok(()) => {
                info!(kind, name, "protocol registered");
                wire::OK.to_string()
            }
            Err(e) => e.to_wire(),
        }
    }

    /// `9:DATABASE:<section>`: resolve the section, bring up the pool, hand
    /// it to the handler context. Replaces any previously connected pool.
    fn connect_database(&self, section: &str) -> Result<()> {
        let cfg = DbSettings::from_config(self.ctx.settings(), section, self.worker_threads)?;
        info!(kind = %cfg.kind, section, "database type selected");
        let pool = DbPool::connect(&cfg)?;
        self.ctx.set_db(pool);
        Ok(())
    }

    /// Stop accepting work, drain and join the workers, clear the registry
    /// and the database pool. Terminal and idempotent.
    pub fn stop(&self) {
        if self.stopped.swap(true, Ordering::SeqCst) {
            return;
        }
        info!("stopping, please wait");
        if let Some(mut pool) = self.workers.lock().take() {
            pool.shutdown();
        }
        self.registry.clear();
        self.ctx.clear_db();
        info!("stopped");
    }

    fn enqueue(&self, task: crate::workers::Task) {
        if let Some(pool) = self.workers.lock().as_ref() {
            pool.execute(task);
        }
    }
}

impl Drop for Extension {
    fn drop(&mut self) {
        self.stop();
    }
}
