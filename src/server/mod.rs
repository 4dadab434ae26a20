// Territory Server Implementations
// HTTP front end, worker bootstrap and the multi-process supervisor

//! # Territory Server Module
//!
//! The server layer sits on top of the engine and turns it into running
//! processes.
//!
//! ```text
//! master process (supervisor)
//!    ├── worker 0 ── GraphQLServer ── /graphql /graphiql /health
//!    ├── worker 1 ── GraphQLServer ── ...
//!    └── worker N-1
//! ```
//!
//! - [`graphql`]: axum router, listener binding (shared port via
//!   `SO_REUSEPORT`), plain HTTP plus HTTPS in production
//! - [`worker`]: what a single worker process does from settings to serving
//! - [`supervisor`]: spawns one worker per core and restarts them under a
//!   bounded policy
//! - [`config`]: clap/environment settings shared by master and workers

pub mod config;
pub mod graphql;
pub mod supervisor;
pub mod worker;

pub use config::{DatabaseArgs, Environment, ServerSettings, SupervisorArgs};
pub use graphql::{BoundServer, GraphQLServer, GraphQLServerConfig, TlsConfig};
pub use supervisor::{
    ProcessLauncher, RestartDecision, RestartPolicy, RestartTracker, Supervisor, SupervisorStatus,
    WorkerEvent, WorkerHandle, WorkerLauncher,
};
pub use worker::{run_worker, shutdown_on_signal, READY_PREFIX, WORKER_SLOT_ENV};
