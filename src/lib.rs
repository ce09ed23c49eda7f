//! DEFT - Deferred Execution on Fixed Threads
//!
//! A minimal, hand-built asynchronous task primitive: [`Deferred`] is a
//! single-assignment future with continuation chaining, executed through a
//! fixed pool of worker threads draining one blocking FIFO queue. A small
//! set of combinators composes tasks: sequential continuation, fan-out
//! join, timed delay, and strictly sequential iteration.
//!
//! # Quick Start
//!
//! ```no_run
//! use deft::prelude::*;
//!
//! // Initialize the global runtime
//! deft::init().unwrap();
//!
//! // Run work on the pool and chain a continuation
//! let answer = deft::spawn_value(|| Ok(21)).continue_with(|n| Ok(n * 2));
//! assert_eq!(answer.wait().unwrap(), 42);
//!
//! deft::shutdown();
//! ```
//!
//! # Features
//!
//! - **Fixed worker pool**: one thread per CPU by default, created once,
//!   never resized
//! - **Single-assignment tasks**: exactly one pending-to-terminal
//!   transition; completing twice is a loud protocol violation
//! - **Continuation chaining**: continuations always dispatch through the
//!   pool, never inline on the registering or completing thread
//! - **Combinators**: `join_all`, `delay` (timer-backed, no worker held),
//!   `iterate` (strictly sequential)
//! - **Ambient context**: caller-scoped values captured at submission and
//!   reinstalled on the worker
//! - **Await support**: tasks implement `Future` for use with any executor

#![warn(missing_debug_implementations)]

pub mod config;
pub mod context;
pub mod error;
pub mod pool;
pub mod prelude;
pub mod runtime;
pub mod task;
pub mod telemetry;

mod timer;

// Re-export key types at crate root
pub use config::{Config, ConfigBuilder, ThreadPriority};
pub use context::AmbientContext;
pub use error::{Error, Result, TaskError};
pub use runtime::{delay, init, init_with_config, iterate, join_all, shutdown, spawn, spawn_value, Runtime};
pub use task::{Deferred, ValueTask};
