//! # perf-monitor - pluggable perf event monitor runtime
//!
//! Runs one named monitor against a set of CPUs or threads. The runtime
//! owns the perf event sources, their ring buffers and the timing; monitors
//! only declare events and react to what arrives.
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌──────────────┐  select   ┌──────────────────────────────────────────┐
//! │   Registry   │──────────▶│                 Engine                   │
//! │ (by name)    │           │  Session: construct → bind → init → open │
//! └──────────────┘           │           → filter → mmap → enable       │
//!                            │  Loop:    poll → drain → read → interval │
//!                            │  Reinit:  teardown + rebuild on request  │
//!                            └───────┬───────────────────────┬──────────┘
//!                                    │ records / counters    │ perf_event_open,
//!                                    ▼                       ▼ mmap, poll
//!                            ┌──────────────┐        ┌──────────────┐
//!                            │   Monitor    │        │    Host /    │
//!                            │  callbacks   │        │ EventDriver  │
//!                            └──────────────┘        └──────────────┘
//! ```
//!
//! ## Module Structure
//!
//! - [`monitor`]: the plugin contract, callback context, default printers
//!   and the registry
//! - [`engine`]: staged lifecycle, dispatch loop, record dispatcher, counter
//!   aggregator and the reinitialization loop
//! - [`events`]: event declarations, the event-list aggregate, the
//!   `perf_event_open(2)` driver and ring buffers
//! - [`record`]: ring-buffer record decoding
//! - [`targets`]: CPU/thread binding and instance addressing
//! - [`host`]: online CPUs, thread lookup and driver construction
//! - [`monitors`]: built-in monitors
//! - [`cli`], [`config`]: command line and the read-only configuration
//! - [`signals`], [`preflight`]: process plumbing for the binary
//! - [`domain`]: core domain types and errors

pub mod cli;
pub mod config;
pub mod domain;
pub mod engine;
pub mod events;
pub mod host;
pub mod monitor;
pub mod monitors;
pub mod preflight;
pub mod record;
pub mod signals;
pub mod targets;
