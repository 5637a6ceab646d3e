//! pharmq-core: queue scheduling policies and the phased simulation
//! engine behind the pharmacy queue benchmark.
//!
//! Leaves first:
//!   policy    : orders WAITING requests (FIFO, PRIORITY, MULTILEVEL, MULTILEVEL_FEEDBACK)
//!   generator : synthetic population of WAITING requests
//!   processor : advances a run from one percentage checkpoint to the next
//!   analyzer  : switch/keep recommendation at a checkpoint
//!   controller: the IDLE → … → COMPLETED state machine

pub mod analyzer;
pub mod config;
pub mod controller;
pub mod error;
pub mod event;
pub mod generator;
pub mod model;
pub mod policy;
pub mod processor;
pub mod rng;
pub mod store;
pub mod types;
