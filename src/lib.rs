//! deskloop - observe-think-act core for a desktop automation agent
//!
//! A run takes a natural-language goal and loops: capture the screen, ask a
//! model for one JSON action, gate it by risk tier, dispatch it to a
//! first-party executor or a plugin process, and journal every step so an
//! interrupted run can be resumed or abandoned after a crash.

pub mod callbacks;
pub mod config;
pub mod domain;
pub mod error;
pub mod id;
pub mod journal;
pub mod llm;
pub mod observe;
pub mod orchestrator;
pub mod plugin;
pub mod retry;
pub mod runner;
pub mod safety;
pub mod tools;

pub use error::{DeskloopError, Result};
