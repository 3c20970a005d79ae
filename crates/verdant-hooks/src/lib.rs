//! `verdant-hooks`: fire-and-forget notifications to external collaborators
//! (camera, summary delivery) around watering and periodic jobs.
//!
//! Hooks never influence a watering decision: [`HookEngine::emit`] swallows
//! every handler error after logging it.

pub mod engine;
pub mod error;
pub mod types;

pub use engine::HookEngine;
pub use error::{HookError, Result};
pub use types::{HookContext, HookDefinition, HookEvent, HookHandler, HookReport};
