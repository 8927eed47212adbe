//! Run tracking flow
//!
//! Stage table, per-stage sub-flows (manual entry, edit pass), prompt
//! builders and the engine that ties them to the session store and the
//! dispatch bus.

pub mod action;
pub mod edit;
pub mod engine;
pub mod manual;
pub mod prompts;
pub mod share;
pub mod stage;

pub use action::{ActionKind, UserAction};
pub use engine::{Collaborators, FlowEngine, FlowOptions};
pub use stage::{available_actions, transition, Stage, StateTransition};
