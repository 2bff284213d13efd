//! Error types for the simulation core.

use thiserror::Error;

use crate::components::EntityId;

/// Result type alias using [`GameError`].
pub type Result<T> = std::result::Result<T, GameError>;

/// Errors surfaced by the public simulation API.
///
/// The tick pipeline itself never fails; these come from commands, config
/// loading, path queries and persistence.
#[derive(Debug, Error)]
pub enum GameError {
    /// Invalid entity reference.
    #[error("Entity not found: {0}")]
    EntityNotFound(EntityId),

    /// The entity exists but lacks a component the operation needs.
    #[error("Entity {entity} has no {component} component")]
    MissingComponent {
        /// Entity the operation targeted.
        entity: EntityId,
        /// Name of the missing component.
        component: &'static str,
    },

    /// A config document could not be parsed.
    #[error("Failed to parse config '{path}': {message}")]
    DataParseError {
        /// Where the document came from.
        path: String,
        /// Parser message.
        message: String,
    },

    /// Navigation query failed.
    #[error("Navigation failed: {0}")]
    Navigation(#[from] NavError),

    /// Rejected configuration or simulation state.
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// Snapshot encoding or decoding failed.
    #[error("Serialization failed: {0}")]
    Serialization(String),
}

/// Reasons a path request can fail.
///
/// Inside the tick pipeline these never propagate; the planner turns them into
/// "cannot path" and the actor stands still.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum NavError {
    /// No navigable surface within the sample radius of the start point.
    #[error("start position could not be placed on the navigable surface")]
    StartNotNavigable,
    /// No navigable surface within the sample radius of the end point.
    #[error("end position could not be placed on the navigable surface")]
    EndNotNavigable,
    /// Both endpoints are navigable but no route connects them.
    #[error("no route between start and end")]
    NoRoute,
}
