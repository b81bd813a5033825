//! Helpers for the protocol session layer

pub mod events;
pub mod resolver;

pub use events::{LoggingEventListener, SessionEventListener};
pub use resolver::PathResolver;
