//! Container management module for the Dockside orchestrator
//!
//! Handles all interactions with session containers including:
//! - Launching and stopping one container per session
//! - Executing commands inside containers
//! - Committing and publishing containers as images

pub mod error;
mod executor;
mod manager;
mod publish;
pub mod session;

pub use error::{
    CommitError, ExecError, ExecTimeoutError, LaunchError, PublishError, PushError, SessionError,
    ShutdownError,
};
pub use executor::CommandExecutor;
pub use manager::SessionManager;
pub use publish::{CommitPipeline, Publication};
pub use session::{Session, SessionHandle, SessionState};
