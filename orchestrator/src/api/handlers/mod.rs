//! API request handlers

pub mod containers;
pub mod events;
pub mod execute;
pub mod health;
pub mod publish;
pub mod session;
pub mod terminal;
