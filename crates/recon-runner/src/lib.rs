pub mod action;
pub mod cancel;
pub mod config;
pub mod doctor;
pub mod probe;
pub mod reconciler;
pub mod runner;
pub mod task;

pub use action::*;
pub use cancel::*;
pub use config::*;
pub use doctor::*;
pub use probe::*;
pub use reconciler::*;
pub use runner::*;
pub use task::*;
