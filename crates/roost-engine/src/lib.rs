//! The roost core: bot lifecycle + supervision engine and the real-time
//! log/status fan-out plane.
//!
//! The HTTP and WebSocket collaborators call into [`Engine`] and register
//! live subscribers on the [`EventBus`]; everything else in here is
//! internal machinery (workspace materialization, dependency inference,
//! package installation, RADAR risk analysis, process supervision and
//! resource sampling).

pub mod config;
pub mod deps;
pub mod engine;
pub mod error;
pub mod events;
pub mod installer;
pub mod radar;
pub mod supervisor;
pub mod workspace;

pub use config::EngineConfig;
pub use engine::Engine;
pub use error::{EngineError, OpResult};
pub use events::EventBus;
pub use radar::RadarConfig;
