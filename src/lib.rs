//! field gateway: telemetry log, audio relay and language selection for
//! soil/light field devices and their control surface.

pub mod audio;
pub mod config;
pub mod dispatcher;
pub mod domain;
pub mod error;
pub mod relay;
pub mod selection;
pub mod server;
pub mod telemetry;
pub mod ws;

pub use dispatcher::GatewayDispatcher;
pub use error::{GatewayError, Result};
