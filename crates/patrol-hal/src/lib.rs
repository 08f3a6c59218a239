//! `patrol-hal` – Robot boundary
//!
//! Everything the orchestration core needs from the outside world, expressed
//! as traits so vendor bindings and simulators are interchangeable.
//!
//! # Modules
//!
//! - [`motion_sdk`] – [`MotionSdk`][motion_sdk::MotionSdk]: the four motion
//!   operations (send, poll, cancel, telemetry) the core may invoke.
//! - [`sensor`] – [`ObstacleSource`][sensor::ObstacleSource]: pull interface
//!   to classified obstacle readings.
//! - [`sim`] – in-process simulators of both, with control handles for
//!   tests and the CLI.

pub mod motion_sdk;
pub mod sensor;
pub mod sim;

pub use motion_sdk::MotionSdk;
pub use sensor::ObstacleSource;
pub use sim::{SimControl, SimMotionSdk, SimObstacle, SimObstacleSource, SimSceneControl};
