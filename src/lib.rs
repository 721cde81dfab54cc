//! Webcam Classifier - continuous image classification from a camera feed
//!
//! Loads a model described by a TF.js-style `model.json` manifest, opens a
//! camera and labels every frame with the highest-scoring class.

pub mod camera;
pub mod error;
pub mod labels;
pub mod manifest;
pub mod model;
pub mod predict;
pub mod session;
pub mod settings;
pub mod telemetry;

pub use error::{ClassifierError, Result};
pub use labels::Labels;
pub use session::{Session, SessionHooks};
pub use settings::ClassifierSettings;
