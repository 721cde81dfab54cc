mod fixtures;
pub use fixtures::*;

pub use webcam_classifier::camera::{CameraFrame, CameraSource, DisplaySurface, VideoStream};
pub use webcam_classifier::model::{Classifier, ModelHandle, ModelLoader, ModelRuntime};
pub use webcam_classifier::session::{PredictContext, SessionHooks, STATUS_LOADING, STATUS_RUNNING};
pub use webcam_classifier::{ClassifierError, ClassifierSettings, Session};
