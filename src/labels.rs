//! Status and prediction text regions
//!
//! Stand-ins for the page's status line and prediction readout. Cloning a
//! `Labels` shares the same underlying text.

use std::sync::Arc;

use parking_lot::RwLock;

/// Initial status text
pub const STATUS_IDLE: &str = "Idle";
/// Initial prediction text
pub const PREDICTION_EMPTY: &str = "-";

#[derive(Debug)]
struct LabelState {
    status: String,
    prediction: String,
    status_history: Vec<String>,
}

/// Shared handle to the status and prediction labels
#[derive(Clone, Debug)]
pub struct Labels {
    inner: Arc<RwLock<LabelState>>,
}

impl Labels {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(RwLock::new(LabelState {
                status: STATUS_IDLE.to_string(),
                prediction: PREDICTION_EMPTY.to_string(),
                status_history: Vec::new(),
            })),
        }
    }

    /// Replace the status text
    pub fn set_status(&self, status: impl Into<String>) {
        let status = status.into();
        tracing::info!(status = %status, "Status");
        let mut state = self.inner.write();
        state.status_history.push(status.clone());
        state.status = status;
    }

    /// Replace the prediction text. Unchanged values are not re-logged.
    pub fn set_prediction(&self, prediction: impl Into<String>) {
        let prediction = prediction.into();
        let mut state = self.inner.write();
        if state.prediction != prediction {
            tracing::debug!(prediction = %prediction, "Prediction changed");
            state.prediction = prediction;
        }
    }

    pub fn status(&self) -> String {
        self.inner.read().status.clone()
    }

    pub fn prediction(&self) -> String {
        self.inner.read().prediction.clone()
    }

    /// Every status set so far, oldest first
    pub fn status_history(&self) -> Vec<String> {
        self.inner.read().status_history.clone()
    }
}

impl Default for Labels {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_initial_text() {
        let labels = Labels::new();
        assert_eq!(labels.status(), "Idle");
        assert_eq!(labels.prediction(), "-");
        assert!(labels.status_history().is_empty());
    }

    #[test]
    fn test_clones_share_text() {
        let labels = Labels::new();
        let other = labels.clone();
        other.set_status("Loading model...");
        other.set_prediction("class_3");
        assert_eq!(labels.status(), "Loading model...");
        assert_eq!(labels.prediction(), "class_3");
        assert_eq!(labels.status_history(), vec!["Loading model...".to_string()]);
    }
}
