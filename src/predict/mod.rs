//! Per-frame prediction loop
//!
//! Each tick turns the surface's current frame into an NHWC batch, runs the
//! model and writes `class_<index>` of the best score to the prediction
//! label. The loop runs until its stop signal fires.

pub mod tensor;

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::MissedTickBehavior;

use crate::camera::DisplaySurface;
use crate::error::{ClassifierError, Result};
use crate::labels::Labels;
use crate::model::{Classifier, ModelHandle};

pub use tensor::{argmax, class_label, Tensor, TensorScope};

/// Run a single prediction tick.
///
/// Returns the predicted class, or `None` when the surface has no frame yet.
/// Tensors created here are released before returning, on success or error.
pub fn predict_tick(
    surface: &DisplaySurface,
    model: &dyn Classifier,
    labels: &Labels,
    scope: &TensorScope,
) -> Result<Option<usize>> {
    let Some(frame) = surface.current_frame() else {
        return Ok(None);
    };

    let (width, height) = model.input_size();
    let pixels = tensor::frame_to_tensor(scope, &frame)?;
    let resized = tensor::resize_bilinear(scope, &pixels, width, height)?;
    let float = tensor::to_float(scope, &resized);
    let batched = tensor::expand_batch(scope, &float);

    let scores = tensor::scores_tensor(scope, model.predict(batched.view())?);
    let class = argmax(scores.as_slice().unwrap_or_default())
        .ok_or_else(|| ClassifierError::Runtime("Model returned no scores".to_string()))?;

    labels.set_prediction(class_label(class));
    Ok(Some(class))
}

/// Run prediction ticks every `interval` until `stop` is set or dropped.
///
/// Late ticks are not skipped: if inference falls behind, missed ticks run
/// back to back.
pub async fn predict_loop(
    surface: Arc<DisplaySurface>,
    model: ModelHandle,
    labels: Labels,
    interval: Duration,
    mut stop: watch::Receiver<bool>,
) {
    let scope = TensorScope::new();
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Burst);

    tracing::info!(interval_ms = interval.as_millis() as u64, "Predict loop started");

    let mut ticks: u64 = 0;
    while !*stop.borrow() {
        tokio::select! {
            _ = ticker.tick() => {}
            changed = stop.changed() => {
                if changed.is_err() {
                    break;
                }
                continue;
            }
        }

        let (surface, model, labels, tick_scope) =
            (surface.clone(), model.clone(), labels.clone(), scope.clone());
        let outcome = tokio::task::spawn_blocking(move || {
            predict_tick(&surface, model.as_ref(), &labels, &tick_scope)
        })
        .await;

        match outcome {
            Ok(Ok(_)) => {}
            Ok(Err(e)) => tracing::warn!("Prediction tick failed: {}", e),
            Err(e) => tracing::error!("Prediction tick panicked: {}", e),
        }

        ticks += 1;
        tracing::trace!(ticks, live_tensors = scope.live_count(), "Tick done");
    }

    tracing::info!(ticks, allocated_tensors = scope.allocated_count(), "Predict loop stopped");
}
