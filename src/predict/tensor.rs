//! Tensors with tracked lifetimes and the frame preprocessing steps
//!
//! Every intermediate array of a prediction tick is created through a
//! [`TensorScope`]. Dropping a [`Tensor`] releases it from the scope's live
//! count, so a tick that returns early still leaves nothing behind.

use std::ops::Deref;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use image::imageops::{self, FilterType};
use image::RgbImage;
use ndarray::{s, Array, Array3, Array4, Axis, Dimension, Ix1, Ix3, Ix4};

use crate::camera::CameraFrame;
use crate::error::{ClassifierError, Result};

#[derive(Debug, Default)]
struct ScopeCounters {
    live: AtomicUsize,
    allocated: AtomicU64,
}

/// Tracks tensors created for prediction ticks
#[derive(Clone, Debug, Default)]
pub struct TensorScope {
    counters: Arc<ScopeCounters>,
}

impl TensorScope {
    pub fn new() -> Self {
        Self::default()
    }

    /// Take ownership of an array and track it until dropped
    pub fn track<A, D: Dimension>(&self, array: Array<A, D>) -> Tensor<A, D> {
        self.counters.live.fetch_add(1, Ordering::AcqRel);
        self.counters.allocated.fetch_add(1, Ordering::Relaxed);
        Tensor {
            array,
            counters: self.counters.clone(),
        }
    }

    /// Tensors currently alive
    pub fn live_count(&self) -> usize {
        self.counters.live.load(Ordering::Acquire)
    }

    /// Tensors created over the scope's lifetime
    pub fn allocated_count(&self) -> u64 {
        self.counters.allocated.load(Ordering::Relaxed)
    }
}

/// An array owned by a [`TensorScope`]
#[derive(Debug)]
pub struct Tensor<A, D: Dimension> {
    array: Array<A, D>,
    counters: Arc<ScopeCounters>,
}

impl<A, D: Dimension> Deref for Tensor<A, D> {
    type Target = Array<A, D>;

    fn deref(&self) -> &Self::Target {
        &self.array
    }
}

impl<A, D: Dimension> Drop for Tensor<A, D> {
    fn drop(&mut self) {
        self.counters.live.fetch_sub(1, Ordering::AcqRel);
    }
}

/// Capture a frame as an `[height, width, 3]` RGB tensor, dropping alpha
pub fn frame_to_tensor(scope: &TensorScope, frame: &CameraFrame) -> Result<Tensor<u8, Ix3>> {
    let (width, height) = (frame.width as usize, frame.height as usize);
    let expected = width * height * 4;
    if frame.data.len() < expected {
        return Err(ClassifierError::Tensor(format!(
            "frame {} has {} bytes, expected {} for {}x{} RGBA",
            frame.frame_number,
            frame.data.len(),
            expected,
            width,
            height
        )));
    }

    let rgba = ndarray::ArrayView3::from_shape((height, width, 4), &frame.data[..expected])
        .map_err(|e| ClassifierError::Tensor(e.to_string()))?;
    Ok(scope.track(rgba.slice(s![.., .., 0..3]).to_owned()))
}

/// Bilinear resize of an `[h, w, 3]` tensor to `[height, width, 3]`
pub fn resize_bilinear(
    scope: &TensorScope,
    pixels: &Tensor<u8, Ix3>,
    width: u32,
    height: u32,
) -> Result<Tensor<u8, Ix3>> {
    let (src_h, src_w, channels) = pixels.dim();
    if channels != 3 {
        return Err(ClassifierError::Tensor(format!(
            "expected 3 channels, got {}",
            channels
        )));
    }
    if (src_w as u32, src_h as u32) == (width, height) {
        return Ok(scope.track(pixels.array.clone()));
    }

    let raw: Vec<u8> = pixels.iter().copied().collect();
    let image = RgbImage::from_raw(src_w as u32, src_h as u32, raw)
        .ok_or_else(|| ClassifierError::Tensor("pixel buffer does not match its shape".to_string()))?;
    let resized = imageops::resize(&image, width, height, FilterType::Triangle);

    let array = Array3::from_shape_vec((height as usize, width as usize, 3), resized.into_raw())
        .map_err(|e| ClassifierError::Tensor(e.to_string()))?;
    Ok(scope.track(array))
}

/// Convert pixel values to `f32` without rescaling
pub fn to_float(scope: &TensorScope, pixels: &Tensor<u8, Ix3>) -> Tensor<f32, Ix3> {
    scope.track(pixels.mapv(f32::from))
}

/// Add a leading batch dimension of size 1
pub fn expand_batch(scope: &TensorScope, input: &Tensor<f32, Ix3>) -> Tensor<f32, Ix4> {
    let batched: Array4<f32> = input.array.clone().insert_axis(Axis(0));
    scope.track(batched)
}

/// Wrap a score vector returned by the runtime
pub fn scores_tensor(scope: &TensorScope, scores: Vec<f32>) -> Tensor<f32, Ix1> {
    scope.track(Array::from_vec(scores))
}

/// Index of the highest score; the first one wins on ties. NaN is ignored.
pub fn argmax(scores: &[f32]) -> Option<usize> {
    let mut best: Option<(usize, f32)> = None;
    for (idx, &score) in scores.iter().enumerate() {
        if score.is_nan() {
            continue;
        }
        match best {
            Some((_, best_score)) if score <= best_score => {}
            _ => best = Some((idx, score)),
        }
    }
    best.map(|(idx, _)| idx)
}

/// Human-readable label for a class index
pub fn class_label(index: usize) -> String {
    format!("class_{}", index)
}
