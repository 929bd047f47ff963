//! ONNX Runtime inference engine with session pooling.
//!
//! Model weights are loaded once at startup and shared read-only for the
//! process lifetime. A small pool of sessions allows concurrent requests to
//! run inference without contending on a single session lock.

use crate::core::errors::RecipeError;
use crate::core::{Tensor2D, Tensor3D, Tensor4D};
use ndarray::{ArrayView2, ArrayView3};
use ort::session::Session;
use ort::value::TensorRef;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

/// A pooled ONNX Runtime inference engine for one model.
pub struct OrtInfer {
    sessions: Vec<Mutex<Session>>,
    next_idx: AtomicUsize,
    input_name: String,
    output_name: String,
    model_path: PathBuf,
    model_name: String,
}

impl std::fmt::Debug for OrtInfer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OrtInfer")
            .field("sessions", &self.sessions.len())
            .field("input_name", &self.input_name)
            .field("output_name", &self.output_name)
            .field("model_path", &self.model_path)
            .field("model_name", &self.model_name)
            .finish()
    }
}

impl OrtInfer {
    /// Loads a model into a pool of sessions.
    ///
    /// The primary input and output tensor names are discovered from the
    /// session metadata. Any failure here is fatal to process startup.
    ///
    /// # Arguments
    ///
    /// * `model_path` - Path to the ONNX model file
    /// * `model_name` - Human-readable model name used in error context
    /// * `pool_size` - Number of sessions to create (clamped to at least 1)
    pub fn load(
        model_path: &Path,
        model_name: &str,
        pool_size: usize,
    ) -> Result<Self, RecipeError> {
        let pool_size = pool_size.max(1);
        let mut sessions = Vec::with_capacity(pool_size);
        for _ in 0..pool_size {
            let session = Session::builder()
                .and_then(|b| b.commit_from_file(model_path))
                .map_err(|e| {
                    RecipeError::model_load(
                        model_path,
                        "failed to create ONNX session",
                        Some(Box::new(e)),
                    )
                })?;
            sessions.push(Mutex::new(session));
        }

        let (input_name, output_name) = {
            let session = sessions[0].lock().map_err(|_| {
                RecipeError::model_load(model_path, "session lock poisoned during load", None)
            })?;
            let input = session.inputs.first().ok_or_else(|| {
                RecipeError::model_load(model_path, "model declares no inputs", None)
            })?;
            let output = session.outputs.first().ok_or_else(|| {
                RecipeError::model_load(model_path, "model declares no outputs", None)
            })?;
            (input.name.clone(), output.name.clone())
        };

        Ok(Self {
            sessions,
            next_idx: AtomicUsize::new(0),
            input_name,
            output_name,
            model_path: model_path.to_path_buf(),
            model_name: model_name.to_string(),
        })
    }

    /// Returns the model path associated with this inference engine.
    pub fn model_path(&self) -> &Path {
        &self.model_path
    }

    /// Returns the model name associated with this inference engine.
    pub fn model_name(&self) -> &str {
        &self.model_name
    }

    /// Runs a closure against one pooled session, selected round-robin.
    pub(crate) fn with_session<T>(
        &self,
        f: impl FnOnce(&mut Session) -> Result<T, RecipeError>,
    ) -> Result<T, RecipeError> {
        let idx = self.next_idx.fetch_add(1, Ordering::Relaxed) % self.sessions.len();
        let mut guard = self.sessions[idx].lock().map_err(|_| {
            RecipeError::inference_context(
                &self.model_name,
                format!("session lock {}/{} poisoned", idx, self.sessions.len()),
            )
        })?;
        f(&mut guard)
    }

    fn run_single_input(&self, x: &Tensor4D) -> Result<(Vec<i64>, Vec<f32>), RecipeError> {
        let input_shape = x.shape().to_vec();
        self.with_session(|session| {
            let input_tensor = TensorRef::from_array_view(x.view()).map_err(|e| {
                RecipeError::inference(
                    &self.model_name,
                    format!("failed to convert input tensor with shape {input_shape:?}"),
                    e,
                )
            })?;
            let outputs = session
                .run(ort::inputs![self.input_name.as_str() => input_tensor])
                .map_err(|e| {
                    RecipeError::inference(
                        &self.model_name,
                        format!(
                            "forward pass failed with input '{}' -> output '{}'",
                            self.input_name, self.output_name
                        ),
                        e,
                    )
                })?;
            let (shape, data) = outputs[self.output_name.as_str()]
                .try_extract_tensor::<f32>()
                .map_err(|e| {
                    RecipeError::inference(
                        &self.model_name,
                        format!("failed to extract output '{}' as f32", self.output_name),
                        e,
                    )
                })?;
            Ok((shape.to_vec(), data.to_vec()))
        })
    }

    /// Runs inference and returns a 2D tensor (batch_size, num_classes).
    pub fn infer_2d(&self, x: &Tensor4D) -> Result<Tensor2D, RecipeError> {
        let (shape, data) = self.run_single_input(x)?;
        if shape.len() != 2 {
            return Err(RecipeError::invalid_input(format!(
                "model '{}': expected 2D output tensor, got {}D with shape {:?}",
                self.model_name,
                shape.len(),
                shape
            )));
        }
        let view = ArrayView2::from_shape((shape[0] as usize, shape[1] as usize), &data)
            .map_err(RecipeError::Tensor)?;
        Ok(view.to_owned())
    }

    /// Runs inference and returns a 3D tensor (batch_size, sequence, features).
    pub fn infer_3d(&self, x: &Tensor4D) -> Result<Tensor3D, RecipeError> {
        let (shape, data) = self.run_single_input(x)?;
        if shape.len() != 3 {
            return Err(RecipeError::invalid_input(format!(
                "model '{}': expected 3D output tensor, got {}D with shape {:?}",
                self.model_name,
                shape.len(),
                shape
            )));
        }
        let view = ArrayView3::from_shape(
            (shape[0] as usize, shape[1] as usize, shape[2] as usize),
            &data,
        )
        .map_err(RecipeError::Tensor)?;
        Ok(view.to_owned())
    }
}
