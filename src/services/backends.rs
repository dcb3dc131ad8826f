// On-device Inference Backends
// A backend maps an RGBA buffer (plus its feature vector) to a probability.
// Detectors receive an optional backend at construction; there is no global slot.

use crate::models::{FeatureVector, PixelBuffer};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::warn;

pub const DEFAULT_INFERENCE_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Error, Debug)]
pub enum BackendError {
    #[error("inference failed: {0}")]
    Inference(String),
    #[error("backend returned an out-of-range probability: {0}")]
    InvalidProbability(f64),
    #[error("input rejected: {0}")]
    UnsupportedInput(String),
    #[error("inference timed out after {0:?}")]
    Timeout(Duration),
}

#[async_trait]
pub trait InferenceBackend: Send + Sync {
    fn name(&self) -> &str;

    /// Probability in [0, 1] that the pixels are machine-generated.
    async fn run(&self, pixels: &PixelBuffer, features: &FeatureVector) -> Result<f64, BackendError>;
}

pub type SharedBackend = Arc<dyn InferenceBackend>;

/// Run a backend with a bounded wait and validate its output.
pub async fn run_inference(
    backend: &dyn InferenceBackend,
    pixels: &PixelBuffer,
    features: &FeatureVector,
    timeout: Duration,
) -> Result<f64, BackendError> {
    let prob = tokio::time::timeout(timeout, backend.run(pixels, features))
        .await
        .map_err(|_| BackendError::Timeout(timeout))??;
    if !prob.is_finite() || !(0.0..=1.0).contains(&prob) {
        return Err(BackendError::InvalidProbability(prob));
    }
    Ok(prob)
}

/// Like [`run_inference`] but logs and swallows failures so the caller can
/// fall back to a cheaper signal.
pub async fn try_inference(
    backend: &dyn InferenceBackend,
    pixels: &PixelBuffer,
    features: &FeatureVector,
    timeout: Duration,
) -> Option<f64> {
    match run_inference(backend, pixels, features, timeout).await {
        Ok(p) => Some(p),
        Err(e) => {
            warn!("[BACKEND] {} failed, falling back: {}", backend.name(), e);
            None
        }
    }
}


#[cfg(test)]
mod tests {
    use super::test_backends::*;
    use super::*;

    fn tiny() -> PixelBuffer {
        PixelBuffer::new(1, 1, vec![0, 0, 0, 255]).unwrap()
    }

    #[tokio::test]
    async fn test_valid_probability_passes_through() {
        let backend = FixedBackend::new(0.8);
        let p = run_inference(&backend, &tiny(), &FeatureVector::default(), DEFAULT_INFERENCE_TIMEOUT).await;
        assert_eq!(p.unwrap(), 0.8);
        assert_eq!(backend.calls(), 1);
    }

    #[tokio::test]
    async fn test_out_of_range_probability_is_an_error() {
        let backend = FixedBackend::new(1.5);
        let err = run_inference(&backend, &tiny(), &FeatureVector::default(), DEFAULT_INFERENCE_TIMEOUT)
            .await
            .unwrap_err();
        assert!(matches!(err, BackendError::InvalidProbability(_)));
    }

    #[tokio::test]
    async fn test_failure_falls_back_to_none() {
        let p = try_inference(&FailingBackend, &tiny(), &FeatureVector::default(), DEFAULT_INFERENCE_TIMEOUT).await;
        assert!(p.is_none());
    }
}
