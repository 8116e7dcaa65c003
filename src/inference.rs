//! Local inference engine abstraction
//!
//! The crate never executes a segmentation model itself. Embedders inject
//! an engine implementing [`LocalInferenceEngine`]; the orchestrator drives
//! it through the same request/result surface as the remote backend.

use async_trait::async_trait;
use image::{DynamicImage, GenericImageView};
use thiserror::Error;

/// Opaque failure reported by a local inference engine
///
/// Engine internals (model loading, tensor shapes, execution providers)
/// stay behind this single message-carrying type.
#[derive(Error, Debug)]
#[error("{message}")]
pub struct LocalEngineError {
    message: String,
}

impl LocalEngineError {
    /// Wrap an engine-specific failure description
    pub fn new<S: Into<String>>(message: S) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Decoded image handed between an engine's decode and removal steps
pub struct ImageHandle {
    image: DynamicImage,
}

impl ImageHandle {
    #[must_use]
    pub fn new(image: DynamicImage) -> Self {
        Self { image }
    }

    #[must_use]
    pub fn image(&self) -> &DynamicImage {
        &self.image
    }

    /// Pixel dimensions as (width, height)
    #[must_use]
    pub fn dimensions(&self) -> (u32, u32) {
        self.image.dimensions()
    }

    #[must_use]
    pub fn into_image(self) -> DynamicImage {
        self.image
    }
}

/// Trait for in-process background removal engines
///
/// Both steps are async so engines backed by worker threads or GPU queues
/// can suspend instead of blocking the runtime.
#[async_trait]
pub trait LocalInferenceEngine: Send + Sync {
    /// Decode raw image bytes into a handle the engine can process
    ///
    /// # Errors
    /// - Unrecognized or corrupt image data
    async fn decode_image(&self, bytes: &[u8]) -> Result<ImageHandle, LocalEngineError>;

    /// Remove the background, returning encoded image bytes (RGBA PNG by
    /// convention)
    ///
    /// # Errors
    /// - Model execution failures
    /// - Images the engine cannot handle (size, color space)
    async fn remove_background(
        &self,
        handle: ImageHandle,
    ) -> Result<Vec<u8>, LocalEngineError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    struct PassthroughEngine;

    #[async_trait]
    impl LocalInferenceEngine for PassthroughEngine {
        async fn decode_image(
            &self,
            bytes: &[u8],
        ) -> Result<ImageHandle, LocalEngineError> {
            let image = image::load_from_memory(bytes)
                .map_err(|e| LocalEngineError::new(format!("decode failed: {e}")))?;
            Ok(ImageHandle::new(image))
        }

        async fn remove_background(
            &self,
            handle: ImageHandle,
        ) -> Result<Vec<u8>, LocalEngineError> {
            let mut bytes = Vec::new();
            handle
                .into_image()
                .write_to(
                    &mut std::io::Cursor::new(&mut bytes),
                    image::ImageFormat::Png,
                )
                .map_err(|e| LocalEngineError::new(format!("encode failed: {e}")))?;
            Ok(bytes)
        }
    }

    fn png_fixture(width: u32, height: u32) -> Vec<u8> {
        let image = DynamicImage::new_rgba8(width, height);
        let mut bytes = Vec::new();
        image
            .write_to(
                &mut std::io::Cursor::new(&mut bytes),
                image::ImageFormat::Png,
            )
            .unwrap();
        bytes
    }

    #[tokio::test]
    async fn test_engine_round_trip() {
        let engine = PassthroughEngine;
        let handle = engine.decode_image(&png_fixture(8, 6)).await.unwrap();
        assert_eq!(handle.dimensions(), (8, 6));

        let output = engine.remove_background(handle).await.unwrap();
        assert!(!output.is_empty());
        // Output stays decodable
        assert!(image::load_from_memory(&output).is_ok());
    }

    #[tokio::test]
    async fn test_decode_rejects_garbage() {
        let engine = PassthroughEngine;
        let result = engine.decode_image(b"definitely not an image").await;
        assert!(result.is_err());
    }

    #[test]
    fn test_handle_exposes_decoded_image() {
        let handle = ImageHandle::new(DynamicImage::new_rgba8(3, 2));
        assert_eq!(handle.dimensions(), (3, 2));
        assert_eq!(handle.image().width(), 3);
        assert_eq!(handle.into_image().height(), 2);
    }

    #[test]
    fn test_engine_error_display() {
        let err = LocalEngineError::new("model not loaded");
        assert_eq!(err.to_string(), "model not loaded");
    }
}
