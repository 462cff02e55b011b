//! Image classification collaborator.
//!
//! The relay only needs "bytes in, label and confidence out"; the default
//! classifier checks the image signature and derives a two-class label
//! from pixel-data intensity.

use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ClassifyError {
    #[error("invalid input: {0}")]
    InvalidInput(String),
}

/// Label and confidence in `[0, 1]`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Classification {
    pub label: String,
    pub confidence: f64,
}

/// Classifies one encoded image. Runs on the blocking pool.
pub trait Classifier: Send + Sync + 'static {
    fn classify(&self, image: &[u8]) -> Result<Classification, ClassifyError>;
}

/// Container formats accepted as images.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageFormat {
    Jpeg,
    Png,
    WebP,
}

impl ImageFormat {
    /// Detect the format from the leading bytes.
    pub fn sniff(bytes: &[u8]) -> Option<Self> {
        const PNG: &[u8] = &[0x89, b'P', b'N', b'G', 0x0d, 0x0a, 0x1a, 0x0a];

        if bytes.starts_with(&[0xff, 0xd8, 0xff]) {
            Some(ImageFormat::Jpeg)
        } else if bytes.starts_with(PNG) {
            Some(ImageFormat::Png)
        } else if bytes.len() >= 12 && &bytes[..4] == b"RIFF" && &bytes[8..12] == b"WEBP" {
            Some(ImageFormat::WebP)
        } else {
            None
        }
    }

    fn header_len(self) -> usize {
        match self {
            ImageFormat::Jpeg => 3,
            ImageFormat::Png => 8,
            ImageFormat::WebP => 12,
        }
    }
}

/// Signature check plus a mean-intensity decision between two classes.
#[derive(Debug, Clone)]
pub struct SignatureClassifier {
    labels: [String; 2],
}

impl Default for SignatureClassifier {
    fn default() -> Self {
        Self {
            labels: ["car".to_string(), "motorcycle".to_string()],
        }
    }
}

impl SignatureClassifier {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Classifier for SignatureClassifier {
    fn classify(&self, image: &[u8]) -> Result<Classification, ClassifyError> {
        let format = ImageFormat::sniff(image)
            .ok_or_else(|| ClassifyError::InvalidInput("payload is not a JPEG, PNG or WebP image".into()))?;

        let body = &image[format.header_len()..];
        if body.is_empty() {
            return Err(ClassifyError::InvalidInput("image has no data after its header".into()));
        }

        let sum: u64 = body.iter().map(|b| u64::from(*b)).sum();
        let intensity = sum as f64 / (body.len() as f64 * 255.0);

        let label = if intensity < 0.5 { &self.labels[0] } else { &self.labels[1] };
        let confidence = (0.5 + (intensity - 0.5).abs()).clamp(0.5, 1.0);

        Ok(Classification {
            label: label.clone(),
            confidence,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn png(body: &[u8]) -> Vec<u8> {
        let mut bytes = vec![0x89, b'P', b'N', b'G', 0x0d, 0x0a, 0x1a, 0x0a];
        bytes.extend_from_slice(body);
        bytes
    }

    #[test]
    fn sniffs_formats() {
        assert_eq!(ImageFormat::sniff(&[0xff, 0xd8, 0xff, 0xe0]), Some(ImageFormat::Jpeg));
        assert_eq!(ImageFormat::sniff(&png(b"x")), Some(ImageFormat::Png));
        assert_eq!(ImageFormat::sniff(b"RIFF\0\0\0\0WEBPVP8 "), Some(ImageFormat::WebP));
        assert_eq!(ImageFormat::sniff(b"GIF89a"), None);
        assert_eq!(ImageFormat::sniff(b""), None);
    }

    #[test]
    fn dark_and_bright_images_get_different_labels() {
        let classifier = SignatureClassifier::new();

        let dark = classifier.classify(&png(&[0u8; 64])).unwrap();
        assert_eq!(dark.label, "car");
        assert_eq!(dark.confidence, 1.0);

        let bright = classifier.classify(&png(&[200u8; 64])).unwrap();
        assert_eq!(bright.label, "motorcycle");
        assert!((0.5..=1.0).contains(&bright.confidence));
    }

    #[test]
    fn rejects_non_images() {
        let classifier = SignatureClassifier::new();
        assert!(matches!(classifier.classify(b"hello world"), Err(ClassifyError::InvalidInput(_))));
        assert!(matches!(classifier.classify(&png(b"")), Err(ClassifyError::InvalidInput(_))));
    }
}
