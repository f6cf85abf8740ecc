//! External analysis workflow seam: the vision model, storage bucket, and
//! database live in the host application. The processor only sees these traits.

use crate::image::PreparedImage;
use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Structured nutrition analysis for one food photo.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NutritionAnalysis {
    pub food_name: String,
    /// Total estimated calories in kcal.
    pub calories: f64,
    /// Total estimated sugar in grams.
    pub sugar: f64,
    /// Total estimated protein in grams.
    pub protein: f64,
    /// Free-form notes (fats, carbs, fiber, vitamins, ...).
    pub others: String,
}

/// Result of uploading the image bytes to storage.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredImage {
    pub url: String,
    pub path: String,
}

/// Persisted analysis record reference.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisRecord {
    pub id: String,
    pub created_at: String,
}

/// The analysis + storage + persistence workflow the processor drives.
/// Implementations are expected to be remote-backed; the processor wraps the
/// calls in the retry adapter, so they should not retry internally.
#[async_trait]
pub trait AnalysisWorkflow: Send + Sync {
    /// Run the vision model over a prepared image.
    async fn analyze(&self, prepared: &PreparedImage, display_name: &str)
        -> Result<NutritionAnalysis>;

    /// Upload the canonical image bytes to storage.
    async fn upload(&self, bytes: &[u8], filename: &str, content_type: &str)
        -> Result<StoredImage>;

    /// Persist the analysis row, keyed by the stored image path.
    async fn persist(&self, image_path: &str, nutrition: &NutritionAnalysis)
        -> Result<AnalysisRecord>;
}
