use crate::{LinkPreviewData, PreviewError};
use serde::{Deserialize, Serialize};

/// Body of a trade safety check submission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalysisRequest {
    pub input_text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_language: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_urls: Option<Vec<String>>,
}

impl AnalysisRequest {
    /// Builds a submission from what the user typed and, when one resolved, the link preview.
    ///
    /// A preview with content replaces the typed text as the analysis input, and its images are
    /// attached when there are any.
    pub fn new(
        input_text: &str,
        preview: Option<&LinkPreviewData>,
        output_language: Option<&str>,
    ) -> Result<Self, PreviewError> {
        if input_text.trim().is_empty() {
            return Err(PreviewError::InvalidInput(
                "trade description is empty".to_string(),
            ));
        }

        let input_text = preview
            .map(|p| p.content.as_str())
            .filter(|content| !content.is_empty())
            .unwrap_or(input_text)
            .to_string();

        let image_urls = preview
            .map(|p| p.images.clone())
            .filter(|images| !images.is_empty());

        Ok(Self {
            input_text,
            output_language: output_language.map(str::to_string),
            image_urls,
        })
    }
}

/// The id of a created check; the rest of the record is rendered elsewhere.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SubmittedCheck {
    pub id: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct CheckResponse {
    pub data: SubmittedCheck,
}
