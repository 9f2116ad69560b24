//! Categorization prompt for the completion service.

use crate::completion::{CompletionService, Message};
use crate::error::{AnalysisError, Stage};
use crate::schema::VisionExtraction;
use tracing::debug;

const CATEGORIZE_INSTRUCTION: &str = "Come up with sensible categories for the items in the \
JSON data that follows. Rework the data so every item sits under one of those categories and \
the result matches the provided type description as closely as possible. Do not add comments \
or explanations: return only the raw JSON.";

/// Build the three ordered prompt turns: instruction, schema description, data.
///
/// The schema description stays a separate turn so backends with a dedicated
/// schema channel can take it without changing the text path.
pub fn build_messages(
    schema_description: &str,
    extraction: &VisionExtraction,
) -> Result<Vec<Message>, AnalysisError> {
    let data = serde_json::to_string_pretty(extraction).map_err(|e| AnalysisError::Decode {
        stage: Stage::Categorization,
        message: format!("could not serialize vision result: {}", e),
    })?;

    Ok(vec![
        Message::user(CATEGORIZE_INSTRUCTION),
        Message::user(schema_description),
        Message::user(data),
    ])
}

/// Ask the completion service to categorize the vision output. Returns the
/// raw completion text.
pub async fn categorize(
    service: &dyn CompletionService,
    schema_description: &str,
    extraction: &VisionExtraction,
) -> Result<String, AnalysisError> {
    let messages = build_messages(schema_description, extraction)?;
    debug!(
        "Categorizing {} top-level vision keys ({} chars of schema)",
        extraction.len(),
        schema_description.len()
    );

    service
        .complete(messages)
        .await
        .map_err(|e| AnalysisError::from_service(Stage::Categorization, e))
}
