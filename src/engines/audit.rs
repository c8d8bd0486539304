//! Audit LLM adapter

use async_trait::async_trait;
use serde_json::{Value, json};
use std::sync::Arc;

use super::runner::ModelRunner;
use crate::error::JobError;
use crate::models::Auditor;

/// llama.cpp-backed transcript auditor
pub struct LlamaAuditor {
    runner: Arc<ModelRunner>,
}

impl LlamaAuditor {
    pub fn new(runner: Arc<ModelRunner>) -> Self {
        Self { runner }
    }
}

#[async_trait]
impl Auditor for LlamaAuditor {
    async fn audit(&self, transcript: &str, criteria: &str) -> Result<String, JobError> {
        let request = json!({
            "op": "generate",
            "prompt": build_prompt(transcript, criteria),
        });
        let response = self
            .runner
            .call(&request)
            .await
            .map_err(|e| JobError::Audit(e.to_string()))?;

        if response.get("ok").and_then(Value::as_bool) == Some(false) {
            return Err(JobError::Audit(super::transcription::error_message(
                &response,
            )));
        }

        response
            .get("text")
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| JobError::Audit("runner response missing text".to_string()))
    }
}

fn build_prompt(transcript: &str, criteria: &str) -> String {
    format!(
        "<s>\n\
         [INST]\n\
         You are an auditor, your task is to audit the content in the conversation.\n\
         Keep in mind that the speaker assignment is not always accurate and some segments might be misassigned.\n\
         Go through the transcript verbatim without creating your own information and try to understand the intent of the speakers and their conversation:\n\
         [/INST]\n\
         {transcript}\n\n\
         [INST]\n\
         Audit the conversation according to the following criteria without changing anything.\n\
         Keep in mind each item in the criteria checklist is independent of one another and does not have to appear in the transcript in any order:\n\
         [/INST]\n\
         {criteria}\n\n\
         [INST]\n\
         For each item in the criteria checklist above, your response must follow the format:\n\
         Provide the result as either a Pass or Fail and only quote the text from the transcript that best supports your evaluation as evidence, keep the quote short.\n\
         [/INST]\n\
         </s>"
    )
}
