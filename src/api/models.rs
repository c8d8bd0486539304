//! API request and response models

use serde::{Deserialize, Serialize};

use crate::error::ScribeError;
use crate::models::ModelSize;
use crate::pipeline::{BatchOptions, DiarisationMethod, TranscriptionMethod};

/// Health check response
#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

/// Active device response
#[derive(Debug, Serialize, Deserialize)]
pub struct DeviceResponse {
    pub device: String,
    pub compute_type: String,
}

/// Text fields of a transcription request, collected from the multipart
/// form before they are validated as a whole.
#[derive(Debug, Default)]
pub struct TranscribeForm {
    model_size: Option<String>,
    transcription_method: Option<String>,
    diarisation: Option<String>,
    diarisation_method: Option<String>,
    num_speakers: Option<String>,
    audit: Option<String>,
    criteria: Option<String>,
}

impl TranscribeForm {
    /// Record one form field. Unknown fields are rejected so typos fail
    /// loudly instead of silently falling back to defaults.
    pub fn set(&mut self, name: &str, value: String) -> Result<(), ScribeError> {
        let slot = match name {
            "model_size" => &mut self.model_size,
            "transcription_method" => &mut self.transcription_method,
            "diarisation" => &mut self.diarisation,
            "diarisation_method" => &mut self.diarisation_method,
            "num_speakers" => &mut self.num_speakers,
            "audit" => &mut self.audit,
            "criteria" => &mut self.criteria,
            other => {
                return Err(ScribeError::Configuration(format!(
                    "Unknown form field '{other}'"
                )));
            }
        };
        *slot = Some(value);
        Ok(())
    }

    pub fn into_options(self) -> Result<BatchOptions, ScribeError> {
        Ok(BatchOptions {
            model_size: parse_field::<ModelSize>("model_size", self.model_size)?,
            transcription_method: parse_field::<TranscriptionMethod>(
                "transcription_method",
                self.transcription_method,
            )?,
            diarisation: parse_bool("diarisation", self.diarisation)?,
            diarisation_method: parse_field::<DiarisationMethod>(
                "diarisation_method",
                self.diarisation_method,
            )?,
            num_speakers: parse_field::<u32>("num_speakers", self.num_speakers)?,
            audit: parse_bool("audit", self.audit)?,
            criteria: self.criteria.unwrap_or_default(),
        })
    }
}

fn parse_field<T>(name: &str, value: Option<String>) -> Result<T, ScribeError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    let value = value
        .ok_or_else(|| ScribeError::Configuration(format!("Missing form field '{name}'")))?;
    value
        .parse()
        .map_err(|e| ScribeError::Configuration(format!("Invalid value for '{name}': {e}")))
}

fn parse_bool(name: &str, value: Option<String>) -> Result<bool, ScribeError> {
    match parse_field::<String>(name, value)?.to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" => Ok(true),
        "false" | "0" | "no" => Ok(false),
        other => Err(ScribeError::Configuration(format!(
            "Invalid value for '{name}': expected a boolean (got '{other}')"
        ))),
    }
}
