use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PredictRequest {
    /// Missing and `null` both read as empty text.
    #[serde(default)]
    pub text: Option<String>,
}

impl PredictRequest {
    pub fn into_text(self) -> String {
        self.text.unwrap_or_default()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PredictResponse {
    pub sentiment: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub labels: Vec<String>,
}
