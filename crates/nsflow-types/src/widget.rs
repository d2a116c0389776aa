use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A form widget produced by the widget agent.
/// `schema` is a JSON Schema describing the form fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WidgetSpec {
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub icon: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
    #[serde(rename = "bgImage", default, skip_serializing_if = "Option::is_none")]
    pub bg_image: Option<String>,
    pub schema: Value,
}
