use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Message {
    pub code: String,
    #[serde(default)]
    pub message: String,
}

/// Every Data API body has this shape, successful or not.
#[derive(Debug, Deserialize)]
pub struct Envelope {
    #[serde(default)]
    pub response: Value,
    #[serde(default)]
    pub messages: Vec<Message>,
}

impl Envelope {
    pub fn first_message(&self) -> Option<&Message> {
        self.messages.first()
    }

    pub fn is_ok(&self) -> bool {
        self.first_message().map_or(true, |m| m.code == "0")
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Record {
    pub record_id: String,
    #[serde(default)]
    pub mod_id: String,
    #[serde(default)]
    pub field_data: Map<String, Value>,
    #[serde(default)]
    pub portal_data: Value,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DataInfo {
    #[serde(default)]
    pub database: String,
    #[serde(default)]
    pub layout: String,
    #[serde(default)]
    pub table: String,
    #[serde(default)]
    pub total_record_count: u64,
    #[serde(default)]
    pub found_count: u64,
    #[serde(default)]
    pub returned_count: u64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct RecordsResponse {
    #[serde(default)]
    pub data: Vec<Record>,
    pub data_info: Option<DataInfo>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct SessionResponse {
    pub token: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct CreateResponse {
    pub record_id: String,
}
