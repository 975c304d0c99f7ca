use serde::{Deserialize, Serialize};

#[derive(Debug, Deserialize)]
pub struct AskRequest {
    pub query: String,
}

/// Body of every `/ask` reply, success or failure.
#[derive(Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct AskResponse {
    pub data: String,
}

impl AskResponse {
    pub fn new(data: impl Into<String>) -> Self {
        Self { data: data.into() }
    }
}
