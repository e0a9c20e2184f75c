use serde::{Deserialize, Serialize};

pub const STATUS_OK: i32 = 0;
pub const STATUS_SERVICE_ERROR: i32 = 1000;
pub const STATUS_PARSING_ERROR: i32 = 1001;
pub const STATUS_EXCLUSIVE_ACCESS_BUSY: i32 = 1002;

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestEnvelope {
    #[serde(rename = "mType")]
    pub m_type: String,
    pub data: RequestData,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestData {
    pub msg_id: String,
    #[serde(default)]
    pub timeout: Option<u64>,
    #[serde(default)]
    pub return_verbose: Option<bool>,
    pub req: serde_json::Value,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResponseEnvelope {
    #[serde(rename = "mType")]
    pub m_type: String,
    pub data: ResponseData,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResponseData {
    pub msg_id: String,
    pub rsp: serde_json::Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub raw: Option<serde_json::Value>,
    pub status: i32,
    pub status_str: String,
}

impl ResponseEnvelope {
    pub fn ok(m_type: impl Into<String>, msg_id: impl Into<String>, rsp: serde_json::Value) -> Self {
        Self {
            m_type: m_type.into(),
            data: ResponseData {
                msg_id: msg_id.into(),
                rsp,
                raw: None,
                status: STATUS_OK,
                status_str: "ok".to_string(),
            },
        }
    }

    pub fn error(
        m_type: impl Into<String>,
        msg_id: impl Into<String>,
        status: i32,
        status_str: impl Into<String>,
    ) -> Self {
        Self {
            m_type: m_type.into(),
            data: ResponseData {
                msg_id: msg_id.into(),
                rsp: serde_json::Value::Null,
                raw: None,
                status,
                status_str: status_str.into(),
            },
        }
    }
}
