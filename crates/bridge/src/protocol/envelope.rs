use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::BridgeError;

pub const REQUEST_TYPE: &str = "SIGN_STRUCTURED_DATA_REQUEST";
pub const RESULT_TYPE: &str = "SIGN_STRUCTURED_DATA_RESULT";
pub const READY_TYPE: &str = "SIGNING_BRIDGE_READY";

/// Every message shape the bridge itself puts on the wire, keyed by the
/// `type` discriminator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum BridgeMessage {
    /// Page → relay: sign this payload.
    #[serde(rename = "SIGN_STRUCTURED_DATA_REQUEST")]
    SignRequest(RequestEnvelope),
    /// Relay → page: outcome for a request id.
    #[serde(rename = "SIGN_STRUCTURED_DATA_RESULT")]
    SignResult(ResponseEnvelope),
    /// Bridge installed and operational.
    #[serde(rename = "SIGNING_BRIDGE_READY")]
    Ready(ReadyEvent),
}

impl BridgeMessage {
    pub fn to_value(&self) -> anyhow::Result<Value> {
        Ok(serde_json::to_value(self)?)
    }

    /// Strict decode: anything that is not exactly one of our shapes is `None`.
    pub fn from_value(value: &Value) -> Option<Self> {
        Self::deserialize(value).ok()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestEnvelope {
    pub id: String,
    pub data: RequestData,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestData {
    #[serde(rename = "structuredData")]
    pub structured_data: Value,
}

impl RequestEnvelope {
    pub fn new(id: impl Into<String>, structured_data: Value) -> Self {
        Self {
            id: id.into(),
            data: RequestData { structured_data },
        }
    }

    pub fn into_message(self) -> BridgeMessage {
        BridgeMessage::SignRequest(self)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResponseEnvelope {
    pub id: String,
    pub result: SignResult,
}

impl ResponseEnvelope {
    pub fn success(id: impl Into<String>, signature: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            result: SignResult::success(signature),
        }
    }

    pub fn failure(id: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            result: SignResult::failure(error),
        }
    }

    pub fn into_message(self) -> BridgeMessage {
        BridgeMessage::SignResult(self)
    }
}

/// Tagged outcome. `signature` is present iff `success`, `error` iff not;
/// inbound results are not trusted to honour that, see [`SignResult::into_outcome`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignResult {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signature: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl SignResult {
    pub fn success(signature: impl Into<String>) -> Self {
        Self {
            success: true,
            signature: Some(signature.into()),
            error: None,
        }
    }

    pub fn failure(error: impl Into<String>) -> Self {
        Self {
            success: false,
            signature: None,
            error: Some(error.into()),
        }
    }

    /// A success without a signature is treated as a failure with the
    /// fallback message.
    pub fn into_outcome(self) -> Result<String, BridgeError> {
        match (self.success, self.signature) {
            (true, Some(signature)) => Ok(signature),
            (true, None) => Err(BridgeError::signing_failed(None)),
            (false, _) => Err(BridgeError::signing_failed(self.error)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReadyEvent {
    pub version: String,
}
