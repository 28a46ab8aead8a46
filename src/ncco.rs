//! Call-control action plans returned to the telephony control plane.
//!
//! A plan is an ordered JSON array of actions, each tagged by `"action"`.
//! Plans are built by [`crate::routing`] and are never empty.

use serde::{Deserialize, Serialize};

/// Language every spoken message uses.
pub const TALK_LANGUAGE: &str = "en-US";

/// Ring timeout for outbound legs, in seconds.
pub const CONNECT_TIMEOUT_SECS: u32 = 45;

/// How long the menu waits for a keypress, in seconds.
pub const INPUT_TIMEOUT_SECS: u32 = 7;

/// HTTP method for control-plane callbacks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum CallbackMethod {
    Post,
}

/// Destination of a `connect` action.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Endpoint {
    /// A PSTN number.
    Phone { number: String },
    /// An in-app (WebRTC client) user.
    App { user: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InputType {
    Dtmf,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DtmfSettings {
    pub max_digits: u32,
}

/// One call-control instruction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "lowercase")]
pub enum Action {
    #[serde(rename_all = "camelCase")]
    Talk {
        text: String,
        language: String,
        style: u32,
        #[serde(skip_serializing_if = "Option::is_none")]
        barge_in: Option<bool>,
    },
    #[serde(rename_all = "camelCase")]
    Connect {
        from: String,
        endpoint: Vec<Endpoint>,
        timeout: u32,
        event_url: Vec<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        event_method: Option<CallbackMethod>,
        #[serde(skip_serializing_if = "Option::is_none")]
        answer_url: Option<Vec<String>>,
        #[serde(skip_serializing_if = "Option::is_none")]
        answer_method: Option<CallbackMethod>,
    },
    #[serde(rename_all = "camelCase")]
    Input {
        #[serde(rename = "type")]
        input_type: Vec<InputType>,
        dtmf: DtmfSettings,
        timeout: u32,
        event_url: Vec<String>,
    },
}

impl Action {
    /// Plain spoken message.
    pub fn talk(text: impl Into<String>) -> Self {
        Action::Talk {
            text: text.into(),
            language: TALK_LANGUAGE.to_string(),
            style: 0,
            barge_in: None,
        }
    }

    /// Spoken message the caller may interrupt with a keypress.
    pub fn interruptible_talk(text: impl Into<String>) -> Self {
        Action::Talk {
            text: text.into(),
            language: TALK_LANGUAGE.to_string(),
            style: 0,
            barge_in: Some(true),
        }
    }

    /// Single-digit DTMF collection posting its result to `event_url`.
    pub fn single_digit_input(event_url: impl Into<String>) -> Self {
        Action::Input {
            input_type: vec![InputType::Dtmf],
            dtmf: DtmfSettings { max_digits: 1 },
            timeout: INPUT_TIMEOUT_SECS,
            event_url: vec![event_url.into()],
        }
    }
}

/// Ordered, non-empty list of actions for one call decision.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct RoutingPlan(Vec<Action>);

impl RoutingPlan {
    /// Plan starting with `first`; a plan always has at least one action.
    pub fn new(first: Action) -> Self {
        Self(vec![first])
    }

    pub fn then(mut self, action: Action) -> Self {
        self.0.push(action);
        self
    }

    pub fn actions(&self) -> &[Action] {
        &self.0
    }
}
