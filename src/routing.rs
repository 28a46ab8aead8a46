//! Call routing — maps inbound call events and keypad results to plans.
//!
//! Decisions are pure functions of the event and the static roster:
//!
//! | Origin | Destination      | Plan                                   |
//! |--------|------------------|----------------------------------------|
//! | app    | all digits       | talk, connect to PSTN from service no. |
//! | app    | anything else    | talk, connect to that app user         |
//! | PSTN   | —                | IVR menu, collect one digit            |
//!
//! The keypad result then connects to the selected roster entry, or ends the
//! call on timeout or an invalid option.

use std::sync::Arc;

use tracing::info;

use crate::ncco::{Action, CONNECT_TIMEOUT_SECS, CallbackMethod, Endpoint, RoutingPlan};
use crate::roster::Roster;

pub const CONNECTING_TEXT: &str = "Connecting your call, please wait";
pub const NO_INPUT_TEXT: &str = "You did not press any key, good bye";
pub const INVALID_OPTION_TEXT: &str = "You pressed an invalid option. Good bye";
pub const REJECT_TEXT: &str = "We are unable to process your call. Good bye";

/// New call notification from the control plane.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundCallEvent {
    /// Call was placed by an in-app client rather than a phone.
    pub origin_is_app: bool,
    pub from: String,
    pub to: String,
}

/// Keypad collection result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DtmfEvent {
    pub timed_out: bool,
    pub digits: Option<String>,
    pub from: String,
}

/// Webhook URLs the control plane calls back for a routed call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallbackUrls {
    base: String,
}

impl CallbackUrls {
    /// Callbacks served over HTTPS at `host`.
    pub fn for_host(host: &str) -> Self {
        Self {
            base: format!("https://{host}"),
        }
    }

    pub fn in_app_event(&self) -> String {
        format!("{}/voice/inappevent", self.base)
    }

    pub fn in_app_answer(&self) -> String {
        format!("{}/voice/inappanswer", self.base)
    }

    pub fn dtmf(&self) -> String {
        format!("{}/voice/dtmf", self.base)
    }
}

/// Stateless routing decisions over a fixed roster.
#[derive(Debug, Clone)]
pub struct CallRouter {
    roster: Arc<Roster>,
    service_number: String,
}

impl CallRouter {
    pub fn new(roster: Arc<Roster>, service_number: impl Into<String>) -> Self {
        Self {
            roster,
            service_number: service_number.into(),
        }
    }

    pub fn roster(&self) -> &Roster {
        &self.roster
    }

    /// Plan for a new inbound call.
    pub fn decide_inbound(&self, event: &InboundCallEvent, urls: &CallbackUrls) -> RoutingPlan {
        if !event.origin_is_app {
            info!(from = %event.from, "PSTN call, playing IVR menu");
            return RoutingPlan::new(Action::interruptible_talk(self.roster.prompt()))
                .then(Action::single_digit_input(urls.dtmf()));
        }

        let connect = if is_pstn_number(&event.to) {
            info!(to = %event.to, "In-app call to PSTN number");
            Action::Connect {
                from: self.service_number.clone(),
                endpoint: vec![Endpoint::Phone {
                    number: event.to.clone(),
                }],
                timeout: CONNECT_TIMEOUT_SECS,
                event_url: vec![urls.in_app_event()],
                event_method: None,
                answer_url: None,
                answer_method: None,
            }
        } else {
            // App-to-app calls may reach any user the signaling plane knows,
            // roster membership is not required here.
            info!(from = %event.from, to = %event.to, "In-app call to app user");
            Action::Connect {
                from: event.from.clone(),
                endpoint: vec![Endpoint::App {
                    user: event.to.clone(),
                }],
                timeout: CONNECT_TIMEOUT_SECS,
                event_url: vec![urls.in_app_event()],
                event_method: Some(CallbackMethod::Post),
                answer_url: None,
                answer_method: None,
            }
        };

        RoutingPlan::new(Action::talk(CONNECTING_TEXT)).then(connect)
    }

    /// Plan for the IVR keypad result.
    pub fn decide_dtmf(&self, event: &DtmfEvent, urls: &CallbackUrls) -> RoutingPlan {
        if event.timed_out {
            info!(from = %event.from, "No key pressed before timeout");
            return RoutingPlan::new(Action::talk(NO_INPUT_TEXT));
        }

        let selected = event
            .digits
            .as_deref()
            .and_then(|digits| self.roster.select(digits));

        match selected {
            Some(user) => {
                info!(from = %event.from, user, "Connecting PSTN call to app user");
                RoutingPlan::new(Action::talk(CONNECTING_TEXT)).then(Action::Connect {
                    from: event.from.clone(),
                    endpoint: vec![Endpoint::App {
                        user: user.to_string(),
                    }],
                    timeout: CONNECT_TIMEOUT_SECS,
                    event_url: vec![urls.in_app_event()],
                    event_method: Some(CallbackMethod::Post),
                    answer_url: Some(vec![urls.in_app_answer()]),
                    answer_method: Some(CallbackMethod::Post),
                })
            }
            None => {
                info!(from = %event.from, digits = ?event.digits, "Invalid IVR option");
                RoutingPlan::new(Action::talk(INVALID_OPTION_TEXT))
            }
        }
    }
}

/// Plan returned when a callback cannot be understood.
pub fn reject_plan() -> RoutingPlan {
    RoutingPlan::new(Action::talk(REJECT_TEXT))
}

/// `true` for a non-empty, all-ASCII-digit string.
pub fn is_pstn_number(to: &str) -> bool {
    !to.is_empty() && to.bytes().all(|b| b.is_ascii_digit())
}
