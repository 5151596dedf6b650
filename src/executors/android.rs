//! Android relay executor.
//!
//! The desktop never talks to the phone directly. It emits a typed intent
//! payload through an [`IntentSink`], and the connected companion app turns
//! that payload into a real SMS, call, or app launch on the device. The
//! directive argument is a small pipe-separated form: `sms | +15551234567 |
//! running late`, `call | +15551234567`, `whatsapp | +15551234567 | hello`,
//! `open_app | com.android.chrome`.

use std::sync::Arc;

use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::ExecutorError;
use crate::policy::{CanonicalArg, ValidatedDirective};

use super::{wrong_argument, Executor};

static PHONE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\+?[0-9][0-9 ().-]{2,19}$").expect("phone regex"));

static PACKAGE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z][A-Za-z0-9_]*(\.[A-Za-z][A-Za-z0-9_]*)+$").expect("package regex"));

// ---------------------------------------------------------------------------
// Intent payloads
// ---------------------------------------------------------------------------

/// What the phone is asked to do.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "intent", rename_all = "snake_case")]
pub enum IntentPayload {
    Sms { phone_number: String, message: String },
    Call { phone_number: String },
    Whatsapp { phone_number: String, message: String },
    OpenApp { package: String },
}

/// Where relayed intents go. The live implementation pushes them onto the
/// session's outbound event stream; tests record them.
pub trait IntentSink: Send + Sync {
    fn send_intent(&self, payload: IntentPayload) -> Result<(), ExecutorError>;
}

// ---------------------------------------------------------------------------
// AndroidExecutor
// ---------------------------------------------------------------------------

/// Executor for phone-side actions.
pub struct AndroidExecutor {
    sink: Arc<dyn IntentSink>,
}

impl AndroidExecutor {
    pub fn new(sink: Arc<dyn IntentSink>) -> Self {
        Self { sink }
    }
}

#[async_trait]
impl Executor for AndroidExecutor {
    fn name(&self) -> &'static str {
        "android"
    }

    async fn execute(&self, directive: &ValidatedDirective) -> Result<String, ExecutorError> {
        let CanonicalArg::Text(raw) = directive.arg() else {
            return Err(wrong_argument(self.name()));
        };
        let payload = parse_relay(raw)?;
        let summary = describe(&payload);
        self.sink.send_intent(payload)?;
        Ok(summary)
    }
}

/// Parse the pipe-separated relay form into a payload.
fn parse_relay(raw: &str) -> Result<IntentPayload, ExecutorError> {
    let parts: Vec<&str> = raw.split('|').map(str::trim).collect();
    let action = parts
        .first()
        .copied()
        .unwrap_or_default()
        .to_lowercase();

    match action.as_str() {
        "sms" => {
            let (phone, message) = phone_and_message(&parts, "sms")?;
            Ok(IntentPayload::Sms {
                phone_number: phone,
                message,
            })
        }
        "call" => {
            let phone = phone_at(&parts, 1, "call")?;
            if parts.len() > 2 {
                return Err(malformed("call takes only a phone number"));
            }
            Ok(IntentPayload::Call { phone_number: phone })
        }
        "whatsapp" => {
            let (phone, message) = phone_and_message(&parts, "whatsapp")?;
            Ok(IntentPayload::Whatsapp {
                phone_number: phone,
                message,
            })
        }
        "open_app" | "open" => {
            let package = parts
                .get(1)
                .copied()
                .filter(|p| !p.is_empty())
                .ok_or_else(|| malformed("open_app needs a package name"))?;
            if !PACKAGE_RE.is_match(package) {
                return Err(malformed(&format!("invalid package name: {package}")));
            }
            Ok(IntentPayload::OpenApp {
                package: package.to_string(),
            })
        }
        "" => Err(malformed("empty phone action")),
        other => Err(malformed(&format!("unknown phone action: {other}"))),
    }
}

fn phone_and_message(parts: &[&str], action: &str) -> Result<(String, String), ExecutorError> {
    let phone = phone_at(parts, 1, action)?;
    let message = parts
        .get(2)
        .copied()
        .filter(|m| !m.is_empty())
        .ok_or_else(|| malformed(&format!("{action} needs a message")))?;
    // Anything after the second pipe belongs to the message body.
    let full_message = if parts.len() > 3 {
        let mut body = message.to_string();
        for extra in &parts[3..] {
            body.push_str(" | ");
            body.push_str(extra);
        }
        body
    } else {
        message.to_string()
    };
    Ok((phone, full_message))
}

fn phone_at(parts: &[&str], index: usize, action: &str) -> Result<String, ExecutorError> {
    let phone = parts
        .get(index)
        .copied()
        .filter(|p| !p.is_empty())
        .ok_or_else(|| malformed(&format!("{action} needs a phone number")))?;
    if !PHONE_RE.is_match(phone) {
        return Err(malformed(&format!("invalid phone number: {phone}")));
    }
    Ok(phone.to_string())
}

fn malformed(detail: &str) -> ExecutorError {
    ExecutorError::Failed(format!("Invalid phone action: {detail}"))
}

fn describe(payload: &IntentPayload) -> String {
    match payload {
        IntentPayload::Sms { phone_number, .. } => {
            format!("SMS to {phone_number} relayed to the phone")
        }
        IntentPayload::Call { phone_number } => {
            format!("Call to {phone_number} relayed to the phone")
        }
        IntentPayload::Whatsapp { phone_number, .. } => {
            format!("WhatsApp message to {phone_number} relayed to the phone")
        }
        IntentPayload::OpenApp { package } => {
            format!("App launch ({package}) relayed to the phone")
        }
    }
}
