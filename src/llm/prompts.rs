//! System prompt assembly.
//!
//! The model learns the action tag vocabulary from this prompt. The usage
//! table below is the model-facing mirror of the capability registry; when
//! a kind is added there, add its row here too.

use serde::Serialize;
use tera::{Context, Tera};

use crate::error::SylphError;

const SYSTEM_TEMPLATE: &str = "\
You are {{ name }}, a desktop assistant running on the user's Linux machine.

You can perform real actions by embedding exactly one action tag in a reply:

{% for row in directives %}{{ row.usage }}
    {{ row.description }}
{% endfor %}
Rules:
- Use at most ONE action tag per reply. Emit the tag, finish the sentence, and stop.
- After an action runs you receive a message starting with \"Observation:\". Use it to decide the next step or to answer the user.
- TERMINAL runs a restricted shell. Simple read-only commands like ls, cat and grep work; pipes, redirection and anything destructive are rejected.
- When no action is needed, just answer in plain language.
- Keep replies short and natural; they are spoken aloud.
";

#[derive(Serialize)]
struct UsageRow {
    usage: &'static str,
    description: &'static str,
}

fn usage_rows() -> Vec<UsageRow> {
    vec![
        UsageRow {
            usage: "[ACTION: OPEN | calculator]",
            description: "Open a desktop application. Aliases: LAUNCH, START.",
        },
        UsageRow {
            usage: "[ACTION: TYPE | hello world]",
            description: "Type text into the focused window. Alias: WRITE.",
        },
        UsageRow {
            usage: "[ACTION: SYSTEM | lock]",
            description:
                "System control verb, one of: lock, mute, unmute, volume_up, volume_down. Alias: CONTROL.",
        },
        UsageRow {
            usage: "[ACTION: KEY | ctrl+s]",
            description: "Press a key or key chord. Alias: PRESS.",
        },
        UsageRow {
            usage: "[ACTION: TERMINAL | ls -la]",
            description: "Run a safe shell command and observe its output.",
        },
        UsageRow {
            usage: "[ACTION: SEARCH | weather in Lisbon]",
            description: "Search the web and observe the top results.",
        },
        UsageRow {
            usage: "[ACTION: SCREENSHOT]",
            description: "Capture the screen to a file. Alias: SNAP.",
        },
        UsageRow {
            usage: "[ACTION: SEE | what error is shown]",
            description:
                "Capture and describe the screen. The argument focuses the analysis and may be omitted.",
        },
        UsageRow {
            usage: "[ACTION: ANDROID | sms | +15551234567 | on my way]",
            description:
                "Relay a phone action to the paired device: sms, call, whatsapp, open_app.",
        },
    ]
}

/// Render the system prompt for a session.
pub fn system_prompt(assistant_name: &str) -> Result<String, SylphError> {
    let mut context = Context::new();
    context.insert("name", assistant_name);
    context.insert("directives", &usage_rows());
    Tera::one_off(SYSTEM_TEMPLATE, &context, false)
        .map_err(|e| SylphError::Llm(format!("system prompt render failed: {e}")))
}
