//! Desktop automation executor (X11).
//!
//! Covers app launch, typing, key chords, system control verbs, and
//! screenshots. Every effect is an argument-vector spawn of a desktop tool
//! (`xdotool`, `amixer`, `scrot`, the screensaver commands); nothing goes
//! through a shell. Command construction is split into pure plan functions
//! so the exact argv can be checked without a display server.

use std::process::Stdio;

use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use tokio::process::Command;

use crate::error::ExecutorError;
use crate::policy::{CanonicalArg, ValidatedDirective};

use super::{wrong_argument, Executor};

/// Key chord segments after name mapping: xdotool keysym or modifier names.
static KEY_SEGMENT_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z0-9_]+$").expect("key segment regex"));

// ---------------------------------------------------------------------------
// CommandPlan
// ---------------------------------------------------------------------------

/// An argv vector ready to spawn.
#[derive(Debug, Clone, PartialEq, Eq)]
struct CommandPlan {
    program: String,
    args: Vec<String>,
}

impl CommandPlan {
    fn new(program: &str, args: &[&str]) -> Self {
        Self {
            program: program.to_string(),
            args: args.iter().map(|a| a.to_string()).collect(),
        }
    }
}

// ---------------------------------------------------------------------------
// DesktopExecutor
// ---------------------------------------------------------------------------

/// Executor for the local desktop automation surface.
#[derive(Debug, Clone)]
pub struct DesktopExecutor {
    /// Where the screenshot tool writes.
    screenshot_path: String,
    /// Inter-keystroke delay for typed text, in milliseconds.
    typing_delay_ms: u32,
}

impl DesktopExecutor {
    pub fn new(screenshot_path: impl Into<String>) -> Self {
        Self {
            screenshot_path: screenshot_path.into(),
            typing_delay_ms: 20,
        }
    }

    // --- plans -------------------------------------------------------------

    fn open_plan(app: &str) -> CommandPlan {
        CommandPlan::new(app, &[])
    }

    fn type_plan(&self, text: &str) -> CommandPlan {
        CommandPlan::new(
            "xdotool",
            &["type", "--delay", &self.typing_delay_ms.to_string(), "--", text],
        )
    }

    fn key_plan(key: &str) -> Result<CommandPlan, ExecutorError> {
        let chord = normalize_chord(key)?;
        Ok(CommandPlan::new("xdotool", &["key", &chord]))
    }

    fn system_plans(token: &str) -> Option<(CommandPlan, Option<CommandPlan>, &'static str)> {
        match token {
            "lock" => Some((
                CommandPlan::new("gnome-screensaver-command", &["-l"]),
                Some(CommandPlan::new("xdg-screensaver", &["lock"])),
                "Screen locked",
            )),
            "mute" => Some((
                CommandPlan::new("amixer", &["-D", "pulse", "sset", "Master", "toggle"]),
                None,
                "Audio toggled (mute/unmute)",
            )),
            "unmute" => Some((
                CommandPlan::new("amixer", &["-D", "pulse", "sset", "Master", "on"]),
                None,
                "Audio unmuted",
            )),
            "volume_up" => Some((
                CommandPlan::new("amixer", &["-D", "pulse", "sset", "Master", "5%+"]),
                Some(CommandPlan::new("amixer", &["sset", "Master", "5%+"])),
                "Volume increased",
            )),
            "volume_down" => Some((
                CommandPlan::new("amixer", &["-D", "pulse", "sset", "Master", "5%-"]),
                Some(CommandPlan::new("amixer", &["sset", "Master", "5%-"])),
                "Volume decreased",
            )),
            _ => None,
        }
    }

    fn screenshot_plan(&self) -> CommandPlan {
        CommandPlan::new("scrot", &["--overwrite", &self.screenshot_path])
    }

    // --- spawning ----------------------------------------------------------

    /// Launch without waiting. The child handle is dropped so the app keeps
    /// running on its own.
    fn spawn_detached(&self, plan: &CommandPlan) -> Result<(), ExecutorError> {
        Command::new(&plan.program)
            .args(&plan.args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .map(drop)
            .map_err(ExecutorError::Io)
    }

    /// Run to completion and require a zero exit status.
    async fn run_checked(&self, plan: &CommandPlan) -> Result<(), ExecutorError> {
        let output = Command::new(&plan.program)
            .args(&plan.args)
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|e| match e.kind() {
                std::io::ErrorKind::NotFound => {
                    ExecutorError::Unavailable(format!("required tool not found: {}", plan.program))
                }
                _ => ExecutorError::Io(e),
            })?;
        if output.status.success() {
            Ok(())
        } else {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            Err(ExecutorError::Failed(format!(
                "{} exited with {}: {}",
                plan.program, output.status, stderr
            )))
        }
    }

    async fn run_with_fallback(
        &self,
        primary: &CommandPlan,
        fallback: Option<&CommandPlan>,
    ) -> Result<(), ExecutorError> {
        match self.run_checked(primary).await {
            Ok(()) => Ok(()),
            Err(primary_err) => match fallback {
                Some(plan) => self.run_checked(plan).await.map_err(|_| primary_err),
                None => Err(primary_err),
            },
        }
    }
}

#[async_trait]
impl Executor for DesktopExecutor {
    fn name(&self) -> &'static str {
        "desktop"
    }

    async fn execute(&self, directive: &ValidatedDirective) -> Result<String, ExecutorError> {
        use crate::directive::DirectiveKind::*;

        match (directive.kind(), directive.arg()) {
            (OpenApp, CanonicalArg::App(app)) => {
                match self.spawn_detached(&Self::open_plan(app)) {
                    Ok(()) => Ok(format!("Launched {app} successfully")),
                    Err(ExecutorError::Io(e)) if e.kind() == std::io::ErrorKind::NotFound => {
                        Err(ExecutorError::Failed(format!("App not found: {app}")))
                    }
                    Err(e) => Err(e),
                }
            }
            (TypeText, CanonicalArg::Text(text)) => {
                self.run_checked(&self.type_plan(text)).await?;
                Ok(format!("Typed: {}", preview(text)))
            }
            (KeyCombo, CanonicalArg::Text(key)) => {
                self.run_checked(&Self::key_plan(key)?).await?;
                Ok(format!("Pressed key: {key}"))
            }
            (SystemControl, CanonicalArg::Token(token)) => {
                let (primary, fallback, message) = Self::system_plans(token)
                    .ok_or_else(|| {
                        ExecutorError::Failed(format!("Unknown system command: {token}"))
                    })?;
                self.run_with_fallback(&primary, fallback.as_ref()).await?;
                Ok(message.to_string())
            }
            (Screenshot, CanonicalArg::None) => {
                match self.run_checked(&self.screenshot_plan()).await {
                    Ok(()) => Ok(format!("Screenshot saved to {}", self.screenshot_path)),
                    Err(ExecutorError::Unavailable(_)) => Err(ExecutorError::Unavailable(
                        "'scrot' not found. Please install it.".to_string(),
                    )),
                    Err(e) => Err(e),
                }
            }
            _ => Err(wrong_argument(self.name())),
        }
    }
}

/// Map a human key name to xdotool's keysym vocabulary and validate the
/// chord. Parts are joined with `+` (`ctrl+shift+t`).
fn normalize_chord(key: &str) -> Result<String, ExecutorError> {
    let parts: Vec<String> = key
        .split('+')
        .map(|part| map_key_name(part.trim()))
        .collect::<Result<_, _>>()?;
    Ok(parts.join("+"))
}

fn map_key_name(name: &str) -> Result<String, ExecutorError> {
    let mapped = match name.to_lowercase().as_str() {
        "enter" | "return" => "Return".to_string(),
        "esc" | "escape" => "Escape".to_string(),
        "space" => "space".to_string(),
        "tab" => "Tab".to_string(),
        "backspace" => "BackSpace".to_string(),
        "delete" | "del" => "Delete".to_string(),
        "up" => "Up".to_string(),
        "down" => "Down".to_string(),
        "left" => "Left".to_string(),
        "right" => "Right".to_string(),
        "home" => "Home".to_string(),
        "end" => "End".to_string(),
        "pageup" => "Page_Up".to_string(),
        "pagedown" => "Page_Down".to_string(),
        "win" | "super" | "cmd" => "super".to_string(),
        "ctrl" | "control" => "ctrl".to_string(),
        "alt" => "alt".to_string(),
        "shift" => "shift".to_string(),
        _ => name.to_string(),
    };
    if !KEY_SEGMENT_RE.is_match(&mapped) {
        return Err(ExecutorError::Failed(format!("invalid key name: {name}")));
    }
    Ok(mapped)
}

fn preview(text: &str) -> String {
    let short: String = text.chars().take(30).collect();
    if short.len() < text.len() {
        format!("{short}...")
    } else {
        short
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn open_plan_is_the_bare_app() {
        let plan = DesktopExecutor::open_plan("gnome-calculator");
        assert_eq!(plan.program, "gnome-calculator");
        assert!(plan.args.is_empty());
    }

    #[test]
    fn type_plan_uses_xdotool_with_delay_and_guard() {
        let executor = DesktopExecutor::new("/tmp/shot.png");
        let plan = executor.type_plan("-hello");
        assert_eq!(plan.program, "xdotool");
        assert_eq!(plan.args, vec!["type", "--delay", "20", "--", "-hello"]);
    }

    #[test]
    fn key_plan_maps_common_names() {
        let plan = DesktopExecutor::key_plan("enter").unwrap();
        assert_eq!(plan.args, vec!["key", "Return"]);

        let plan = DesktopExecutor::key_plan("ctrl+c").unwrap();
        assert_eq!(plan.args, vec!["key", "ctrl+c"]);

        let plan = DesktopExecutor::key_plan("Ctrl + Shift + T").unwrap();
        assert_eq!(plan.args, vec!["key", "ctrl+shift+T"]);
    }

    #[test]
    fn key_plan_rejects_garbage() {
        assert!(DesktopExecutor::key_plan("not a key").is_err());
        assert!(DesktopExecutor::key_plan("c;d").is_err());
    }

    #[test]
    fn system_plans_match_the_verb_table() {
        let (primary, fallback, message) = DesktopExecutor::system_plans("lock").unwrap();
        assert_eq!(primary.program, "gnome-screensaver-command");
        assert_eq!(fallback.unwrap().program, "xdg-screensaver");
        assert_eq!(message, "Screen locked");

        let (primary, fallback, _) = DesktopExecutor::system_plans("mute").unwrap();
        assert_eq!(
            primary.args,
            vec!["-D", "pulse", "sset", "Master", "toggle"]
        );
        assert!(fallback.is_none());

        let (primary, _, message) = DesktopExecutor::system_plans("volume_up").unwrap();
        assert_eq!(primary.args, vec!["-D", "pulse", "sset", "Master", "5%+"]);
        assert_eq!(message, "Volume increased");

        assert!(DesktopExecutor::system_plans("reboot").is_none());
    }

    #[test]
    fn screenshot_plan_overwrites_configured_path() {
        let executor = DesktopExecutor::new("/tmp/vision.png");
        let plan = executor.screenshot_plan();
        assert_eq!(plan.program, "scrot");
        assert_eq!(plan.args, vec!["--overwrite", "/tmp/vision.png"]);
    }

    #[test]
    fn preview_truncates_long_text() {
        assert_eq!(preview("short"), "short");
        let long = "x".repeat(40);
        assert_eq!(preview(&long), format!("{}...", "x".repeat(30)));
    }
}
