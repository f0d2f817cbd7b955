use std::path::PathBuf;

use clap::Parser;

use crate::app::CoordinatorEvent;
use crate::config::Config;
use crate::upload::RedactionLevel;

/// Command-line arguments. Anything given here overrides the config file.
#[derive(Parser, Debug, Default)]
#[command(name = "pii-guard")]
#[command(about = "Upload documents for PII redaction and watch live transcription alerts")]
#[command(version)]
pub struct Args {
    /// Base URL of the redaction service
    #[arg(long, env = "PII_GUARD_SERVER")]
    pub server: Option<String>,

    /// Initial redaction level (basic, intermediate, critical)
    #[arg(long)]
    pub level: Option<RedactionLevel>,

    /// Disable the audible alert for live PII hits
    #[arg(long)]
    pub no_sound: bool,

    /// Reconnect attempts before the event channel gives up
    #[arg(long)]
    pub reconnect_attempts: Option<u32>,

    /// Delay between reconnect attempts in milliseconds
    #[arg(long)]
    pub reconnect_delay_ms: Option<u64>,

    /// Write the effective configuration back to the config file
    #[arg(long)]
    pub save_config: bool,
}

impl Args {
    pub fn apply(&self, config: &mut Config) {
        if let Some(server) = &self.server {
            config.server_url = server.clone();
        }
        if let Some(level) = self.level {
            config.default_level = level;
        }
        if self.no_sound {
            config.alert_sound = false;
        }
        if let Some(attempts) = self.reconnect_attempts {
            config.reconnect.attempts = attempts;
        }
        if let Some(delay) = self.reconnect_delay_ms {
            config.reconnect.delay_ms = delay;
        }
    }
}

/// One line typed at the prompt.
#[derive(Debug, PartialEq)]
pub enum Command {
    Upload {
        path: Option<PathBuf>,
        level: Option<RedactionLevel>,
    },
    /// Forwarded to the coordinator as-is.
    Send(CommandEvent),
    Status,
    Help,
    Quit,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CommandEvent {
    SetLevel(RedactionLevel),
    Start,
    Stop,
    Toggle,
}

impl From<CommandEvent> for CoordinatorEvent {
    fn from(event: CommandEvent) -> Self {
        match event {
            CommandEvent::SetLevel(level) => CoordinatorEvent::SetLevel(level),
            CommandEvent::Start => CoordinatorEvent::StartSession,
            CommandEvent::Stop => CoordinatorEvent::StopSession,
            CommandEvent::Toggle => CoordinatorEvent::ToggleSession,
        }
    }
}

pub const HELP: &str = "\
Commands:
  upload [PATH] [LEVEL]   upload a document (LEVEL: basic, intermediate, critical)
  level LEVEL             select the redaction level for later uploads
  start | stop | toggle   control live transcription
  status                  show the current state
  help                    show this help
  quit                    exit";

pub fn parse_command(line: &str) -> Result<Option<Command>, String> {
    let mut words = line.split_whitespace();
    let Some(verb) = words.next() else {
        return Ok(None);
    };
    let args: Vec<&str> = words.collect();

    let command = match (verb.to_ascii_lowercase().as_str(), args.as_slice()) {
        ("upload", []) => Command::Upload {
            path: None,
            level: None,
        },
        ("upload", [path]) => Command::Upload {
            path: Some(PathBuf::from(path)),
            level: None,
        },
        ("upload", [path, level]) => Command::Upload {
            path: Some(PathBuf::from(path)),
            level: Some(level.parse()?),
        },
        ("level", [level]) => Command::Send(CommandEvent::SetLevel(level.parse()?)),
        ("start", []) => Command::Send(CommandEvent::Start),
        ("stop", []) => Command::Send(CommandEvent::Stop),
        ("toggle", []) => Command::Send(CommandEvent::Toggle),
        ("status", []) => Command::Status,
        ("help" | "?", _) => Command::Help,
        ("quit" | "exit", []) => Command::Quit,
        (other, _) => return Err(format!("Unrecognized command '{other}'. Type 'help'.")),
    };
    Ok(Some(command))
}
