//! The built-in `ping` command (SPEC_FULL.md §A.6): a trivial
//! liveness check with no cooldown and no channel restriction.

use async_trait::async_trait;

use super::{Command, Cooldown};
use crate::message::MeshMessage;

pub struct PingCommand {
    cooldown: Cooldown,
}

impl PingCommand {
    pub fn new() -> Self {
        Self { cooldown: Cooldown::none() }
    }
}

impl Default for PingCommand {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Command for PingCommand {
    fn name(&self) -> &str {
        "ping"
    }

    fn keywords(&self) -> &[&str] {
        &["ping"]
    }

    fn category(&self) -> &str {
        "system"
    }

    fn description(&self) -> &str {
        "Replies Pong! to check whether the bot is responsive."
    }

    fn short_description(&self) -> Option<&str> {
        Some("liveness check")
    }

    fn cooldown(&self) -> &Cooldown {
        &self.cooldown
    }

    async fn execute(&self, _message: &MeshMessage) -> bool {
        true
    }

    fn get_response_format(&self, _message: &MeshMessage) -> Option<String> {
        Some("Pong!".to_string())
    }
}
