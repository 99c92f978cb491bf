//! Scripted command executor for adapter unit tests.

use async_trait::async_trait;
use std::sync::Mutex;

use shipit_core::CollaboratorResult;

use crate::command::CommandSpec;
use crate::runner::{CommandExecutor, CommandOutput};

struct Rule {
    prefix: String,
    output: CommandOutput,
}

/// Answers commands by the longest matching prefix; unmatched commands succeed
/// with empty output. Every command line is journaled.
#[derive(Default)]
pub struct ScriptedExecutor {
    rules: Mutex<Vec<Rule>>,
    journal: Mutex<Vec<String>>,
}

impl ScriptedExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn respond(&self, prefix: &str, exit_code: i32, stdout: &str, stderr: &str) {
        self.rules.lock().unwrap().push(Rule {
            prefix: prefix.to_string(),
            output: CommandOutput {
                exit_code,
                stdout: stdout.to_string(),
                stderr: stderr.to_string(),
                duration_ms: 0,
            },
        });
    }

    pub fn commands(&self) -> Vec<String> {
        self.journal.lock().unwrap().clone()
    }
}

#[async_trait]
impl CommandExecutor for ScriptedExecutor {
    async fn execute(&self, spec: &CommandSpec) -> CollaboratorResult<CommandOutput> {
        let line = spec.to_string();
        self.journal.lock().unwrap().push(line.clone());

        let rules = self.rules.lock().unwrap();
        let output = rules
            .iter()
            .filter(|r| line.starts_with(&r.prefix))
            .max_by_key(|r| r.prefix.len())
            .map(|r| r.output.clone())
            .unwrap_or(CommandOutput {
                exit_code: 0,
                stdout: String::new(),
                stderr: String::new(),
                duration_ms: 0,
            });
        Ok(output)
    }
}
