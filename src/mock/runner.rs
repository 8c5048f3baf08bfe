//! Scripted kubectl runner

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use crate::cluster::{CommandOutput, CommandRunner, Invocation, RunnerError};

use super::next_reply;

/// What a scripted invocation produces
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunnerReply {
    Output(CommandOutput),
    /// Behave as if the per-invocation timeout fired
    Timeout,
}

#[derive(Debug, Default)]
struct Script {
    replies: HashMap<String, VecDeque<RunnerReply>>,
    calls: Vec<Invocation>,
}

/// Command runner answering from a script.
///
/// Keys are the invocation's arguments joined by single spaces, program
/// excluded (`get model iris -n seldon-mesh -o json`). Unscripted
/// invocations exit 1 with `unscripted: <key>` on stderr.
#[derive(Debug, Default)]
pub struct ScriptedRunner {
    script: Mutex<Script>,
}

impl ScriptedRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a reply for `key`
    pub fn respond(&self, key: &str, output: CommandOutput) {
        self.push(key, RunnerReply::Output(output));
    }

    /// Append several replies for `key`, consumed in order
    pub fn respond_sequence(&self, key: &str, outputs: Vec<CommandOutput>) {
        for output in outputs {
            self.respond(key, output);
        }
    }

    /// Make `key` time out
    pub fn time_out(&self, key: &str) {
        self.push(key, RunnerReply::Timeout);
    }

    fn push(&self, key: &str, reply: RunnerReply) {
        if let Ok(mut script) = self.script.lock() {
            script.replies.entry(key.to_string()).or_default().push_back(reply);
        }
    }

    /// Every invocation seen so far, in order
    pub fn calls(&self) -> Vec<Invocation> {
        self.script.lock().map(|s| s.calls.clone()).unwrap_or_default()
    }

    /// Number of invocations whose key starts with `prefix`
    pub fn count_calls(&self, prefix: &str) -> usize {
        self.calls()
            .iter()
            .filter(|c| c.args.join(" ").starts_with(prefix))
            .count()
    }
}

impl CommandRunner for ScriptedRunner {
    fn run(&self, invocation: &Invocation) -> Result<CommandOutput, RunnerError> {
        let key = invocation.args.join(" ");
        let reply = match self.script.lock() {
            Ok(mut script) => {
                script.calls.push(invocation.clone());
                script.replies.get_mut(&key).and_then(next_reply)
            }
            Err(_) => None,
        };

        match reply {
            Some(RunnerReply::Output(output)) => Ok(output),
            Some(RunnerReply::Timeout) => Err(RunnerError::Timeout {
                command: invocation.display(),
                seconds: 30,
            }),
            None => Ok(CommandOutput::failed(1, format!("unscripted: {}", key))),
        }
    }
}
