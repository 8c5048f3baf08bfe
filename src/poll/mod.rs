//! Readiness poller
//!
//! Queries a resource's status once per attempt, up to `max_attempts`,
//! sleeping a fixed interval between attempts. A success token ends the
//! poll as Ready, a failure token as Failed; running out of attempts is
//! TimedOut. A query that fails to run or returns unparseable output is
//! inconclusive: it uses up an attempt, is counted, and polling continues.

use std::fmt;
use std::time::Duration;

use mesh_manifest::ResourceKind;
use mesh_report::{DeploymentRecord, DeploymentState};
use serde_json::Value;
use tracing::{debug, warn};

use crate::cluster::{ClusterResult, Kubectl, StatusRule, StatusTokens, Terminal};

/// Blocking sleep primitive, injectable for tests
pub trait Sleeper: Send + Sync {
    fn sleep(&self, duration: Duration);
}

/// Sleeps the current thread
#[derive(Debug, Clone, Copy, Default)]
pub struct ThreadSleeper;

impl Sleeper for ThreadSleeper {
    fn sleep(&self, duration: Duration) {
        std::thread::sleep(duration);
    }
}

/// Invalid poll parameters
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum CheckError {
    #[error("poll interval must be greater than zero")]
    ZeroInterval,

    #[error("max attempts must be greater than zero")]
    ZeroAttempts,
}

/// What to poll and for how long
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceCheck {
    kind: ResourceKind,
    name: String,
    namespace: String,
    poll_interval: Duration,
    max_attempts: u32,
}

impl ResourceCheck {
    pub fn new(
        kind: ResourceKind,
        name: impl Into<String>,
        namespace: impl Into<String>,
        poll_interval: Duration,
        max_attempts: u32,
    ) -> Result<Self, CheckError> {
        if poll_interval.is_zero() {
            return Err(CheckError::ZeroInterval);
        }
        if max_attempts == 0 {
            return Err(CheckError::ZeroAttempts);
        }
        Ok(Self {
            kind,
            name: name.into(),
            namespace: namespace.into(),
            poll_interval,
            max_attempts,
        })
    }

    pub fn kind(&self) -> ResourceKind {
        self.kind
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }
}

/// Terminal poll outcome
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceOutcome {
    Ready,
    Failed,
    TimedOut,
}

impl ResourceOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceOutcome::Ready => "ready",
            ResourceOutcome::Failed => "failed",
            ResourceOutcome::TimedOut => "timed out",
        }
    }
}

impl fmt::Display for ResourceOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<ResourceOutcome> for DeploymentState {
    fn from(outcome: ResourceOutcome) -> Self {
        match outcome {
            ResourceOutcome::Ready => DeploymentState::Ready,
            ResourceOutcome::Failed => DeploymentState::Failed,
            ResourceOutcome::TimedOut => DeploymentState::TimedOut,
        }
    }
}

/// Everything observed during one poll
#[derive(Debug, Clone, PartialEq)]
pub struct PollResult {
    pub outcome: ResourceOutcome,
    /// Status queries issued
    pub attempts: u32,
    /// Queries that failed to run or parse
    pub query_failures: u32,
    /// Last status string extracted, if any
    pub last_status: Option<String>,
    /// Last raw resource document successfully fetched
    pub raw: Option<Value>,
    /// Message of the most recent query failure
    pub last_error: Option<String>,
}

impl PollResult {
    pub fn to_record(&self) -> DeploymentRecord {
        let detail = match (&self.last_status, &self.last_error) {
            (Some(status), _) if self.outcome != ResourceOutcome::TimedOut => {
                Some(format!("status {}", status))
            }
            (status, Some(error)) => Some(match status {
                Some(status) => format!("last status {}; last query error: {}", status, error),
                None => format!("last query error: {}", error),
            }),
            (Some(status), None) => Some(format!("last status {}", status)),
            (None, None) => None,
        };
        DeploymentRecord {
            state: self.outcome.into(),
            attempts: self.attempts,
            query_failures: self.query_failures,
            detail,
        }
    }
}

/// Poll until a terminal status or `max_attempts` queries.
///
/// `query` fetches the raw resource; `extract` maps it to a status string.
/// The sleep happens between attempts, never after the last one.
pub fn poll<Q, E, Err>(
    check: &ResourceCheck,
    tokens: &StatusTokens,
    mut query: Q,
    extract: E,
    sleeper: &dyn Sleeper,
) -> PollResult
where
    Q: FnMut() -> Result<Value, Err>,
    E: Fn(&Value) -> Option<String>,
    Err: fmt::Display,
{
    let mut result = PollResult {
        outcome: ResourceOutcome::TimedOut,
        attempts: 0,
        query_failures: 0,
        last_status: None,
        raw: None,
        last_error: None,
    };

    for attempt in 1..=check.max_attempts {
        if attempt > 1 {
            sleeper.sleep(check.poll_interval);
        }
        result.attempts = attempt;

        match query() {
            Ok(raw) => {
                let status = extract(&raw);
                debug!(
                    kind = %check.kind,
                    name = %check.name,
                    attempt,
                    status = status.as_deref().unwrap_or("<none>"),
                    "polled"
                );
                result.raw = Some(raw);
                if let Some(status) = status {
                    let terminal = tokens.classify(&status);
                    result.last_status = Some(status);
                    match terminal {
                        Some(Terminal::Success) => {
                            result.outcome = ResourceOutcome::Ready;
                            return result;
                        }
                        Some(Terminal::Failure) => {
                            result.outcome = ResourceOutcome::Failed;
                            return result;
                        }
                        None => {}
                    }
                }
            }
            Err(e) => {
                warn!(
                    kind = %check.kind,
                    name = %check.name,
                    attempt,
                    error = %e,
                    "status query failed"
                );
                result.query_failures += 1;
                result.last_error = Some(e.to_string());
            }
        }
    }

    result
}

impl Kubectl {
    /// Poll a mesh resource through `kubectl get -o json`
    pub fn poll_resource(
        &self,
        check: &ResourceCheck,
        rule: StatusRule,
        tokens: &StatusTokens,
        sleeper: &dyn Sleeper,
    ) -> PollResult {
        let query = || -> ClusterResult<Value> {
            self.get_json(check.kind().cli_name(), check.name(), Some(check.namespace()))
        };
        poll(check, tokens, query, |raw| rule.extract(raw), sleeper)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::RecordingSleeper;
    use serde_json::json;
    use std::cell::Cell;

    fn check(max_attempts: u32) -> ResourceCheck {
        ResourceCheck::new(
            ResourceKind::Model,
            "iris",
            "seldon-mesh",
            Duration::from_secs(5),
            max_attempts,
        )
        .unwrap()
    }

    fn state(s: &str) -> Value {
        json!({"status": {"state": s}})
    }

    #[test]
    fn test_check_rejects_zero_values() {
        assert_eq!(
            ResourceCheck::new(ResourceKind::Model, "m", "ns", Duration::ZERO, 3),
            Err(CheckError::ZeroInterval)
        );
        assert_eq!(
            ResourceCheck::new(ResourceKind::Model, "m", "ns", Duration::from_secs(1), 0),
            Err(CheckError::ZeroAttempts)
        );
    }

    #[test]
    fn test_never_terminal_times_out_after_exactly_n_queries() {
        for n in [1u32, 2, 7, 30] {
            let queries = Cell::new(0u32);
            let sleeper = RecordingSleeper::new();

            let result = poll(
                &check(n),
                &StatusTokens::default(),
                || {
                    queries.set(queries.get() + 1);
                    Ok::<_, String>(state("ModelProgressing"))
                },
                |raw| StatusRule::State.extract(raw),
                &sleeper,
            );

            assert_eq!(result.outcome, ResourceOutcome::TimedOut);
            assert_eq!(queries.get(), n);
            assert_eq!(result.attempts, n);
            assert_eq!(sleeper.count() as u32, n - 1);
            assert_eq!(result.last_status.as_deref(), Some("ModelProgressing"));
        }
    }

    #[test]
    fn test_success_on_attempt_k_stops_querying() {
        let n = 10;
        for k in 1..=n {
            let queries = Cell::new(0u32);
            let result = poll(
                &check(n),
                &StatusTokens::default(),
                || {
                    queries.set(queries.get() + 1);
                    let s = if queries.get() == k { "ModelReady" } else { "Pending" };
                    Ok::<_, String>(state(s))
                },
                |raw| StatusRule::State.extract(raw),
                &RecordingSleeper::new(),
            );

            assert_eq!(result.outcome, ResourceOutcome::Ready);
            assert_eq!(queries.get(), k);
            assert_eq!(result.attempts, k);
        }
    }

    #[test]
    fn test_failure_on_attempt_k_stops_querying() {
        let n = 6;
        for k in 1..=n {
            let queries = Cell::new(0u32);
            let result = poll(
                &check(n),
                &StatusTokens::default(),
                || {
                    queries.set(queries.get() + 1);
                    let s = if queries.get() == k { "ModelFailed" } else { "Pending" };
                    Ok::<_, String>(state(s))
                },
                |raw| StatusRule::State.extract(raw),
                &RecordingSleeper::new(),
            );

            assert_eq!(result.outcome, ResourceOutcome::Failed);
            assert_eq!(queries.get(), k);
        }
    }

    #[test]
    fn test_query_errors_are_inconclusive() {
        let queries = Cell::new(0u32);
        let result = poll(
            &check(5),
            &StatusTokens::default(),
            || {
                queries.set(queries.get() + 1);
                match queries.get() {
                    1 | 2 => Err("kubectl timed out".to_string()),
                    3 => Ok(json!({"not": "a status"})),
                    _ => Ok(state("Ready")),
                }
            },
            |raw| StatusRule::State.extract(raw),
            &RecordingSleeper::new(),
        );

        assert_eq!(result.outcome, ResourceOutcome::Ready);
        assert_eq!(result.attempts, 4);
        assert_eq!(result.query_failures, 2);
        assert_eq!(result.last_error.as_deref(), Some("kubectl timed out"));
    }

    #[test]
    fn test_all_queries_failing_times_out_with_detail() {
        let result = poll(
            &check(3),
            &StatusTokens::default(),
            || Err::<Value, _>("parse failure".to_string()),
            |raw| StatusRule::State.extract(raw),
            &RecordingSleeper::new(),
        );

        assert_eq!(result.outcome, ResourceOutcome::TimedOut);
        assert_eq!(result.query_failures, 3);

        let record = result.to_record();
        assert_eq!(record.state, DeploymentState::TimedOut);
        assert_eq!(record.attempts, 3);
        assert_eq!(record.query_failures, 3);
        assert_eq!(record.detail.as_deref(), Some("last query error: parse failure"));
    }

    #[test]
    fn test_sleeps_use_check_interval() {
        let sleeper = RecordingSleeper::new();
        poll(
            &check(3),
            &StatusTokens::default(),
            || Ok::<_, String>(state("Pending")),
            |raw| StatusRule::State.extract(raw),
            &sleeper,
        );

        assert_eq!(sleeper.sleeps(), vec![Duration::from_secs(5); 2]);
    }
}
