//! Per-task retry and host-failover state machine.
//!
//! A task walks the download hosts in order (CDN subdomains, then the base
//! domain). When every host has failed it waits and starts a new cycle from
//! the first host, up to the retry ceiling.

use super::stream::FailureClass;

/// What the worker should do after a failed attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// Try the next host immediately, same retry count.
    NextHost,
    /// Sleep the retry delay, then start over from the first host.
    RetryAfterDelay,
    /// Stop and report the task as failed for this pass.
    GiveUp,
    /// Stop and blacklist the path permanently.
    Blacklist,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AttemptState {
    /// Completed host cycles that ended in failure.
    pub retry: u32,
    /// Index into the download host list.
    pub host_index: usize,
    /// Attempts made so far, across all cycles.
    pub attempts: u32,
}

impl AttemptState {
    /// Record a failed attempt and decide the next step.
    pub fn advance(&mut self, class: FailureClass, host_count: usize, max_retries: u32) -> Transition {
        self.attempts += 1;
        match class {
            FailureClass::OriginPermanent => Transition::Blacklist,
            FailureClass::Local => Transition::GiveUp,
            FailureClass::Transient => {
                if self.host_index + 1 < host_count {
                    self.host_index += 1;
                    Transition::NextHost
                } else if self.retry < max_retries {
                    self.retry += 1;
                    self.host_index = 0;
                    Transition::RetryAfterDelay
                } else {
                    Transition::GiveUp
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cycles_hosts_then_retries() {
        let mut state = AttemptState::default();
        let mut transitions = Vec::new();
        loop {
            let t = state.advance(FailureClass::Transient, 3, 2);
            transitions.push(t);
            if t == Transition::GiveUp {
                break;
            }
        }
        use Transition::*;
        assert_eq!(
            transitions,
            [
                NextHost,
                NextHost,
                RetryAfterDelay,
                NextHost,
                NextHost,
                RetryAfterDelay,
                NextHost,
                NextHost,
                GiveUp
            ]
        );
        assert_eq!(state.attempts, 9);
        assert_eq!(state.retry, 2);
    }

    #[test]
    fn test_retry_restarts_at_first_host() {
        let mut state = AttemptState::default();
        assert_eq!(state.advance(FailureClass::Transient, 2, 3), Transition::NextHost);
        assert_eq!(state.host_index, 1);
        assert_eq!(
            state.advance(FailureClass::Transient, 2, 3),
            Transition::RetryAfterDelay
        );
        assert_eq!(state.host_index, 0);
        assert_eq!(state.retry, 1);
    }

    #[test]
    fn test_origin_error_blacklists_immediately() {
        let mut state = AttemptState::default();
        assert_eq!(
            state.advance(FailureClass::OriginPermanent, 5, 3),
            Transition::Blacklist
        );
    }

    #[test]
    fn test_local_error_does_not_cycle_hosts() {
        let mut state = AttemptState::default();
        assert_eq!(state.advance(FailureClass::Local, 5, 3), Transition::GiveUp);
        assert_eq!(state.host_index, 0);
    }

    #[test]
    fn test_single_host_zero_retries() {
        let mut state = AttemptState::default();
        assert_eq!(state.advance(FailureClass::Transient, 1, 0), Transition::GiveUp);
    }
}
