//! Directive dispatch.
//!
//! The router owns the kind-to-executor bindings and enforces the hard cap
//! of one executed directive per turn segment. Executor failures are not
//! errors at this layer: they become failure observations that flow back to
//! the model, which gets the chance to react. The only error the router
//! raises itself is the per-segment limit.

use std::collections::HashMap;
use std::sync::Arc;

use crate::directive::{DirectiveKind, Observation};
use crate::error::SylphError;
use crate::executors::Executor;
use crate::policy::ValidatedDirective;
use crate::turn::TurnState;

/// Routes validated directives to their bound executors.
#[derive(Default)]
pub struct DispatchRouter {
    executors: HashMap<DirectiveKind, Arc<dyn Executor>>,
}

impl DispatchRouter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind an executor to a kind, replacing any previous binding.
    pub fn bind(&mut self, kind: DirectiveKind, executor: Arc<dyn Executor>) -> &mut Self {
        self.executors.insert(kind, executor);
        self
    }

    pub fn is_bound(&self, kind: DirectiveKind) -> bool {
        self.executors.contains_key(&kind)
    }

    /// Execute one directive and wrap the outcome as an [`Observation`].
    ///
    /// Fails only with [`SylphError::TurnLimitExceeded`] when this segment
    /// already executed a directive. The counter is taken before the
    /// executor runs, so a failing executor still consumes the segment's
    /// slot.
    pub async fn dispatch(
        &self,
        directive: &ValidatedDirective,
        state: &mut TurnState,
    ) -> Result<Observation, SylphError> {
        if state.directives_executed >= 1 {
            return Err(SylphError::TurnLimitExceeded);
        }
        state.directives_executed += 1;

        let kind = directive.kind();
        let Some(executor) = self.executors.get(&kind) else {
            tracing::warn!(kind = %kind, "no executor bound");
            return Ok(Observation::failure(
                Some(kind),
                format!("No executor available for {kind}"),
            ));
        };

        tracing::info!(kind = %kind, executor = executor.name(), "dispatching directive");
        match executor.execute(directive).await {
            Ok(message) => {
                tracing::debug!(kind = %kind, "directive succeeded");
                Ok(Observation::success(kind, message))
            }
            Err(e) => {
                tracing::warn!(kind = %kind, error = %e, "directive failed");
                Ok(Observation::failure(Some(kind), e.to_string()))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ExecutorError;
    use crate::policy::PolicyEngine;
    use async_trait::async_trait;

    struct StaticExecutor {
        reply: Result<&'static str, &'static str>,
    }

    #[async_trait]
    impl Executor for StaticExecutor {
        fn name(&self) -> &'static str {
            "static"
        }

        async fn execute(&self, _d: &ValidatedDirective) -> Result<String, ExecutorError> {
            self.reply
                .map(str::to_string)
                .map_err(|m| ExecutorError::Failed(m.to_string()))
        }
    }

    fn screenshot_directive() -> ValidatedDirective {
        let engine = PolicyEngine::with_defaults();
        let candidate = crate::directive::RawDirectiveCandidate {
            kind_token: "SCREENSHOT".to_string(),
            raw_argument: String::new(),
            start_offset: 0,
            end_offset: 0,
        };
        engine.validate_candidate(&candidate).unwrap()
    }

    #[tokio::test]
    async fn success_becomes_a_success_observation() {
        let mut router = DispatchRouter::new();
        router.bind(
            DirectiveKind::Screenshot,
            Arc::new(StaticExecutor { reply: Ok("saved") }),
        );
        let mut state = TurnState::new();

        let obs = router
            .dispatch(&screenshot_directive(), &mut state)
            .await
            .unwrap();

        assert!(obs.success);
        assert_eq!(obs.message, "saved");
        assert_eq!(obs.kind, Some(DirectiveKind::Screenshot));
        assert_eq!(state.directives_executed, 1);
    }

    #[tokio::test]
    async fn executor_failure_becomes_a_failure_observation() {
        let mut router = DispatchRouter::new();
        router.bind(
            DirectiveKind::Screenshot,
            Arc::new(StaticExecutor { reply: Err("display gone") }),
        );
        let mut state = TurnState::new();

        let obs = router
            .dispatch(&screenshot_directive(), &mut state)
            .await
            .unwrap();

        assert!(!obs.success);
        assert_eq!(obs.message, "display gone");
        assert_eq!(state.directives_executed, 1);
    }

    #[tokio::test]
    async fn second_dispatch_in_a_segment_is_refused() {
        let mut router = DispatchRouter::new();
        router.bind(
            DirectiveKind::Screenshot,
            Arc::new(StaticExecutor { reply: Ok("saved") }),
        );
        let mut state = TurnState::new();
        let directive = screenshot_directive();

        router.dispatch(&directive, &mut state).await.unwrap();
        let err = router.dispatch(&directive, &mut state).await.unwrap_err();

        assert!(matches!(err, SylphError::TurnLimitExceeded));
        assert_eq!(state.directives_executed, 1);
    }

    #[tokio::test]
    async fn missing_binding_still_consumes_the_slot() {
        let router = DispatchRouter::new();
        let mut state = TurnState::new();

        let obs = router
            .dispatch(&screenshot_directive(), &mut state)
            .await
            .unwrap();

        assert!(!obs.success);
        assert!(obs.message.contains("No executor available"));
        assert_eq!(state.directives_executed, 1);
    }
}
