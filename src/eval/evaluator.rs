use std::sync::Arc;

use thiserror::Error;

use super::context::ExecutionContext;
use super::statement::StatementEvaluator;
use crate::capability::CapabilityError;
use crate::parser::{parse_program, ParseError};

#[derive(Error, Debug)]
pub enum EvalError {
    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error("undefined variable: {0}")]
    UndefinedVariable(String),

    #[error("undefined shared value: {0}")]
    UndefinedShared(String),

    #[error("unknown function: {0}")]
    UnknownFunction(String),

    #[error("{function} expects {expected} arguments, got {got}")]
    ArityMismatch {
        function: String,
        expected: usize,
        got: usize,
    },

    #[error("type mismatch: expected {expected}, got {actual}")]
    TypeMismatch { expected: String, actual: String },

    #[error("invalid operation: {0}")]
    InvalidOperation(String),

    #[error("division by zero")]
    DivisionByZero,

    #[error("reply is only available while handling a message")]
    ReplyOutsideHandler,

    #[error("send failed: {0}")]
    Send(String),

    #[error("capability error: {0}")]
    Capability(#[from] CapabilityError),

    #[error("capability {name} installed; restart required")]
    RestartRequired { name: String },
}

impl EvalError {
    /// Set when a capability install just ran and the process must restart
    /// before the capability can be used. Not a fragment failure.
    pub fn restart_required(&self) -> Option<&str> {
        match self {
            EvalError::RestartRequired { name } => Some(name),
            _ => None,
        }
    }
}

pub type EvalResult<T> = Result<T, EvalError>;

/// Top level entry point: parses one code block and runs its statements.
#[derive(Default)]
pub struct Evaluator {
    statement_evaluator: StatementEvaluator,
}

impl Evaluator {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn eval_source(
        &self,
        source: &str,
        context: Arc<ExecutionContext>,
    ) -> EvalResult<()> {
        let program = parse_program(source)?;
        for statement in &program.statements {
            self.statement_evaluator
                .eval_statement(statement, context.clone())
                .await?;
        }
        Ok(())
    }

    pub async fn eval_block(
        &self,
        block: &crate::ast::Block,
        context: Arc<ExecutionContext>,
    ) -> EvalResult<()> {
        self.statement_evaluator.eval_block(block, context).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capability::{CapabilityManifest, CapabilityResolver};
    use crate::eval::expression::Value;
    use crate::gateway::MockChatGateway;
    use crate::router::HandlerRegistry;
    use dashmap::DashMap;

    struct Fixture {
        shared: Arc<DashMap<String, Value>>,
        registry: Arc<HandlerRegistry>,
        resolver: Arc<CapabilityResolver>,
    }

    impl Fixture {
        fn new(resolver: CapabilityResolver) -> Self {
            Self {
                shared: Arc::new(DashMap::new()),
                registry: Arc::new(HandlerRegistry::default()),
                resolver: Arc::new(resolver),
            }
        }

        fn context(&self) -> Arc<ExecutionContext> {
            Arc::new(ExecutionContext::for_fragment(
                self.shared.clone(),
                self.registry.clone(),
                self.resolver.clone(),
                Arc::new(MockChatGateway::new()),
                "m1".to_string(),
            ))
        }
    }

    fn fixture() -> Fixture {
        Fixture::new(CapabilityResolver::with_manifests(
            vec![CapabilityManifest {
                name: "text".to_string(),
                version: None,
                source: None,
            }],
            vec![],
        ))
    }

    #[tokio::test]
    async fn test_shared_assignment_and_arithmetic() {
        let fixture = fixture();
        let evaluator = Evaluator::new();
        evaluator
            .eval_source("let n = 2 + 3 * 4\nshared.n = n", fixture.context())
            .await
            .unwrap();
        assert_eq!(
            *fixture.shared.get("n").unwrap().value(),
            Value::Integer(14)
        );
    }

    #[tokio::test]
    async fn test_if_else_branching() {
        let fixture = fixture();
        let evaluator = Evaluator::new();
        evaluator
            .eval_source(
                "if 1 < 2 { shared.r = \"yes\" } else { shared.r = \"no\" }",
                fixture.context(),
            )
            .await
            .unwrap();
        assert_eq!(
            *fixture.shared.get("r").unwrap().value(),
            Value::String("yes".to_string())
        );
    }

    #[tokio::test]
    async fn test_shared_values_visible_across_contexts() {
        let fixture = fixture();
        let evaluator = Evaluator::new();
        evaluator
            .eval_source("shared.x = 1", fixture.context())
            .await
            .unwrap();
        // a fresh context over the same namespace sees the value
        evaluator
            .eval_source("shared.y = shared.x + 1", fixture.context())
            .await
            .unwrap();
        assert_eq!(*fixture.shared.get("y").unwrap().value(), Value::Integer(2));
    }

    #[tokio::test]
    async fn test_use_binds_capability_functions() {
        let fixture = fixture();
        let evaluator = Evaluator::new();
        evaluator
            .eval_source(
                "use text\nshared.loud = upper(\"hello\")",
                fixture.context(),
            )
            .await
            .unwrap();
        assert_eq!(
            *fixture.shared.get("loud").unwrap().value(),
            Value::String("HELLO".to_string())
        );
    }

    #[tokio::test]
    async fn test_capability_functions_do_not_leak_across_contexts() {
        let fixture = fixture();
        let evaluator = Evaluator::new();
        evaluator
            .eval_source("use text", fixture.context())
            .await
            .unwrap();
        let err = evaluator
            .eval_source("upper(\"hello\")", fixture.context())
            .await
            .unwrap_err();
        assert!(matches!(err, EvalError::UnknownFunction(_)));
    }

    #[tokio::test]
    async fn test_on_message_registers_handler() {
        let fixture = fixture();
        let evaluator = Evaluator::new();
        evaluator
            .eval_source("on message { reply(\"hi\") }", fixture.context())
            .await
            .unwrap();
        assert_eq!(fixture.registry.len().await, 1);
    }

    #[tokio::test]
    async fn test_uninstalled_capability_requests_restart() {
        let fixture = Fixture::new(CapabilityResolver::with_manifests(
            vec![],
            vec!["true".to_string()],
        ));
        let evaluator = Evaluator::new();
        let err = evaluator
            .eval_source("use jq", fixture.context())
            .await
            .unwrap_err();
        assert_eq!(err.restart_required(), Some("jq"));
    }

    #[tokio::test]
    async fn test_division_by_zero() {
        let fixture = fixture();
        let evaluator = Evaluator::new();
        let err = evaluator
            .eval_source("shared.x = 1 / 0", fixture.context())
            .await
            .unwrap_err();
        assert!(matches!(err, EvalError::DivisionByZero));
    }

    #[tokio::test]
    async fn test_parse_failure_is_an_eval_error() {
        let fixture = fixture();
        let evaluator = Evaluator::new();
        let err = evaluator
            .eval_source("let = broken", fixture.context())
            .await
            .unwrap_err();
        assert!(matches!(err, EvalError::Parse(_)));
    }

    #[tokio::test]
    async fn test_builtins() {
        let fixture = fixture();
        let evaluator = Evaluator::new();
        evaluator
            .eval_source(
                "shared.a = len(\"abc\")\nshared.b = str(42)\nshared.c = contains(\"haystack\", \"hay\")",
                fixture.context(),
            )
            .await
            .unwrap();
        assert_eq!(*fixture.shared.get("a").unwrap().value(), Value::Integer(3));
        assert_eq!(
            *fixture.shared.get("b").unwrap().value(),
            Value::String("42".to_string())
        );
        assert_eq!(
            *fixture.shared.get("c").unwrap().value(),
            Value::Boolean(true)
        );
    }
}
