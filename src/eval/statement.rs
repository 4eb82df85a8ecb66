use std::sync::Arc;

use async_recursion::async_recursion;

use super::context::ExecutionContext;
use super::evaluator::{EvalError, EvalResult};
use super::expression::ExpressionEvaluator;
use crate::ast::{AssignTarget, Block, Statement};
use crate::capability::Resolution;

pub struct StatementEvaluator {
    pub expression_evaluator: Arc<ExpressionEvaluator>,
}

impl Default for StatementEvaluator {
    fn default() -> Self {
        Self {
            expression_evaluator: Arc::new(ExpressionEvaluator::new()),
        }
    }
}

impl StatementEvaluator {
    pub fn new(expression_evaluator: Arc<ExpressionEvaluator>) -> Self {
        Self {
            expression_evaluator,
        }
    }

    #[async_recursion]
    pub async fn eval_statement(
        &self,
        statement: &Statement,
        context: Arc<ExecutionContext>,
    ) -> EvalResult<()> {
        match statement {
            Statement::Let { name, value } => {
                let value = self
                    .expression_evaluator
                    .eval_expression(value, context.clone())
                    .await?;
                context.define_local(name.clone(), value).await;
                Ok(())
            }
            Statement::Assignment { target, value } => {
                let value = self
                    .expression_evaluator
                    .eval_expression(value, context.clone())
                    .await?;
                match target {
                    AssignTarget::Shared(name) => context.shared_set(name.clone(), value),
                    AssignTarget::Local(name) => context.assign_local(name.clone(), value).await,
                }
                Ok(())
            }
            Statement::Expression(expr) => {
                self.expression_evaluator
                    .eval_expression(expr, context)
                    .await?;
                Ok(())
            }
            Statement::If {
                condition,
                then_block,
                else_block,
            } => {
                self.eval_if(condition, then_block, else_block.as_ref(), context)
                    .await
            }
            Statement::On { selector, block } => {
                context
                    .register_handler(selector.clone(), block.clone())
                    .await;
                Ok(())
            }
            Statement::Use { name, source } => {
                let resolution = context
                    .resolver()
                    .resolve(name, source.as_deref())
                    .await?;
                match resolution {
                    Resolution::Ready(handle) => {
                        context.bind_functions(&handle).await;
                        Ok(())
                    }
                    Resolution::NeedsRestart => {
                        Err(EvalError::RestartRequired { name: name.clone() })
                    }
                }
            }
        }
    }

    async fn eval_if(
        &self,
        condition: &crate::ast::Expression,
        then_block: &Block,
        else_block: Option<&Block>,
        context: Arc<ExecutionContext>,
    ) -> EvalResult<()> {
        let condition = self
            .expression_evaluator
            .eval_expression(condition, context.clone())
            .await?
            .as_bool()?;

        let branch = if condition {
            Some(then_block)
        } else {
            else_block
        };
        let Some(branch) = branch else {
            return Ok(());
        };

        context.push_scope().await;
        let result = self.eval_block(branch, context.clone()).await;
        context.pop_scope().await;
        result
    }

    pub async fn eval_block(&self, block: &Block, context: Arc<ExecutionContext>) -> EvalResult<()> {
        for statement in &block.statements {
            self.eval_statement(statement, context.clone()).await?;
        }
        Ok(())
    }
}
