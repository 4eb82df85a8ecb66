use thiserror::Error;

use crate::capability::CapabilityError;
use crate::config::ConfigError;
use crate::engine::EngineError;
use crate::eval::evaluator::EvalError;
use crate::gateway::GatewayError;
use crate::parser::ParseError;
use crate::router::RouterError;
use crate::system::SystemError;

#[derive(Error, Debug)]
pub enum Error {
    #[error("system error: {0}")]
    System(#[from] SystemError),
    #[error("engine error: {0}")]
    Engine(#[from] EngineError),
    #[error("router error: {0}")]
    Router(#[from] RouterError),
    #[error("config error: {0}")]
    Config(#[from] ConfigError),
    // script errors
    #[error("parse error: {0}")]
    Parse(#[from] ParseError),
    #[error("eval error: {0}")]
    Eval(#[from] EvalError),
    #[error("capability error: {0}")]
    Capability(#[from] CapabilityError),
    // gateway boundary
    #[error("gateway error: {0}")]
    Gateway(#[from] GatewayError),

    #[error("internal error: {0}")]
    Internal(String),
}

pub type SaiseiResult<T> = Result<T, Error>;

impl Error {
    pub fn internal<S: Into<String>>(message: S) -> Self {
        Error::Internal(message.into())
    }

    /// Whether the process should exit with the restart status rather than
    /// a failure status.
    pub fn is_restart(&self) -> bool {
        matches!(self, Error::System(e) if e.is_restart())
    }
}
