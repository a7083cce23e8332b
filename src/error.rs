//! Crate-wide error type for node construction, flow execution and loading

use thiserror::Error;

use crate::expression::{EvalError, ExpressionError};

pub type Result<T, E = FlowError> = std::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum FlowError {
    /* ===================== Construction ===================== */
    #[error("node '{node}': missing required parameter '{param}'")]
    MissingParameter { node: String, param: String },

    #[error("node '{node}': parameter '{param}' failed to compile: {source}")]
    Compile {
        node: String,
        param: String,
        #[source]
        source: ExpressionError,
    },

    #[error("unknown node type '{0}'")]
    UnknownNodeType(String),

    #[error("parent node '{parent}' of '{node}' does not exist")]
    UnknownParent { node: String, parent: String },

    /* ===================== Resolution ===================== */
    #[error("node '{node}': failed to resolve '{param}': {source}")]
    Eval {
        node: String,
        param: String,
        #[source]
        source: EvalError,
    },

    #[error("node '{node}': {source}")]
    Expression {
        node: String,
        #[source]
        source: ExpressionError,
    },

    #[error("node '{node}': parameter '{param}' {message}")]
    InvalidParameter {
        node: String,
        param: String,
        message: String,
    },

    #[error("node '{node}': {message}")]
    InvalidValue { node: String, message: String },

    /* ===================== Data Integrity ===================== */
    #[error("flowdata key '{0}' is already set")]
    DuplicateKey(String),

    /* ===================== Loader ===================== */
    #[error("flow file: {0}")]
    Load(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),
}

impl FlowError {
    pub fn invalid_value(node: impl Into<String>, message: impl Into<String>) -> Self {
        FlowError::InvalidValue {
            node: node.into(),
            message: message.into(),
        }
    }

    pub fn invalid_parameter(
        node: impl Into<String>,
        param: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        FlowError::InvalidParameter {
            node: node.into(),
            param: param.into(),
            message: message.into(),
        }
    }
}
