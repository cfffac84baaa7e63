/*!
# Layout engine errors

Ошибки движка укладки:

- **InvalidInput**: обнаруживается до создания состояния симуляции
- **WorkerExecution**: терминальное сообщение ERROR вынесенного запуска
- **Configuration**: некорректные настройки
*/

use thiserror::Error;

/// Ошибка движка укладки
#[derive(Debug, Clone, Error, PartialEq)]
pub enum LayoutError {
    /// Граф или параметры нарушают входной контракт
    #[error("invalid input: {reason}")]
    InvalidInput { reason: String },

    /// Рабочий поток сообщил об ошибке или пропал посреди запуска
    #[error("worker execution failed: {reason}")]
    WorkerExecution { reason: String },

    #[error("invalid configuration: {reason}")]
    Configuration { reason: String },
}

impl LayoutError {
    pub fn invalid_input(reason: impl Into<String>) -> Self {
        Self::InvalidInput {
            reason: reason.into(),
        }
    }

    pub fn worker(reason: impl Into<String>) -> Self {
        Self::WorkerExecution {
            reason: reason.into(),
        }
    }

    pub fn configuration(reason: impl Into<String>) -> Self {
        Self::Configuration {
            reason: reason.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, LayoutError>;
