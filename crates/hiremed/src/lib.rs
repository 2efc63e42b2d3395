//! hiremed: local control-plane backend for the HireMe outreach bot.

pub mod config;
pub mod console;
pub mod ollama;
pub mod onboarding;
pub mod runner;
pub mod tagwizard;
pub mod transport;

pub use config::{BotEnv, ServerConfig};
pub use console::{ConsoleLog, LogEntry, LogLevel, Subscription};
pub use ollama::{OllamaClient, OllamaError};
pub use runner::{BotRunner, BotSpawner, Mode, RunError, RunRequest, RunResult};
pub use transport::http::AppState;
pub use transport::serve;
