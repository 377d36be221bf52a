pub use self::parser::{
    Config, DatabaseConfig, DbType, LogFormat, LoggingConfig, ReconnectConfig, SlackConfig,
};
pub use self::validator::ConfigError;

mod parser;
mod validator;
