pub mod display;
pub mod lexer;
pub mod parser;
pub mod types;
pub mod validate;

pub use parser::{ConfigParser, ParseResult, FromYaml, ConfigError};
pub use types::{AppConfig, ServerConfig, RouteConfig, ThrottleConfig, ServerOptions};
pub use display::display_config;
pub use validate::validate_configs;
