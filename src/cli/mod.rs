pub(crate) mod command;

pub use self::command::{Args, LogFormat, LogLevel};
