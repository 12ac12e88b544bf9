//! Interactive command surface for the terminal client.

mod parse;
mod terminal;
mod workspace;

pub use parse::{parse_command, Command, HELP_TEXT};
pub use terminal::TerminalRenderer;
pub use workspace::{CommandError, Reply, Workspace};
