pub mod handler;
pub mod tui_backend;

pub use handler::DisplayHandler;
pub use tui_backend::TerminalUiBackend;
