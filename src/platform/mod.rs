//! OS primitives: signals, window focus and file-manager selection.

mod focus;
mod selection;
mod signals;

pub use focus::{OsWindowFocus, WindowFocus};
pub use selection::{platform_selection, SelectionSource};
pub use signals::{KillSignaller, ProcessStatus, Signal, Signaller};

#[cfg(test)]
pub use focus::mock as focus_mock;
#[cfg(test)]
pub use signals::mock as signals_mock;
