pub mod args;
pub mod fit;

pub use args::{Cli, CliCommand, FitCliArgs, ListenCliArgs, SimulateCliArgs};
pub use fit::{fit_samples, handle_fit_command, FitOutput};
