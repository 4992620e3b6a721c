use clap::{Args as ClapArgs, Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "humtrace")]
#[command(about = "Hum a pitch, see the shape", long_about = None)]
pub struct Cli {
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Read configuration from this file instead of the default location
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<CliCommand>,
}

#[derive(Subcommand, Debug)]
pub enum CliCommand {
    /// Capture hums from the default microphone (the default command)
    Listen(ListenCliArgs),
    /// Run scripted hums through the capture pipeline
    Simulate(SimulateCliArgs),
    /// Fit a curve to an exported session and print the segments
    Fit(FitCliArgs),
    /// Print version information
    Version,
}

#[derive(ClapArgs, Debug, Default)]
pub struct ListenCliArgs {
    /// Write the session canvases to this SVG file on exit
    #[arg(long)]
    pub snapshot: Option<PathBuf>,
}

#[derive(ClapArgs, Debug)]
pub struct SimulateCliArgs {
    /// Number of sessions to capture before exiting
    #[arg(short, long, default_value = "3")]
    pub sessions: usize,
    /// Write the session canvases to this SVG file on exit
    #[arg(long)]
    pub snapshot: Option<PathBuf>,
}

#[derive(ClapArgs, Debug)]
pub struct FitCliArgs {
    /// Session export JSON, or an array of [duration, pitch] pairs
    pub file: PathBuf,
    /// Fitting tolerance in pixels (defaults to render.tolerance)
    #[arg(short, long)]
    pub tolerance: Option<f64>,
    /// Also draw the raw trace and fitted curve to this SVG file
    #[arg(long)]
    pub svg: Option<PathBuf>,
}
