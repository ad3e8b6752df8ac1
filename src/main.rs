//! stream-shift: live pitch shifting from the default input to the default output.
//!
//! Reads single-character commands from stdin:
//! - `s` pitch shift mode, `p` passthrough mode
//! - `u` / `d` raise / lower the shift factor (pitch shift mode only)
//! - `q` quit

use std::io::{self, Read};
use std::thread;

use anyhow::{Context, Result};
use clap::Parser;
use stream_shift::{
    AudioDevice, Command, Controller, Mode, PipelineConfig, PipelineEvent, ShiftRange, StreamShift,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Command-line arguments for stream-shift
#[derive(Parser, Debug)]
#[command(name = "stream-shift")]
#[command(about = "Real-time pitch shifter with keyboard control")]
#[command(version)]
struct Args {
    /// Sample rate in Hz
    #[arg(long, default_value_t = 44100, env = "STREAM_SHIFT_SAMPLE_RATE")]
    sample_rate: u32,

    /// Samples per block
    #[arg(long, default_value_t = 128, env = "STREAM_SHIFT_BLOCK_SIZE")]
    block_size: usize,

    /// Number of slots in the ring
    #[arg(long, default_value_t = 16, env = "STREAM_SHIFT_RING_CAPACITY")]
    ring_capacity: usize,

    /// Pitch shifter FFT frame size (power of two)
    #[arg(long, default_value_t = 1024, env = "STREAM_SHIFT_FFT_FRAME_SIZE")]
    fft_frame_size: usize,

    /// Pitch shifter oversampling factor
    #[arg(long, default_value_t = 32, env = "STREAM_SHIFT_OVERSAMPLING")]
    oversampling: usize,

    /// Lowest shift factor
    #[arg(long, default_value_t = 0.5, env = "STREAM_SHIFT_MIN_FACTOR")]
    min_factor: f32,

    /// Highest shift factor
    #[arg(long, default_value_t = 2.0, env = "STREAM_SHIFT_MAX_FACTOR")]
    max_factor: f32,

    /// Shift factor at startup and after returning to passthrough
    #[arg(long, default_value_t = 1.0, env = "STREAM_SHIFT_DEFAULT_FACTOR")]
    default_factor: f32,

    /// Factor change per up/down command
    #[arg(long, default_value_t = 0.5, env = "STREAM_SHIFT_STEP")]
    step: f32,

    /// Input device name (default input device if omitted)
    #[arg(long, env = "STREAM_SHIFT_INPUT_DEVICE")]
    input_device: Option<String>,

    /// Output device name (default output device if omitted)
    #[arg(long, env = "STREAM_SHIFT_OUTPUT_DEVICE")]
    output_device: Option<String>,

    /// List audio devices and exit
    #[arg(long)]
    list_devices: bool,
}

impl Args {
    fn pipeline_config(&self) -> PipelineConfig {
        PipelineConfig {
            sample_rate: self.sample_rate,
            block_size: self.block_size,
            ring_capacity: self.ring_capacity,
            fft_frame_size: self.fft_frame_size,
            oversampling: self.oversampling,
            shift: ShiftRange {
                min: self.min_factor,
                max: self.max_factor,
                default: self.default_factor,
                step: self.step,
            },
        }
    }
}

fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "warn".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(io::stderr))
        .init();

    let args = Args::parse();

    if args.list_devices {
        print_devices()?;
        return Ok(());
    }

    let config = args.pipeline_config();
    config.validate().context("Invalid configuration")?;

    let device = AudioDevice::open(args.input_device.as_deref(), args.output_device.as_deref())
        .context("Failed to open audio devices")?;
    let (streams, source, sink) = device
        .start(&config)
        .context("Failed to start audio streams")?;

    let session = StreamShift::builder()
        .config(config)
        .source(source)
        .sink(sink)
        .on_event(print_event)
        .start()
        .context("Failed to start pipeline")?;

    println!("Program Started in Passthrough mode");
    println!("\t * Enter 'p' for Passthrough mode and 's' for Pitch Shift mode");
    println!("\t * In Pitch Shift mode, enter 'u' or 'd' to increase/decrease the shift factor");
    println!("\t * Enter 'q' at any time to quit the program");

    let mut controller = Controller::new(session.handle());
    // Never joined: it may stay parked on stdin after a device failure.
    thread::Builder::new()
        .name("control-input".to_string())
        .spawn(move || {
            let commands = io::stdin()
                .lock()
                .bytes()
                .map_while(|byte| byte.ok())
                .filter_map(|byte| Command::from_char(char::from(byte)));
            controller.run(commands);
        })
        .context("Failed to spawn control input thread")?;

    let result = session.join();
    drop(streams);
    println!("Program End");

    result.context("Pipeline failed")
}

fn print_event(event: PipelineEvent) {
    match event {
        PipelineEvent::ModeChanged {
            mode: Mode::Passthrough,
        } => println!("Now in Passthrough Mode"),
        PipelineEvent::ModeChanged { mode: Mode::Shift } => println!("Now in Pitch Shift Mode"),
        PipelineEvent::FactorChanged { factor } => println!("Shift factor now: {factor}"),
        PipelineEvent::FactorLimitReached { .. } => println!("Pitch shift limit reached"),
        PipelineEvent::DeviceFailed { stage, error } => {
            eprintln!("Audio device error in {stage} stage: {error}");
        }
        _ => {}
    }
}

fn print_devices() -> Result<()> {
    println!("Input devices:");
    for name in stream_shift::list_input_devices().context("Failed to list input devices")? {
        println!("  {name}");
    }
    println!("Output devices:");
    for name in stream_shift::list_output_devices().context("Failed to list output devices")? {
        println!("  {name}");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_pipeline_config() {
        let args = Args::try_parse_from(["stream-shift"]).unwrap();
        assert_eq!(args.pipeline_config(), PipelineConfig::default());
    }

    #[test]
    fn test_default_factor_follows_shifted_range() {
        let args = Args::try_parse_from([
            "stream-shift",
            "--min-factor",
            "1.5",
            "--max-factor",
            "3.0",
            "--default-factor",
            "2.0",
        ])
        .unwrap();

        let config = args.pipeline_config();
        assert_eq!(config.shift.default, 2.0);
        assert!(config.validate().is_ok());
    }
}
