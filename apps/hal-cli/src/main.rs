use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};

use channel_registry::{AllocationMetrics, ResourceKind};
use hal_port::MockHardware;
use sensor_io::{AnalogChannel, ChassisConfig};

#[derive(Parser, Debug)]
#[command(
    name = "hal",
    version,
    about = "Channel allocation and analog acquisition on the mock backend",
    disable_help_subcommand = true
)]
struct Cli {
    /// Chassis YAML; built-in defaults when omitted
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Print the analog and digital layouts
    Layout,
    /// Sample one analog channel and print JSON lines
    Read {
        /// 1-based module; the chassis default module when omitted
        #[arg(long)]
        module: Option<u8>,
        #[arg(long, default_value_t = 0)]
        channel: u32,
        #[arg(long, default_value_t = 5)]
        count: u32,
        /// Simulated raw value fed to the converter before each read
        #[arg(long, default_value_t = 512)]
        raw: i16,
    },
    /// Integrate simulated samples on an accumulator channel
    Gyro {
        #[arg(long, default_value_t = 0)]
        channel: u32,
        /// Simulated raw samples
        #[arg(long, value_delimiter = ',', default_value = "10,12,8,11")]
        samples: Vec<i16>,
        #[arg(long, default_value_t = 0)]
        center: i32,
        #[arg(long, default_value_t = 0)]
        deadband: i32,
    },
    /// Load, validate and open a chassis file against the mock backend
    CheckConfig { file: PathBuf },
    /// Open the configured channels and print the allocation metrics
    Metrics,
}

#[derive(Serialize)]
struct SampleRecord {
    ts: String,
    module: u8,
    channel: u32,
    raw: i16,
    average: i32,
    volts: f64,
}

#[derive(Serialize)]
struct GyroReport {
    channel: u32,
    value: i64,
    count: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    average: Option<f64>,
}

fn main() -> Result<()> {
    setup_tracing();
    let cli = Cli::parse();
    let chassis = load_chassis(cli.config.as_deref())?;

    match cli.command {
        Commands::Layout => print_layout(&chassis),
        Commands::Read {
            module,
            channel,
            count,
            raw,
        } => read_channel(&chassis, module, channel, count, raw),
        Commands::Gyro {
            channel,
            samples,
            center,
            deadband,
        } => gyro(&chassis, channel, &samples, center, deadband),
        Commands::CheckConfig { file } => check_config(&file),
        Commands::Metrics => print_metrics(&chassis),
    }
}

fn setup_tracing() {
    // Best-effort; avoid panics if already set
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .try_init();
}

fn load_chassis(path: Option<&std::path::Path>) -> Result<ChassisConfig> {
    match path {
        Some(p) => sensor_io::load_chassis_file(p),
        None => Ok(ChassisConfig::default()),
    }
}

fn print_layout(chassis: &ChassisConfig) -> Result<()> {
    for (kind, layout) in [
        (ResourceKind::Analog, chassis.analog),
        (ResourceKind::Digital, chassis.digital),
    ] {
        println!(
            "{kind}\tmodules={}\tchannels_per_module={}\tslots={}",
            layout.modules,
            layout.channels_per_module,
            layout.capacity()
        );
    }
    println!("default_analog_module={}", chassis.default_analog_module);
    Ok(())
}

fn read_channel(
    chassis: &ChassisConfig,
    module: Option<u8>,
    channel: u32,
    count: u32,
    raw: i16,
) -> Result<()> {
    let hw = Arc::new(MockHardware::new());
    let ctx = chassis.context(hw.clone());
    let module = module.unwrap_or(ctx.default_analog_module());
    let ch = AnalogChannel::open(&ctx, module, channel)?;

    for i in 0..count {
        // Wobble the simulated input a little so consecutive lines differ.
        let sample = raw.saturating_add((i % 3) as i16 - 1);
        hw.set_raw(module, channel, sample);
        hw.push_sample(module, channel, sample);
        println!("{}", sample_line(&ch)?);
    }
    Ok(())
}

fn sample_line(ch: &AnalogChannel) -> Result<String> {
    let ts = time::OffsetDateTime::now_utc()
        .format(&time::format_description::well_known::Rfc3339)
        .unwrap_or_default();
    let rec = SampleRecord {
        ts,
        module: ch.module_number(),
        channel: ch.channel(),
        raw: ch.value()?,
        average: ch.average_value()?,
        volts: ch.voltage()?,
    };
    Ok(serde_json::to_string(&rec)?)
}

fn gyro(
    chassis: &ChassisConfig,
    channel: u32,
    samples: &[i16],
    center: i32,
    deadband: i32,
) -> Result<()> {
    let hw = Arc::new(MockHardware::new());
    let ctx = chassis.context(hw.clone());
    let mut ch = AnalogChannel::open(&ctx, sensor_io::ACCUMULATOR_MODULE, channel)?;
    ch.init_accumulator()?;
    ch.set_accumulator_center(center)?;
    ch.set_accumulator_deadband(deadband)?;

    hw.push_samples(sensor_io::ACCUMULATOR_MODULE, channel, samples.iter().copied());
    let out = ch.accumulator_output()?;
    let report = GyroReport {
        channel,
        value: out.value,
        count: out.count,
        average: out.average(),
    };
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

fn check_config(file: &std::path::Path) -> Result<()> {
    let chassis = sensor_io::load_chassis_file(file)?;
    let ctx = chassis.context(Arc::new(MockHardware::new()));
    let opened = chassis
        .open_channels(&ctx)
        .with_context(|| format!("opening channels from {}", file.display()))?;
    for ch in &opened {
        let acc = if ch.is_accumulator_channel() {
            format!("\taccumulator={:?}", ch.accumulator_state())
        } else {
            String::new()
        };
        println!(
            "module={}\tchannel={}\taverage_bits={}\toversample_bits={}{acc}",
            ch.module_number(),
            ch.channel(),
            ch.average_bits()?,
            ch.oversample_bits()?,
        );
    }
    info!(channels = opened.len(), "chassis ok");
    println!("ok: {} channels", opened.len());
    Ok(())
}

fn print_metrics(chassis: &ChassisConfig) -> Result<()> {
    let metrics = AllocationMetrics::new().context("registering allocation metrics")?;
    let ctx = chassis.context_with_metrics(Arc::new(MockHardware::new()), metrics.clone());
    let opened = chassis.open_channels(&ctx)?;

    // Re-open the first channel to show a rejection in the output.
    if let Some(first) = opened.first() {
        if let Err(e) = AnalogChannel::open(&ctx, first.module_number(), first.channel()) {
            warn!(error = %e, "duplicate open rejected");
        }
    }
    print!("{}", metrics.encode_text());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use sensor_io::HalContext;

    fn open(hw: &Arc<MockHardware>) -> (HalContext, AnalogChannel) {
        let ctx = HalContext::new(hw.clone());
        let ch = AnalogChannel::open(&ctx, 1, 2).unwrap();
        (ctx, ch)
    }

    #[test]
    fn sample_line_is_json_with_rfc3339_ts() {
        let hw = Arc::new(MockHardware::new());
        let (_ctx, ch) = open(&hw);
        hw.set_raw(1, 2, 100);
        let line = sample_line(&ch).unwrap();
        let v: serde_json::Value = serde_json::from_str(&line).unwrap();
        assert_eq!(v["raw"], 100);
        assert_eq!(v["channel"], 2);
        let ts = v["ts"].as_str().unwrap();
        time::OffsetDateTime::parse(ts, &time::format_description::well_known::Rfc3339)
            .unwrap();
    }

    #[test]
    fn cli_parses_gyro_samples() {
        let cli = Cli::parse_from(["hal", "gyro", "--samples", "1,2,3", "--center", "2"]);
        assert!(matches!(
            cli.command,
            Commands::Gyro { ref samples, center: 2, .. } if samples == &[1, 2, 3]
        ));
    }

    #[test]
    fn default_chassis_without_config() {
        let chassis = load_chassis(None).unwrap();
        assert_eq!(chassis.analog.capacity(), 16);
        assert_eq!(chassis.digital.capacity(), 28);
    }
}
