//! ATRIA simulator binary
//!
//! Builds a seeded random routing tree, runs the unicast rule on every node
//! for a number of slotframes and reports any schedule disagreement.

use std::process::ExitCode;

use atria_core::{AllocationStrategy, EpochMode, ScheduleConfig};
use atria_sim::SimulationConfig;
use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Parser, Debug)]
#[command(name = "atria-sim", version, about = "Simulate ATRIA unicast scheduling on a random tree")]
struct Args {
    /// Nodes including the root
    #[arg(long, short, default_value_t = 20)]
    nodes: u16,

    /// Seed for the tree shape and churn
    #[arg(long, short, default_value_t = 0)]
    seed: u64,

    /// Slotframes to run
    #[arg(long, short, default_value_t = 10)]
    epochs: u32,

    /// Probability per slotframe that a node changes parent
    #[arg(long, default_value_t = 0.0)]
    churn: f64,

    /// Cell allocation strategy (single, replicated, evenly)
    #[arg(long)]
    strategy: Option<AllocationStrategy>,

    /// Unicast slotframe length
    #[arg(long)]
    period: Option<u16>,

    /// Hopping sequence length
    #[arg(long)]
    channels: Option<u16>,

    /// Sub-period width (evenly)
    #[arg(long)]
    sub_period: Option<u16>,

    /// Sub-period count (evenly)
    #[arg(long)]
    num_sub_period: Option<u16>,

    /// Epoch mode (fixed, rotating)
    #[arg(long, default_value = "rotating")]
    epoch_mode: EpochMode,

    /// Cap on additional cells per link
    #[arg(long)]
    max_additional: Option<u16>,

    /// Print the final schedule as JSON
    #[arg(long)]
    json: bool,

    /// Verbose logging (-v for debug, -vv for trace)
    #[arg(long, short, action = clap::ArgAction::Count)]
    verbose: u8,
}

impl Args {
    fn schedule(&self) -> atria_core::Result<ScheduleConfig> {
        let mut config = ScheduleConfig::from_env()?;
        if let Some(strategy) = self.strategy {
            config.strategy = strategy;
        }
        if let Some(period) = self.period {
            config.unicast_period = period;
        }
        if let Some(channels) = self.channels {
            config.num_channels = channels;
        }
        if let Some(sub_period) = self.sub_period {
            config.sub_period = sub_period;
        }
        if let Some(num_sub_period) = self.num_sub_period {
            config.num_sub_period = num_sub_period;
        }
        if let Some(max) = self.max_additional {
            config.max_additional_cells = Some(max);
        }
        config.epoch_mode = self.epoch_mode;
        config.validate()?;
        Ok(config)
    }
}

fn init_tracing(verbosity: u8) {
    let default = match verbosity {
        0 => "atria_sim=info,atria_rule=info",
        1 => "atria_sim=debug,atria_rule=debug",
        _ => "atria_sim=trace,atria_rule=trace",
    };
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| default.into()))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

fn main() -> Result<ExitCode, Box<dyn std::error::Error>> {
    let args = Args::parse();
    init_tracing(args.verbose);

    let config = SimulationConfig::default()
        .with_seed(args.seed)
        .with_nodes(args.nodes)
        .with_epochs(args.epochs)
        .with_churn(args.churn)
        .with_schedule(args.schedule()?);

    tracing::info!(
        nodes = config.nodes,
        seed = config.seed,
        strategy = %config.schedule.strategy,
        period = config.schedule.unicast_period,
        "starting simulation"
    );

    let outcome = atria_sim::run(&config)?;

    if args.json {
        println!("{}", outcome.network.snapshot().to_json()?);
    }

    for (epoch, disagreement) in &outcome.disagreements {
        tracing::error!(%epoch, "{disagreement}");
    }
    println!(
        "{} nodes, {} audits, {} parent changes, {} disagreements",
        outcome.network.len(),
        outcome.audits,
        outcome.reparents,
        outcome.disagreements.len()
    );

    Ok(if outcome.is_clean() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}
