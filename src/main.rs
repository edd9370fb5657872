use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};

use satwatch::analysis::{overview, summarize, top_anomaly, Overview, QueryContext};
use satwatch::collaborators::{Collaborators, OfflineNarrator};
use satwatch::config::Config;
use satwatch::dataset::{self, export};
use satwatch::detect::{self, ModelArtifact};
use satwatch::generator::{now_epoch, FaultScenario, Generator};
use satwatch::packet::codec::write_packets;
use satwatch::pipeline::RunStateRecord;
use satwatch::scheduler::{self, NightlyScheduler, RunStatus, RunTrigger};

#[derive(Parser)]
#[command(
    name = "satwatch",
    about = "Small-satellite telemetry simulation and nightly anomaly detection",
    version,
    long_about = None
)]
struct Cli {
    /// Configuration file (TOML)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    json_logs: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate a binary telemetry stream with injected faults
    Generate {
        /// Number of packets
        #[arg(long)]
        count: Option<usize>,

        /// Per-packet fault probability
        #[arg(long)]
        fault_rate: Option<f64>,

        /// Fault scenarios to draw from (power_drop, thermal_spike, attitude_issue)
        #[arg(long, value_delimiter = ',')]
        scenarios: Vec<FaultScenario>,

        /// Seed for a reproducible stream
        #[arg(long)]
        seed: Option<u64>,
    },

    /// Decode the binary stream and export it as CSV
    Decode,

    /// Train the anomaly model on the current dataset
    Train,

    /// Score the current dataset and export flagged rows
    Detect {
        /// Flag threshold on the normalised score
        #[arg(long)]
        threshold: Option<f64>,
    },

    /// Run the full nightly pipeline once
    Nightly,

    /// Explain the most anomalous packet of the last detection
    Explain,

    /// Ask a free-text question about the current dataset
    Ask {
        /// The question
        question: String,
    },

    /// Start the daemon (API server + nightly scheduler)
    Serve {
        /// Bind address
        #[arg(long)]
        bind: Option<String>,
    },

    /// Nightly schedule
    Schedule {
        #[command(subcommand)]
        action: ScheduleAction,
    },
}

#[derive(Subcommand)]
enum ScheduleAction {
    /// Preview fire times in the next N hours
    Preview {
        /// Hours to preview
        #[arg(long, default_value = "48")]
        hours: u64,
    },

    /// Run the scheduler loop in the foreground
    Run,
}

fn init_tracing(json: bool) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    if json {
        tracing_subscriber::fmt().json().with_env_filter(filter).init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

fn print_overview(o: &Overview) {
    println!("Packets:    {}", o.total_packets);
    println!("Anomalies:  {}", o.anomaly_count);
    if let (Some(first), Some(last)) = (o.first_timestamp, o.last_timestamp) {
        println!("Time span:  {} .. {}", first, last);
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.json_logs);

    let mut config = Config::resolve(cli.config.as_deref())?;
    let paths = config.paths.clone();

    match cli.command {
        Commands::Generate {
            count,
            fault_rate,
            scenarios,
            seed,
        } => {
            let g = &mut config.generator;
            if let Some(count) = count {
                g.packet_count = count;
            }
            if let Some(rate) = fault_rate {
                g.fault_rate = rate;
            }
            if !scenarios.is_empty() {
                g.scenarios = scenarios;
            }
            if seed.is_some() {
                g.seed = seed;
            }
            config.validate()?;

            let g = &config.generator;
            let mut generator = Generator::new(&g.profile, g.seed)?;
            let packets = generator.generate(g.packet_count, now_epoch(), g.fault_rate, &g.scenarios);
            write_packets(&paths.bin_file, &packets)?;
            println!("Wrote {} packets to {}", packets.len(), paths.bin_file.display());
        }
        Commands::Decode => {
            let ds = dataset::decode_file(&paths.bin_file)?;
            export::write_csv(&ds, &paths.csv_file)?;
            print_overview(&overview(&ds));
            println!("CSV:        {}", paths.csv_file.display());
        }
        Commands::Train => {
            let ds = dataset::load_or_decode(&paths.csv_file, &paths.bin_file)?;
            let training = ds.sample_fraction(config.model.train_fraction, config.model.subsample_seed);
            let model = detect::train(&training, &config.model.forest_params())?;
            ModelArtifact::new(model, training.len()).save(&paths.model_file)?;
            println!(
                "Trained on {} of {} packets; model saved to {}",
                training.len(),
                ds.len(),
                paths.model_file.display()
            );
        }
        Commands::Detect { threshold } => {
            let threshold = threshold.unwrap_or(config.detect.threshold);
            let ds = dataset::load_or_decode(&paths.csv_file, &paths.bin_file)?;
            let detected = detect::detect_with_fallback(
                &ds,
                &paths.model_file,
                &config.model.forest_params(),
                threshold,
            )?;
            export::write_csv(&detected, &paths.csv_file)?;
            print_overview(&overview(&detected));
            if let Some(top) = top_anomaly(&detected) {
                println!("Top score:  {:.3} (packet {})", top.anomaly_score, top.index);
            }
        }
        Commands::Nightly => {
            let runner = satwatch::build_runner(&config)?;
            let entry = runner.trigger(RunTrigger::Cli).await;
            if entry.status != RunStatus::Success {
                anyhow::bail!(
                    "nightly run {}: {}",
                    entry.status,
                    entry.error.unwrap_or_default()
                );
            }
            if let Some(record) = RunStateRecord::read(&paths.last_run_file)? {
                println!("{}", serde_json::to_string_pretty(&record)?);
            }
        }
        Commands::Explain => {
            let ds = export::read_csv(&paths.csv_file)?;
            let Some(top) = top_anomaly(&ds) else {
                println!("No flagged packets in {}", paths.csv_file.display());
                return Ok(());
            };
            let stats = summarize(&ds)?;
            let narrator = Collaborators::from_config(&config.narrator).narrator;
            let text = match narrator.explain_anomaly(&top, &stats).await {
                Ok(text) => text,
                Err(e) => {
                    tracing::warn!(error = %e, "narrator failed, using offline explanation");
                    OfflineNarrator::explanation_text(&top, &stats)
                }
            };
            println!("{}", text);
        }
        Commands::Ask { question } => {
            let ds = dataset::load_or_decode(&paths.csv_file, &paths.bin_file)?;
            let context = QueryContext::build(&ds)?;
            let answer = Collaborators::from_config(&config.narrator)
                .answer(&question, &context)
                .await;
            println!("{}", answer);
        }
        Commands::Serve { bind } => {
            if let Some(bind) = bind {
                config.server.bind = bind;
            }
            tracing::info!(bind = %config.server.bind, "Starting satwatch daemon");
            satwatch::serve(&config).await?;
        }
        Commands::Schedule { action } => {
            let nightly = NightlyScheduler::from_config(&config.schedule)?;
            match action {
                ScheduleAction::Preview { hours } => {
                    let upcoming = nightly.next_runs(hours);
                    println!("Schedule '{}' -- next {} hours:", nightly.expr(), hours);
                    if upcoming.is_empty() {
                        println!("  (no runs)");
                    }
                    for t in upcoming {
                        println!("  {}", satwatch::pipeline::run_state::readable(&t));
                    }
                }
                ScheduleAction::Run => {
                    let runner = satwatch::build_runner(&config)?;
                    tokio::select! {
                        _ = scheduler::run_loop(nightly, runner) => {}
                        _ = tokio::signal::ctrl_c() => {
                            tracing::info!("interrupted, stopping scheduler");
                        }
                    }
                }
            }
        }
    }

    Ok(())
}
