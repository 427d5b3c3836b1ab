use clap::{Parser, Subcommand};
use heartlens_signals::{
    FeatureExtractor, QualityClassifier, QualityConfig, QualityMonitor, RecordHistory,
    SessionRecord, SpectralEstimator,
};
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(name = "heartlens", about = "PPG signal-quality tools")]
struct Cli {
    /// TOML configuration file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    cmd: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the quality features of a recorded window
    Features {
        #[arg(long)]
        input: PathBuf,
    },
    /// Print the Welch PSD estimate of a recorded window
    Spectrum {
        #[arg(long)]
        input: PathBuf,
        #[arg(long)]
        sample_rate: Option<f32>,
    },
    /// Replay samples one at a time through the quality monitor
    Assess {
        #[arg(long)]
        input: PathBuf,
        #[arg(long)]
        model: Option<PathBuf>,
    },
    /// Historical averages for a subject from a JSON array of records
    History {
        #[arg(long)]
        records: PathBuf,
        #[arg(long)]
        subject: String,
    },
}

#[derive(Serialize)]
struct NamedFeature {
    name: &'static str,
    value: f32,
}

#[derive(Serialize)]
struct AssessReport {
    samples: usize,
    assessments: u64,
    failures: u64,
    label: String,
    confidence: f32,
}

fn read_samples(path: &Path) -> Result<Vec<f32>, Box<dyn std::error::Error>> {
    let content = fs::read_to_string(path)?;
    let mut samples = Vec::new();
    for token in content
        .split(|c: char| c.is_whitespace() || c == ',')
        .filter(|t| !t.is_empty())
    {
        let value: f32 = token
            .parse()
            .map_err(|_| format!("invalid sample '{}' in {}", token, path.display()))?;
        samples.push(value);
    }
    Ok(samples)
}

fn load_config(path: Option<&Path>) -> Result<QualityConfig, Box<dyn std::error::Error>> {
    let config = match path {
        Some(path) => QualityConfig::from_file_with_env(path)?,
        None => QualityConfig::load_layered(None, None)?,
    };
    Ok(config)
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();
    let cli = Cli::parse();
    let mut config = load_config(cli.config.as_deref())?;

    match cli.cmd {
        Commands::Features { input } => {
            let samples = read_samples(&input)?;
            if samples.len() < config.min_window {
                log::warn!(
                    "{} samples is below the {}-sample assessment window; features are not representative",
                    samples.len(),
                    config.min_window
                );
            }
            let mut extractor = FeatureExtractor::with_config(&config);
            let features = extractor.extract(&samples);
            let named: Vec<NamedFeature> = features
                .iter_named()
                .map(|(name, value)| NamedFeature { name, value })
                .collect();
            println!("{}", serde_json::to_string_pretty(&named)?);
        }
        Commands::Spectrum { input, sample_rate } => {
            let samples = read_samples(&input)?;
            let fs = sample_rate.unwrap_or(config.sample_rate_hz);
            let mut estimator = SpectralEstimator::with_config(config.welch.clone(), config.epsilon);
            let psd = estimator.welch_psd(&samples, fs);
            if let Some((freq, power)) = psd.peak() {
                log::info!("PSD peak {:.3} Hz (power {:.4e})", freq, power);
            }
            println!("{}", serde_json::to_string_pretty(&psd)?);
        }
        Commands::Assess { input, model } => {
            if let Some(model) = model {
                config.model_path = model;
            }
            let samples = read_samples(&input)?;
            let classifier = QualityClassifier::load_from_path(&config.model_path);
            let mut monitor = QualityMonitor::new(config, classifier);

            for end in 1..=samples.len() {
                monitor.on_buffer_grew(&samples[..end]);
            }

            let snapshot = monitor.latest().snapshot();
            let report = AssessReport {
                samples: samples.len(),
                assessments: monitor.assessments(),
                failures: monitor.failures(),
                label: snapshot.label,
                confidence: snapshot.confidence,
            };
            monitor.end_session();
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        Commands::History { records, subject } => {
            let content = fs::read_to_string(&records)?;
            let records: Vec<SessionRecord> = serde_json::from_str(&content)?;
            let history = RecordHistory::from_records(records);
            match history.averages(&subject) {
                Some(averages) => println!("{}", serde_json::to_string_pretty(&averages)?),
                None => println!("No records for subject {}", subject),
            }
            if let Some(last) = history.last_access(&subject) {
                println!("Last access: {}", last.to_rfc3339());
            }
        }
    }
    Ok(())
}
