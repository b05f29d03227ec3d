use std::sync::Arc;

use anyhow::{bail, Result};
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

use harvest_common::{ResearchBundle, ResearchConfig, ResearchContext};
use harvest_scout::bootstrap;
use harvest_scout::stages::{research_stages, PipelineError, ResearchRequest, RESEARCH_STAGE};

#[derive(Parser)]
#[command(name = "harvest-scout", about = "Market research acquisition pipeline")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Research a seed query and print the bundle summary
    Research {
        seed: String,
        #[arg(long)]
        segment: Option<String>,
        #[arg(long)]
        product: Option<String>,
        #[arg(long)]
        audience: Option<String>,
        #[arg(long)]
        region: Option<String>,
        /// Extra context as key=value, repeatable
        #[arg(long = "attr", value_parser = parse_attribute)]
        attributes: Vec<(String, String)>,
        #[arg(long)]
        max_queries: Option<usize>,
        #[arg(long)]
        concurrency: Option<usize>,
        /// Second search round from first-round themes
        #[arg(long, default_value_t = 0)]
        follow_ups: usize,
        /// Print the stage report as JSON instead of text
        #[arg(long)]
        json: bool,
    },
}

fn parse_attribute(raw: &str) -> Result<(String, String), String> {
    match raw.split_once('=') {
        Some((k, v)) if !k.trim().is_empty() => Ok((k.trim().to_string(), v.trim().to_string())),
        _ => Err(format!("expected key=value, got {raw}")),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let filter = EnvFilter::from_default_env().add_directive("harvest=info".parse()?);
    if std::env::var("LOG_FORMAT").is_ok_and(|f| f == "json") {
        tracing_subscriber::fmt().with_env_filter(filter).json().init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }

    let cli = Cli::parse();
    let mut config = ResearchConfig::from_env()?;

    match cli.command {
        Command::Research {
            seed,
            segment,
            product,
            audience,
            region,
            attributes,
            max_queries,
            concurrency,
            follow_ups,
            json,
        } => {
            if let Some(n) = max_queries {
                config.max_queries = n;
            }
            if let Some(n) = concurrency {
                config.extraction_concurrency = n;
            }
            config.log_redacted();

            let mut context = ResearchContext {
                segment,
                product,
                audience,
                region,
                ..ResearchContext::default()
            };
            context.attributes.extend(attributes);

            info!(seed = seed.as_str(), "Harvest research starting...");
            let pipeline = bootstrap::research_pipeline(&config)?.follow_ups(follow_ups);
            let executor = research_stages(Arc::new(pipeline), config.research_timeout)?;
            let request = serde_json::to_value(ResearchRequest { seed, context })?;

            let report = match executor.execute(request).await {
                Ok(report) => report,
                Err(PipelineError::StageFatal { stage, reason, report }) => {
                    eprintln!("{report}");
                    bail!("stage {stage} failed: {reason}");
                }
                Err(e) => return Err(e.into()),
            };

            if json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                if let Some(raw) = report.result(RESEARCH_STAGE) {
                    let bundle: ResearchBundle = serde_json::from_value(raw.clone())?;
                    println!("{bundle}");
                }
                println!("{report}");
            }
        }
    }

    Ok(())
}
