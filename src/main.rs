use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use crate::config::{OutputFormat, Settings};

pub mod aws;
pub mod cfn;
pub mod compose;
pub mod config;
pub mod generate;
pub mod kinesis;
pub mod resources;
pub mod stacks;
pub mod store;
pub mod validate;
pub mod writer;

/// Render a docker-compose file into nested CloudFormation stacks.
#[derive(Parser, Debug)]
#[command(name = "compose-cfn", version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Generate the root and nested templates.
    Generate(GenerateArgs),
}

#[derive(Args, Debug)]
struct GenerateArgs {
    /// Path to the compose file.
    #[arg(short = 'f', long = "file", default_value = "docker-compose.yml")]
    compose_file: PathBuf,

    /// Directory the templates are written to.
    #[arg(short = 'd', long, default_value = "outputs")]
    output_dir: PathBuf,

    #[arg(long, value_enum, default_value_t = OutputFormat::Json)]
    format: OutputFormat,

    /// File name of the root template, without extension.
    #[arg(short = 'n', long, default_value = "root")]
    name: String,

    /// Upload child templates to this S3 bucket.
    #[arg(long, env = "COMPOSE_CFN_BUCKET")]
    bucket: Option<String>,

    #[arg(long, env = "AWS_REGION")]
    region: Option<String>,

    /// Availability zone to spread hosts over. Repeat for more.
    #[arg(long = "az")]
    azs: Vec<String>,

    /// Validate the root template with CloudFormation.
    #[arg(long)]
    validate: bool,
}

impl GenerateArgs {
    fn into_settings(self) -> Settings {
        Settings {
            compose_file: self.compose_file,
            output_dir: self.output_dir,
            format: self.format,
            name: self.name,
            bucket_name: self.bucket,
            region: self.region,
            azs: self.azs,
            validate_templates: self.validate,
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    match cli.command {
        Command::Generate(args) => {
            let settings = args.into_settings().validated()?;
            let path = generate::execute(&settings).await?;
            tracing::info!(path = %path.display(), "root template written");
        }
    }

    return Ok(());
}
