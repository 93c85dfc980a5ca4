use anyhow::Result;
use clap::{CommandFactory, Parser};
use tokio::sync::watch;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use sgc::cli::{AccountAction, Cli, Commands, GetTarget, ListTarget, TranscribeTarget};
use sgc::client::{Model, ServiceClient, SourceKey};
use sgc::config::Config;
use sgc::transcribe::{sha512_hex, SelectionPolicy, TranscriptionPipeline};

#[tokio::main]
async fn main() -> Result<()> {
    // Bare invocation prints help to stderr and exits clean
    if std::env::args().len() == 1 {
        let help = Cli::command().render_help();
        eprint!("{help}");
        return Ok(());
    }

    let cli = Cli::parse();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                if cli.verbose {
                    "sgc=debug".into()
                } else {
                    "sgc=info".into()
                }
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::load()?;

    // Account creation is the one call that runs unauthenticated
    if let Commands::Account {
        action: AccountAction::Create { username },
    } = &cli.command
    {
        let client = ServiceClient::new(config.base_url(), None);
        let account = client.create_account(username).await?;

        let mut config = config;
        config.set_credentials(&account);
        config.save()?;

        println!(
            "Account '{}' created; API key saved to {}",
            account.username,
            Config::path()?.display()
        );
        return Ok(());
    }

    // An interrupt flips the cancel flag; the poll loop notices and stops.
    // The cluster has no cancel call, so the remote job itself keeps running.
    let (cancel_tx, cancel_rx) = watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            let _ = cancel_tx.send(true);
        }
    });

    let pipeline = TranscriptionPipeline::new(&config, cancel_rx);

    match cli.command {
        Commands::Transcribe { target } => match target {
            TranscribeTarget::Url {
                video_url,
                model,
                save,
            } => {
                let model = Model::from(model.as_str());
                pipeline
                    .transcribe_url(&video_url, &model, save.as_deref())
                    .await?;
            }
            TranscribeTarget::File {
                file_path,
                model,
                save,
            } => {
                let model = Model::from(model.as_str());
                pipeline
                    .transcribe_file(&file_path, &model, save.as_deref())
                    .await?;
            }
            TranscribeTarget::List {
                channel_list,
                skip_prompt,
                model,
                save,
            } => {
                let model = Model::from(model.as_str());
                pipeline
                    .transcribe_list(&channel_list, &model, skip_prompt, save.as_deref())
                    .await?;
            }
        },
        Commands::List { target } => match target {
            ListTarget::Url { url } => {
                pipeline.list_existing(&SourceKey::Url(url)).await?;
            }
            ListTarget::File { file_path } => {
                let hash = sha512_hex(&file_path)?;
                pipeline.list_existing(&SourceKey::Sha512(hash)).await?;
            }
        },
        Commands::Get {
            target:
                GetTarget::Url {
                    output,
                    media_url,
                    get_best_model,
                    get_latest,
                    output_format,
                },
        } => {
            let policy = SelectionPolicy::from_flags(get_best_model, get_latest);
            pipeline
                .get_existing(&SourceKey::Url(media_url), policy, output_format, &output)
                .await?;
        }
        // Handled above before the pipeline was built
        Commands::Account { .. } => {}
    }

    Ok(())
}
