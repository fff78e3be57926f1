use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use kastodi::config::Config;
use kastodi::console::{ConsolePrompter, ConsoleProgress, ConsoleSelector, Interrupts};
use kastodi::control::{ConsoleInput, ConsoleView};
use kastodi::host::{HostContext, IdleHost, MediaHost, Progress, StaticHost};
use kastodi::network::{ChromecastReceiver, MdnsDiscovery, TargetDiscovery};
use kastodi::service::{CastOutcome, CastService};
use kastodi::settings::FileSettings;
use kastodi::skin::{PatchOutcome, SkinPatcher, UnpatchOutcome};
use kastodi::PlaybackLocator;

#[derive(Parser, Debug)]
#[command(author, version, about = "Hand media playback over to a Chromecast", long_about = None)]
struct Args {
    /// Config file (defaults to the per-user config directory)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List Chromecast devices on the local network
    Discover {
        /// Print the device list as JSON
        #[arg(long)]
        json: bool,
    },

    /// Cast a URL or local file and open the controls
    Cast {
        /// http(s) URL or local file path
        locator: String,

        /// Receiver friendly name; asks when omitted
        #[arg(short, long)]
        device: Option<String>,

        /// Start position in seconds
        #[arg(short, long, default_value_t = 0.0)]
        offset: f64,

        #[arg(short, long)]
        title: Option<String>,

        /// Artwork URL or file shown on the receiver
        #[arg(long)]
        thumbnail: Option<String>,

        /// Answer yes to every question (e.g. enabling the web server)
        #[arg(short, long)]
        yes: bool,
    },

    /// Add or remove the Cast button in the skin
    Skin {
        #[command(subcommand)]
        action: SkinAction,
    },

    /// Patch the skin, idle until Ctrl-C, then unpatch
    Service,
}

#[derive(Subcommand, Debug)]
enum SkinAction {
    Patch,
    Unpatch,
}

fn host_context(
    config: &Config,
    interrupts: &Interrupts,
    player: Box<dyn MediaHost>,
    assume_yes: bool,
) -> anyhow::Result<HostContext> {
    Ok(HostContext {
        player,
        settings: Box::new(FileSettings::open(config.settings_path())?),
        prompter: Box::new(ConsolePrompter::new(interrupts.clone(), assume_yes)),
    })
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let config = Config::load(args.config.as_deref())?;
    tracing::debug!("Using config {:?}", config);
    let interrupts = Interrupts::install().await;

    match args.command {
        Command::Discover { json } => {
            let discovery = MdnsDiscovery::new(config.discovery.timeout());
            let mut progress = ConsoleProgress::new(&interrupts, "Discovery");
            let targets = discovery.discover(&mut progress).await;
            progress.close();

            let targets = targets?;
            if json {
                println!("{}", serde_json::to_string_pretty(&targets)?);
                return Ok(());
            }
            if targets.is_empty() {
                println!("No Chromecast devices found");
            }
            for target in targets {
                println!("{}", target);
            }
        }

        Command::Cast {
            locator,
            device,
            offset,
            title,
            thumbnail,
            yes,
        } => {
            let locator = PlaybackLocator::new(locator);
            let title = title.unwrap_or_else(|| locator.to_string());
            let mut host = StaticHost::new(locator, title, offset);
            if let Some(thumb) = thumbnail {
                host = host.with_thumbnail(PlaybackLocator::new(thumb));
            }

            let ctx = host_context(&config, &interrupts, Box::new(host), yes)?;
            let input = ConsoleInput::new(&interrupts, config.control.poll_interval(), config.control.volume_step);
            let discovery = MdnsDiscovery::new(config.discovery.timeout());
            let selector = Box::new(ConsoleSelector { preferred: device });
            let receiver = ChromecastReceiver::new(config.cast.io_timeout());

            let mut service = CastService::new(config, ctx, receiver, discovery, selector);
            match service.cast_button_pressed(input, ConsoleView::new()).await {
                CastOutcome::Failed(reason) => anyhow::bail!(reason),
                outcome => tracing::debug!("Cast finished: {:?}", outcome),
            }
        }

        Command::Skin { action } => {
            let patcher = SkinPatcher::new(&config.skin);
            match action {
                SkinAction::Patch => match patcher.ensure_present()? {
                    PatchOutcome::Applied { restart_required } => {
                        println!("Cast button added to {}", patcher.document_path().display());
                        if restart_required {
                            println!("Restart the media center to load the new skin");
                        }
                    }
                    PatchOutcome::AlreadyPresent => println!("Cast button already present"),
                },
                SkinAction::Unpatch => match patcher.ensure_absent()? {
                    UnpatchOutcome::Removed => {
                        println!("Cast button removed from {}", patcher.document_path().display())
                    }
                    UnpatchOutcome::AlreadyAbsent => println!("Cast button not present"),
                },
            }
        }

        Command::Service => {
            let ctx = host_context(&config, &interrupts, Box::new(IdleHost), false)?;
            let discovery = MdnsDiscovery::new(config.discovery.timeout());
            let selector = Box::new(ConsoleSelector::default());
            let receiver = ChromecastReceiver::new(config.cast.io_timeout());
            let service = CastService::new(config, ctx, receiver, discovery, selector);

            tracing::info!("kastodi service v{} running, Ctrl-C to stop", env!("CARGO_PKG_VERSION"));
            service.run(interrupts.pressed()).await;
        }
    }

    Ok(())
}
