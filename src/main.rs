use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use sound_trigger_hal::device::DeviceCoordinator;
use sound_trigger_hal::nats::spawn_event_pump;
use sound_trigger_hal::session::{Phrase, RECOGNITION_MODE_VOICE_TRIGGER};
use sound_trigger_hal::{
    create_router, hw_module, AppState, CaptureWriter, Config, Cookie, Detection, NatsPublisher,
    RecognitionCallback, RecognitionConfig, RecognitionEvent, SoundModel, SubsystemFactory,
    SOUND_TRIGGER_HARDWARE_INTERFACE,
};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "sound-trigger-hal", version, about = "Sound trigger hardware abstraction")]
struct Cli {
    /// Configuration file (extension optional)
    #[arg(short, long, default_value = "config/sound-trigger")]
    config: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Serve the HTTP control API and publish recognition events
    Serve,

    /// Print the device properties as JSON
    Properties,

    /// Run one detection cycle against the simulated engine
    Simulate {
        /// Bytes of captured audio to read after the detection
        #[arg(long, default_value_t = 32000)]
        bytes: usize,

        /// Write the captured audio to this WAV file
        #[arg(long)]
        output: Option<PathBuf>,

        /// Cookie handed back with the recognition event
        #[arg(long, default_value_t = 1)]
        cookie: u64,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let cfg = Config::load(&cli.config)
        .with_context(|| format!("Failed to load config {}", cli.config))?;

    info!("Sound trigger HAL v{}", env!("CARGO_PKG_VERSION"));
    info!("Loaded config: {}", cfg.service.name);

    match cli.command {
        Command::Serve => serve(cfg).await,
        Command::Properties => properties(cfg),
        Command::Simulate {
            bytes,
            output,
            cookie,
        } => simulate(cfg, bytes, output, Cookie(cookie)),
    }
}

async fn serve(cfg: Config) -> Result<()> {
    let subsystem = SubsystemFactory::create(&cfg.subsystem)?;
    let coordinator = Arc::new(DeviceCoordinator::new(
        subsystem.binding(),
        cfg.device.clone(),
    ));
    let hw = Arc::new(hw_module(coordinator));
    let device = hw
        .open(SOUND_TRIGGER_HARDWARE_INTERFACE)
        .context("Failed to open sound trigger device")?;

    let mut state = AppState::new(Arc::clone(&hw), device);
    if let Some(simulator) = subsystem.simulator() {
        state = state.with_simulator(simulator);
    }

    let pump = match &cfg.nats.url {
        Some(url) => {
            let publisher = NatsPublisher::connect(url, cfg.nats.subject_prefix.clone()).await?;
            let (tx, rx) = mpsc::unbounded_channel();
            state = state.with_publisher(tx);
            Some(spawn_event_pump(Box::new(publisher), rx))
        }
        None => {
            info!("No NATS url configured, recognition events stay local");
            None
        }
    };

    let app = create_router(state);
    let addr = format!("{}:{}", cfg.service.http.bind, cfg.service.http.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    info!("HTTP server listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!("Failed to listen for shutdown signal: {}", e);
            }
            info!("Shutting down");
        })
        .await
        .context("HTTP server failed")?;

    hw.close(device)?;

    // Armed sessions keep event senders alive, so the pump never drains on its own.
    if let Some(pump) = pump {
        pump.abort();
    }
    Ok(())
}

fn properties(cfg: Config) -> Result<()> {
    let subsystem = SubsystemFactory::create(&cfg.subsystem)?;
    let coordinator = Arc::new(DeviceCoordinator::new(subsystem.binding(), cfg.device));
    let hw = hw_module(coordinator);

    let device = hw.open(SOUND_TRIGGER_HARDWARE_INTERFACE)?;
    let properties = hw.get_properties(device);
    hw.close(device)?;

    println!("{}", serde_json::to_string_pretty(&properties?)?);
    Ok(())
}

fn simulate(cfg: Config, bytes: usize, output: Option<PathBuf>, cookie: Cookie) -> Result<()> {
    let subsystem = SubsystemFactory::create(&cfg.subsystem)?;
    let simulator = subsystem
        .simulator()
        .context("simulate requires the simulated subsystem")?;
    let sample_rate = simulator.config().sample_rate;

    let coordinator = Arc::new(DeviceCoordinator::new(subsystem.binding(), cfg.device));
    let hw = hw_module(coordinator);
    let device = hw.open(SOUND_TRIGGER_HARDWARE_INTERFACE)?;

    let model = SoundModel::keyphrase(
        b"simulated keyphrase model".to_vec(),
        Phrase {
            id: 1,
            recognition_mode: RECOGNITION_MODE_VOICE_TRIGGER,
            users: Vec::new(),
            locale: "en-US".to_string(),
            text: "hey device".to_string(),
        },
    );
    let handle = hw.load_sound_model(device, model)?;

    let callback: RecognitionCallback = Arc::new(|event: &RecognitionEvent, cookie: Cookie| {
        info!(
            "Recognition event: model={} status={:?} capture_available={} cookie={}",
            event.model, event.status, event.capture_available, cookie.0
        );
    });
    let config = RecognitionConfig {
        capture_requested: true,
        ..RecognitionConfig::default()
    };
    hw.start_recognition(device, handle, config, callback, cookie)?;

    let delivered = simulator
        .spawn_detect(handle, Detection::default())
        .join()
        .map_err(|_| anyhow::anyhow!("Detection thread panicked"))?;
    if !delivered {
        anyhow::bail!("Detection for model {} was not delivered", handle);
    }

    let mut writer = match &output {
        Some(path) => Some(CaptureWriter::create(path, sample_rate)?),
        None => None,
    };

    let mut total = 0;
    let mut buf = vec![0u8; 3200];
    while total < bytes {
        let want = buf.len().min(bytes - total);
        let read = hw.read_buffer(device, handle, &mut buf[..want])?;
        if read == 0 {
            break;
        }
        if let Some(writer) = writer.as_mut() {
            writer.write_bytes(&buf[..read])?;
        }
        total += read;
    }
    info!("Read {} bytes of captured audio", total);

    if let Some(writer) = writer {
        writer.finish()?;
    }

    hw.stop_recognition(device, handle)?;
    hw.unload_sound_model(device, handle)?;
    hw.close(device)?;
    Ok(())
}
