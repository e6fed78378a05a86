// sentrycam: run the face-tracking sentry against real hardware
//
// Usage: sentrycam [config.toml]

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::runtime::{Handle, Runtime};

use sentrycam::audio::CpalAudioSource;
use sentrycam::capture::{NokhwaFrameSource, SnapshotPreview};
use sentrycam::detect::HaarCascadeDetector;
use sentrycam::gimbal::{GimbalController, PulseActuator, RppalGpioDriver};
use sentrycam::notify::{HttpNotifier, MailSender, NotificationPool, SmtpMailer};
use sentrycam::recording::{Mp4Sink, RecordingSink};
use sentrycam::{CaptureOrchestrator, LoopStats, SentryConfig, ShutdownHandle};

fn main() -> Result<()> {
    sentrycam::init_logging();

    let path = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(SentryConfig::default_path);
    let config = SentryConfig::load_from_file(&path)
        .with_context(|| format!("loading configuration from {}", path.display()))?;
    config.validate().context("invalid configuration")?;

    let runtime = Runtime::new().context("starting async runtime")?;
    runtime.block_on(run(config))
}

async fn run(config: SentryConfig) -> Result<()> {
    let shutdown = ShutdownHandle::new();
    {
        let shutdown = shutdown.clone();
        ctrlc::set_handler(move || {
            log::info!("Shutdown requested");
            shutdown.trigger();
        })
        .context("installing signal handler")?;
    }

    let notifier = Arc::new(HttpNotifier::new(&config.notify)?);
    let mailer: Option<Arc<dyn MailSender>> = if config.mail.enabled {
        Some(Arc::new(SmtpMailer::new(&config.mail)?))
    } else {
        None
    };
    let pool = Arc::new(NotificationPool::new(
        Handle::current(),
        notifier,
        mailer,
        &config,
    ));
    let sink: Arc<dyn RecordingSink> = Arc::new(Mp4Sink::new());

    let loop_pool = pool.clone();
    let stats = tokio::task::spawn_blocking(move || -> Result<LoopStats> {
        let detector = HaarCascadeDetector::load(&config.detection)?;
        let driver =
            RppalGpioDriver::open(config.gimbal.horizontal_pin, config.gimbal.vertical_pin)
                .context("opening servo GPIO lines")?;
        let gimbal = GimbalController::new(
            PulseActuator::new(driver),
            config.gimbal.calibration.clone(),
        );
        let source = NokhwaFrameSource::from_config(&config.camera);

        let camera = config.camera.clone();
        let mut orchestrator = CaptureOrchestrator::new(
            config.clone(),
            source,
            detector,
            gimbal,
            sink,
            loop_pool,
        )
        .with_shutdown(shutdown)
        .with_audio_source(move || {
            CpalAudioSource::open(
                camera.audio_device.as_deref(),
                camera.audio_sample_rate,
                camera.audio_channels,
            )
        });
        if config.preview.enabled {
            orchestrator =
                orchestrator.with_preview(Box::new(SnapshotPreview::from_config(&config.preview)));
        }

        Ok(orchestrator.run())
    })
    .await
    .context("capture loop panicked")??;

    log::info!(
        "Processed {} frames: {} read errors, {} detection errors, {} gimbal moves, {} start(s), {} stop(s)",
        stats.frames,
        stats.frame_errors,
        stats.detection_errors,
        stats.gimbal_moves,
        stats.sessions_started,
        stats.sessions_stopped
    );

    pool.drain().await;
    Ok(())
}
