use std::time::Duration;

use clipbot_config::ClipbotConfig;
use clipbot_media::FfprobeProbe;

/// Check config validity and duration-probe availability.
pub async fn run(config: &ClipbotConfig) -> anyhow::Result<()> {
    let mut failed = false;

    let result = clipbot_config::validate::validate(config);
    if result.has_errors() {
        failed = true;
        println!("✗ config has errors:");
        for d in &result.diagnostics {
            println!("    {}: {}: {}", d.severity, d.path, d.message);
        }
    } else {
        println!("✓ config ok");
    }

    let probe = FfprobeProbe::new(
        config.validation.ffprobe_path.clone(),
        Duration::from_millis(config.validation.probe_timeout_ms),
    );
    match probe.version().await {
        Ok(version) => println!("✓ duration probe: {version}"),
        Err(e) => {
            failed = true;
            println!("✗ duration probe unavailable: {e}");
            println!("    install ffmpeg/ffprobe or set validation.ffprobe_path");
        },
    }

    if failed {
        anyhow::bail!("doctor found problems");
    }
    Ok(())
}
