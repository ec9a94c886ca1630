use clipbot_config::ClipbotConfig;

/// Print the effective configuration as TOML.
pub fn show(config: &ClipbotConfig) -> anyhow::Result<()> {
    let rendered = toml::to_string_pretty(config)?;
    println!("{rendered}");
    Ok(())
}

/// Validate the configuration and print diagnostics.
pub fn validate(config: &ClipbotConfig) -> anyhow::Result<()> {
    let result = clipbot_config::validate::validate(config);
    if result.diagnostics.is_empty() {
        println!("config ok");
        return Ok(());
    }
    for d in &result.diagnostics {
        println!("{}: {}: {}", d.severity, d.path, d.message);
    }
    if result.has_errors() {
        anyhow::bail!("config has errors");
    }
    Ok(())
}
