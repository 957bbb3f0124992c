use anyhow::{Context, Result, anyhow};
use yapne::config::{NetConfig, OutputFormat};
use yapne::net::{PetriNet, io};
use yapne::options::Options;

fn main() -> Result<()> {
    if std::env::var("PN_LOG").is_ok() {
        let e = env_logger::Env::new()
            .filter("PN_LOG")
            .write_style("PN_LOG_STYLE");
        env_logger::init_from_env(e);
    }

    let args = std::env::args().skip(1).collect::<Vec<_>>();
    let mut options = Options::parse_from_args(&args).map_err(|err| anyhow!("{err}"))?;
    if let Ok(flags) = std::env::var("PN_FLAGS") {
        let from_env = Options::parse_from_str(&flags).map_err(|err| anyhow!("PN_FLAGS: {err}"))?;
        options = options.merge(from_env);
    }
    log::debug!("PN options: {:?}", options);

    let config = NetConfig::load_from_file(&options.config)?;
    let input = options
        .input
        .as_ref()
        .context("no input PNML file given")?;
    let mut net = io::read_pnml_with_config(input, &config)
        .with_context(|| format!("Failed to load net from {:?}", input))?;
    log::info!(
        "loaded {} places, {} transitions, {} arcs from {:?}",
        net.places().count(),
        net.transitions().count(),
        net.arcs().count(),
        input
    );

    if options.list_enabled {
        report_enabled(&net, "before firing");
    }
    for transition in &options.fire {
        if !net.occur(transition)? {
            log::warn!("transition {transition} did not fire");
        }
    }
    if options.list_enabled && !options.fire.is_empty() {
        report_enabled(&net, "after firing");
    }

    let format = options.format.unwrap_or(config.output_format);
    match &options.output {
        Some(path) => {
            let written = match format {
                OutputFormat::Pnml => io::write_pnml(path, &net),
                OutputFormat::Json => io::write_json(path, &net),
                OutputFormat::Ron => io::write_ron(path, &net),
            };
            written.with_context(|| format!("Failed to write {format} output to {:?}", path))?;
        }
        None => {
            let rendered = match format {
                OutputFormat::Pnml => io::pnml::export_pnml(&net),
                OutputFormat::Json => io::to_json_string(&net)?,
                OutputFormat::Ron => io::to_ron_string(&net)?,
            };
            print!("{rendered}");
        }
    }
    Ok(())
}

fn report_enabled(net: &PetriNet, when: &str) {
    let enabled = net.enabled_transitions();
    if enabled.is_empty() {
        eprintln!("no enabled transitions {when}");
        return;
    }
    let ids = enabled.iter().map(|id| id.as_str()).collect::<Vec<_>>();
    eprintln!("enabled transitions {when}: {}", ids.join(", "));
}
