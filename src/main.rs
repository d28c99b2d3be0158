use std::fs;

use clap::Parser;
use miette::{ensure, miette, Context, IntoDiagnostic, Result};
use serde::Serialize;
use tracing::{debug, info};

use splicetube::{
    cli::{Args, Command},
    config::Settings,
    dispatch::dispatch,
    io::is_non_empty_file,
    logging::init_logging,
    outside::{Ffmpeg, Ytdl},
    pipeline::Pipeline,
    proxy::{HttpIpEcho, ProxyEndpoint, ProxySelector},
    resolver::Resolver,
    result::ErrorKind,
    splicer::Splicer,
};

/// One line of the `process` output
#[derive(Debug, Serialize)]
#[serde(untagged)]
enum Outcome<'a> {
    Done {
        url: &'a str,
        filename: String,
    },
    Failed {
        url: &'a str,
        error: &'static str,
        message: String,
        status: u16,
    },
}

impl<'a> Outcome<'a> {
    fn new(url: &'a str, res: std::result::Result<String, ErrorKind>) -> Self {
        match res {
            Ok(filename) => Outcome::Done { url, filename },
            Err(kind) => Outcome::Failed {
                url,
                error: kind.name(),
                message: kind.to_string(),
                status: kind.status_code(),
            },
        }
    }
}

fn main() -> Result<()> {
    // Initialize the settings & CLI
    let args = Args::parse();
    let mut settings = Settings::load(args.config.as_deref())?;
    args.apply_to(&mut settings);
    settings
        .validate()
        .wrap_err("Invalid command line arguments")?;

    init_logging(settings.log_level()?)?;
    debug!("{settings:?}");

    // Make sure the needed directories are created
    fs::create_dir_all(&settings.video_folder)
        .into_diagnostic()
        .wrap_err("Could not create the video folder")?;

    match &args.command {
        Command::ProbeProxies => {
            let ytdl = Ytdl::new(settings.ytdl_timeouts())?;
            match select_proxy(&settings, &ytdl)? {
                Some(proxy) => println!("{proxy}"),
                None => println!("direct"),
            }
        }
        Command::Process { urls } => process(urls, &settings)?,
    }

    Ok(())
}

fn process(urls: &[String], settings: &Settings) -> Result<()> {
    ensure!(
        is_non_empty_file(&settings.insert_clip),
        "Insert clip {} not found or empty",
        settings.insert_clip.display()
    );

    let (ytdl, ffmpeg) = load_external_components(settings)?;

    // Chosen once, every request goes through the same proxy
    let proxy = select_proxy(settings, &ytdl)?;

    let resolver = Resolver::new(&ytdl, &settings.video_folder, settings.max_duration());
    let splicer = Splicer::new(
        &ffmpeg,
        &settings.video_folder,
        settings.edit_rule,
        settings.encode_settings(),
    );
    let pipeline = Pipeline::new(
        resolver,
        splicer,
        &settings.insert_clip,
        &settings.video_folder,
        proxy.as_ref(),
    );

    let workers = settings.workers();
    info!("Processing {} URLs on {workers} workers", urls.len());
    let results = dispatch(urls, workers, |url| pipeline.handle_request(url))?;

    for (url, res) in urls.iter().zip(results) {
        let line = serde_json::to_string(&Outcome::new(url, res))
            .into_diagnostic()
            .wrap_err("Could not serialize the result")?;
        println!("{line}");
    }

    info!("All requests completed");
    Ok(())
}

fn select_proxy(settings: &Settings, ytdl: &Ytdl) -> Result<Option<ProxyEndpoint>> {
    let echo = HttpIpEcho::new(&settings.ip_echo_url, settings.probe_timeout());
    let selector = ProxySelector::new(
        &echo,
        ytdl,
        &settings.reference_video_url,
        settings.probe_workers,
    );
    selector
        .select(&settings.proxy_conns)
        .map_err(|err| miette::Report::from(err).wrap_err("No usable proxy"))
}

/// Load the external components
fn load_external_components(settings: &Settings) -> Result<(Ytdl, Ffmpeg)> {
    // Construct the handles concurrently as executing an external program
    // is not instantaneous. That way we can avoid adding the costs
    let ytdl_timeouts = settings.ytdl_timeouts();
    let (probe_timeout, encode_timeout) = (settings.probe_timeout(), settings.encode_timeout());
    let ytdl_thread = std::thread::spawn(move || Ytdl::new(ytdl_timeouts));
    let ffmpeg_thread = std::thread::spawn(move || Ffmpeg::new(probe_timeout, encode_timeout));

    let ytdl = ytdl_thread
        .join()
        .map_err(|_| miette!("Could not join thread"))??;
    let ffmpeg = ffmpeg_thread
        .join()
        .map_err(|_| miette!("Could not join thread"))??;

    Ok((ytdl, ffmpeg))
}
