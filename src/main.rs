use ble_rgbw_light::*;
use clap::{Parser, Subcommand};
use color_eyre::eyre::{eyre, Result};
use std::path::PathBuf;
use tokio::time::Duration;
use tracing::{debug, error, info, instrument, trace};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// TOML file with address, name and transport settings
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Bluetooth address of the controller (overrides the config file)
    #[arg(short, long)]
    address: Option<String>,

    /// Display name of the light (overrides the config file)
    #[arg(short, long)]
    name: Option<String>,

    /// Transport used to reach the controller (overrides the config file)
    #[arg(short, long, value_enum)]
    backend: Option<Backend>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Demonstration of the light's features
    Demo {
        /// Duration of each demo step in seconds
        #[arg(short, long, default_value_t = 5)]
        duration: u64,
    },
    /// Turn the light on
    On,
    /// Turn the light off
    Off,
    /// Set custom RGB color
    Color {
        /// Red value (0-255)
        #[arg(short, long, default_value_t = 255)]
        red: u8,
        /// Green value (0-255)
        #[arg(short, long, default_value_t = 255)]
        green: u8,
        /// Blue value (0-255)
        #[arg(short, long, default_value_t = 255)]
        blue: u8,
    },
    /// Set the white channel
    White {
        /// White level (0-255)
        #[arg(short, long, default_value_t = 255)]
        level: u8,
    },
    /// Set hue, saturation and brightness
    Hs {
        /// Hue in degrees (0-360)
        #[arg(long)]
        hue: f64,
        /// Saturation in percent (0-100)
        #[arg(long)]
        saturation: f64,
        /// Brightness (0-255)
        #[arg(long, default_value_t = 255)]
        brightness: u8,
    },
}

/// Merges the config file with command line overrides
fn load_config(cli: &Cli) -> Result<LightConfig> {
    let mut config = match &cli.config {
        Some(path) => LightConfig::from_file(path)?,
        None => {
            let address = cli
                .address
                .clone()
                .ok_or_else(|| eyre!("either --config or --address is required"))?;
            LightConfig::new(address, cli.name.clone().unwrap_or_else(|| "light".to_string()))
        }
    };

    if let Some(address) = &cli.address {
        config.address = address.clone();
    }
    if let Some(name) = &cli.name {
        config.name = name.clone();
    }
    if let Some(backend) = cli.backend {
        config.backend = backend;
    }

    config.validate()?;
    Ok(config)
}

#[tokio::main]
#[instrument]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_env("RUST_LOG")
                .unwrap_or_else(|_| EnvFilter::new("ble_rgbw_light=info")),
        )
        .compact()
        .init();

    color_eyre::install()?;

    let cli = Cli::parse();
    debug!("Parsed command line arguments");

    let config = load_config(&cli)?;
    let interactor = match Interactor::from_config(&config).await {
        Ok(interactor) => interactor,
        Err(e) => {
            error!("Failed to initialize {}: {}", config.address, e);
            return Err(e.into());
        }
    };

    match cli.command {
        Commands::Demo { duration } => {
            let mut light = RgbwLight::new(config.name.clone(), interactor);
            run_demo(&mut light, duration).await?;
            light.close().await?;
        }
        Commands::Hs {
            hue,
            saturation,
            brightness,
        } => {
            let mut light = RgbwLight::new(config.name.clone(), interactor);
            light
                .turn_on(
                    TurnOn::default()
                        .hs_color(hue, saturation)
                        .brightness(brightness),
                )
                .await?;
            light.close().await?;
        }
        Commands::On => {
            interactor.set_on().await?;
            interactor.close().await?;
        }
        Commands::Off => {
            interactor.set_off().await?;
            interactor.close().await?;
        }
        Commands::Color { red, green, blue } => {
            interactor.set_on().await?;
            interactor.set_color(red, green, blue).await?;
            interactor.close().await?;
        }
        Commands::White { level } => {
            interactor.set_on().await?;
            interactor.set_white(level).await?;
            interactor.close().await?;
        }
    }

    Ok(())
}

/// Sleep for specified number of seconds
#[instrument]
async fn sleep(seconds: u64) {
    trace!("Sleeping for {}s", seconds);
    tokio::time::sleep(Duration::from_secs(seconds)).await;
}

/// Run a demonstration of the light's features
#[instrument(skip(light))]
async fn run_demo(light: &mut RgbwLight, duration: u64) -> Result<()> {
    info!("Running demo on {} with {}s intervals", light.name(), duration);

    info!("Turning light on");
    light.turn_on(TurnOn::default()).await?;
    sleep(duration).await;

    for (label, hue) in [("red", 0.0), ("green", 120.0), ("blue", 240.0)] {
        info!("Setting color to {}", label);
        light
            .turn_on(TurnOn::default().hs_color(hue, 100.0))
            .await?;
        sleep(duration).await;
    }

    info!("Setting brightness to 50%");
    light.turn_on(TurnOn::default().brightness(128)).await?;
    sleep(duration).await;

    info!("Setting white channel to full");
    light.turn_on(TurnOn::default().white_value(255)).await?;
    sleep(duration).await;

    info!("Turning white channel off");
    light.turn_on(TurnOn::default().white_value(0)).await?;
    sleep(1).await;

    info!("Turning light off to end demo");
    light.turn_off().await?;

    info!("Demo completed!");
    Ok(())
}
