use ble_rgbw_light::*;
use clap::Parser;
use color_eyre::eyre::Result;
use std::path::PathBuf;
use tokio::io::{self, AsyncBufReadExt, BufReader};
use tracing::{debug, warn};
use tracing_subscriber::EnvFilter;

/// Line-oriented daemon: reads commands from stdin and answers OK or ERR
#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Bluetooth address of the controller
    address: Option<String>,

    /// TOML file with address, name and transport settings
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Transport used to reach the controller
    #[arg(short, long, value_enum)]
    backend: Option<Backend>,
}

/// Attributes of a `turn_on` line.
///
/// Hue and saturation are kept apart so a line naming only one of them
/// keeps the light's current value for the other.
#[derive(Debug, Default, PartialEq)]
struct TurnOnArgs {
    brightness: Option<u8>,
    hue: Option<f64>,
    saturation: Option<f64>,
    white: Option<u8>,
}

impl TurnOnArgs {
    fn merge(self, current: (f64, f64)) -> TurnOn {
        let hs_color = match (self.hue, self.saturation) {
            (None, None) => None,
            (hue, saturation) => Some((hue.unwrap_or(current.0), saturation.unwrap_or(current.1))),
        };
        TurnOn {
            brightness: self.brightness,
            hs_color,
            white_value: self.white,
        }
    }
}

#[derive(Debug, PartialEq)]
enum Request {
    TurnOn(TurnOnArgs),
    TurnOff,
    SetColor(u8, u8, u8),
    SetWhite(u8),
    State,
}

/// Parses `command[:arguments]`
fn parse_request(line: &str) -> std::result::Result<Request, String> {
    let mut parts = line.trim().splitn(2, ':');
    let command = parts.next().unwrap_or_default();
    let args = parts.next().map(str::trim);

    match command {
        "turn_on" => {
            let mut request = TurnOnArgs::default();
            for pair in args.into_iter().flat_map(|a| a.split(',')).filter(|p| !p.is_empty()) {
                let (key, value) = pair
                    .split_once('=')
                    .ok_or_else(|| format!("Expected key=value, got {pair:?}"))?;
                match key.trim() {
                    "brightness" => request.brightness = Some(parse_number(value)?),
                    "white" => request.white = Some(parse_number(value)?),
                    "hue" => request.hue = Some(parse_number(value)?),
                    "saturation" => request.saturation = Some(parse_number(value)?),
                    other => return Err(format!("Unknown attribute: {other}")),
                }
            }
            Ok(Request::TurnOn(request))
        }
        "turn_off" => Ok(Request::TurnOff),
        "set_color" => {
            let rgb = args
                .ok_or("no color given")?
                .split(',')
                .map(parse_number)
                .collect::<std::result::Result<Vec<u8>, _>>()?;
            match rgb[..] {
                [r, g, b] => Ok(Request::SetColor(r, g, b)),
                _ => Err("Invalid color format. Use R,G,B (e.g., 255,0,0 for red)".to_string()),
            }
        }
        "set_white" => Ok(Request::SetWhite(parse_number(args.ok_or("no white level given")?)?)),
        "state" => Ok(Request::State),
        "" => Err("No command given".to_string()),
        other => Err(format!("Unknown command: {other}")),
    }
}

fn parse_number<T: std::str::FromStr>(s: &str) -> std::result::Result<T, String> {
    s.trim()
        .parse()
        .map_err(|_| format!("Invalid number: {:?}", s.trim()))
}

async fn handle(light: &mut RgbwLight, request: Request) -> Result<String> {
    match request {
        Request::TurnOn(args) => {
            let request = args.merge(light.hs_color());
            light.turn_on(request).await?
        }
        Request::TurnOff => light.turn_off().await?,
        Request::SetColor(r, g, b) => light.set_rgb(r, g, b).await?,
        Request::SetWhite(level) => light.turn_on(TurnOn::default().white_value(level)).await?,
        Request::State => {
            let (hue, saturation) = light.hs_color();
            return Ok(format!(
                "OK on={} brightness={} hue={} saturation={} white={}",
                light.is_on(),
                light.brightness(),
                hue,
                saturation,
                light.white_value()
            ));
        }
    }
    Ok("OK".to_string())
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_env("RUST_LOG")
                .unwrap_or_else(|_| EnvFilter::new("ble_rgbw_light=warn")),
        )
        .with_writer(std::io::stderr)
        .compact()
        .init();

    color_eyre::install()?;

    let args = Args::parse();
    let mut config = match (&args.config, &args.address) {
        (Some(path), _) => LightConfig::from_file(path)?,
        (None, Some(address)) => LightConfig::new(address.clone(), address.clone()),
        (None, None) => {
            eprintln!("Usage: rgbwd <address> | rgbwd --config <file>");
            std::process::exit(1);
        }
    };
    if let (Some(_), Some(address)) = (&args.config, &args.address) {
        config.address = address.clone();
    }
    if let Some(backend) = args.backend {
        config.backend = backend;
    }

    let interactor = Interactor::from_config(&config).await?;
    let mut light = RgbwLight::new(config.name.clone(), interactor);

    // Inform about successful initialization
    println!("OK");

    let mut lines = BufReader::new(io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        debug!("Received {:?}", line);
        match parse_request(&line) {
            Ok(request) => match handle(&mut light, request).await {
                Ok(reply) => println!("{reply}"),
                Err(e) => {
                    warn!("Command failed: {}", e);
                    println!("ERR {e}");
                }
            },
            Err(e) => println!("ERR {e}"),
        }
    }

    // stdin closed: let queued writes finish
    light.close().await?;
    Ok(())
}
