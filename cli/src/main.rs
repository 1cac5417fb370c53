use std::fmt::Display;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use clap::{App, AppSettings, Arg, ArgMatches};
use log::warn;

use v4l2cam::controls::Control;
use v4l2cam::device::DeviceConfig;
use v4l2cam::{Camera, CameraConfig, CameraManager, ManagerConfig};

const NAMED_CONTROLS: &[&str] = &[
    "pan",
    "tilt",
    "zoom",
    "brightness",
    "temperature",
    "auto-white-balance",
];

fn describe<C>(label: &str, control: &C) -> String
where
    C: Control,
    C::Value: Display,
{
    let value = match control.value() {
        Ok(v) => v.to_string(),
        Err(e) => format!("<{}>", e),
    };
    let friendly = match control.user_friendly_value() {
        Ok(Some(s)) => format!(" ({})", s),
        _ => String::new(),
    };

    format!(
        "{:<20} {:<32} [{}..{} step {}] = {}{}{}",
        label,
        control.name(),
        control.minimum(),
        control.maximum(),
        control.step(),
        value,
        friendly,
        if control.is_enabled() { "" } else { " (disabled)" },
    )
}

fn watch<C>(label: &str, control: &C)
where
    C: Control + Clone + Send + Sync + 'static,
    C::Value: Display,
{
    let label = label.to_string();
    let reader = control.clone();
    control.connect_changed(Arc::new(move || match reader.value() {
        Ok(v) => println!("{}: {}", label, v),
        Err(e) => warn!("{}: {}", label, e),
    }));
}

fn parse_id(s: &str) -> Result<u32> {
    let id = match s.strip_prefix("0x") {
        Some(hex) => u32::from_str_radix(hex, 16),
        None => s.parse(),
    };
    id.with_context(|| {
        format!(
            "invalid control {:?}, expected one of {} or a control ID",
            s,
            NAMED_CONTROLS.join(", ")
        )
    })
}

fn parse_bool(s: &str) -> Result<bool> {
    match s {
        "1" | "true" | "on" => Ok(true),
        "0" | "false" | "off" => Ok(false),
        _ => bail!("invalid boolean value {:?}", s),
    }
}

fn missing(name: &str) -> anyhow::Error {
    anyhow!("this camera has no {} control", name)
}

fn get(camera: &Camera, name: &str) -> Result<String> {
    Ok(match name {
        "pan" => camera.pan().ok_or_else(|| missing(name))?.value()?.to_string(),
        "tilt" => camera.tilt().ok_or_else(|| missing(name))?.value()?.to_string(),
        "zoom" => camera.zoom().ok_or_else(|| missing(name))?.value()?.to_string(),
        "brightness" => camera
            .brightness()
            .ok_or_else(|| missing(name))?
            .value()?
            .to_string(),
        "temperature" => camera
            .temperature()
            .ok_or_else(|| missing(name))?
            .value()?
            .to_string(),
        "auto-white-balance" => camera
            .auto_white_balance()
            .ok_or_else(|| missing(name))?
            .value()?
            .to_string(),
        _ => {
            let id = parse_id(name)?;
            let advanced = camera.advanced_controls();
            if let Some(control) = advanced.integers.get(&id) {
                control.value()?.to_string()
            } else if let Some(control) = advanced.booleans.get(&id) {
                control.value()?.to_string()
            } else {
                return Err(missing(name));
            }
        }
    })
}

fn set(camera: &Camera, name: &str, value: &str) -> Result<()> {
    let int = || -> Result<i32> {
        value
            .parse()
            .with_context(|| format!("invalid integer value {:?}", value))
    };
    let float = || -> Result<f32> {
        value
            .parse()
            .with_context(|| format!("invalid angle {:?}", value))
    };

    match name {
        "pan" => camera.pan().ok_or_else(|| missing(name))?.set_value(float()?)?,
        "tilt" => camera.tilt().ok_or_else(|| missing(name))?.set_value(float()?)?,
        "zoom" => camera.zoom().ok_or_else(|| missing(name))?.set_value(int()?)?,
        "brightness" => camera
            .brightness()
            .ok_or_else(|| missing(name))?
            .set_value(int()?)?,
        "temperature" => camera
            .temperature()
            .ok_or_else(|| missing(name))?
            .set_value(int()?)?,
        "auto-white-balance" => camera
            .auto_white_balance()
            .ok_or_else(|| missing(name))?
            .set_value(parse_bool(value)?)?,
        _ => {
            let id = parse_id(name)?;
            let advanced = camera.advanced_controls();
            if let Some(control) = advanced.integers.get(&id) {
                control.set_value(int()?)?
            } else if let Some(control) = advanced.booleans.get(&id) {
                control.set_value(parse_bool(value)?)?
            } else {
                return Err(missing(name));
            }
        }
    }

    Ok(())
}

fn list_controls(camera: &Camera) {
    if let Some(c) = camera.pan() {
        println!("{}", describe("pan", c));
    }
    if let Some(c) = camera.tilt() {
        println!("{}", describe("tilt", c));
    }
    if let Some(c) = camera.zoom() {
        println!("{}", describe("zoom", c));
    }
    if let Some(c) = camera.brightness() {
        println!("{}", describe("brightness", c));
    }
    if let Some(c) = camera.temperature() {
        println!("{}", describe("temperature", c));
    }
    if let Some(c) = camera.auto_white_balance() {
        println!("{}", describe("auto-white-balance", c));
    }

    let advanced = camera.advanced_controls();
    for (id, c) in &advanced.integers {
        println!("{}", describe(&format!("0x{:08x}", id), c));
    }
    for (id, c) in &advanced.booleans {
        println!("{}", describe(&format!("0x{:08x}", id), c));
    }
}

fn watch_controls(camera: &Camera) -> Result<()> {
    if let Some(c) = camera.pan() {
        watch("pan", c);
    }
    if let Some(c) = camera.tilt() {
        watch("tilt", c);
    }
    if let Some(c) = camera.zoom() {
        watch("zoom", c);
    }
    if let Some(c) = camera.brightness() {
        watch("brightness", c);
    }
    if let Some(c) = camera.temperature() {
        watch("temperature", c);
    }
    if let Some(c) = camera.auto_white_balance() {
        watch("auto-white-balance", c);
    }
    let advanced = camera.advanced_controls();
    for (id, c) in &advanced.integers {
        watch(&format!("0x{:08x}", id), c);
    }
    for (id, c) in &advanced.booleans {
        watch(&format!("0x{:08x}", id), c);
    }

    if !camera.is_listening() {
        bail!("{} does not deliver change notifications", camera.raw_name());
    }

    let lets_quit = Arc::new(AtomicBool::new(false));
    // Setup the Ctrl+c handler.
    {
        let lets_quit_handler = lets_quit.clone();
        ctrlc::set_handler(move || {
            lets_quit_handler.store(true, Ordering::SeqCst);
        })
        .context("Failed to set Ctrl-C handler")?;
    }

    println!("Watching {} for changes, press Ctrl-C to stop.", camera.name());
    while !lets_quit.load(Ordering::SeqCst) {
        if !camera.is_listening() {
            bail!("change notifications stopped");
        }
        thread::sleep(Duration::from_millis(100));
    }

    Ok(())
}

fn select_camera<'a>(manager: &'a CameraManager, matches: &ArgMatches) -> Result<&'a Camera> {
    match matches.value_of("device") {
        Some(name) => manager
            .find(name)
            .ok_or_else(|| anyhow!("no supported camera named {:?}", name)),
        None => Ok(manager.default_camera()?),
    }
}

fn main() -> Result<()> {
    env_logger::builder().format_timestamp(None).init();

    let matches = App::new("v4l2cam")
        .about("Inspect and adjust webcam controls over V4L2")
        .setting(AppSettings::SubcommandRequiredElseHelp)
        .arg(
            Arg::with_name("device")
                .long("device")
                .short('d')
                .global(true)
                .takes_value(true)
                .help("Camera to use, by device node (e.g. \"video0\") or name"),
        )
        .arg(
            Arg::with_name("sysfs_dir")
                .long("sysfs-dir")
                .global(true)
                .takes_value(true)
                .default_value("/sys/class/video4linux")
                .help("Directory listing the video devices"),
        )
        .arg(
            Arg::with_name("device_dir")
                .long("device-dir")
                .global(true)
                .takes_value(true)
                .default_value("/dev")
                .help("Directory containing the device nodes"),
        )
        .arg(
            Arg::with_name("read_write")
                .long("read-write")
                .global(true)
                .help("Open the device nodes for writing, for drivers that require it to set controls"),
        )
        .subcommand(App::new("list").about("List the supported cameras"))
        .subcommand(App::new("controls").about("Show the controls of a camera and their values"))
        .subcommand(App::new("modes").about("Show the video modes of a camera, best first"))
        .subcommand(
            App::new("get").about("Read a control").arg(
                Arg::with_name("control")
                    .required(true)
                    .help("Name of the control (pan, tilt, zoom, brightness, temperature, auto-white-balance) or control ID"),
            ),
        )
        .subcommand(
            App::new("set")
                .about("Write a control")
                .arg(Arg::with_name("control").required(true).help("Name or ID of the control"))
                .arg(
                    Arg::with_name("value")
                        .required(true)
                        .allow_hyphen_values(true)
                        .help("Value in the unit of the control (degrees, percent, Kelvin, ...)"),
                ),
        )
        .subcommand(App::new("watch").about("Print changes made to the controls until Ctrl-C"))
        .get_matches();

    let (command, sub_matches) = matches
        .subcommand()
        .ok_or_else(|| anyhow!("no command given"))?;

    let device_config = if sub_matches.is_present("read_write") {
        DeviceConfig::new().read_write()
    } else {
        DeviceConfig::new()
    };
    let camera_config = CameraConfig::new()
        .device_dir(sub_matches.value_of("device_dir").unwrap_or("/dev"))
        .device_config(device_config)
        .listen_events(command == "watch");
    let config = ManagerConfig::new()
        .sysfs_dir(
            sub_matches
                .value_of("sysfs_dir")
                .unwrap_or("/sys/class/video4linux"),
        )
        .camera_config(camera_config);
    let manager = CameraManager::new(config)?;

    match command {
        "list" => {
            let default = manager.default_camera().ok().map(Camera::raw_name);
            for camera in manager.cameras() {
                println!(
                    "{} {:<10} {} ({}, {})",
                    if Some(camera.raw_name()) == default { "*" } else { " " },
                    camera.raw_name(),
                    camera.name(),
                    camera.capability().driver,
                    camera.capability().bus_info,
                );
            }
        }
        "controls" => list_controls(select_camera(&manager, sub_matches)?),
        "modes" => {
            for mode in select_camera(&manager, sub_matches)?.video_modes() {
                println!("{}", mode);
            }
        }
        "get" => {
            let camera = select_camera(&manager, sub_matches)?;
            let name = sub_matches.value_of("control").unwrap_or_default();
            println!("{}", get(camera, name)?);
        }
        "set" => {
            let camera = select_camera(&manager, sub_matches)?;
            let name = sub_matches.value_of("control").unwrap_or_default();
            let value = sub_matches.value_of("value").unwrap_or_default();
            set(camera, name, value)?;
            println!("{}", get(camera, name)?);
        }
        "watch" => watch_controls(select_camera(&manager, sub_matches)?)?,
        _ => unreachable!(),
    }

    Ok(())
}
