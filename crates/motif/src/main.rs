use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::bail;
use clap::Parser;
use motif_core::{
    list_output_ports, BoundsPercent, ConfigManager, Engine, PatchManager, PlayMode,
};

/// Motion-triggered MIDI: maps camera regions to notes.
#[derive(Parser, Debug)]
#[command(name = "motif")]
#[command(about = "Motif motion-to-MIDI engine")]
struct Args {
    /// Directory of image frames to play through the engine, in
    /// filename order
    frames_dir: Option<PathBuf>,

    /// Frames per second to replay at
    #[arg(long, default_value_t = 5.0)]
    fps: f64,

    /// Config file path (default: config.json, created if missing)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Patch file to load before processing
    #[arg(long)]
    patch: Option<PathBuf>,

    /// Override the configured MIDI port name match
    #[arg(long)]
    midi_port: Option<String>,

    /// Region definition "id:x1,y1,x2,y2[:note[:mode]]" with percent
    /// coordinates, e.g. "kick:10,10,50,50:36:restart" (repeatable)
    #[arg(long = "region", value_parser = parse_region)]
    regions: Vec<RegionSpec>,

    /// Allow overlapping sounds (set false for one-at-a-time play)
    #[arg(long)]
    simultaneous: Option<bool>,

    /// List available MIDI output ports and exit
    #[arg(long)]
    list_midi_ports: bool,
}

#[derive(Debug, Clone)]
struct RegionSpec {
    id: String,
    bounds: BoundsPercent,
    note: Option<u8>,
    mode: PlayMode,
}

fn parse_region(s: &str) -> Result<RegionSpec, String> {
    let mut parts = s.split(':');
    let id = match parts.next() {
        Some(id) if !id.is_empty() => id.to_string(),
        _ => return Err("Missing region id".to_string()),
    };

    let coords = parts
        .next()
        .ok_or_else(|| "Missing bounds (x1,y1,x2,y2)".to_string())?;
    let coords: Vec<f64> = coords
        .split(',')
        .map(|c| {
            c.trim()
                .parse::<f64>()
                .map_err(|e| format!("Bad coordinate '{}': {}", c, e))
        })
        .collect::<Result<_, _>>()?;
    if coords.len() != 4 {
        return Err(format!("Expected 4 coordinates, got {}", coords.len()));
    }

    let note = match parts.next() {
        None | Some("") => None,
        Some(n) => Some(
            n.parse::<u8>()
                .map_err(|e| format!("Bad MIDI note '{}': {}", n, e))?,
        ),
    };
    let mode = match parts.next() {
        Some(m) => m.parse::<PlayMode>()?,
        None => PlayMode::default(),
    };

    Ok(RegionSpec {
        id,
        bounds: BoundsPercent::new(coords[0], coords[1], coords[2], coords[3]),
        note,
        mode,
    })
}

#[tokio::main]
async fn main() -> Result<(), anyhow::Error> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    if args.list_midi_ports {
        let ports = list_output_ports();
        if ports.is_empty() {
            println!("No MIDI output ports found");
        } else {
            println!("MIDI output ports:");
            for port in ports {
                println!("  {}", port);
            }
        }
        return Ok(());
    }

    let mut config_manager = ConfigManager::new(args.config.clone());
    let mut settings = config_manager.load()?;
    if let Some(port) = &args.midi_port {
        settings.midi_port = port.clone();
    }
    if let Err(errors) = ConfigManager::validate_settings(&settings) {
        bail!("Invalid configuration: {}", errors.join("; "));
    }

    println!("Configuring Motif:");
    println!("MIDI port match: {}", settings.midi_port);
    println!("Cooldown: {:.1}s", settings.cooldown_secs);
    println!("Note length: {:.1}s", settings.note_off_delay_secs);

    let engine = Engine::new(&settings)?;

    if let Some(path) = &args.patch {
        let mut patches = PatchManager::new()?;
        let patch = patches.load_patch(path)?;
        println!("Loaded patch '{}' ({} regions)", patch.name, patch.regions.len());
        patches.apply_patch_to_engine(&engine)?;
    }

    for spec in &args.regions {
        engine.upsert_region(&spec.id, spec.bounds);
        engine.set_midi_note(&spec.id, spec.note)?;
        engine.set_play_mode(&spec.id, spec.mode);
    }
    if let Some(simultaneous) = args.simultaneous {
        engine.set_simultaneous_play(simultaneous);
    }

    let Some(frames_dir) = &args.frames_dir else {
        bail!("A frames directory is required (or pass --list-midi-ports)");
    };
    let frames = collect_frames(frames_dir)?;
    if frames.is_empty() {
        bail!("No image frames found in {:?}", frames_dir);
    }
    println!(
        "Replaying {} frames from {:?} at {:.1} fps",
        frames.len(),
        frames_dir,
        args.fps
    );

    let frame_interval = Duration::from_secs_f64(1.0 / args.fps.max(0.1));
    let mut trigger_counts: BTreeMap<String, u32> = BTreeMap::new();

    for path in &frames {
        let bytes = fs::read(path)?;
        match engine.process_frame_bytes(&bytes) {
            Ok(report) => {
                for (region_id, _) in report.triggered() {
                    *trigger_counts.entry(region_id.clone()).or_insert(0) += 1;
                }
                if let Some(global) = report.global {
                    if global.motion {
                        log::info!(
                            "Frame {:?}: whole-frame motion, area {}",
                            path.file_name().unwrap_or_default(),
                            global.area
                        );
                    }
                }
            }
            Err(err) => log::warn!("Skipping frame {:?}: {}", path, err),
        }
        tokio::time::sleep(frame_interval).await;
    }

    if trigger_counts.is_empty() {
        println!("No region triggers fired");
    } else {
        println!("Triggers fired:");
        for (region_id, count) in &trigger_counts {
            println!("  {}: {}", region_id, count);
        }
    }

    // Let outstanding note-offs land before exiting
    let pending = engine.pending_note_offs();
    if pending > 0 {
        log::info!("Waiting for {} pending note-off(s)", pending);
        tokio::time::sleep(settings.note_off_delay()).await;
    }
    engine.shutdown();

    Ok(())
}

/// Image files in the directory, sorted by filename.
fn collect_frames(dir: &Path) -> Result<Vec<PathBuf>, anyhow::Error> {
    let mut frames = Vec::new();
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        let is_image = path
            .extension()
            .and_then(|ext| ext.to_str())
            .map_or(false, |ext| {
                matches!(
                    ext.to_ascii_lowercase().as_str(),
                    "png" | "jpg" | "jpeg" | "bmp"
                )
            });
        if path.is_file() && is_image {
            frames.push(path);
        }
    }
    frames.sort();
    Ok(frames)
}
