use std::{
    cell::{Cell, RefCell},
    error::Error,
    path::PathBuf,
    rc::Rc,
};

use gbcolor_core::{Config, Emulator, SystemPreference};

const DEFAULT_FRAMES: u32 = 600;

struct Args {
    rom: PathBuf,
    frames: u32,
    system: SystemPreference,
}

fn parse_args() -> Result<Args, String> {
    let mut rom = None;
    let mut frames = DEFAULT_FRAMES;
    let mut system = SystemPreference::Auto;
    let mut args = std::env::args().skip(1);
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--dmg" => system = SystemPreference::Dmg,
            "--cgb" => system = SystemPreference::Cgb,
            "--frames" => {
                let value = args.next().ok_or("--frames needs a value")?;
                frames = value
                    .parse()
                    .map_err(|_| format!("invalid frame count {value}"))?;
            }
            _ if rom.is_none() => rom = Some(PathBuf::from(arg)),
            _ => return Err(format!("unexpected argument {arg}")),
        }
    }
    Ok(Args {
        rom: rom.ok_or("usage: gbcolor <rom> [--frames N] [--dmg|--cgb]")?,
        frames,
        system,
    })
}

fn main() -> Result<(), Box<dyn Error>> {
    env_logger::init();

    let args = parse_args()?;
    let rom = std::fs::read(&args.rom)?;

    let mut emulator = Emulator::new(Config {
        system: args.system,
        ..Default::default()
    });
    let info = emulator.load_rom(&rom)?;
    println!("Title: {}", info.title);
    println!("Cartridge: {:?} {:?}", info.mbc, info.flags);
    println!("ROM size: {} KiB", info.rom_size / 1024);
    println!("RAM size: {} bytes", info.ram_size);

    let save_path = args.rom.with_extension("sav");
    if emulator.has_battery()
        && let Ok(sram) = std::fs::read(&save_path)
        && let Err(error) = emulator.set_sram(&sram)
    {
        log::warn!("ignoring {}: {error}", save_path.display());
    }

    // test ROMs print their results on the serial port
    let serial = Rc::new(RefCell::new(Vec::new()));
    let link_output = serial.clone();
    emulator.set_link_callback(move |byte| {
        link_output.borrow_mut().push(byte);
        0xff
    });
    let samples = Rc::new(Cell::new(0usize));
    let sample_count = samples.clone();
    emulator.set_audio_callback(move |buffer| sample_count.set(sample_count.get() + buffer.len()));
    emulator.set_diagnostic_callback(|diagnostic| eprintln!("diagnostic: {diagnostic}"));

    for _ in 0..args.frames {
        emulator.run_frame();
    }

    let serial = serial.borrow();
    if !serial.is_empty() {
        println!("Serial: {}", String::from_utf8_lossy(&serial));
    }
    println!("Audio samples: {}", samples.get());
    println!("Frame hash: {:016x}", frame_hash(emulator.pixel_sink().pixels()));

    if emulator.has_battery()
        && let Some(sram) = emulator.sram()
    {
        std::fs::write(&save_path, sram)?;
        log::info!("wrote {}", save_path.display());
    }
    Ok(())
}

// FNV-1a
fn frame_hash(pixels: &[u32]) -> u64 {
    pixels
        .iter()
        .flat_map(|pixel| pixel.to_le_bytes())
        .fold(0xcbf2_9ce4_8422_2325, |hash, byte| {
            (hash ^ u64::from(byte)).wrapping_mul(0x0100_0000_01b3)
        })
}
