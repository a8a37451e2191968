mod common;

use std::{
    cell::{Cell, RefCell},
    rc::Rc,
};

use arrayvec::ArrayVec;
use common::{
    HASH_SEED, NOISY_PROGRAM, RomBuilder, emulator, hash_pixels, program_rom, read, record_audio,
};
use gbcolor_core::{Buttons, CLOCK_RATE, Diagnostic, Emulator, StereoSample};

const FRAME: u32 = 70224;
// JR -2
const SPIN: &[u8] = &[0x18, 0xfe];

fn count_frames(emulator: &mut Emulator) -> Rc<Cell<u32>> {
    let frames = Rc::new(Cell::new(0));
    let counter = frames.clone();
    emulator.set_vblank_callback(move |_| counter.set(counter.get() + 1));
    frames
}

#[test]
fn ten_frames_take_ten_frame_durations() {
    let mut emulator = emulator(&program_rom(SPIN));
    emulator.run_frame();
    let frames = count_frames(&mut emulator);
    let mut cycles = 0;
    while frames.get() < 10 {
        cycles += emulator.run_step();
    }
    // both ends overshoot by less than one instruction
    assert!(cycles.abs_diff(10 * FRAME) <= 12, "{cycles}");
}

#[test]
fn every_line_is_visited_in_order() {
    let mut emulator = emulator(&program_rom(SPIN));
    emulator.run_frame();
    let frames = count_frames(&mut emulator);
    let mut previous = emulator.bus().unwrap().ppu.ly();
    assert_eq!(144, previous);
    let mut seen = [false; 154];
    while frames.get() < 1 {
        emulator.run_step();
        let ly = emulator.bus().unwrap().ppu.ly();
        assert!(ly == previous || ly == (previous + 1) % 154, "{previous} -> {ly}");
        seen[usize::from(ly)] = true;
        previous = ly;
    }
    assert!(seen.iter().all(|line| *line));
}

#[test]
fn vblank_interrupt_once_per_frame() {
    let rom = RomBuilder::new(0x00)
        .code(&[
            0xf3, // DI
            0xaf, // XOR A
            0xe0, 0x0f, // LDH (IF),A
            0x3e, 0x01, // LD A,$01
            0xe0, 0xff, // LDH (IE),A
            0xfb, // EI
            0x76, // HALT
            0x18, 0xfd, // JR -3
        ])
        .at(0x40)
        .code(&[
            0x21, 0x00, 0xc0, // LD HL,$c000
            0x34, // INC (HL)
            0xd9, // RETI
        ])
        .build();
    let mut emulator = emulator(&rom);
    for _ in 0..5 {
        emulator.run_frame();
    }
    for _ in 0..100 {
        emulator.run_step();
    }
    assert_eq!(5, read(&emulator, 0xc000));
}

#[test]
fn skipped_frame_leaves_sink_alone() {
    let mut emulator = emulator(&program_rom(SPIN));
    emulator.run_frame();
    emulator.run_frame();
    let before = emulator.pixel_sink().pixels().to_vec();

    emulator.set_colour_callback(|_| 0x00ab_cdef);
    emulator.skip_next_frame();
    emulator.run_frame();
    assert_eq!(before.as_slice(), emulator.pixel_sink().pixels());

    emulator.run_frame();
    assert!(
        emulator
            .pixel_sink()
            .pixels()
            .iter()
            .all(|pixel| *pixel == 0x00ab_cdef)
    );
}

fn scripted_run(with_inputs: bool) -> (u64, Vec<StereoSample>) {
    let mut emulator = emulator(&program_rom(NOISY_PROGRAM));
    let samples = record_audio(&mut emulator);
    let mut hash = HASH_SEED;
    for frame in 0..60 {
        if with_inputs {
            match frame {
                10 => emulator.set_buttons(Buttons::A, true),
                20 => emulator.set_buttons(Buttons::A, false),
                30 => emulator.set_buttons(Buttons::START | Buttons::B, true),
                45 => emulator.set_buttons(Buttons::all(), false),
                _ => {}
            }
        }
        emulator.run_frame();
        hash = hash_pixels(emulator.pixel_sink().pixels(), hash);
    }
    let samples = samples.borrow().clone();
    (hash, samples)
}

#[test]
fn identical_runs_are_identical() {
    let (hash, samples) = scripted_run(true);
    let (other_hash, other_samples) = scripted_run(true);
    assert_eq!(hash, other_hash);
    assert_eq!(samples, other_samples);
    assert!(samples.iter().any(|sample| sample.left != 0));

    let (idle_hash, _) = scripted_run(false);
    assert_ne!(hash, idle_hash);
}

/// Turns the LCD off, fills tile 0 with columns of shades 3, 1, 2 and 0, then turns it back on.
/// The whole background map points at tile 0.
const STRIPES_PROGRAM: &[u8] = &[
    0x3e, 0x00, // LD A,$00
    0xe0, 0x40, // LDH (LCDC),A
    0x21, 0x00, 0x80, // LD HL,$8000
    0x06, 0x08, // LD B,8
    0x3e, 0xf0, // LD A,$f0
    0x22, // LD (HL+),A
    0x3e, 0xcc, // LD A,$cc
    0x22, // LD (HL+),A
    0x05, // DEC B
    0x20, 0xf7, // JR NZ,-9
    0x3e, 0xe4, // LD A,$e4
    0xe0, 0x47, // LDH (BGP),A
    0x3e, 0x91, // LD A,$91
    0xe0, 0x40, // LDH (LCDC),A
    0x18, 0xfe, // JR -2
];

#[test]
fn known_frame_matches_reference() {
    let mut emulator = emulator(&program_rom(STRIPES_PROGRAM));
    for _ in 0..4 {
        emulator.run_frame();
    }
    let pixels = emulator.pixel_sink().pixels();
    assert_eq!(
        [0x000000, 0x000000, 0xadadad, 0xadadad, 0x525252, 0x525252, 0xffffff, 0xffffff],
        pixels[143 * 160 + 152..]
    );
    // FNV-1a of the 160x144 stripes, little-endian pixels
    assert_eq!(0x4bb2_9407_134e_a325, hash_pixels(pixels, HASH_SEED));
}

#[test]
fn audio_keeps_pace_with_video() {
    let mut emulator = emulator(&program_rom(SPIN));
    let samples = record_audio(&mut emulator);
    let frames = count_frames(&mut emulator);
    let mut cycles = 0u64;
    while frames.get() < 60 {
        cycles += u64::from(emulator.run_step());
    }
    // buffers are handed out 512 samples at a time
    let expected = cycles * 48000 / u64::from(CLOCK_RATE);
    let got = samples.borrow().len() as u64;
    assert!(got <= expected && expected - got < 512, "{got} {expected}");
    assert!(
        samples
            .borrow()
            .iter()
            .all(|sample| *sample == StereoSample::default())
    );
}

#[test]
fn double_speed_runs_the_cpu_twice_as_fast() {
    let rom = RomBuilder::new(0x00)
        .cgb_flag(0x80)
        .code(&[
            0x3e, 0x01, // LD A,$01
            0xe0, 0x4d, // LDH (KEY1),A
            0x10, 0x00, // STOP
            0x18, 0xfe, // JR -2
        ])
        .build();
    let mut emulator = emulator(&rom);
    assert!(emulator.is_cgb());
    emulator.run_frame();
    assert!(emulator.bus().unwrap().is_double_speed());

    let start = emulator.cpu().unwrap().cycles();
    emulator.run_frame();
    let cpu_cycles = emulator.cpu().unwrap().cycles() - start;
    assert!(cpu_cycles.abs_diff(2 * u64::from(FRAME)) <= 24, "{cpu_cycles}");
}

#[test]
fn button_press_ends_stop() {
    let rom = program_rom(&[
        0x3e, 0x10, // LD A,$10
        0xe0, 0x00, // LDH (P1),A
        0xaf, // XOR A
        0xe0, 0x0f, // LDH (IF),A
        0x10, 0x00, // STOP
        0x04, // INC B
        0x18, 0xfd, // JR -3
    ]);
    let mut emulator = emulator(&rom);
    for _ in 0..50 {
        emulator.run_step();
    }
    let cpu = emulator.cpu().unwrap();
    assert!(cpu.is_stopped());
    assert_eq!(0x0159, cpu.pc);
    let b = cpu.b;
    assert_eq!(0, read(&emulator, 0xff0f) & 0x10);

    emulator.set_buttons(Buttons::START, true);
    assert_ne!(0, read(&emulator, 0xff0f) & 0x10);
    emulator.run_step();
    let cpu = emulator.cpu().unwrap();
    assert!(!cpu.is_stopped());
    assert_eq!(b.wrapping_add(1), cpu.b);
    // START is bit 3 of the button lines
    assert_eq!(0xd7, read(&emulator, 0xff00));
}

#[test]
fn serial_transfer_uses_link_callback() {
    let rom = program_rom(&[
        0x3e, 0x42, // LD A,$42
        0xe0, 0x01, // LDH (SB),A
        0x3e, 0x81, // LD A,$81
        0xe0, 0x02, // LDH (SC),A
        0x18, 0xfe, // JR -2
    ]);
    let mut emulator = emulator(&rom);
    let sent = Rc::new(RefCell::new(Vec::new()));
    let link = sent.clone();
    emulator.set_link_callback(move |byte| {
        link.borrow_mut().push(byte);
        0x99
    });
    emulator.run_frame();
    assert_eq!(vec![0x42], *sent.borrow());
    assert_eq!(0x99, read(&emulator, 0xff01));
    assert_eq!(0, read(&emulator, 0xff02) & 0x80);
    assert_ne!(0, read(&emulator, 0xff0f) & 0x08);
}

#[test]
fn undefined_opcode_is_reported_once() {
    let mut emulator = emulator(&program_rom(&[0xd3]));
    let diagnostics = Rc::new(RefCell::new(ArrayVec::<Diagnostic, 4>::new()));
    let sink = diagnostics.clone();
    emulator.set_diagnostic_callback(move |diagnostic| {
        let _ = sink.borrow_mut().try_push(*diagnostic);
    });
    let frames = count_frames(&mut emulator);
    emulator.run_frame();
    emulator.run_frame();
    assert_eq!(2, frames.get());
    assert_eq!(
        [Diagnostic::UnknownInstruction {
            opcode: 0xd3,
            cb_prefix: false,
            pc: 0x0150
        }],
        diagnostics.borrow().as_slice()
    );
    assert!(emulator.cpu().unwrap().is_locked());
}
