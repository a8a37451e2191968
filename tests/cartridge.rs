mod common;

use common::{RomBuilder, emulator, emulator_with, program_rom, read};
use gbcolor_core::{
    CartridgeInfo, Config, Emulator, LoadError, ParseError, RtcRegisters, RtcUpdate,
    SramSizeMismatch, System, SystemPreference, get_rom_info,
    cartridge::{CartridgeFlags, CgbSupport, MbcVariant},
};

#[test]
fn header_errors() {
    let rom = program_rom(&[]);
    assert_eq!(
        Err(ParseError::TooSmall { len: 0x14f }),
        get_rom_info(&rom[..0x14f])
    );

    let rom = RomBuilder::new(0xfc).build();
    assert_eq!(
        Err(ParseError::UnknownCartridgeType(0xfc)),
        get_rom_info(&rom)
    );

    let mut rom = program_rom(&[]);
    rom[0x14d] ^= 0xff;
    assert!(matches!(
        get_rom_info(&rom),
        Err(ParseError::HeaderChecksum { .. })
    ));

    let rom = RomBuilder::new(0x00).ram_size(9).build();
    assert_eq!(Err(ParseError::InvalidRamSize(9)), get_rom_info(&rom));
}

#[test]
fn header_fields() {
    let rom = RomBuilder::new(0x13)
        .title(b"POCKET")
        .cgb_flag(0x80)
        .rom_size(2)
        .ram_size(3)
        .build();
    let info: CartridgeInfo = get_rom_info(&rom).unwrap();
    assert_eq!("POCKET", info.title.as_str());
    assert_eq!(MbcVariant::Mbc3, info.mbc);
    assert_eq!(CartridgeFlags::RAM | CartridgeFlags::BATTERY, info.flags);
    assert_eq!(CgbSupport::Supported, info.cgb);
    assert_eq!(128 * 1024, info.rom_size);
    assert_eq!(8, info.rom_banks());
    assert_eq!(32 * 1024, info.ram_size);
    assert!(info.has_battery());
    assert!(!info.has_rtc());

    // MBC2 RAM lives in the controller whatever the header says
    let info = get_rom_info(&RomBuilder::new(0x06).build()).unwrap();
    assert_eq!(512, info.ram_size);
}

#[test]
fn failed_load_keeps_the_previous_cartridge() {
    let rom = RomBuilder::new(0x00).title(b"FIRST").code(&[0x18, 0xfe]).build();
    let mut emulator = emulator(&rom);
    emulator.run_frame();

    let rom = RomBuilder::new(0x01).rom_size(2).build();
    assert_eq!(
        Err(LoadError::RomTruncated {
            declared: 128 * 1024,
            actual: 64 * 1024
        }),
        emulator.load_rom(&rom[..64 * 1024])
    );
    assert!(matches!(
        emulator.load_rom(&[0; 16]),
        Err(LoadError::InvalidRom(ParseError::TooSmall { len: 16 }))
    ));
    assert_eq!("FIRST", emulator.cartridge_info().unwrap().title.as_str());
    assert_eq!(0x0150, emulator.cpu().unwrap().pc);
}

#[test]
fn forced_system_must_be_supported() {
    let cgb_only = RomBuilder::new(0x00).cgb_flag(0xc0).build();
    let mut emulator = Emulator::new(Config {
        system: SystemPreference::Dmg,
        ..Default::default()
    });
    assert_eq!(
        Err(LoadError::UnsupportedSystem {
            cgb_only: true,
            forced: System::Dmg
        }),
        emulator.load_rom(&cgb_only)
    );
    assert!(emulator.cpu().is_none());

    let dual = RomBuilder::new(0x00).cgb_flag(0x80).build();
    let emulator = emulator_with(
        &dual,
        Config {
            system: SystemPreference::Dmg,
            ..Default::default()
        },
    );
    assert!(!emulator.is_cgb());
    assert_eq!(0x01, emulator.cpu().unwrap().a);
}

/// Selects `bank` through $2100 and copies the first byte of the switchable window to $c000.
fn visible_bank(cartridge_type: u8, bank: u8) -> u8 {
    let mut builder = RomBuilder::new(cartridge_type).rom_size(2).code(&[
        0x3e, bank, // LD A,bank
        0xea, 0x00, 0x21, // LD ($2100),A
        0xfa, 0x00, 0x40, // LD A,($4000)
        0xea, 0x00, 0xc0, // LD ($c000),A
        0x18, 0xfe, // JR -2
    ]);
    for marker in 1..8u8 {
        builder = builder.at(usize::from(marker) * 0x4000).code(&[marker]);
    }
    let mut emulator = emulator(&builder.build());
    emulator.run_frame();
    read(&emulator, 0xc000)
}

#[test]
fn bank_switching() {
    for cartridge_type in [0x01, 0x05, 0x11, 0x19] {
        assert_eq!(5, visible_bank(cartridge_type, 5), "{cartridge_type:02x}");
        // bank numbers wrap to the ROM size
        assert_eq!(3, visible_bank(cartridge_type, 11), "{cartridge_type:02x}");
    }
    for cartridge_type in [0x01, 0x05, 0x11] {
        assert_eq!(1, visible_bank(cartridge_type, 0), "{cartridge_type:02x}");
    }
    // MBC5 maps bank 0 as asked, and byte 0 of the ROM is 0
    assert_eq!(0, visible_bank(0x19, 0));
}

#[test]
fn battery_ram_round_trip() {
    let rom = RomBuilder::new(0x03)
        .ram_size(2)
        .code(&[
            0x3e, 0x0a, // LD A,$0a
            0xea, 0x00, 0x00, // LD ($0000),A
            0xfa, 0x00, 0xa0, // LD A,($a000)
            0xea, 0x00, 0xc0, // LD ($c000),A
            0x3e, 0x77, // LD A,$77
            0xea, 0x01, 0xa0, // LD ($a001),A
            0x18, 0xfe, // JR -2
        ])
        .build();
    let mut emulator = emulator(&rom);
    assert!(emulator.has_battery());
    assert_eq!(
        Err(SramSizeMismatch {
            expected: 8192,
            actual: 100
        }),
        emulator.set_sram(&[0; 100])
    );

    let mut sram = vec![0; 8192];
    sram[0] = 0x5a;
    emulator.set_sram(&sram).unwrap();
    emulator.run_frame();
    assert_eq!(0x5a, read(&emulator, 0xc000));
    let sram = emulator.sram().unwrap();
    assert_eq!([0x5a_u8, 0x77], sram[..2]);

    let plain = common::emulator(&program_rom(&[]));
    assert_eq!(None, plain.sram());
}

fn rtc_emulator(rtc_update: RtcUpdate) -> Emulator {
    let rom = RomBuilder::new(0x0f).code(&[0x18, 0xfe]).build();
    let mut emulator = emulator_with(
        &rom,
        Config {
            rtc_update,
            ..Default::default()
        },
    );
    assert!(emulator.has_rtc());
    assert!(emulator.set_rtc(RtcRegisters {
        seconds: 59,
        minutes: 1,
        ..Default::default()
    }));
    emulator
}

#[test]
fn clock_follows_emulated_time() {
    let mut emulator = rtc_emulator(RtcUpdate::EmulatedTime);
    for _ in 0..60 {
        emulator.run_frame();
    }
    let rtc = emulator.rtc().unwrap();
    assert_eq!((0, 2, 0), (rtc.seconds, rtc.minutes, rtc.hours));

    let mut frozen = rtc_emulator(RtcUpdate::Frozen);
    for _ in 0..120 {
        frozen.run_frame();
    }
    assert_eq!(59, frozen.rtc().unwrap().seconds);
}

#[test]
fn clock_registers_are_clamped() {
    let mut emulator = rtc_emulator(RtcUpdate::Frozen);
    emulator.set_rtc(RtcRegisters {
        seconds: 200,
        minutes: 61,
        hours: 30,
        day_low: 7,
        day_high: 0xff,
    });
    assert_eq!(
        RtcRegisters {
            seconds: 59,
            minutes: 59,
            hours: 23,
            day_low: 7,
            day_high: 0xc1,
        },
        emulator.rtc().unwrap()
    );

    let mut plain = common::emulator(&program_rom(&[]));
    assert!(!plain.set_rtc(RtcRegisters::default()));
    assert_eq!(None, plain.rtc());
}

#[test]
fn rumble_motor() {
    let rom = RomBuilder::new(0x1c)
        .code(&[
            0x3e, 0x08, // LD A,$08
            0xea, 0x00, 0x40, // LD ($4000),A
            0x18, 0xfe, // JR -2
        ])
        .build();
    let mut emulator = emulator(&rom);
    assert!(!emulator.rumble());
    emulator.run_frame();
    assert!(emulator.rumble());
}
