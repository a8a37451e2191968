// Opcode groups, decoded once at compile time from the bit layout of each opcode.
// https://gbdev.io/gb-opcodes/optables/
// https://archive.gbdev.io/salvage/decoding_gbz80_opcodes/Decoding%20Gamboy%20Z80%20Opcodes.html

use crate::bits::bit_range;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Register8Bit {
    A,
    B,
    C,
    D,
    E,
    H,
    L,
}

/// 8-bit operand as encoded in the low or middle three opcode bits.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Operand {
    Register(Register8Bit),
    AddressHl,
}

impl Operand {
    const fn from_bits(bits: u8) -> Self {
        match bits & 0b111 {
            0 => Self::Register(Register8Bit::B),
            1 => Self::Register(Register8Bit::C),
            2 => Self::Register(Register8Bit::D),
            3 => Self::Register(Register8Bit::E),
            4 => Self::Register(Register8Bit::H),
            5 => Self::Register(Register8Bit::L),
            6 => Self::AddressHl,
            _ => Self::Register(Register8Bit::A),
        }
    }

    pub const fn is_memory(self) -> bool {
        matches!(self, Self::AddressHl)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Register16Bit {
    AF,
    BC,
    DE,
    HL,
    SP,
}

impl Register16Bit {
    // BC DE HL SP
    const fn from_bits_sp(bits: u8) -> Self {
        match bits & 0b11 {
            0 => Self::BC,
            1 => Self::DE,
            2 => Self::HL,
            _ => Self::SP,
        }
    }

    // BC DE HL AF, for push and pop
    const fn from_bits_af(bits: u8) -> Self {
        match bits & 0b11 {
            0 => Self::BC,
            1 => Self::DE,
            2 => Self::HL,
            _ => Self::AF,
        }
    }
}

/// Memory operand of `LD (rr),A` and `LD A,(rr)`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Indirect {
    BC,
    DE,
    HlIncrement,
    HlDecrement,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Flag {
    Z,
    C,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Condition {
    pub flag: Flag,
    pub not: bool,
}

impl Condition {
    const fn from_bits(bits: u8) -> Self {
        Self {
            flag: if bits & 0b10 == 0 { Flag::Z } else { Flag::C },
            not: bits & 1 == 0,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AluOp {
    Add,
    Adc,
    Sub,
    Sbc,
    And,
    Xor,
    Or,
    Cp,
}

impl AluOp {
    const fn from_bits(bits: u8) -> Self {
        match bits & 0b111 {
            0 => Self::Add,
            1 => Self::Adc,
            2 => Self::Sub,
            3 => Self::Sbc,
            4 => Self::And,
            5 => Self::Xor,
            6 => Self::Or,
            _ => Self::Cp,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ShiftOp {
    Rlc,
    Rrc,
    Rl,
    Rr,
    Sla,
    Sra,
    Swap,
    Srl,
}

impl ShiftOp {
    const fn from_bits(bits: u8) -> Self {
        match bits & 0b111 {
            0 => Self::Rlc,
            1 => Self::Rrc,
            2 => Self::Rl,
            3 => Self::Rr,
            4 => Self::Sla,
            5 => Self::Sra,
            6 => Self::Swap,
            _ => Self::Srl,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Op {
    Nop,
    Stop,
    Halt,
    Di,
    Ei,
    Undefined,
    CbPrefix,
    Load(Operand, Operand),
    LoadImmediate(Operand),
    LoadImmediate16(Register16Bit),
    StoreA(Indirect),
    LoadA(Indirect),
    StoreSp,
    Increment16(Register16Bit),
    Decrement16(Register16Bit),
    AddHl(Register16Bit),
    Increment(Operand),
    Decrement(Operand),
    Rlca,
    Rrca,
    Rla,
    Rra,
    Daa,
    Cpl,
    Scf,
    Ccf,
    JumpRelative(Option<Condition>),
    Jump(Option<Condition>),
    JumpHl,
    Call(Option<Condition>),
    Return(Option<Condition>),
    ReturnInterrupt,
    Restart(u8),
    Push(Register16Bit),
    Pop(Register16Bit),
    Alu(AluOp, Operand),
    AluImmediate(AluOp),
    // 0xff00 + n
    StoreHigh,
    LoadHigh,
    // 0xff00 + C
    StoreHighC,
    LoadHighC,
    StoreAbsolute,
    LoadAbsolute,
    AddSp,
    LoadHlSpOffset,
    LoadSpHl,
    // 0xcb prefixed
    Shift(ShiftOp, Operand),
    Bit(u8, Operand),
    Reset(u8, Operand),
    Set(u8, Operand),
}

const fn decode(opcode: u8) -> Op {
    let x = bit_range(opcode, 7, 6);
    let y = bit_range(opcode, 5, 3);
    let z = bit_range(opcode, 2, 0);
    let p = y >> 1;
    let q = y & 1;

    match x {
        0 => match z {
            0 => match y {
                0 => Op::Nop,
                1 => Op::StoreSp,
                2 => Op::Stop,
                3 => Op::JumpRelative(None),
                _ => Op::JumpRelative(Some(Condition::from_bits(y - 4))),
            },
            1 if q == 0 => Op::LoadImmediate16(Register16Bit::from_bits_sp(p)),
            1 => Op::AddHl(Register16Bit::from_bits_sp(p)),
            2 => {
                let indirect = match p {
                    0 => Indirect::BC,
                    1 => Indirect::DE,
                    2 => Indirect::HlIncrement,
                    _ => Indirect::HlDecrement,
                };
                if q == 0 {
                    Op::StoreA(indirect)
                } else {
                    Op::LoadA(indirect)
                }
            }
            3 if q == 0 => Op::Increment16(Register16Bit::from_bits_sp(p)),
            3 => Op::Decrement16(Register16Bit::from_bits_sp(p)),
            4 => Op::Increment(Operand::from_bits(y)),
            5 => Op::Decrement(Operand::from_bits(y)),
            6 => Op::LoadImmediate(Operand::from_bits(y)),
            _ => match y {
                0 => Op::Rlca,
                1 => Op::Rrca,
                2 => Op::Rla,
                3 => Op::Rra,
                4 => Op::Daa,
                5 => Op::Cpl,
                6 => Op::Scf,
                _ => Op::Ccf,
            },
        },
        1 if y == 6 && z == 6 => Op::Halt,
        1 => Op::Load(Operand::from_bits(y), Operand::from_bits(z)),
        2 => Op::Alu(AluOp::from_bits(y), Operand::from_bits(z)),
        _ => match z {
            0 => match y {
                0..=3 => Op::Return(Some(Condition::from_bits(y))),
                4 => Op::StoreHigh,
                5 => Op::AddSp,
                6 => Op::LoadHigh,
                _ => Op::LoadHlSpOffset,
            },
            1 if q == 0 => Op::Pop(Register16Bit::from_bits_af(p)),
            1 => match p {
                0 => Op::Return(None),
                1 => Op::ReturnInterrupt,
                2 => Op::JumpHl,
                _ => Op::LoadSpHl,
            },
            2 => match y {
                0..=3 => Op::Jump(Some(Condition::from_bits(y))),
                4 => Op::StoreHighC,
                5 => Op::StoreAbsolute,
                6 => Op::LoadHighC,
                _ => Op::LoadAbsolute,
            },
            3 => match y {
                0 => Op::Jump(None),
                1 => Op::CbPrefix,
                6 => Op::Di,
                7 => Op::Ei,
                _ => Op::Undefined,
            },
            4 if y <= 3 => Op::Call(Some(Condition::from_bits(y))),
            5 if q == 0 => Op::Push(Register16Bit::from_bits_af(p)),
            5 if p == 0 => Op::Call(None),
            6 => Op::AluImmediate(AluOp::from_bits(y)),
            7 => Op::Restart(y * 8),
            _ => Op::Undefined,
        },
    }
}

const fn decode_cb(opcode: u8) -> Op {
    let y = bit_range(opcode, 5, 3);
    let operand = Operand::from_bits(opcode);
    match opcode >> 6 {
        0 => Op::Shift(ShiftOp::from_bits(y), operand),
        1 => Op::Bit(y, operand),
        2 => Op::Reset(y, operand),
        _ => Op::Set(y, operand),
    }
}

const fn build_table(cb: bool) -> [Op; 256] {
    let mut table = [Op::Nop; 256];
    let mut opcode = 0;
    while opcode < 256 {
        table[opcode] = if cb {
            decode_cb(opcode as u8)
        } else {
            decode(opcode as u8)
        };
        opcode += 1;
    }
    table
}

pub static PRIMARY: [Op; 256] = build_table(false);
pub static CB: [Op; 256] = build_table(true);
