mod instructions;

use crate::{
    bits::{join, split},
    bus::Bus,
    error::{Diagnostic, StateError},
    save_state::{Snapshot, StateReader, StateWriter},
};

pub use instructions::{
    AluOp, Condition, Flag, Indirect, Op, Operand, Register8Bit, Register16Bit, ShiftOp,
};
use instructions::{CB, PRIMARY};

// T-cycles
const INTERRUPT_DISPATCH: u32 = 20;
const IDLE: u32 = 4;

pub fn set_h_add(arg1: u8, arg2: u8) -> bool {
    let lo1 = arg1 & 0x0F;
    let lo2 = arg2 & 0x0F;

    ((lo1 + lo2) & (0x10)) == 0x10
}

pub fn set_h_add_with_carry(arg1: u8, arg2: u8, carry: bool) -> bool {
    let lo1 = arg1 & 0x0F;
    let lo2 = arg2 & 0x0F;

    ((lo1 + lo2 + carry as u8) & (0x10)) == 0x10
}

pub fn set_h_sub(arg1: u8, arg2: u8) -> bool {
    let lo1 = arg1 & 0x0F;
    let lo2 = arg2 & 0x0F;

    (lo1.wrapping_sub(lo2) & (0x10)) == 0x10
}

pub fn set_h_sub_with_carry(arg1: u8, arg2: u8, carry: bool) -> bool {
    let lo1 = arg1 & 0x0F;
    let lo2 = arg2 & 0x0F;

    (lo1.wrapping_sub(lo2).wrapping_sub(carry as u8) & (0x10)) == 0x10
}

bitflags::bitflags! {
    #[derive(Debug, Clone, Default, Copy, PartialEq, Eq)]
    pub struct Flags: u8 {
        const Z = 1 << 7;
        const N = 1 << 6;
        const H = 1 << 5;
        const C = 1 << 4;
    }
}

#[derive(Clone, Default, Debug)]
pub struct Cpu {
    pub a: u8,
    pub b: u8,
    pub c: u8,
    pub d: u8,
    pub e: u8,
    pub h: u8,
    pub l: u8,
    pub f: Flags,
    pub sp: u16,
    pub pc: u16,
    pub ime: bool,
    // steps left before EI takes effect
    ei_delay: u8,
    is_halted: bool,
    is_stopped: bool,
    halt_bug: bool,
    // an undefined opcode freezes the CPU until reset
    is_locked: bool,
    cycles: u64,
}

impl Cpu {
    /// Registers as the boot ROM leaves them.
    // https://gbdev.io/pandocs/Power_Up_Sequence.html#cpu-registers
    pub fn post_boot(cgb: bool) -> Self {
        let mut cpu = Self {
            sp: 0xfffe,
            pc: 0x0100,
            ..Default::default()
        };
        if cgb {
            cpu.set_16bit_register(Register16Bit::AF, 0x1180);
            cpu.set_16bit_register(Register16Bit::DE, 0xff56);
            cpu.set_16bit_register(Register16Bit::HL, 0x000d);
        } else {
            cpu.set_16bit_register(Register16Bit::AF, 0x01b0);
            cpu.set_16bit_register(Register16Bit::BC, 0x0013);
            cpu.set_16bit_register(Register16Bit::DE, 0x00d8);
            cpu.set_16bit_register(Register16Bit::HL, 0x014d);
        }
        cpu
    }

    pub fn is_halted(&self) -> bool {
        self.is_halted
    }

    pub fn is_stopped(&self) -> bool {
        self.is_stopped
    }

    pub fn is_locked(&self) -> bool {
        self.is_locked
    }

    /// Total CPU cycles executed.
    pub fn cycles(&self) -> u64 {
        self.cycles
    }

    /// Ends STOP mode, called on a joypad press.
    pub fn wake(&mut self) {
        self.is_stopped = false;
    }

    /// Runs one interrupt dispatch or one instruction and returns its duration in CPU cycles.
    pub fn step(&mut self, bus: &mut Bus) -> u32 {
        let cycles = self.step_inner(bus);
        self.cycles = self.cycles.wrapping_add(u64::from(cycles));
        cycles
    }

    fn step_inner(&mut self, bus: &mut Bus) -> u32 {
        if self.is_locked || self.is_stopped {
            return IDLE;
        }

        let pending = bus.pending_interrupts();

        // https://gbdev.io/pandocs/halt.html#halt
        if self.is_halted {
            if pending.is_empty() {
                return IDLE;
            }
            self.is_halted = false;
        }

        if self.ime
            && let Some(interrupt) = pending.highest_priority()
        {
            self.ime = false;
            self.ei_delay = 0;
            bus.acknowledge(interrupt);
            self.push(bus, self.pc);
            self.pc = interrupt.vector();
            return INTERRUPT_DISPATCH;
        }

        let opcode = self.fetch_opcode(bus);
        let cycles = self.execute(bus, opcode, PRIMARY[usize::from(opcode)]);

        if self.ei_delay > 0 {
            self.ei_delay -= 1;
            self.ime |= self.ei_delay == 0;
        }
        cycles
    }

    fn fetch_opcode(&mut self, bus: &Bus) -> u8 {
        let opcode = bus.read(self.pc);
        // the HALT bug reads the byte after HALT twice
        if self.halt_bug {
            self.halt_bug = false;
        } else {
            self.pc = self.pc.wrapping_add(1);
        }
        opcode
    }

    fn read_immediate(&mut self, bus: &Bus) -> u8 {
        let value = bus.read(self.pc);
        self.pc = self.pc.wrapping_add(1);
        value
    }

    fn read_immediate16(&mut self, bus: &Bus) -> u16 {
        let lsb = self.read_immediate(bus);
        let msb = self.read_immediate(bus);
        join(msb, lsb)
    }

    fn push(&mut self, bus: &mut Bus, value: u16) {
        let (msb, lsb) = split(value);
        self.sp = self.sp.wrapping_sub(1);
        bus.write(self.sp, msb);
        self.sp = self.sp.wrapping_sub(1);
        bus.write(self.sp, lsb);
    }

    fn pop(&mut self, bus: &Bus) -> u16 {
        let lsb = bus.read(self.sp);
        self.sp = self.sp.wrapping_add(1);
        let msb = bus.read(self.sp);
        self.sp = self.sp.wrapping_add(1);
        join(msb, lsb)
    }

    fn get_8bit_register(&self, register: Register8Bit) -> u8 {
        match register {
            Register8Bit::A => self.a,
            Register8Bit::B => self.b,
            Register8Bit::C => self.c,
            Register8Bit::D => self.d,
            Register8Bit::E => self.e,
            Register8Bit::H => self.h,
            Register8Bit::L => self.l,
        }
    }

    fn set_8bit_register(&mut self, register: Register8Bit, value: u8) {
        match register {
            Register8Bit::A => self.a = value,
            Register8Bit::B => self.b = value,
            Register8Bit::C => self.c = value,
            Register8Bit::D => self.d = value,
            Register8Bit::E => self.e = value,
            Register8Bit::H => self.h = value,
            Register8Bit::L => self.l = value,
        }
    }

    pub fn get_16bit_register(&self, register: Register16Bit) -> u16 {
        match register {
            Register16Bit::AF => join(self.a, self.f.bits()),
            Register16Bit::BC => join(self.b, self.c),
            Register16Bit::DE => join(self.d, self.e),
            Register16Bit::HL => join(self.h, self.l),
            Register16Bit::SP => self.sp,
        }
    }

    pub fn set_16bit_register(&mut self, register: Register16Bit, value: u16) {
        let (msb, lsb) = split(value);
        match register {
            Register16Bit::AF => {
                self.a = msb;
                // the low nibble of F does not exist
                self.f = Flags::from_bits_truncate(lsb);
            }
            Register16Bit::BC => (self.b, self.c) = (msb, lsb),
            Register16Bit::DE => (self.d, self.e) = (msb, lsb),
            Register16Bit::HL => (self.h, self.l) = (msb, lsb),
            Register16Bit::SP => self.sp = value,
        }
    }

    fn read_operand(&self, bus: &Bus, operand: Operand) -> u8 {
        match operand {
            Operand::Register(register) => self.get_8bit_register(register),
            Operand::AddressHl => bus.read(self.get_16bit_register(Register16Bit::HL)),
        }
    }

    fn write_operand(&mut self, bus: &mut Bus, operand: Operand, value: u8) {
        match operand {
            Operand::Register(register) => self.set_8bit_register(register, value),
            Operand::AddressHl => bus.write(self.get_16bit_register(Register16Bit::HL), value),
        }
    }

    fn check_condition(&self, condition: Option<Condition>) -> bool {
        let Some(Condition { flag, not }) = condition else {
            return true;
        };
        let flag = match flag {
            Flag::Z => self.f.contains(Flags::Z),
            Flag::C => self.f.contains(Flags::C),
        };
        flag != not
    }

    fn indirect_address(&mut self, indirect: Indirect) -> u16 {
        match indirect {
            Indirect::BC => self.get_16bit_register(Register16Bit::BC),
            Indirect::DE => self.get_16bit_register(Register16Bit::DE),
            Indirect::HlIncrement => {
                let hl = self.get_16bit_register(Register16Bit::HL);
                self.set_16bit_register(Register16Bit::HL, hl.wrapping_add(1));
                hl
            }
            Indirect::HlDecrement => {
                let hl = self.get_16bit_register(Register16Bit::HL);
                self.set_16bit_register(Register16Bit::HL, hl.wrapping_sub(1));
                hl
            }
        }
    }

    // https://gbdev.io/gb-opcodes/optables/ for the cycle counts
    fn execute(&mut self, bus: &mut Bus, opcode: u8, op: Op) -> u32 {
        match op {
            Op::Nop => 4,
            Op::Stop => {
                // STOP is two bytes long
                self.pc = self.pc.wrapping_add(1);
                bus.timer.reset_div();
                if !bus.try_speed_switch() {
                    log::debug!("cpu stopped at ${:04x}", self.pc);
                    self.is_stopped = true;
                }
                4
            }
            Op::Halt => {
                if !self.ime && !bus.pending_interrupts().is_empty() {
                    self.halt_bug = true;
                } else {
                    self.is_halted = true;
                }
                4
            }
            Op::Di => {
                self.ime = false;
                self.ei_delay = 0;
                4
            }
            Op::Ei => {
                if !self.ime && self.ei_delay == 0 {
                    self.ei_delay = 2;
                }
                4
            }
            Op::Undefined => {
                bus.report(Diagnostic::UnknownInstruction {
                    opcode,
                    cb_prefix: false,
                    pc: self.pc.wrapping_sub(1),
                });
                self.is_locked = true;
                4
            }
            Op::CbPrefix => {
                let opcode = self.read_immediate(bus);
                self.execute(bus, opcode, CB[usize::from(opcode)])
            }
            Op::Load(destination, source) => {
                let value = self.read_operand(bus, source);
                self.write_operand(bus, destination, value);
                if destination.is_memory() || source.is_memory() {
                    8
                } else {
                    4
                }
            }
            Op::LoadImmediate(destination) => {
                let value = self.read_immediate(bus);
                self.write_operand(bus, destination, value);
                if destination.is_memory() { 12 } else { 8 }
            }
            Op::LoadImmediate16(register) => {
                let value = self.read_immediate16(bus);
                self.set_16bit_register(register, value);
                12
            }
            Op::StoreA(indirect) => {
                let address = self.indirect_address(indirect);
                bus.write(address, self.a);
                8
            }
            Op::LoadA(indirect) => {
                let address = self.indirect_address(indirect);
                self.a = bus.read(address);
                8
            }
            Op::StoreSp => {
                let address = self.read_immediate16(bus);
                let [msb, lsb] = self.sp.to_be_bytes();
                bus.write(address, lsb);
                bus.write(address.wrapping_add(1), msb);
                20
            }
            Op::Increment16(register) => {
                let value = self.get_16bit_register(register).wrapping_add(1);
                self.set_16bit_register(register, value);
                8
            }
            Op::Decrement16(register) => {
                let value = self.get_16bit_register(register).wrapping_sub(1);
                self.set_16bit_register(register, value);
                8
            }
            Op::AddHl(register) => {
                self.add_hl(self.get_16bit_register(register));
                8
            }
            Op::Increment(operand) => {
                let value = self.read_operand(bus, operand);
                let result = self.inc(value);
                self.write_operand(bus, operand, result);
                if operand.is_memory() { 12 } else { 4 }
            }
            Op::Decrement(operand) => {
                let value = self.read_operand(bus, operand);
                let result = self.dec(value);
                self.write_operand(bus, operand, result);
                if operand.is_memory() { 12 } else { 4 }
            }
            Op::Rlca => {
                self.a = self.rlc(self.a);
                self.f.remove(Flags::Z);
                4
            }
            Op::Rrca => {
                self.a = self.rrc(self.a);
                self.f.remove(Flags::Z);
                4
            }
            Op::Rla => {
                self.a = self.rl(self.a);
                self.f.remove(Flags::Z);
                4
            }
            Op::Rra => {
                self.a = self.rr(self.a);
                self.f.remove(Flags::Z);
                4
            }
            Op::Daa => {
                self.daa();
                4
            }
            Op::Cpl => {
                self.a = !self.a;
                self.f.insert(Flags::N | Flags::H);
                4
            }
            Op::Scf => {
                self.f.remove(Flags::N | Flags::H);
                self.f.insert(Flags::C);
                4
            }
            Op::Ccf => {
                self.f.remove(Flags::N | Flags::H);
                self.f.toggle(Flags::C);
                4
            }
            Op::JumpRelative(condition) => {
                let offset = self.read_immediate(bus);
                if !self.check_condition(condition) {
                    return 8;
                }
                self.pc = self.pc.wrapping_add(crate::bits::sign_extend(offset));
                12
            }
            Op::Jump(condition) => {
                let address = self.read_immediate16(bus);
                if !self.check_condition(condition) {
                    return 12;
                }
                self.pc = address;
                16
            }
            Op::JumpHl => {
                self.pc = self.get_16bit_register(Register16Bit::HL);
                4
            }
            Op::Call(condition) => {
                let address = self.read_immediate16(bus);
                if !self.check_condition(condition) {
                    return 12;
                }
                self.push(bus, self.pc);
                self.pc = address;
                24
            }
            Op::Return(None) => {
                self.pc = self.pop(bus);
                16
            }
            Op::Return(condition) => {
                if !self.check_condition(condition) {
                    return 8;
                }
                self.pc = self.pop(bus);
                20
            }
            Op::ReturnInterrupt => {
                self.pc = self.pop(bus);
                self.ime = true;
                self.ei_delay = 0;
                16
            }
            Op::Restart(vector) => {
                self.push(bus, self.pc);
                self.pc = u16::from(vector);
                16
            }
            Op::Push(register) => {
                self.push(bus, self.get_16bit_register(register));
                16
            }
            Op::Pop(register) => {
                let value = self.pop(bus);
                self.set_16bit_register(register, value);
                12
            }
            Op::Alu(alu_op, operand) => {
                let value = self.read_operand(bus, operand);
                self.alu(alu_op, value);
                if operand.is_memory() { 8 } else { 4 }
            }
            Op::AluImmediate(alu_op) => {
                let value = self.read_immediate(bus);
                self.alu(alu_op, value);
                8
            }
            Op::StoreHigh => {
                let offset = self.read_immediate(bus);
                bus.write(0xff00 | u16::from(offset), self.a);
                12
            }
            Op::LoadHigh => {
                let offset = self.read_immediate(bus);
                self.a = bus.read(0xff00 | u16::from(offset));
                12
            }
            Op::StoreHighC => {
                bus.write(0xff00 | u16::from(self.c), self.a);
                8
            }
            Op::LoadHighC => {
                self.a = bus.read(0xff00 | u16::from(self.c));
                8
            }
            Op::StoreAbsolute => {
                let address = self.read_immediate16(bus);
                bus.write(address, self.a);
                16
            }
            Op::LoadAbsolute => {
                let address = self.read_immediate16(bus);
                self.a = bus.read(address);
                16
            }
            Op::AddSp => {
                let offset = self.read_immediate(bus);
                self.sp = self.sp_plus_offset(offset);
                16
            }
            Op::LoadHlSpOffset => {
                let offset = self.read_immediate(bus);
                let value = self.sp_plus_offset(offset);
                self.set_16bit_register(Register16Bit::HL, value);
                12
            }
            Op::LoadSpHl => {
                self.sp = self.get_16bit_register(Register16Bit::HL);
                8
            }
            Op::Shift(shift_op, operand) => {
                let value = self.read_operand(bus, operand);
                let result = match shift_op {
                    ShiftOp::Rlc => self.rlc(value),
                    ShiftOp::Rrc => self.rrc(value),
                    ShiftOp::Rl => self.rl(value),
                    ShiftOp::Rr => self.rr(value),
                    ShiftOp::Sla => self.sla(value),
                    ShiftOp::Sra => self.sra(value),
                    ShiftOp::Swap => self.swap(value),
                    ShiftOp::Srl => self.srl(value),
                };
                self.write_operand(bus, operand, result);
                if operand.is_memory() { 16 } else { 8 }
            }
            Op::Bit(bit, operand) => {
                let value = self.read_operand(bus, operand);
                self.f.set(Flags::Z, !crate::bits::bit(value, bit));
                self.f.remove(Flags::N);
                self.f.insert(Flags::H);
                if operand.is_memory() { 12 } else { 8 }
            }
            Op::Reset(bit, operand) => {
                let value = self.read_operand(bus, operand);
                self.write_operand(bus, operand, crate::bits::with_bit(value, bit, false));
                if operand.is_memory() { 16 } else { 8 }
            }
            Op::Set(bit, operand) => {
                let value = self.read_operand(bus, operand);
                self.write_operand(bus, operand, crate::bits::with_bit(value, bit, true));
                if operand.is_memory() { 16 } else { 8 }
            }
        }
    }

    fn alu(&mut self, op: AluOp, value: u8) {
        match op {
            AluOp::Add => self.a = self.add(value, false),
            AluOp::Adc => self.a = self.add(value, self.f.contains(Flags::C)),
            AluOp::Sub => self.a = self.sub(value, false),
            AluOp::Sbc => self.a = self.sub(value, self.f.contains(Flags::C)),
            AluOp::Cp => {
                self.sub(value, false);
            }
            AluOp::And => {
                self.a &= value;
                self.f = Flags::H;
                self.f.set(Flags::Z, self.a == 0);
            }
            AluOp::Xor => {
                self.a ^= value;
                self.f = Flags::empty();
                self.f.set(Flags::Z, self.a == 0);
            }
            AluOp::Or => {
                self.a |= value;
                self.f = Flags::empty();
                self.f.set(Flags::Z, self.a == 0);
            }
        }
    }

    fn add(&mut self, value: u8, carry: bool) -> u8 {
        let (partial, overflow1) = self.a.overflowing_add(value);
        let (result, overflow2) = partial.overflowing_add(carry as u8);
        let flags = &mut self.f;
        flags.set(Flags::Z, result == 0);
        flags.remove(Flags::N);
        flags.set(Flags::H, set_h_add_with_carry(self.a, value, carry));
        flags.set(Flags::C, overflow1 || overflow2);
        result
    }

    fn sub(&mut self, value: u8, carry: bool) -> u8 {
        let (partial, overflow1) = self.a.overflowing_sub(value);
        let (result, overflow2) = partial.overflowing_sub(carry as u8);
        let flags = &mut self.f;
        flags.set(Flags::Z, result == 0);
        flags.insert(Flags::N);
        flags.set(Flags::H, set_h_sub_with_carry(self.a, value, carry));
        flags.set(Flags::C, overflow1 || overflow2);
        result
    }

    fn inc(&mut self, value: u8) -> u8 {
        let incremented = value.wrapping_add(1);
        let flags = &mut self.f;
        flags.set(Flags::Z, incremented == 0);
        flags.remove(Flags::N);
        flags.set(Flags::H, set_h_add(value, 1));
        incremented
    }

    fn dec(&mut self, value: u8) -> u8 {
        let decremented = value.wrapping_sub(1);
        let flags = &mut self.f;
        flags.set(Flags::Z, decremented == 0);
        flags.insert(Flags::N);
        flags.set(Flags::H, set_h_sub(value, 1));
        decremented
    }

    fn add_hl(&mut self, value: u16) {
        let hl = self.get_16bit_register(Register16Bit::HL);
        let (result, overflow) = hl.overflowing_add(value);
        let flags = &mut self.f;
        flags.remove(Flags::N);
        flags.set(Flags::H, (hl & 0x0fff) + (value & 0x0fff) > 0x0fff);
        flags.set(Flags::C, overflow);
        self.set_16bit_register(Register16Bit::HL, result);
    }

    // flags come from the unsigned addition on the low byte
    fn sp_plus_offset(&mut self, offset: u8) -> u16 {
        let low = self.sp.to_be_bytes()[1];
        self.f = Flags::empty();
        self.f.set(Flags::H, set_h_add(low, offset));
        self.f.set(Flags::C, low.overflowing_add(offset).1);
        self.sp.wrapping_add(crate::bits::sign_extend(offset))
    }

    fn daa(&mut self) {
        // https://rgbds.gbdev.io/docs/v1.0.0/gbz80.7#DAA
        let flags = &mut self.f;
        let mut adj = 0;
        let result = if flags.contains(Flags::N) {
            if flags.contains(Flags::H) {
                adj += 0x06
            }
            if flags.contains(Flags::C) {
                adj += 0x60
            }
            self.a.wrapping_sub(adj)
        } else {
            let a = self.a;
            if flags.contains(Flags::H) || (a & 0x0f) > 0x09 {
                adj += 0x06;
            }
            if flags.contains(Flags::C) || a > 0x99 {
                adj += 0x60;
                flags.insert(Flags::C);
            }
            self.a.wrapping_add(adj)
        };
        self.a = result;
        flags.set(Flags::Z, result == 0);
        flags.remove(Flags::H);
    }

    fn sla(&mut self, value: u8) -> u8 {
        let result = value << 1;
        let flags = &mut self.f;
        flags.set(Flags::Z, result == 0);
        flags.remove(Flags::N | Flags::H);
        flags.set(Flags::C, (value & 0x80) == 0x80);
        result
    }

    fn sra(&mut self, value: u8) -> u8 {
        let result = (value >> 1) | (value & 0x80);
        let flags = &mut self.f;
        flags.set(Flags::Z, result == 0);
        flags.remove(Flags::N | Flags::H);
        flags.set(Flags::C, (value & 0x1) == 0x1);
        result
    }

    fn rrc(&mut self, value: u8) -> u8 {
        let flags = &mut self.f;
        flags.set(Flags::Z, value == 0);
        flags.remove(Flags::N | Flags::H);
        flags.set(Flags::C, (value & 1) == 1);
        value.rotate_right(1)
    }

    fn rlc(&mut self, value: u8) -> u8 {
        let result = value.rotate_left(1);
        let flags = &mut self.f;
        flags.set(Flags::Z, result == 0);
        flags.remove(Flags::N | Flags::H);
        flags.set(Flags::C, (result & 1) == 1);
        result
    }

    fn rl(&mut self, value: u8) -> u8 {
        let new_carry = (value & 0x80) == 0x80;
        let result = (value << 1) | (self.f.contains(Flags::C) as u8);
        let flags = &mut self.f;
        flags.set(Flags::Z, result == 0);
        flags.remove(Flags::N | Flags::H);
        flags.set(Flags::C, new_carry);
        result
    }

    fn srl(&mut self, value: u8) -> u8 {
        let result = value >> 1;
        let flags = &mut self.f;
        flags.set(Flags::Z, result == 0);
        flags.remove(Flags::N | Flags::H);
        flags.set(Flags::C, (value & 0x1) == 0x1);
        result
    }

    fn rr(&mut self, value: u8) -> u8 {
        let flags = &mut self.f;
        let carry = flags.contains(Flags::C);
        flags.set(Flags::C, (value & 0x1) == 0x1);
        let result = (value >> 1) | ((carry as u8) << 7);
        flags.remove(Flags::N | Flags::H);
        flags.set(Flags::Z, result == 0);
        result
    }

    fn swap(&mut self, value: u8) -> u8 {
        let result = value.rotate_left(4);
        let flags = &mut self.f;
        flags.set(Flags::Z, result == 0);
        flags.remove(Flags::N | Flags::H | Flags::C);
        result
    }
}

impl Snapshot for Cpu {
    fn save(&self, writer: &mut StateWriter) {
        writer.bytes(&[
            self.a,
            self.f.bits(),
            self.b,
            self.c,
            self.d,
            self.e,
            self.h,
            self.l,
        ]);
        writer.u16(self.sp);
        writer.u16(self.pc);
        writer.bool(self.ime);
        writer.u8(self.ei_delay);
        writer.bool(self.is_halted);
        writer.bool(self.is_stopped);
        writer.bool(self.halt_bug);
        writer.bool(self.is_locked);
        writer.u64(self.cycles);
    }

    fn load(&mut self, reader: &mut StateReader<'_>) -> Result<(), StateError> {
        let mut registers = [0; 8];
        reader.bytes_into(&mut registers)?;
        let [a, f, b, c, d, e, h, l] = registers;
        (self.a, self.b, self.c, self.d, self.e, self.h, self.l) = (a, b, c, d, e, h, l);
        self.f = Flags::from_bits_truncate(f);
        self.sp = reader.u16()?;
        self.pc = reader.u16()?;
        self.ime = reader.bool()?;
        self.ei_delay = reader.u8()?;
        if self.ei_delay > 2 {
            return Err(StateError::InvalidValue("ei delay"));
        }
        self.is_halted = reader.bool()?;
        self.is_stopped = reader.bool()?;
        self.halt_bug = reader.bool()?;
        self.is_locked = reader.bool()?;
        self.cycles = reader.u64()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        cartridge::{Cartridge, get_rom_info, header_checksum},
        ppu::color::DMG_SHADES,
        registers::{INTERRUPT_ENABLE, INTERRUPT_FLAG, KEY1, Interruptions},
    };
    use alloc::vec;

    const PROGRAM: u16 = 0xc000;

    fn machine(cgb: bool, program: &[u8]) -> (Cpu, Bus) {
        let mut rom = vec![0; 0x8000];
        rom[0x14d] = header_checksum(&rom);
        let cartridge = Cartridge::new(get_rom_info(&rom).unwrap(), &rom);
        let mut bus = Bus::new(cartridge, cgb, 0, DMG_SHADES);
        bus.post_boot();
        for (offset, byte) in program.iter().enumerate() {
            bus.write(PROGRAM + offset as u16, *byte);
        }
        let mut cpu = Cpu::post_boot(cgb);
        cpu.pc = PROGRAM;
        (cpu, bus)
    }

    #[test]
    fn post_boot_registers() {
        let dmg = Cpu::post_boot(false);
        assert_eq!(0x01b0, dmg.get_16bit_register(Register16Bit::AF));
        assert_eq!(0x0013, dmg.get_16bit_register(Register16Bit::BC));
        assert_eq!(0x00d8, dmg.get_16bit_register(Register16Bit::DE));
        assert_eq!(0x014d, dmg.get_16bit_register(Register16Bit::HL));
        let cgb = Cpu::post_boot(true);
        assert_eq!(0x1180, cgb.get_16bit_register(Register16Bit::AF));
        assert_eq!(0xff56, cgb.get_16bit_register(Register16Bit::DE));
        assert_eq!(0xfffe, cgb.sp);
        assert_eq!(0x0100, cgb.pc);
    }

    #[test]
    fn add_overflow_flags() {
        // LD A,$80 ; ADD A,A
        let (mut cpu, mut bus) = machine(false, &[0x3e, 0x80, 0x87]);
        assert_eq!(8, cpu.step(&mut bus));
        assert_eq!(4, cpu.step(&mut bus));
        assert_eq!(0x00, cpu.a);
        assert_eq!(Flags::Z | Flags::C, cpu.f);
    }

    #[test]
    fn half_carry_and_compare() {
        // LD A,$0f ; ADD A,$01 ; CP $10 ; SUB $11
        let (mut cpu, mut bus) = machine(false, &[0x3e, 0x0f, 0xc6, 0x01, 0xfe, 0x10, 0xd6, 0x11]);
        cpu.step(&mut bus);
        cpu.step(&mut bus);
        assert_eq!(0x10, cpu.a);
        assert_eq!(Flags::H, cpu.f);
        cpu.step(&mut bus);
        assert_eq!(0x10, cpu.a);
        assert_eq!(Flags::Z | Flags::N, cpu.f);
        cpu.step(&mut bus);
        assert_eq!(0xff, cpu.a);
        assert_eq!(Flags::N | Flags::H | Flags::C, cpu.f);
    }

    #[test]
    fn bcd_adjust() {
        // LD A,$45 ; ADD A,$38 ; DAA ; SUB $09 ; DAA
        let (mut cpu, mut bus) = machine(false, &[0x3e, 0x45, 0xc6, 0x38, 0x27, 0xd6, 0x09, 0x27]);
        for _ in 0..3 {
            cpu.step(&mut bus);
        }
        assert_eq!(0x83, cpu.a);
        assert!(!cpu.f.contains(Flags::C));
        cpu.step(&mut bus);
        cpu.step(&mut bus);
        assert_eq!(0x74, cpu.a);
    }

    #[test]
    fn add_hl_and_sp_offset() {
        // LD HL,$0fff ; LD BC,$0001 ; ADD HL,BC ; LD SP,$00ff ; ADD SP,$01 ; LD HL,SP-1
        let (mut cpu, mut bus) = machine(
            false,
            &[
                0x21, 0xff, 0x0f, 0x01, 0x01, 0x00, 0x09, 0x31, 0xff, 0x00, 0xe8, 0x01, 0xf8,
                0xff,
            ],
        );
        cpu.f = Flags::Z;
        for _ in 0..3 {
            cpu.step(&mut bus);
        }
        assert_eq!(0x1000, cpu.get_16bit_register(Register16Bit::HL));
        assert_eq!(Flags::Z | Flags::H, cpu.f);
        cpu.step(&mut bus);
        assert_eq!(16, cpu.step(&mut bus));
        assert_eq!(0x0100, cpu.sp);
        assert_eq!(Flags::H | Flags::C, cpu.f);
        assert_eq!(12, cpu.step(&mut bus));
        assert_eq!(0x00ff, cpu.get_16bit_register(Register16Bit::HL));
        assert_eq!(Flags::empty(), cpu.f);
    }

    #[test]
    fn taken_branches_cost_more() {
        // XOR A ; JR NZ,+0 ; JR Z,+0 ; CALL NZ,$0000 ; CALL Z,$c00d ; NOP ; NOP ; RET NZ ; RET Z
        let (mut cpu, mut bus) = machine(
            false,
            &[
                0xaf, 0x20, 0x00, 0x28, 0x00, 0xc4, 0x00, 0x00, 0xcc, 0x0d, 0xc0, 0x00, 0x00,
                0xc0, 0xc8,
            ],
        );
        cpu.step(&mut bus);
        assert_eq!(8, cpu.step(&mut bus));
        assert_eq!(12, cpu.step(&mut bus));
        assert_eq!(12, cpu.step(&mut bus));
        assert_eq!(24, cpu.step(&mut bus));
        assert_eq!(0xc00d, cpu.pc);
        assert_eq!(8, cpu.step(&mut bus));
        assert_eq!(20, cpu.step(&mut bus));
        assert_eq!(0xc00b, cpu.pc);
    }

    #[test]
    fn push_pop_af_masks_low_nibble() {
        // LD BC,$12ff ; PUSH BC ; POP AF
        let (mut cpu, mut bus) = machine(false, &[0x01, 0xff, 0x12, 0xc5, 0xf1]);
        for _ in 0..3 {
            cpu.step(&mut bus);
        }
        assert_eq!(0x12f0, cpu.get_16bit_register(Register16Bit::AF));
        assert_eq!(0xfffe, cpu.sp);
    }

    #[test]
    fn cb_operations() {
        // LD HL,$c100 ; LD (HL),$81 ; RLC (HL) ; BIT 0,(HL) ; SWAP (HL) ; SET 7,A ; RES 0,(HL)
        let (mut cpu, mut bus) = machine(
            false,
            &[
                0x21, 0x00, 0xc1, 0x36, 0x81, 0xcb, 0x06, 0xcb, 0x46, 0xcb, 0x36, 0xcb, 0xff, 0xcb,
                0x86,
            ],
        );
        cpu.step(&mut bus);
        assert_eq!(12, cpu.step(&mut bus));
        assert_eq!(16, cpu.step(&mut bus));
        assert_eq!(0x03, bus.read(0xc100));
        assert!(cpu.f.contains(Flags::C));
        assert_eq!(12, cpu.step(&mut bus));
        assert!(!cpu.f.contains(Flags::Z));
        cpu.step(&mut bus);
        assert_eq!(0x30, bus.read(0xc100));
        assert_eq!(8, cpu.step(&mut bus));
        assert_eq!(0x81, cpu.a);
        cpu.step(&mut bus);
        assert_eq!(0x30, bus.read(0xc100));
    }

    #[test]
    fn interrupt_dispatch() {
        // EI ; NOP ; NOP
        let (mut cpu, mut bus) = machine(false, &[0xfb, 0x00, 0x00]);
        bus.acknowledge(Interruptions::all());
        bus.write(INTERRUPT_ENABLE, 0x04);
        bus.write(INTERRUPT_FLAG, 0x04);
        cpu.step(&mut bus);
        assert!(!cpu.ime);
        // the instruction after EI still runs
        cpu.step(&mut bus);
        assert_eq!(PROGRAM + 2, cpu.pc);
        assert!(cpu.ime);
        assert_eq!(INTERRUPT_DISPATCH, cpu.step(&mut bus));
        assert_eq!(0x50, cpu.pc);
        assert!(!cpu.ime);
        assert_eq!(0xe0, bus.read(INTERRUPT_FLAG));
        assert_eq!(PROGRAM + 2, cpu.pop(&bus));
    }

    #[test]
    fn di_cancels_pending_ei() {
        // EI ; DI ; NOP
        let (mut cpu, mut bus) = machine(false, &[0xfb, 0xf3, 0x00]);
        bus.write(INTERRUPT_ENABLE, 0x01);
        for _ in 0..3 {
            cpu.step(&mut bus);
        }
        assert!(!cpu.ime);
        assert_eq!(PROGRAM + 3, cpu.pc);
    }

    #[test]
    fn halt_bug_reads_next_byte_twice() {
        // HALT ; INC A
        let (mut cpu, mut bus) = machine(false, &[0x76, 0x3c, 0x00]);
        bus.write(INTERRUPT_ENABLE, 0x01);
        bus.write(INTERRUPT_FLAG, 0x01);
        cpu.a = 0;
        cpu.step(&mut bus);
        assert!(!cpu.is_halted());
        cpu.step(&mut bus);
        cpu.step(&mut bus);
        assert_eq!(2, cpu.a);
        assert_eq!(PROGRAM + 2, cpu.pc);
    }

    #[test]
    fn halt_waits_for_interrupt() {
        // HALT ; INC A
        let (mut cpu, mut bus) = machine(false, &[0x76, 0x3c]);
        bus.acknowledge(Interruptions::all());
        bus.write(INTERRUPT_ENABLE, 0x01);
        cpu.a = 0;
        cpu.step(&mut bus);
        assert!(cpu.is_halted());
        assert_eq!(4, cpu.step(&mut bus));
        assert_eq!(PROGRAM + 1, cpu.pc);
        // IME is off: wake up without dispatch
        bus.request_interrupt(Interruptions::VBLANK);
        cpu.step(&mut bus);
        assert!(!cpu.is_halted());
        assert_eq!(1, cpu.a);
    }

    #[test]
    fn stop_switches_speed() {
        // STOP ; NOP ; STOP ; NOP
        let (mut cpu, mut bus) = machine(true, &[0x10, 0x00, 0x10, 0x00]);
        bus.write(KEY1, 0x01);
        cpu.step(&mut bus);
        assert!(bus.is_double_speed());
        assert!(!cpu.is_stopped());
        assert_eq!(PROGRAM + 2, cpu.pc);
        assert_eq!(0, bus.timer.div());

        cpu.step(&mut bus);
        assert!(cpu.is_stopped());
        assert_eq!(4, cpu.step(&mut bus));
        assert_eq!(PROGRAM + 4, cpu.pc);
        cpu.wake();
        assert!(!cpu.is_stopped());
    }

    #[test]
    fn undefined_opcode_locks() {
        let (mut cpu, mut bus) = machine(false, &[0xd3, 0x3c]);
        cpu.step(&mut bus);
        assert!(cpu.is_locked());
        let diagnostics = bus.take_diagnostics();
        assert_eq!(
            [Diagnostic::UnknownInstruction {
                opcode: 0xd3,
                cb_prefix: false,
                pc: PROGRAM
            }]
            .as_slice(),
            diagnostics.as_slice()
        );
        let a = cpu.a;
        assert_eq!(4, cpu.step(&mut bus));
        assert_eq!(a, cpu.a);
        assert_eq!(PROGRAM + 1, cpu.pc);
    }
}
