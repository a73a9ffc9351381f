use super::isa::{Instruction, Mnemonic, SVC_INPUT, SVC_OUTPUT};
use crate::config::EngineOptions;
use crate::engine::{Console, Engine, Flags, InstructionKind, MachineState};
use crate::error::Fault;
use crate::program::CompiledProgram;

pub const MEMORY_SIZE: usize = 0x10000;

/// SP of an empty stack. `RET` from here ends the program.
const STACK_BASE: u16 = 0;

/// Longest line an input instruction stores.
const MAX_INPUT: usize = 256;

/// Register field that names SP when `useGR8AsSP` is on.
const SP_REGISTER: u16 = 8;

pub struct Comet2 {
    memory: Vec<u16>,
    gr: [u16; 8],
    sp: u16,
    pr: u16,
    flags: Flags,
    use_gr8_as_sp: bool,
    halted: bool,
}

impl Comet2 {
    pub fn new() -> Self {
        Self {
            memory: vec![0; MEMORY_SIZE],
            gr: [0; 8],
            sp: STACK_BASE,
            pr: 0,
            flags: Flags::default(),
            use_gr8_as_sp: true,
            halted: false,
        }
    }

    /// Reads one word of memory.
    pub fn peek(&self, address: u16) -> u16 {
        self.read(address)
    }

    fn read(&self, address: u16) -> u16 {
        self.memory[usize::from(address)]
    }

    fn write(&mut self, address: u16, value: u16) {
        self.memory[usize::from(address)] = value;
    }

    fn register(&self, r: u16) -> Result<u16, Fault> {
        match r {
            0..=7 => Ok(self.gr[usize::from(r)]),
            SP_REGISTER if self.use_gr8_as_sp => Ok(self.sp),
            _ => Err(Fault::InvalidRegister {
                address: self.pr,
                register: r,
            }),
        }
    }

    fn set_register(&mut self, r: u16, value: u16) -> Result<(), Fault> {
        match r {
            0..=7 => self.gr[usize::from(r)] = value,
            SP_REGISTER if self.use_gr8_as_sp => self.sp = value,
            _ => {
                return Err(Fault::InvalidRegister {
                    address: self.pr,
                    register: r,
                })
            }
        }
        Ok(())
    }

    fn decode_at(&self, address: u16) -> Result<Instruction, Fault> {
        let word = self.read(address);
        let next = self.read(address.wrapping_add(1));
        Instruction::decode(word, next).ok_or(Fault::InvalidInstruction { address, word })
    }

    /// `adr + x`, where x = 0 means no index register.
    fn effective_address(&self, inst: &Instruction) -> Result<u16, Fault> {
        let base = inst.adr.unwrap_or(0);
        if inst.x == 0 {
            return Ok(base);
        }
        Ok(base.wrapping_add(self.register(inst.x)?))
    }

    /// Second operand of the arithmetic, logical and compare instructions.
    fn operand(&self, inst: &Instruction) -> Result<u16, Fault> {
        if inst.adr.is_some() {
            Ok(self.read(self.effective_address(inst)?))
        } else {
            self.register(inst.x)
        }
    }

    fn set_flags(&mut self, result: u16, overflow: bool) {
        self.flags = Flags {
            overflow,
            sign: result & 0x8000 != 0,
            zero: result == 0,
        };
    }

    fn push(&mut self, value: u16) {
        self.sp = self.sp.wrapping_sub(1);
        self.write(self.sp, value);
    }

    fn pop(&mut self) -> u16 {
        let value = self.read(self.sp);
        self.sp = self.sp.wrapping_add(1);
        value
    }

    fn execute(&mut self, inst: Instruction, at: u16, console: &mut dyn Console) -> Result<(), Fault> {
        match inst.mnemonic {
            Mnemonic::Nop => {}
            Mnemonic::Ld => {
                let value = self.operand(&inst)?;
                self.set_register(inst.r, value)?;
                self.set_flags(value, false);
            }
            Mnemonic::St => {
                let address = self.effective_address(&inst)?;
                let value = self.register(inst.r)?;
                self.write(address, value);
            }
            Mnemonic::Lad => {
                let address = self.effective_address(&inst)?;
                self.set_register(inst.r, address)?;
            }
            Mnemonic::Adda | Mnemonic::Suba => {
                let lhs = self.register(inst.r)? as i16;
                let rhs = self.operand(&inst)? as i16;
                let (result, overflow) = if inst.mnemonic == Mnemonic::Adda {
                    lhs.overflowing_add(rhs)
                } else {
                    lhs.overflowing_sub(rhs)
                };
                self.set_register(inst.r, result as u16)?;
                self.set_flags(result as u16, overflow);
            }
            Mnemonic::Addl | Mnemonic::Subl => {
                let lhs = self.register(inst.r)?;
                let rhs = self.operand(&inst)?;
                let (result, carry) = if inst.mnemonic == Mnemonic::Addl {
                    lhs.overflowing_add(rhs)
                } else {
                    lhs.overflowing_sub(rhs)
                };
                self.set_register(inst.r, result)?;
                self.set_flags(result, carry);
            }
            Mnemonic::And | Mnemonic::Or | Mnemonic::Xor => {
                let lhs = self.register(inst.r)?;
                let rhs = self.operand(&inst)?;
                let result = match inst.mnemonic {
                    Mnemonic::And => lhs & rhs,
                    Mnemonic::Or => lhs | rhs,
                    _ => lhs ^ rhs,
                };
                self.set_register(inst.r, result)?;
                self.set_flags(result, false);
            }
            Mnemonic::Cpa | Mnemonic::Cpl => {
                let lhs = self.register(inst.r)?;
                let rhs = self.operand(&inst)?;
                let ordering = if inst.mnemonic == Mnemonic::Cpa {
                    (lhs as i16).cmp(&(rhs as i16))
                } else {
                    lhs.cmp(&rhs)
                };
                self.flags = Flags {
                    overflow: false,
                    sign: ordering.is_lt(),
                    zero: ordering.is_eq(),
                };
            }
            Mnemonic::Sla | Mnemonic::Sra | Mnemonic::Sll | Mnemonic::Srl => {
                let value = self.register(inst.r)?;
                let count = self.effective_address(&inst)?;
                let (result, overflow) = shift(inst.mnemonic, value, count);
                self.set_register(inst.r, result)?;
                self.set_flags(result, overflow);
            }
            Mnemonic::Jmi
            | Mnemonic::Jnz
            | Mnemonic::Jze
            | Mnemonic::Jump
            | Mnemonic::Jpl
            | Mnemonic::Jov => {
                let Flags {
                    overflow,
                    sign,
                    zero,
                } = self.flags;
                let taken = match inst.mnemonic {
                    Mnemonic::Jmi => sign,
                    Mnemonic::Jnz => !zero,
                    Mnemonic::Jze => zero,
                    Mnemonic::Jpl => !sign && !zero,
                    Mnemonic::Jov => overflow,
                    _ => true,
                };
                if taken {
                    self.pr = self.effective_address(&inst)?;
                }
            }
            Mnemonic::Push => {
                let value = self.effective_address(&inst)?;
                self.push(value);
            }
            Mnemonic::Pop => {
                let value = self.pop();
                self.set_register(inst.r, value)?;
            }
            Mnemonic::Call => {
                let target = self.effective_address(&inst)?;
                self.push(self.pr);
                self.pr = target;
            }
            Mnemonic::Ret => {
                if self.sp == STACK_BASE {
                    self.halted = true;
                } else {
                    self.pr = self.pop();
                }
            }
            Mnemonic::Svc => match self.effective_address(&inst)? {
                SVC_INPUT => self.input(console),
                SVC_OUTPUT => self.output(console),
                code => {
                    return Err(Fault::UnknownSupervisorCall { address: at, code });
                }
            },
        }
        Ok(())
    }

    /// GR1 holds the buffer address, GR2 the address of the length word.
    fn input(&mut self, console: &mut dyn Console) {
        let buffer = self.gr[1];
        let length = self.gr[2];
        match console.read_line() {
            Some(line) => {
                let mut count = 0u16;
                for (i, c) in line.chars().take(MAX_INPUT).enumerate() {
                    self.write(buffer.wrapping_add(i as u16), c as u32 as u16);
                    count += 1;
                }
                self.write(length, count);
            }
            None => self.write(length, 0xFFFF),
        }
    }

    fn output(&mut self, console: &mut dyn Console) {
        let buffer = self.gr[1];
        let count = self.read(self.gr[2]);
        let text: String = (0..count)
            .map(|i| self.read(buffer.wrapping_add(i)))
            .map(|word| char::from_u32(u32::from(word)).unwrap_or('?'))
            .collect();
        console.write_line(&text);
    }
}

impl Default for Comet2 {
    fn default() -> Self {
        Self::new()
    }
}

/// Returns the shifted value and the last bit shifted out.
fn shift(mnemonic: Mnemonic, value: u16, count: u16) -> (u16, bool) {
    let mut result = value;
    let mut last_out = false;
    for _ in 0..count.min(16) {
        match mnemonic {
            Mnemonic::Sla => {
                let sign = result & 0x8000;
                last_out = result & 0x4000 != 0;
                result = sign | ((result << 1) & 0x7FFF);
            }
            Mnemonic::Sra => {
                last_out = result & 1 != 0;
                result = ((result as i16) >> 1) as u16;
            }
            Mnemonic::Sll => {
                last_out = result & 0x8000 != 0;
                result <<= 1;
            }
            _ => {
                last_out = result & 1 != 0;
                result >>= 1;
            }
        }
    }
    (result, last_out)
}

impl Engine for Comet2 {
    fn init(&mut self, program: &CompiledProgram, options: &EngineOptions) -> Result<(), Fault> {
        if program.code.len() > MEMORY_SIZE {
            return Err(Fault::ProgramTooLarge(program.code.len()));
        }
        self.memory = vec![0; MEMORY_SIZE];
        self.memory[..program.code.len()].copy_from_slice(&program.code);
        self.gr = [0; 8];
        self.sp = STACK_BASE;
        self.pr = program.entry;
        self.flags = Flags::default();
        self.use_gr8_as_sp = options.use_gr8_as_sp;
        self.halted = false;
        log::debug!(
            "loaded {} words, entry #{:04X}",
            program.code.len(),
            program.entry
        );
        Ok(())
    }

    fn next_instruction(&self) -> Result<InstructionKind, Fault> {
        Ok(self.decode_at(self.pr)?.kind())
    }

    fn step_into(&mut self, console: &mut dyn Console) -> Result<bool, Fault> {
        if self.halted {
            return Ok(true);
        }
        let at = self.pr;
        let inst = self.decode_at(at)?;
        self.pr = at.wrapping_add(inst.word_count());
        self.execute(inst, at, console)?;
        Ok(self.halted)
    }

    fn state(&self) -> MachineState {
        MachineState {
            gr: self.gr,
            pr: self.pr,
            sp: self.sp,
            flags: self.flags,
        }
    }
}
