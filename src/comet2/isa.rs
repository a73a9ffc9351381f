//! COMET II instruction set: mnemonics, opcodes and decoding.
//!
//! The first word of every instruction is `op << 8 | r << 4 | x`. Instructions
//! that take a memory operand carry the address in a second word.

use crate::engine::InstructionKind;

/// SVC code of the input instruction.
pub const SVC_INPUT: u16 = 1;
/// SVC code of the output instruction.
pub const SVC_OUTPUT: u16 = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Mnemonic {
    Nop,
    Ld,
    St,
    Lad,
    Adda,
    Suba,
    Addl,
    Subl,
    And,
    Or,
    Xor,
    Cpa,
    Cpl,
    Sla,
    Sra,
    Sll,
    Srl,
    Jmi,
    Jnz,
    Jze,
    Jump,
    Jpl,
    Jov,
    Push,
    Pop,
    Call,
    Ret,
    Svc,
}

/// Operand shapes accepted by the assembler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperandForm {
    None,
    /// `r`
    Register,
    /// `r,adr[,x]`
    RegisterAddress,
    /// `r,adr[,x]` or `r1,r2`
    RegisterAddressOrRegister,
    /// `adr[,x]`
    Address,
}

struct OpInfo {
    mnemonic: Mnemonic,
    name: &'static str,
    opcode: u8,
    register_opcode: Option<u8>,
    form: OperandForm,
}

const fn op(
    mnemonic: Mnemonic,
    name: &'static str,
    opcode: u8,
    register_opcode: Option<u8>,
    form: OperandForm,
) -> OpInfo {
    OpInfo {
        mnemonic,
        name,
        opcode,
        register_opcode,
        form,
    }
}

static OPS: [OpInfo; 28] = [
    op(Mnemonic::Nop, "NOP", 0x00, None, OperandForm::None),
    op(Mnemonic::Ld, "LD", 0x10, Some(0x14), OperandForm::RegisterAddressOrRegister),
    op(Mnemonic::St, "ST", 0x11, None, OperandForm::RegisterAddress),
    op(Mnemonic::Lad, "LAD", 0x12, None, OperandForm::RegisterAddress),
    op(Mnemonic::Adda, "ADDA", 0x20, Some(0x24), OperandForm::RegisterAddressOrRegister),
    op(Mnemonic::Suba, "SUBA", 0x21, Some(0x25), OperandForm::RegisterAddressOrRegister),
    op(Mnemonic::Addl, "ADDL", 0x22, Some(0x26), OperandForm::RegisterAddressOrRegister),
    op(Mnemonic::Subl, "SUBL", 0x23, Some(0x27), OperandForm::RegisterAddressOrRegister),
    op(Mnemonic::And, "AND", 0x30, Some(0x34), OperandForm::RegisterAddressOrRegister),
    op(Mnemonic::Or, "OR", 0x31, Some(0x35), OperandForm::RegisterAddressOrRegister),
    op(Mnemonic::Xor, "XOR", 0x32, Some(0x36), OperandForm::RegisterAddressOrRegister),
    op(Mnemonic::Cpa, "CPA", 0x40, Some(0x44), OperandForm::RegisterAddressOrRegister),
    op(Mnemonic::Cpl, "CPL", 0x41, Some(0x45), OperandForm::RegisterAddressOrRegister),
    op(Mnemonic::Sla, "SLA", 0x50, None, OperandForm::RegisterAddress),
    op(Mnemonic::Sra, "SRA", 0x51, None, OperandForm::RegisterAddress),
    op(Mnemonic::Sll, "SLL", 0x52, None, OperandForm::RegisterAddress),
    op(Mnemonic::Srl, "SRL", 0x53, None, OperandForm::RegisterAddress),
    op(Mnemonic::Jmi, "JMI", 0x61, None, OperandForm::Address),
    op(Mnemonic::Jnz, "JNZ", 0x62, None, OperandForm::Address),
    op(Mnemonic::Jze, "JZE", 0x63, None, OperandForm::Address),
    op(Mnemonic::Jump, "JUMP", 0x64, None, OperandForm::Address),
    op(Mnemonic::Jpl, "JPL", 0x65, None, OperandForm::Address),
    op(Mnemonic::Jov, "JOV", 0x66, None, OperandForm::Address),
    op(Mnemonic::Push, "PUSH", 0x70, None, OperandForm::Address),
    op(Mnemonic::Pop, "POP", 0x71, None, OperandForm::Register),
    op(Mnemonic::Call, "CALL", 0x80, None, OperandForm::Address),
    op(Mnemonic::Ret, "RET", 0x81, None, OperandForm::None),
    op(Mnemonic::Svc, "SVC", 0xF0, None, OperandForm::Address),
];

impl Mnemonic {
    fn info(self) -> &'static OpInfo {
        // every variant has exactly one row
        OPS.iter()
            .find(|info| info.mnemonic == self)
            .unwrap_or(&OPS[0])
    }

    pub fn from_name(name: &str) -> Option<Self> {
        OPS.iter()
            .find(|info| info.name == name)
            .map(|info| info.mnemonic)
    }

    pub fn name(self) -> &'static str {
        self.info().name
    }

    pub fn opcode(self) -> u8 {
        self.info().opcode
    }

    pub fn register_opcode(self) -> Option<u8> {
        self.info().register_opcode
    }

    pub fn operand_form(self) -> OperandForm {
        self.info().form
    }
}

/// One decoded instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Instruction {
    pub mnemonic: Mnemonic,
    pub r: u16,
    pub x: u16,
    /// Second word, for two-word forms.
    pub adr: Option<u16>,
}

impl Instruction {
    /// Decodes the instruction whose first word is `word`. `next` is the
    /// word that follows it in memory.
    pub fn decode(word: u16, next: u16) -> Option<Self> {
        let opcode = (word >> 8) as u8;
        let r = (word >> 4) & 0xF;
        let x = word & 0xF;

        if let Some(info) = OPS.iter().find(|info| info.opcode == opcode) {
            let adr = match info.form {
                OperandForm::None | OperandForm::Register => None,
                _ => Some(next),
            };
            return Some(Self {
                mnemonic: info.mnemonic,
                r,
                x,
                adr,
            });
        }

        OPS.iter()
            .find(|info| info.register_opcode == Some(opcode))
            .map(|info| Self {
                mnemonic: info.mnemonic,
                r,
                x,
                adr: None,
            })
    }

    pub fn word_count(&self) -> u16 {
        if self.adr.is_some() {
            2
        } else {
            1
        }
    }

    pub fn is_call(&self) -> bool {
        self.mnemonic == Mnemonic::Call
    }

    pub fn is_return(&self) -> bool {
        self.mnemonic == Mnemonic::Ret
    }

    /// Whether executing this instruction reads from the console.
    pub fn is_input(&self) -> bool {
        self.mnemonic == Mnemonic::Svc && self.adr == Some(SVC_INPUT)
    }

    pub fn kind(&self) -> InstructionKind {
        if self.is_call() {
            InstructionKind::Call
        } else if self.is_return() {
            InstructionKind::Return
        } else if self.is_input() {
            InstructionKind::Input
        } else {
            InstructionKind::Other
        }
    }
}

pub fn encode(opcode: u8, r: u16, x: u16) -> u16 {
    (u16::from(opcode) << 8) | ((r & 0xF) << 4) | (x & 0xF)
}
