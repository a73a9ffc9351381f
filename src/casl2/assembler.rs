use super::lexer::{self, SourceLine};
use super::symbols::{self, SymbolTable};
use crate::comet2::isa::{self, Mnemonic, OperandForm, SVC_INPUT, SVC_OUTPUT};
use crate::config::CompileOptions;
use crate::program::{
    CompileOutput, CompiledProgram, Compiler, DebugInfo, Diagnostic, SubroutineInfo,
};

const ADDRESS_SPACE: u32 = 0x10000;

/// The CASL II assembler.
#[derive(Debug, Clone, Copy, Default)]
pub struct Casl2;

impl Casl2 {
    pub fn new() -> Self {
        Self
    }
}

impl Compiler for Casl2 {
    fn compile(&self, source: &str, options: &CompileOptions) -> CompileOutput {
        Assembler::new(*options).assemble(source)
    }
}

/// A word whose value may only be known after every label is defined.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Word {
    Value(u16),
    Symbol(String),
    /// Index into the owning block's literal pool.
    Literal(usize),
}

/// Words emitted for one instruction or one pseudo-instruction.
struct Group {
    address: u16,
    line: usize,
    block: usize,
    words: Vec<Word>,
    instruction: bool,
}

/// One START..END block.
struct Block {
    name: String,
    start_line: usize,
    origin: u16,
    entry_label: Option<String>,
    entry: u16,
    literals: Vec<Vec<u16>>,
    literal_addresses: Vec<u16>,
}

struct Assembler {
    options: CompileOptions,
    symbols: SymbolTable,
    blocks: Vec<Block>,
    current: Option<usize>,
    groups: Vec<Group>,
    location: u32,
    diagnostics: Vec<Diagnostic>,
}

impl Assembler {
    fn new(options: CompileOptions) -> Self {
        Self {
            options,
            symbols: SymbolTable::new(options.enable_label_scope),
            blocks: Vec::new(),
            current: None,
            groups: Vec::new(),
            location: 0,
            diagnostics: Vec::new(),
        }
    }

    fn assemble(mut self, source: &str) -> CompileOutput {
        let mut last_line = 0;
        for (line, text) in source.lines().enumerate() {
            last_line = line;
            let result = match lexer::split_line(text) {
                Ok(Some(statement)) => self.statement(line, statement),
                Ok(None) => Ok(()),
                Err(message) => Err(message),
            };
            if let Err(message) = result {
                self.diagnostics.push(Diagnostic::new(line, message));
            }
        }

        if let Some(open) = self.current {
            let message = format!("missing END for {}", self.blocks[open].name);
            self.diagnostics.push(Diagnostic::new(last_line, message));
        }
        if self.blocks.is_empty() {
            self.diagnostics
                .push(Diagnostic::new(0, "program has no START"));
        }
        if !self.diagnostics.is_empty() {
            return CompileOutput::failed(self.diagnostics);
        }

        let program = self.link();
        if !self.diagnostics.is_empty() {
            return CompileOutput::failed(self.diagnostics);
        }
        log::debug!(
            "assembled {} words in {} blocks",
            program.code.len(),
            self.blocks.len()
        );
        CompileOutput::succeeded(program)
    }

    fn statement(&mut self, line: usize, statement: SourceLine) -> Result<(), String> {
        let SourceLine {
            label,
            opcode,
            operands,
        } = statement;

        if let Some(label) = &label {
            if !symbols::is_valid_label(label) {
                return Err(format!("invalid label {}", label));
            }
        }

        match opcode.as_str() {
            "START" => return self.start(line, label, &operands),
            "END" => return self.end(line, label, &operands),
            _ => {}
        }

        let block = self
            .current
            .ok_or_else(|| format!("{} outside of a START/END block", opcode))?;
        if let Some(label) = &label {
            let address = self.address()?;
            self.symbols.define(block, label, address)?;
        }

        match opcode.as_str() {
            "DS" => {
                let count = match operands.as_slice() {
                    [count] => count
                        .parse::<u16>()
                        .map_err(|_| format!("invalid DS size {}", count))?,
                    _ => return Err("DS takes one size operand".to_string()),
                };
                self.emit(line, block, vec![Word::Value(0); usize::from(count)], false)
            }
            "DC" => {
                if operands.is_empty() {
                    return Err("DC needs at least one constant".to_string());
                }
                let mut words = Vec::new();
                for operand in &operands {
                    words.extend(parse_constant(operand)?);
                }
                self.emit(line, block, words, false)
            }
            "IN" | "OUT" => {
                let code = if opcode == "IN" { SVC_INPUT } else { SVC_OUTPUT };
                self.io_macro(line, block, code, &operands)
            }
            "RPUSH" | "RPOP" => {
                if !operands.is_empty() {
                    return Err(format!("{} takes no operands", opcode));
                }
                if opcode == "RPUSH" {
                    for r in 1..=7 {
                        self.emit_instruction(line, block, push_register(r))?;
                    }
                } else {
                    for r in (1..=7).rev() {
                        self.emit_instruction(line, block, pop_register(r))?;
                    }
                }
                Ok(())
            }
            _ => {
                let mnemonic = Mnemonic::from_name(&opcode)
                    .ok_or_else(|| format!("unknown instruction {}", opcode))?;
                let words = self.encode(block, mnemonic, &operands)?;
                self.emit_instruction(line, block, words)
            }
        }
    }

    fn start(&mut self, line: usize, label: Option<String>, operands: &[String]) -> Result<(), String> {
        if let Some(open) = self.current {
            return Err(format!("START before END of {}", self.blocks[open].name));
        }
        let name = label.ok_or_else(|| "START needs a label".to_string())?;
        let entry_label = match operands {
            [] => None,
            [entry] if symbols::is_valid_label(entry) => Some(entry.clone()),
            _ => return Err("START takes at most one label operand".to_string()),
        };

        let origin = self.address()?;
        let index = self.symbols.open_block();
        self.blocks.push(Block {
            name,
            start_line: line,
            origin,
            entry_label,
            entry: origin,
            literals: Vec::new(),
            literal_addresses: Vec::new(),
        });
        self.current = Some(index);
        Ok(())
    }

    fn end(&mut self, line: usize, label: Option<String>, operands: &[String]) -> Result<(), String> {
        let block = self
            .current
            .take()
            .ok_or_else(|| "END without START".to_string())?;
        if label.is_some() {
            return Err("END cannot have a label".to_string());
        }
        if !operands.is_empty() {
            return Err("END takes no operands".to_string());
        }

        let literals = std::mem::take(&mut self.blocks[block].literals);
        let mut addresses = Vec::with_capacity(literals.len());
        for words in literals {
            addresses.push(self.address()?);
            let words = words.into_iter().map(Word::Value).collect();
            self.emit(line, block, words, false)?;
        }
        self.blocks[block].literal_addresses = addresses;

        let name = self.blocks[block].name.clone();
        let entry = match self.blocks[block].entry_label.clone() {
            None => self.blocks[block].origin,
            Some(label) => self
                .symbols
                .resolve(block, &label)
                .ok_or_else(|| format!("undefined label {}", label))?,
        };
        self.blocks[block].entry = entry;
        self.symbols.define_global(&name, entry)
    }

    /// `IN`/`OUT buf,len` save GR1 and GR2 around the supervisor call.
    fn io_macro(&mut self, line: usize, block: usize, code: u16, operands: &[String]) -> Result<(), String> {
        let [buffer, length] = operands else {
            return Err("IN/OUT take a buffer and a length operand".to_string());
        };
        let buffer = self.address_word(block, buffer)?;
        let length = self.address_word(block, length)?;
        let lad = Mnemonic::Lad.opcode();
        let svc = Mnemonic::Svc.opcode();

        self.emit_instruction(line, block, push_register(1))?;
        self.emit_instruction(line, block, push_register(2))?;
        self.emit_instruction(line, block, vec![Word::Value(isa::encode(lad, 1, 0)), buffer])?;
        self.emit_instruction(line, block, vec![Word::Value(isa::encode(lad, 2, 0)), length])?;
        self.emit_instruction(
            line,
            block,
            vec![Word::Value(isa::encode(svc, 0, 0)), Word::Value(code)],
        )?;
        self.emit_instruction(line, block, pop_register(2))?;
        self.emit_instruction(line, block, pop_register(1))
    }

    fn encode(&mut self, block: usize, mnemonic: Mnemonic, operands: &[String]) -> Result<Vec<Word>, String> {
        let opcode = mnemonic.opcode();
        let wrong_operands = || format!("wrong operands for {}", mnemonic.name());

        match (mnemonic.operand_form(), operands) {
            (OperandForm::None, []) => Ok(vec![Word::Value(isa::encode(opcode, 0, 0))]),
            (OperandForm::Register, [r]) => {
                Ok(vec![Word::Value(isa::encode(opcode, self.register(r)?, 0))])
            }
            (OperandForm::RegisterAddressOrRegister, [r1, r2]) if looks_like_register(r2) => {
                let opcode = mnemonic.register_opcode().ok_or_else(wrong_operands)?;
                let first = self.register(r1)?;
                let second = self.register(r2)?;
                Ok(vec![Word::Value(isa::encode(opcode, first, second))])
            }
            (
                OperandForm::RegisterAddress | OperandForm::RegisterAddressOrRegister,
                [r, adr, index @ ..],
            ) if index.len() <= 1 => {
                let r = self.register(r)?;
                let x = self.index_register(index.first())?;
                let adr = self.address_word(block, adr)?;
                Ok(vec![Word::Value(isa::encode(opcode, r, x)), adr])
            }
            (OperandForm::Address, [adr, index @ ..]) if index.len() <= 1 => {
                let x = self.index_register(index.first())?;
                let adr = self.address_word(block, adr)?;
                Ok(vec![Word::Value(isa::encode(opcode, 0, x)), adr])
            }
            _ => Err(wrong_operands()),
        }
    }

    fn register(&self, text: &str) -> Result<u16, String> {
        match text {
            "GR8" if self.options.use_gr8 => Ok(8),
            "GR8" => Err("GR8 is not enabled".to_string()),
            _ if looks_like_register(text) && text.as_bytes()[2] <= b'7' => {
                Ok(u16::from(text.as_bytes()[2] - b'0'))
            }
            _ => Err(format!("expected a register, found {}", text)),
        }
    }

    fn index_register(&self, text: Option<&String>) -> Result<u16, String> {
        match text {
            None => Ok(0),
            Some(text) => match self.register(text)? {
                0 => Err("GR0 cannot be used as an index register".to_string()),
                x => Ok(x),
            },
        }
    }

    fn address_word(&mut self, block: usize, text: &str) -> Result<Word, String> {
        if let Some(literal) = text.strip_prefix('=') {
            let words = parse_constant(literal)?
                .into_iter()
                .map(|word| match word {
                    Word::Value(value) => Ok(value),
                    _ => Err(format!("literal {} must be a constant", text)),
                })
                .collect::<Result<Vec<_>, _>>()?;
            return Ok(Word::Literal(self.literal(block, words)));
        }
        match parse_constant(text)?.as_slice() {
            [word] => Ok(word.clone()),
            _ => Err(format!("invalid address {}", text)),
        }
    }

    fn literal(&mut self, block: usize, words: Vec<u16>) -> usize {
        let pool = &mut self.blocks[block].literals;
        match pool.iter().position(|existing| *existing == words) {
            Some(index) => index,
            None => {
                pool.push(words);
                pool.len() - 1
            }
        }
    }

    fn address(&self) -> Result<u16, String> {
        u16::try_from(self.location).map_err(|_| "program does not fit in memory".to_string())
    }

    fn emit(&mut self, line: usize, block: usize, words: Vec<Word>, instruction: bool) -> Result<(), String> {
        let address = self.address()?;
        let end = self.location + words.len() as u32;
        if end > ADDRESS_SPACE {
            return Err("program does not fit in memory".to_string());
        }
        self.location = end;
        self.groups.push(Group {
            address,
            line,
            block,
            words,
            instruction,
        });
        Ok(())
    }

    fn emit_instruction(&mut self, line: usize, block: usize, words: Vec<Word>) -> Result<(), String> {
        self.emit(line, block, words, true)
    }

    /// Resolve every symbol and lay the words out in memory.
    fn link(&mut self) -> CompiledProgram {
        let mut code = vec![0u16; self.location as usize];
        let mut debug_info = DebugInfo::default();

        for group in &self.groups {
            for (offset, word) in group.words.iter().enumerate() {
                let value = match word {
                    Word::Value(value) => *value,
                    Word::Symbol(name) => match self.symbols.resolve(group.block, name) {
                        Some(address) => address,
                        None => {
                            self.diagnostics.push(Diagnostic::new(
                                group.line,
                                format!("undefined label {}", name),
                            ));
                            0
                        }
                    },
                    Word::Literal(index) => self.blocks[group.block].literal_addresses[*index],
                };
                code[usize::from(group.address) + offset] = value;
            }
            if group.instruction {
                debug_info.line_map.insert(group.address, group.line);
            }
        }

        for block in &self.blocks {
            debug_info.subroutine_map.insert(block.entry, block.start_line);
            debug_info.subroutines.push(SubroutineInfo {
                name: block.name.clone(),
                start_line: block.start_line,
            });
        }

        CompiledProgram {
            code,
            entry: self.blocks.first().map_or(0, |block| block.entry),
            debug_info,
        }
    }
}

fn push_register(r: u16) -> Vec<Word> {
    vec![
        Word::Value(isa::encode(Mnemonic::Push.opcode(), 0, r)),
        Word::Value(0),
    ]
}

fn pop_register(r: u16) -> Vec<Word> {
    vec![Word::Value(isa::encode(Mnemonic::Pop.opcode(), r, 0))]
}

fn looks_like_register(text: &str) -> bool {
    let bytes = text.as_bytes();
    bytes.len() == 3 && text.starts_with("GR") && bytes[2].is_ascii_digit()
}

/// Decimal, `#hex`, `'string'` or a label.
fn parse_constant(text: &str) -> Result<Vec<Word>, String> {
    if text.starts_with('\'') {
        let string = lexer::unquote(text).ok_or_else(|| format!("malformed string {}", text))?;
        if string.is_empty() {
            return Err("empty string constant".to_string());
        }
        return Ok(string
            .chars()
            .map(|c| Word::Value(c as u32 as u16))
            .collect());
    }

    if let Some(hex) = text.strip_prefix('#') {
        if hex.len() != 4 {
            return Err(format!("hex constant {} needs four digits", text));
        }
        let value =
            u16::from_str_radix(hex, 16).map_err(|_| format!("invalid hex constant {}", text))?;
        return Ok(vec![Word::Value(value)]);
    }

    if text.starts_with(|c: char| c.is_ascii_digit() || c == '-' || c == '+') {
        return match text.parse::<i32>() {
            Ok(value) if (-32768..=65535).contains(&value) => {
                Ok(vec![Word::Value((value & 0xFFFF) as u16)])
            }
            _ => Err(format!("invalid decimal constant {}", text)),
        };
    }

    if symbols::is_valid_label(text) {
        return Ok(vec![Word::Symbol(text.to_string())]);
    }
    Err(format!("invalid constant {}", text))
}
