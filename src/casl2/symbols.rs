use std::collections::HashMap;

/// Label addresses. START labels are always global; other labels are local to
/// their START..END block when label scoping is enabled.
pub struct SymbolTable {
    globals: HashMap<String, u16>,
    locals: Vec<HashMap<String, u16>>,
    label_scope: bool,
}

impl SymbolTable {
    pub fn new(label_scope: bool) -> Self {
        Self {
            globals: HashMap::new(),
            locals: Vec::new(),
            label_scope,
        }
    }

    /// Open a new block and return its index.
    pub fn open_block(&mut self) -> usize {
        self.locals.push(HashMap::new());
        self.locals.len() - 1
    }

    pub fn define(&mut self, block: usize, name: &str, address: u16) -> Result<(), String> {
        let table = match self.locals.get_mut(block) {
            Some(locals) if self.label_scope => locals,
            _ => &mut self.globals,
        };
        if table.contains_key(name) {
            return Err(format!("duplicate label {}", name));
        }
        table.insert(name.to_string(), address);
        Ok(())
    }

    pub fn define_global(&mut self, name: &str, address: u16) -> Result<(), String> {
        if self.globals.contains_key(name) {
            return Err(format!("duplicate label {}", name));
        }
        self.globals.insert(name.to_string(), address);
        Ok(())
    }

    /// Look `name` up in `block` first, then among the globals.
    pub fn resolve(&self, block: usize, name: &str) -> Option<u16> {
        self.locals
            .get(block)
            .and_then(|locals| locals.get(name))
            .or_else(|| self.globals.get(name))
            .copied()
    }
}

/// Labels are one to eight characters: an uppercase letter followed by
/// uppercase letters or digits, and never a register name.
pub fn is_valid_label(name: &str) -> bool {
    let mut chars = name.chars();
    let first_ok = chars.next().is_some_and(|c| c.is_ascii_uppercase());
    first_ok
        && name.len() <= 8
        && chars.all(|c| c.is_ascii_uppercase() || c.is_ascii_digit())
        && !is_register_name(name)
}

fn is_register_name(name: &str) -> bool {
    matches!(
        name,
        "GR0" | "GR1" | "GR2" | "GR3" | "GR4" | "GR5" | "GR6" | "GR7" | "GR8"
    )
}
