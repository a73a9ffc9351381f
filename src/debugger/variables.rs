use crate::engine::MachineState;

/// One inspectable register or flag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Variable {
    pub name: String,
    pub value: String,
    pub type_name: &'static str,
}

impl Variable {
    fn integer(name: impl Into<String>, value: u16) -> Self {
        Self {
            name: name.into(),
            value: value.to_string(),
            type_name: "integer",
        }
    }
}

/// GR0..GR7, PR, SP, OF, SF, ZF. GR8 is SP, so it is not listed.
pub fn registers(state: &MachineState) -> Vec<Variable> {
    let mut variables: Vec<Variable> = state
        .gr
        .iter()
        .enumerate()
        .map(|(i, &value)| Variable::integer(format!("GR{}", i), value))
        .collect();

    variables.push(Variable::integer("PR", state.pr));
    variables.push(Variable::integer("SP", state.sp));
    variables.push(Variable::integer("OF", u16::from(state.flags.overflow)));
    variables.push(Variable::integer("SF", u16::from(state.flags.sign)));
    variables.push(Variable::integer("ZF", u16::from(state.flags.zero)));
    variables
}

/// Exact-name lookup among [`registers`].
pub fn lookup(state: &MachineState, name: &str) -> Option<Variable> {
    registers(state).into_iter().find(|v| v.name == name)
}
