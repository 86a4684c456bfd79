use std::collections::HashMap;

/// mapping from identifier to a signed 32-bit address, populated during
/// pass 1. `$` is the current emission address during assembly.
#[derive(Debug, Clone, Default)]
pub struct SymbolTable {
    symbols: HashMap<String, i32>,
}

impl SymbolTable {
    pub fn new() -> Self {
        SymbolTable {
            symbols: HashMap::new(),
        }
    }

    pub fn define(&mut self, name: &str, value: i32) {
        self.symbols.insert(name.to_string(), value);
    }

    /// unresolved identifiers default to 0 (§4.B) — this preserves
    /// self-referential metaprogramming patterns while still producing
    /// executable bytecode.
    pub fn resolve(&self, name: &str) -> i32 {
        *self.symbols.get(name).unwrap_or(&0)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.symbols.contains_key(name)
    }

    pub fn shift_all(&mut self, delta: i32) {
        for v in self.symbols.values_mut() {
            *v += delta;
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &i32)> {
        self.symbols.iter()
    }
}

/// register name aliasing (§4.B lexical rules): r0..r3 plus ax/bx/cx/dx
/// and si/di aliases, encodable in the low two bits of an operand byte.
/// `sp`/`pc`/`flags` are recognised as register tokens by the lexer but
/// are not part of the byte-encodable set (the register file addresses
/// them directly, not through the low-two-bits operand scheme).
pub fn register_index(name: &str) -> Option<u8> {
    match name.to_ascii_lowercase().as_str() {
        "r0" | "ax" => Some(0),
        "r1" | "bx" | "si" => Some(1),
        "r2" | "cx" | "di" => Some(2),
        "r3" | "dx" => Some(3),
        _ => None,
    }
}

pub fn is_special_register(name: &str) -> bool {
    matches!(name.to_ascii_lowercase().as_str(), "sp" | "pc" | "flags")
}

pub fn is_register_name(name: &str) -> bool {
    register_index(name).is_some() || is_special_register(name)
}
