//! Per-compilation code generation state (spec §4.6, §9's note on bundling
//! the pass-wide counters into an explicit context rather than free fields
//! of a long-lived object).

use crate::symtab::SymbolTable;
use crate::types::TypeRegistry;
use std::collections::HashMap;

/// Everything threaded through code generation: the read-only type
/// registry, the symbol table (which already owns the monotonic
/// temp/label counters and the regular-string pool), the growing IR text
/// buffer, and the D-string id counter.
pub struct CodegenState<'a> {
    pub registry: &'a TypeRegistry,
    pub symbols: SymbolTable,
    pub out: String,
    next_dstring_id: u64,
    /// Per-function map from a tracked variable's name to the SSA registers
    /// of every live D-string that currently depends on it (spec §9: "a
    /// plain table keyed by variable identifier plus scope id"). Cleared at
    /// the start of each function/method body.
    pub dstring_deps: HashMap<String, Vec<String>>,
    /// Labels for the innermost enclosing loop's `break`/`continue`
    /// targets, pushed/popped as loops nest (spec §4.6).
    pub loop_labels: Vec<(String, String)>,
}

impl<'a> CodegenState<'a> {
    pub fn new(registry: &'a TypeRegistry, symbols: SymbolTable) -> Self {
        CodegenState {
            registry,
            symbols,
            out: String::new(),
            next_dstring_id: 0,
            dstring_deps: HashMap::new(),
            loop_labels: Vec::new(),
        }
    }

    pub fn emit(&mut self, line: impl AsRef<str>) {
        self.out.push_str(line.as_ref());
        self.out.push('\n');
    }

    pub fn fresh_temp(&mut self) -> String {
        self.symbols.fresh_temp()
    }

    pub fn fresh_label(&mut self, hint: &str) -> String {
        self.symbols.fresh_label(hint)
    }

    pub fn fresh_dstring_id(&mut self) -> u64 {
        let id = self.next_dstring_id;
        self.next_dstring_id += 1;
        id
    }

    pub fn begin_function(&mut self) {
        self.dstring_deps.clear();
    }

    pub fn track_dependency(&mut self, var_name: &str, dstring_reg: &str) {
        self.dstring_deps
            .entry(var_name.to_string())
            .or_default()
            .push(dstring_reg.to_string());
    }

    /// Emits a `DString_markDirty` call for every D-string depending on
    /// `var_name` (spec §9: the compiler sees every write).
    pub fn mark_dependents_dirty(&mut self, var_name: &str) {
        let Some(regs) = self.dstring_deps.get(var_name).cloned() else {
            return;
        };
        for reg in regs {
            self.emit(format!(
                "  call void @DString_markDirty(ptr {})",
                reg
            ));
        }
    }
}
