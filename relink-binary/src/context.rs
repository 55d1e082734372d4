use std::collections::HashMap;

use crate::function::BinaryFunction;

/// Dense index of a function inside its `BinaryContext`.
pub type FunctionId = usize;
/// Dense index of a symbol inside its `BinaryContext`.
pub type SymbolId = usize;

#[derive(Debug, Clone)]
struct SymbolInfo {
    name: String,
    function: Option<FunctionId>,
}

/// Lookup result for a symbol name.
#[derive(Debug, Clone, Copy)]
pub struct BinaryData {
    symbol: SymbolId,
}

impl BinaryData {
    pub fn symbol(&self) -> SymbolId {
        self.symbol
    }
}

/// Run statistics accumulated while attaching profiles.
#[derive(Debug, Default)]
pub struct BinaryContextStats {
    pub num_stale_funcs_with_equal_block_count: u64,
}

/// Everything recovered from the target binary that profile attachment
/// needs: the function arena, the symbol table, and run statistics.
/// Functions are addressed by dense `FunctionId` indices; cross-references
/// are plain index lookups, never owning links.
#[derive(Debug, Default)]
pub struct BinaryContext {
    functions: Vec<BinaryFunction>,
    symbols: Vec<SymbolInfo>,
    name_to_symbol: HashMap<String, SymbolId>,
    pub stats: BinaryContextStats,
    num_unused_profiled_objects: u64,
}

impl BinaryContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a function under one or more symbol names. The first name
    /// becomes the primary entry symbol.
    pub fn add_function<I, S>(&mut self, names: I, size: u64) -> FunctionId
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let names: Vec<String> = names.into_iter().map(Into::into).collect();
        let id = self.functions.len();
        self.functions.push(BinaryFunction::new(names.clone(), size));
        let mut primary = None;
        for name in names {
            let symbol = self.intern_symbol(name, Some(id));
            primary.get_or_insert(symbol);
        }
        if let Some(symbol) = primary {
            self.functions[id].add_entry_symbol(symbol);
        }
        id
    }

    /// Register a secondary entry point of a multi-entry function. Entry
    /// discriminators follow registration order.
    pub fn add_entry_symbol(&mut self, func: FunctionId, name: impl Into<String>) -> SymbolId {
        let symbol = self.intern_symbol(name.into(), Some(func));
        self.functions[func].add_entry_symbol(symbol);
        symbol
    }

    // First registration of a name wins.
    fn intern_symbol(&mut self, name: String, function: Option<FunctionId>) -> SymbolId {
        if let Some(&symbol) = self.name_to_symbol.get(&name) {
            return symbol;
        }
        let symbol = self.symbols.len();
        self.name_to_symbol.insert(name.clone(), symbol);
        self.symbols.push(SymbolInfo { name, function });
        symbol
    }

    pub fn get_binary_data_by_name(&self, name: &str) -> Option<BinaryData> {
        self.name_to_symbol
            .get(name)
            .map(|&symbol| BinaryData { symbol })
    }

    pub fn get_function_for_symbol(&self, symbol: SymbolId) -> Option<FunctionId> {
        self.symbols.get(symbol)?.function
    }

    pub fn symbol_name(&self, symbol: SymbolId) -> &str {
        &self.symbols[symbol].name
    }

    pub fn function(&self, id: FunctionId) -> &BinaryFunction {
        &self.functions[id]
    }

    pub fn function_mut(&mut self, id: FunctionId) -> &mut BinaryFunction {
        &mut self.functions[id]
    }

    pub fn num_functions(&self) -> usize {
        self.functions.len()
    }

    /// All functions in registration order.
    pub fn functions(&self) -> impl Iterator<Item = (FunctionId, &BinaryFunction)> {
        self.functions.iter().enumerate()
    }

    /// `(symbol name, function)` pairs for every named function symbol.
    pub fn function_symbols(&self) -> impl Iterator<Item = (&str, FunctionId)> {
        self.symbols
            .iter()
            .filter_map(|info| info.function.map(|func| (info.name.as_str(), func)))
    }

    pub fn set_num_unused_profiled_objects(&mut self, count: u64) {
        self.num_unused_profiled_objects = count;
    }

    pub fn num_unused_profiled_objects(&self) -> u64 {
        self.num_unused_profiled_objects
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_name_lookup_round_trip() {
        let mut ctx = BinaryContext::new();
        let func = ctx.add_function(["main", "main.cold"], 64);

        let data = ctx.get_binary_data_by_name("main").unwrap();
        assert_eq!(ctx.get_function_for_symbol(data.symbol()), Some(func));

        let alias = ctx.get_binary_data_by_name("main.cold").unwrap();
        assert_eq!(ctx.get_function_for_symbol(alias.symbol()), Some(func));

        assert!(ctx.get_binary_data_by_name("missing").is_none());
    }

    #[test]
    fn test_entry_discriminators() {
        let mut ctx = BinaryContext::new();
        let func = ctx.add_function(["outer"], 32);
        ctx.add_entry_symbol(func, "outer.entry2");

        let primary = ctx.function(func).symbol_for_entry_id(0).unwrap();
        let secondary = ctx.function(func).symbol_for_entry_id(1).unwrap();
        assert_eq!(ctx.symbol_name(primary), "outer");
        assert_eq!(ctx.symbol_name(secondary), "outer.entry2");
        assert!(ctx.function(func).symbol_for_entry_id(2).is_none());
    }

    #[test]
    fn test_function_symbols_iteration() {
        let mut ctx = BinaryContext::new();
        ctx.add_function(["a"], 8);
        ctx.add_function(["b", "b.alias"], 8);

        let pairs: Vec<_> = ctx.function_symbols().collect();
        assert_eq!(pairs, vec![("a", 0), ("b", 1), ("b.alias", 1)]);
    }
}
