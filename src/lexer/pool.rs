//! Interned identifiers and string literals.

use indexmap::IndexSet;

/// Index of an entry in a [`StringPool`]. Stable for the pool's lifetime.
pub type Symbol = u32;

/// Ordered, deduplicated strings. The first occurrence fixes the index.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StringPool {
    strings: IndexSet<String>,
}

impl StringPool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the symbol for `s`, adding it if this is the first sighting.
    pub fn intern(&mut self, s: &str) -> Symbol {
        if let Some(index) = self.strings.get_index_of(s) {
            return index as Symbol;
        }
        let (index, _) = self.strings.insert_full(s.to_string());
        index as Symbol
    }

    pub fn lookup(&self, s: &str) -> Option<Symbol> {
        self.strings.get_index_of(s).map(|i| i as Symbol)
    }

    pub fn get(&self, symbol: Symbol) -> Option<&str> {
        self.strings.get_index(symbol as usize).map(String::as_str)
    }

    /// Like [`get`](Self::get), for diagnostics where a placeholder is fine.
    pub fn name(&self, symbol: Symbol) -> &str {
        self.get(symbol).unwrap_or("<unknown>")
    }

    pub fn len(&self) -> usize {
        self.strings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.strings.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (Symbol, &str)> {
        self.strings
            .iter()
            .enumerate()
            .map(|(i, s)| (i as Symbol, s.as_str()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_seen_index_is_permanent() {
        let mut pool = StringPool::new();
        let a = pool.intern("alpha");
        let b = pool.intern("beta");
        assert_eq!(pool.intern("alpha"), a);
        assert_eq!((a, b), (0, 1));
        assert_eq!(pool.len(), 2);
        assert_eq!(pool.get(b), Some("beta"));
        assert_eq!(pool.lookup("gamma"), None);
    }
}
