use lazy_static::lazy_static;
use std::sync::{PoisonError, RwLock};
pub use string_cache::DefaultAtom as Atom;

lazy_static! {
    static ref KEY_INTERNER: RwLock<Vec<Atom>> = RwLock::new(Vec::new());
}

/// Intern a stimulus key and return its stable id.
///
/// Ids are dense and never reused, so they can index per-word caches that
/// outlive a single run.
pub fn intern_key(key: &str) -> usize {
    let atom = Atom::from(key);
    if let Some(idx) = KEY_INTERNER
        .read()
        .unwrap_or_else(PoisonError::into_inner)
        .iter()
        .position(|a| *a == atom)
    {
        return idx;
    }
    let mut keys = KEY_INTERNER.write().unwrap_or_else(PoisonError::into_inner);
    match keys.iter().position(|a| *a == atom) {
        Some(idx) => idx,
        None => {
            keys.push(atom);
            keys.len() - 1
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interning_is_stable() {
        let a = intern_key("cache-test-owl");
        let b = intern_key("cache-test-lark");
        assert_ne!(a, b);
        assert_eq!(intern_key("cache-test-owl"), a);
        assert_eq!(intern_key("cache-test-lark"), b);
    }
}
