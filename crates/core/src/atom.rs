//! Process-wide interned strings with integer identity
//!
//! Atoms give event names, coroutine ids, and keywords O(1) equality and
//! ordering. The table is append-only for the life of the process; interned
//! text is leaked once and handed out as `&'static str`.
//!
//! Buckets are independent namespaces. The default bucket holds general
//! identifiers; the MSG bucket holds event-type names so that the scheduler
//! can compare event types without touching the default namespace.

use std::collections::HashMap;
use std::num::NonZeroU32;
use std::sync::{Mutex, OnceLock};

/// Which namespace an atom lives in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AtomBucket {
    Default,
    Msg,
}

/// An interned string. Identity (and ordering) is the small integer handed
/// out at interning time; two atoms are equal iff bucket and text are equal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Atom(NonZeroU32);

struct AtomTable {
    // id -> text; index 0 is unused so ids start at 1.
    strings: Vec<&'static str>,
    by_text: [HashMap<&'static str, Atom>; 2],
}

static TABLE: OnceLock<Mutex<AtomTable>> = OnceLock::new();

fn table() -> &'static Mutex<AtomTable> {
    TABLE.get_or_init(|| {
        Mutex::new(AtomTable {
            strings: vec![""],
            by_text: [HashMap::new(), HashMap::new()],
        })
    })
}

fn bucket_index(bucket: AtomBucket) -> usize {
    match bucket {
        AtomBucket::Default => 0,
        AtomBucket::Msg => 1,
    }
}

impl Atom {
    /// Intern `text` in the default bucket.
    pub fn intern(text: &str) -> Atom {
        Atom::intern_in(AtomBucket::Default, text)
    }

    /// Intern `text` in the given bucket, returning the existing atom if the
    /// text was seen before.
    pub fn intern_in(bucket: AtomBucket, text: &str) -> Atom {
        let mut tab = table().lock().expect("atom table poisoned");
        if let Some(&atom) = tab.by_text[bucket_index(bucket)].get(text) {
            return atom;
        }
        let leaked: &'static str = Box::leak(text.to_owned().into_boxed_str());
        let id = NonZeroU32::new(tab.strings.len() as u32).expect("atom ids start at 1");
        tab.strings.push(leaked);
        let atom = Atom(id);
        tab.by_text[bucket_index(bucket)].insert(leaked, atom);
        atom
    }

    /// Look up an already-interned atom without creating one.
    pub fn try_lookup(bucket: AtomBucket, text: &str) -> Option<Atom> {
        let tab = table().lock().expect("atom table poisoned");
        tab.by_text[bucket_index(bucket)].get(text).copied()
    }

    /// The interned text.
    pub fn as_str(self) -> &'static str {
        let tab = table().lock().expect("atom table poisoned");
        tab.strings[self.0.get() as usize]
    }

    /// The raw integer identity.
    pub fn id(self) -> u32 {
        self.0.get()
    }
}

impl std::fmt::Display for Atom {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_intern_is_idempotent() {
        let a = Atom::intern("change");
        let b = Atom::intern("change");
        assert_eq!(a, b);
        assert_eq!(a.as_str(), "change");
    }

    #[test]
    fn test_buckets_are_disjoint_namespaces() {
        let d = Atom::intern_in(AtomBucket::Default, "close");
        let m = Atom::intern_in(AtomBucket::Msg, "close");
        assert_ne!(d, m);
        assert_eq!(d.as_str(), "close");
        assert_eq!(m.as_str(), "close");
    }

    #[test]
    fn test_try_lookup_does_not_create() {
        assert_eq!(
            Atom::try_lookup(AtomBucket::Msg, "never-interned-sentinel"),
            None
        );
        let a = Atom::intern_in(AtomBucket::Msg, "grow");
        assert_eq!(Atom::try_lookup(AtomBucket::Msg, "grow"), Some(a));
    }

    #[test]
    fn test_ids_are_small_and_distinct() {
        let a = Atom::intern("alpha-atom-test");
        let b = Atom::intern("beta-atom-test");
        assert_ne!(a.id(), b.id());
        assert!(a.id() > 0 && b.id() > 0);
    }

    #[test]
    fn test_concurrent_interning() {
        let handles: Vec<_> = (0..8)
            .map(|i| {
                std::thread::spawn(move || {
                    let text = format!("shared-{}", i % 2);
                    Atom::intern(&text)
                })
            })
            .collect();
        let atoms: Vec<Atom> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        assert_eq!(atoms[0].as_str().starts_with("shared-"), true);
        // Same text always resolves to the same atom regardless of thread.
        for pair in atoms.chunks(2) {
            let same: Vec<_> = atoms
                .iter()
                .filter(|a| a.as_str() == pair[0].as_str())
                .collect();
            assert!(same.windows(2).all(|w| w[0] == w[1]));
        }
    }
}
