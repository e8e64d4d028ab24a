//! Mnemonic splitting: `<base><cond?><suffix?>` -> `(base, Condition, suffix)`.
//!
//! ARM UAL order places the condition right after the base and any
//! modifier suffix (`S`, `B`, block-transfer addressing code) after that,
//! e.g. `ADDEQS`, `LDRNEB`, `STMDB`. We only recognize that order; writing
//! the suffix before the condition is rejected as an unknown mnemonic.

use armvm::instruction::Condition;

const CONDITIONS: &[(&str, Condition)] = &[
    ("EQ", Condition::Eq),
    ("NE", Condition::Ne),
    ("CS", Condition::Cs),
    ("HS", Condition::Cs),
    ("CC", Condition::Cc),
    ("LO", Condition::Cc),
    ("MI", Condition::Mi),
    ("PL", Condition::Pl),
    ("VS", Condition::Vs),
    ("VC", Condition::Vc),
    ("HI", Condition::Hi),
    ("LS", Condition::Ls),
    ("GE", Condition::Ge),
    ("LT", Condition::Lt),
    ("GT", Condition::Gt),
    ("LE", Condition::Le),
    ("AL", Condition::Al),
    ("NV", Condition::Nv),
];

/// Strips a known base (trying the longest candidates first so e.g. `BL`
/// is preferred over `B`), returning `(base, remainder)`.
pub fn strip_base<'a>(mnemonic: &'a str, bases: &[&'static str]) -> Option<(&'static str, &'a str)> {
    let mut candidates: Vec<&'static str> = bases.to_vec();
    candidates.sort_by_key(|b| std::cmp::Reverse(b.len()));
    for base in candidates {
        if let Some(rest) = mnemonic.strip_prefix(base) {
            return Some((base, rest));
        }
    }
    None
}

/// Strips a leading two-letter condition code, defaulting to `AL`.
pub fn strip_condition(s: &str) -> (Condition, &str) {
    if s.len() >= 2 {
        let (head, tail) = s.split_at(2);
        for (name, cond) in CONDITIONS {
            if *name == head {
                return (*cond, tail);
            }
        }
    }
    (Condition::Al, s)
}
