//! Loop bracket matching.

use crate::error::{BracketError, UnmatchedBracketKind};
use crate::source::Op;

/// Precomputed partner of every `[` and `]` in an instruction stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BracketMap {
    // jump[i] holds the matching index for '[' or ']' at index i.
    // For non-bracket positions, it is None.
    jump: Vec<Option<usize>>,
}

impl BracketMap {
    /// Match brackets in one left-to-right pass.
    ///
    /// A `]` with nothing open is reported at its own index; leftover `[` are
    /// reported at the index of the innermost (last opened) one.
    pub fn build(ops: &[Op]) -> Result<Self, BracketError> {
        let mut jump = vec![None; ops.len()];
        let mut stack: Vec<usize> = Vec::new();

        for (i, op) in ops.iter().enumerate() {
            match op {
                Op::LoopStart => stack.push(i),
                Op::LoopEnd => {
                    let Some(open) = stack.pop() else {
                        return Err(BracketError {
                            kind: UnmatchedBracketKind::Close,
                            index: i,
                        });
                    };
                    jump[open] = Some(i);
                    jump[i] = Some(open);
                }
                _ => {}
            }
        }

        if let Some(&open) = stack.last() {
            return Err(BracketError {
                kind: UnmatchedBracketKind::Open,
                index: open,
            });
        }

        Ok(Self { jump })
    }

    /// The matching bracket for the bracket at `index`.
    pub fn partner(&self, index: usize) -> Option<usize> {
        self.jump.get(index).copied().flatten()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::filter;
    use proptest::prelude::*;

    fn build(code: &str) -> Result<BracketMap, BracketError> {
        BracketMap::build(&filter(code).ops)
    }

    #[test]
    fn nested_loops_pair_up() {
        let map = build("[[][]]").unwrap();
        assert_eq!(map.partner(0), Some(5));
        assert_eq!(map.partner(5), Some(0));
        assert_eq!(map.partner(1), Some(2));
        assert_eq!(map.partner(3), Some(4));
    }

    #[test]
    fn non_brackets_have_no_partner() {
        let map = build("+[-]").unwrap();
        assert_eq!(map.partner(0), None);
        assert_eq!(map.partner(2), None);
        assert_eq!(map.partner(99), None);
    }

    #[test]
    fn stray_close_reports_its_index() {
        let err = build("+]").unwrap_err();
        assert_eq!(err.kind, UnmatchedBracketKind::Close);
        assert_eq!(err.index, 1);
    }

    #[test]
    fn unclosed_open_reports_innermost() {
        let err = build("[+[[]").unwrap_err();
        assert_eq!(err.kind, UnmatchedBracketKind::Open);
        assert_eq!(err.index, 2);
    }

    fn balanced() -> impl Strategy<Value = String> {
        let leaf = prop_oneof![Just(String::new()), "[+\\-<>.,]{1,4}"];
        leaf.prop_recursive(4, 64, 4, |inner| {
            prop_oneof![
                inner.clone().prop_map(|s| format!("[{s}]")),
                (inner.clone(), inner).prop_map(|(a, b)| format!("{a}{b}")),
            ]
        })
    }

    proptest! {
        #[test]
        fn matching_is_a_bijection(code in balanced()) {
            let ops = filter(&code).ops;
            let map = BracketMap::build(&ops).unwrap();
            for (i, op) in ops.iter().enumerate() {
                match op {
                    Op::LoopStart | Op::LoopEnd => {
                        let j = map.partner(i).unwrap();
                        prop_assert_eq!(map.partner(j), Some(i));
                        prop_assert_ne!(ops[i], ops[j]);
                    }
                    _ => prop_assert_eq!(map.partner(i), None),
                }
            }
        }

        #[test]
        fn extra_close_is_reported_exactly(code in balanced()) {
            let broken = format!("{code}]");
            let ops = filter(&broken).ops;
            let err = BracketMap::build(&ops).unwrap_err();
            prop_assert_eq!(err.kind, UnmatchedBracketKind::Close);
            prop_assert_eq!(err.index, ops.len() - 1);
        }

        #[test]
        fn extra_open_is_reported_exactly(code in balanced()) {
            let broken = format!("{code}[");
            let ops = filter(&broken).ops;
            let err = BracketMap::build(&ops).unwrap_err();
            prop_assert_eq!(err.kind, UnmatchedBracketKind::Open);
            prop_assert_eq!(err.index, ops.len() - 1);
        }
    }
}
