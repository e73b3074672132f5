// src/sema/mro.rs
//! C3 linearization of entity template bases.

use crate::sema::types::TemplateId;

/// Compute the method resolution order for a template: itself first,
/// then the C3 merge of its parents' MROs and the parent list. Returns
/// None when no consistent linearization exists.
pub fn c3_linearize(
    this: TemplateId,
    parents: &[TemplateId],
    parent_mros: &[Vec<TemplateId>],
) -> Option<Vec<TemplateId>> {
    let mut mro = vec![this];
    let mut merge: Vec<Vec<TemplateId>> = parent_mros
        .iter()
        .filter(|m| !m.is_empty())
        .cloned()
        .collect();
    if !parents.is_empty() {
        merge.push(parents.to_vec());
    }

    while !merge.is_empty() {
        // Find a head candidate that appears in no list's tail
        let mut chosen = None;
        for seq in &merge {
            let candidate = seq[0];
            let in_tail = merge.iter().any(|other| other[1..].contains(&candidate));
            if !in_tail {
                chosen = Some(candidate);
                break;
            }
        }
        let candidate = chosen?;
        mro.push(candidate);
        for seq in &mut merge {
            seq.retain(|t| *t != candidate);
        }
        merge.retain(|seq| !seq.is_empty());
    }
    Some(mro)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn t(n: u32) -> TemplateId {
        TemplateId(n)
    }

    #[test]
    fn single_inheritance_chain() {
        // A; B(A)
        let a_mro = vec![t(0)];
        let b = c3_linearize(t(1), &[t(0)], &[a_mro]).unwrap();
        assert_eq!(b, vec![t(1), t(0)]);
    }

    #[test]
    fn diamond_resolves_left_to_right() {
        // A; B(A); C(A); D(B, C) -> D B C A
        let a = vec![t(0)];
        let b = c3_linearize(t(1), &[t(0)], std::slice::from_ref(&a)).unwrap();
        let c = c3_linearize(t(2), &[t(0)], std::slice::from_ref(&a)).unwrap();
        let d = c3_linearize(t(3), &[t(1), t(2)], &[b.clone(), c.clone()]).unwrap();
        assert_eq!(d, vec![t(3), t(1), t(2), t(0)]);

        // D(C, B) -> D C B A
        let d2 = c3_linearize(t(3), &[t(2), t(1)], &[c, b]).unwrap();
        assert_eq!(d2, vec![t(3), t(2), t(1), t(0)]);
    }

    #[test]
    fn conflicting_order_fails() {
        // X(B, C); Y(C, B); Z(X, Y) has no linearization
        let a = vec![t(0)];
        let b = c3_linearize(t(1), &[t(0)], std::slice::from_ref(&a)).unwrap();
        let c = c3_linearize(t(2), &[t(0)], std::slice::from_ref(&a)).unwrap();
        let x = c3_linearize(t(3), &[t(1), t(2)], &[b.clone(), c.clone()]).unwrap();
        let y = c3_linearize(t(4), &[t(2), t(1)], &[c, b]).unwrap();
        assert!(c3_linearize(t(5), &[t(3), t(4)], &[x, y]).is_none());
    }

    #[test]
    fn no_parents() {
        assert_eq!(c3_linearize(t(7), &[], &[]).unwrap(), vec![t(7)]);
    }
}
