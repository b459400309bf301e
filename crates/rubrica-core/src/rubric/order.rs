use std::cmp::Ordering;
use std::iter::Peekable;
use std::str::Chars;

/// Natural ("numeric-aware") ordering for criterion ids: `C2 < C10`.
///
/// Digit runs compare by numeric value, everything else compares
/// case-insensitively. Ties fall back to plain byte order so the result is a
/// total order.
pub fn natural_cmp(a: &str, b: &str) -> Ordering {
    let mut left = a.chars().peekable();
    let mut right = b.chars().peekable();

    loop {
        match (left.peek().copied(), right.peek().copied()) {
            (None, None) => return a.cmp(b),
            (None, Some(_)) => return Ordering::Less,
            (Some(_), None) => return Ordering::Greater,
            (Some(l), Some(r)) if l.is_ascii_digit() && r.is_ascii_digit() => {
                let ln = take_digits(&mut left);
                let rn = take_digits(&mut right);
                let ord = compare_numeric(&ln, &rn);
                if ord != Ordering::Equal {
                    return ord;
                }
            }
            (Some(l), Some(r)) => {
                let ord = l.to_lowercase().cmp(r.to_lowercase());
                if ord != Ordering::Equal {
                    return ord;
                }
                left.next();
                right.next();
            }
        }
    }
}

fn take_digits(chars: &mut Peekable<Chars<'_>>) -> String {
    let mut digits = String::new();
    while let Some(c) = chars.peek().copied() {
        if !c.is_ascii_digit() {
            break;
        }
        digits.push(c);
        chars.next();
    }
    digits
}

fn compare_numeric(a: &str, b: &str) -> Ordering {
    let a = a.trim_start_matches('0');
    let b = b.trim_start_matches('0');
    a.len().cmp(&b.len()).then_with(|| a.cmp(b))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn numeric_runs_sort_by_value() {
        let mut ids = vec!["C10", "C2", "C1", "c3", "D1", "C02"];
        ids.sort_by(|a, b| natural_cmp(a, b));
        assert_eq!(ids, vec!["C1", "C02", "C2", "c3", "C10", "D1"]);
    }

    #[test]
    fn prefix_sorts_first() {
        assert_eq!(natural_cmp("C", "C1"), Ordering::Less);
        assert_eq!(natural_cmp("C1", "C1"), Ordering::Equal);
    }
}
