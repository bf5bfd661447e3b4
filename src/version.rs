//! Lenient ordering of vendor version strings.
//!
//! macOS package versions are rarely semver: `7.22.3rev1`, `120.0.6099.109`,
//! `2.0b3` and `24.001.20604` all show up in the wild.  A version is split
//! into numeric and alphabetic runs (any other character separates runs):
//!
//! - numeric runs compare numerically;
//! - a numeric run sorts after an alphabetic run in the same position;
//! - alphabetic runs compare by pre-release rank (`dev` < `a`/`alpha` <
//!   `b`/`beta` < `c`/`rc`/`pre`/`preview`) and otherwise case-insensitively;
//! - when one version runs out, remaining zero components are ignored
//!   (`1.0 == 1`), a remaining pre-release marker makes the longer version
//!   older (`2.0b3 < 2.0`) and anything else makes it newer
//!   (`7.22.3rev1 > 7.22.3`, `1.0.1 > 1.0`).
use std::cmp::Ordering;

#[derive(Debug, Clone, PartialEq, Eq)]
enum Token {
    Num(u64),
    Alpha(String),
}

fn tokenize(version: &str) -> Vec<Token> {
    let mut tokens = Vec::new();
    let mut chars = version.trim().chars().peekable();
    while let Some(&c) = chars.peek() {
        if c.is_ascii_digit() {
            let mut digits = String::new();
            while let Some(&d) = chars.peek()
                && d.is_ascii_digit()
            {
                digits.push(d);
                chars.next();
            }
            // Absurdly long runs saturate rather than fail.
            tokens.push(Token::Num(digits.parse().unwrap_or(u64::MAX)));
        } else if c.is_ascii_alphabetic() {
            let mut word = String::new();
            while let Some(&a) = chars.peek()
                && a.is_ascii_alphabetic()
            {
                word.push(a.to_ascii_lowercase());
                chars.next();
            }
            tokens.push(Token::Alpha(word));
        } else {
            chars.next();
        }
    }
    tokens
}

/// Rank of a pre-release marker, `None` for anything else.
fn pre_release_rank(word: &str) -> Option<u8> {
    match word {
        "dev" => Some(0),
        "a" | "alpha" => Some(1),
        "b" | "beta" => Some(2),
        "c" | "rc" | "pre" | "preview" => Some(3),
        _ => None,
    }
}

fn compare_alpha(a: &str, b: &str) -> Ordering {
    match (pre_release_rank(a), pre_release_rank(b)) {
        (Some(x), Some(y)) => x.cmp(&y),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => a.cmp(b),
    }
}

/// Ordering of the longer side's leftover tokens against "nothing".
fn compare_tail(tail: &[Token]) -> Ordering {
    for token in tail {
        match token {
            Token::Num(0) => {}
            Token::Num(_) => return Ordering::Greater,
            Token::Alpha(word) if pre_release_rank(word).is_some() => return Ordering::Less,
            Token::Alpha(_) => return Ordering::Greater,
        }
    }
    Ordering::Equal
}

/// Compare two version strings.
///
/// # Examples
///
/// ```
/// use std::cmp::Ordering;
/// use macos_pkg::version::compare;
///
/// assert_eq!(compare("1.10", "1.9"), Ordering::Greater);
/// assert_eq!(compare("2.0b3", "2.0"), Ordering::Less);
/// assert_eq!(compare("1.0", "1.0.0"), Ordering::Equal);
/// ```
#[must_use]
pub fn compare(a: &str, b: &str) -> Ordering {
    let left = tokenize(a);
    let right = tokenize(b);

    for (x, y) in left.iter().zip(right.iter()) {
        let ord = match (x, y) {
            (Token::Num(m), Token::Num(n)) => m.cmp(n),
            (Token::Num(_), Token::Alpha(_)) => Ordering::Greater,
            (Token::Alpha(_), Token::Num(_)) => Ordering::Less,
            (Token::Alpha(s), Token::Alpha(t)) => compare_alpha(s, t),
        };
        if ord != Ordering::Equal {
            return ord;
        }
    }

    match left.len().cmp(&right.len()) {
        Ordering::Equal => Ordering::Equal,
        Ordering::Greater => compare_tail(left.get(right.len()..).unwrap_or_default()),
        Ordering::Less => compare_tail(right.get(left.len()..).unwrap_or_default()).reverse(),
    }
}

/// Whether `installed` is at least as new as `wanted`.
#[must_use]
pub fn is_at_least(installed: &str, wanted: &str) -> bool {
    compare(installed, wanted) != Ordering::Less
}
