//! Token-based fuzzy string scoring on a 0-100 scale.
//!
//! Scores are a weighted maximum over a plain ratio, token-sort and token-set
//! ratios, with partial (sliding window) variants when the inputs differ a lot in
//! length. The base ratio is the Indel ratio, `2 * lcs / (len_a + len_b)`, so an
//! adjacent swap costs one kept character rather than two substitutions.

use std::collections::BTreeSet;

const UNBASE_SCALE: f64 = 0.95;
const PARTIAL_SCALE: f64 = 0.90;
const LONG_PARTIAL_SCALE: f64 = 0.60;
const PARTIAL_LEN_RATIO: f64 = 1.5;
const LONG_LEN_RATIO: f64 = 8.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Candidate<'a> {
    pub choice: &'a str,
    pub index: usize,
    pub score: u8,
}

/// Lower-case, replace non-alphanumerics with spaces, collapse whitespace.
pub fn process(raw: &str) -> String {
    let mut cleaned = String::with_capacity(raw.len());
    for ch in raw.chars() {
        if ch.is_alphanumeric() {
            cleaned.extend(ch.to_lowercase());
        } else {
            cleaned.push(' ');
        }
    }
    cleaned.split_whitespace().collect::<Vec<_>>().join(" ")
}

pub fn score(a: &str, b: &str) -> u8 {
    score_processed(&process(a), &process(b))
}

fn score_processed(p1: &str, p2: &str) -> u8 {
    if p1.is_empty() || p2.is_empty() {
        return 0;
    }
    let base = ratio(p1, p2);
    let l1 = p1.chars().count() as f64;
    let l2 = p2.chars().count() as f64;
    let len_ratio = l1.max(l2) / l1.min(l2);

    let best = if len_ratio < PARTIAL_LEN_RATIO {
        base.max(token_sort_ratio(p1, p2, false) * UNBASE_SCALE)
            .max(token_set_ratio(p1, p2, false) * UNBASE_SCALE)
    } else {
        let partial_scale = if len_ratio > LONG_LEN_RATIO {
            LONG_PARTIAL_SCALE
        } else {
            PARTIAL_SCALE
        };
        base.max(partial_ratio(p1, p2) * partial_scale)
            .max(token_sort_ratio(p1, p2, true) * UNBASE_SCALE * partial_scale)
            .max(token_set_ratio(p1, p2, true) * UNBASE_SCALE * partial_scale)
    };
    best.round().clamp(0.0, 100.0) as u8
}

fn ratio(a: &str, b: &str) -> f64 {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    let total = a.len() + b.len();
    if total == 0 {
        return 100.0;
    }
    200.0 * lcs_len(&a, &b) as f64 / total as f64
}

/// Longest common subsequence length, one row of the DP table at a time.
fn lcs_len(a: &[char], b: &[char]) -> usize {
    let mut prev = vec![0usize; b.len() + 1];
    let mut cur = vec![0usize; b.len() + 1];
    for ca in a {
        for (j, cb) in b.iter().enumerate() {
            cur[j + 1] = if ca == cb {
                prev[j] + 1
            } else {
                prev[j + 1].max(cur[j])
            };
        }
        std::mem::swap(&mut prev, &mut cur);
    }
    prev[b.len()]
}

fn partial_ratio(a: &str, b: &str) -> f64 {
    let (short, long) = if a.chars().count() <= b.chars().count() {
        (a, b)
    } else {
        (b, a)
    };
    let long_chars: Vec<char> = long.chars().collect();
    let width = short.chars().count();
    if width == 0 {
        return 0.0;
    }
    if width == long_chars.len() {
        return ratio(short, long);
    }

    let mut best = 0.0f64;
    for start in 0..=(long_chars.len() - width) {
        let window: String = long_chars[start..start + width].iter().collect();
        let r = ratio(short, &window);
        if r > best {
            best = r;
            if best >= 100.0 {
                break;
            }
        }
    }
    best
}

fn token_sort_ratio(a: &str, b: &str, partial: bool) -> f64 {
    let sa = sorted_tokens(a);
    let sb = sorted_tokens(b);
    if partial {
        partial_ratio(&sa, &sb)
    } else {
        ratio(&sa, &sb)
    }
}

fn token_set_ratio(a: &str, b: &str, partial: bool) -> f64 {
    let ta: BTreeSet<&str> = a.split_whitespace().collect();
    let tb: BTreeSet<&str> = b.split_whitespace().collect();

    let sect = ta.intersection(&tb).copied().collect::<Vec<_>>().join(" ");
    let diff_ab = ta.difference(&tb).copied().collect::<Vec<_>>().join(" ");
    let diff_ba = tb.difference(&ta).copied().collect::<Vec<_>>().join(" ");
    let combined_ab = join_non_empty(&sect, &diff_ab);
    let combined_ba = join_non_empty(&sect, &diff_ba);

    let scorer: fn(&str, &str) -> f64 = if partial { partial_ratio } else { ratio };
    scorer(&sect, &combined_ab)
        .max(scorer(&sect, &combined_ba))
        .max(scorer(&combined_ab, &combined_ba))
}

fn sorted_tokens(s: &str) -> String {
    let mut tokens: Vec<&str> = s.split_whitespace().collect();
    tokens.sort_unstable();
    tokens.join(" ")
}

fn join_non_empty(a: &str, b: &str) -> String {
    match (a.is_empty(), b.is_empty()) {
        (true, _) => b.to_string(),
        (_, true) => a.to_string(),
        _ => format!("{a} {b}"),
    }
}

/// Score every choice and return the best `limit`, highest first. Equal scores keep
/// the order of `choices`.
pub fn extract<'a, S: AsRef<str>>(query: &str, choices: &'a [S], limit: usize) -> Vec<Candidate<'a>> {
    let q = process(query);
    if q.is_empty() || limit == 0 {
        return Vec::new();
    }
    let mut scored: Vec<Candidate<'a>> = choices
        .iter()
        .enumerate()
        .map(|(index, choice)| {
            let choice = choice.as_ref();
            Candidate {
                choice,
                index,
                score: score_processed(&q, &process(choice)),
            }
        })
        .collect();
    scored.sort_by(|a, b| b.score.cmp(&a.score));
    scored.truncate(limit);
    scored
}

/// Best choice scoring at least `cutoff`; the first one wins on ties.
pub fn extract_one<'a, S: AsRef<str>>(
    query: &str,
    choices: &'a [S],
    cutoff: u8,
) -> Option<Candidate<'a>> {
    let q = process(query);
    if q.is_empty() {
        return None;
    }
    let mut best: Option<Candidate<'a>> = None;
    for (index, choice) in choices.iter().enumerate() {
        let choice = choice.as_ref();
        let s = score_processed(&q, &process(choice));
        if s < cutoff {
            continue;
        }
        if best.is_none_or(|b| s > b.score) {
            best = Some(Candidate {
                choice,
                index,
                score: s,
            });
        }
    }
    best
}
