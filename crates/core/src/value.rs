//! Format-preserving perturbation of scalar measurement values

use rand::Rng;

/// Substrings marking a value as a non-numeric sentinel (matched case-insensitively)
pub const SENTINEL_TOKENS: &[&str] = &[
    "negative",
    "positive",
    "not applicable",
    "n/a",
    "nvt",
    "unknown",
    "not detected",
    "see note",
];

/// What a value turned out to be while randomizing it
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueKind {
    Numeric,
    Sentinel,
    Unrecognized,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RandomizedValue {
    pub text: String,
    pub kind: ValueKind,
}

/// Numeric value split into the parts needed to re-render it
#[derive(Debug, Clone, Copy, PartialEq)]
struct ParsedNumber {
    comparison: Option<char>,
    explicit_plus: bool,
    value: f64,
    decimals: usize,
}

impl ParsedNumber {
    fn parse(text: &str) -> Option<Self> {
        let (comparison, rest) = match text.chars().next() {
            Some(c @ ('<' | '>')) => (Some(c), &text[1..]),
            _ => (None, text),
        };

        let explicit_plus = rest.starts_with('+');
        let unsigned = rest.strip_prefix(['+', '-']).unwrap_or(rest);
        let (int_part, frac_part) = match unsigned.split_once('.') {
            Some((i, f)) => (i, Some(f)),
            None => (unsigned, None),
        };

        let all_digits = |s: &str| s.bytes().all(|b| b.is_ascii_digit());
        let frac_ok = frac_part.is_none_or(|f| !f.is_empty() && all_digits(f));
        if !all_digits(int_part) || !frac_ok || (int_part.is_empty() && frac_part.is_none()) {
            return None;
        }

        let value: f64 = rest.parse().ok()?;
        if !value.is_finite() {
            return None;
        }

        Some(Self {
            comparison,
            explicit_plus,
            value,
            decimals: frac_part.map_or(0, str::len),
        })
    }

    fn render(&self, value: f64) -> String {
        let mut body = if self.decimals == 0 {
            format!("{:.0}", value.round())
        } else {
            format!("{:.*}", self.decimals, value)
        };
        if body.starts_with('-') && body[1..].bytes().all(|b| b == b'0' || b == b'.') {
            body.remove(0);
        }
        if self.explicit_plus && !body.starts_with('-') {
            body.insert(0, '+');
        }
        match self.comparison {
            Some(c) => format!("{c}{body}"),
            None => body,
        }
    }
}

/// True when the value contains one of the known sentinel tokens
pub fn is_sentinel(value: &str) -> bool {
    let lower = value.to_lowercase();
    SENTINEL_TOKENS.iter().any(|token| lower.contains(token))
}

/// Perturb `value` by a uniform factor within `±bound_pct` percent.
///
/// Numbers keep their decimal-place count and any `<`/`>` prefix. Sentinels
/// and anything else that does not parse are returned unchanged.
pub fn randomize_value<R: Rng + ?Sized>(
    value: &str,
    bound_pct: f64,
    rng: &mut R,
) -> RandomizedValue {
    let trimmed = value.trim();

    if is_sentinel(trimmed) {
        return RandomizedValue {
            text: value.to_string(),
            kind: ValueKind::Sentinel,
        };
    }

    let Some(parsed) = ParsedNumber::parse(trimmed) else {
        return RandomizedValue {
            text: value.to_string(),
            kind: ValueKind::Unrecognized,
        };
    };

    let bound = bound_pct.abs() / 100.0;
    let factor = 1.0 + rng.gen_range(-bound..=bound);
    let shifted = parsed.value * factor;
    if !shifted.is_finite() {
        return RandomizedValue {
            text: value.to_string(),
            kind: ValueKind::Unrecognized,
        };
    }

    RandomizedValue {
        text: parsed.render(shifted),
        kind: ValueKind::Numeric,
    }
}
