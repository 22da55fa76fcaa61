//! Variable name normalization for formula evaluation.
//!
//! Imported column names frequently carry units in brackets, spaces or
//! non-ASCII text (`ダイナモトルク[P]`, `Oil Temp`, `温度[°C]`). None of these
//! can appear verbatim in an expression handed to the evaluator, so every
//! unsafe name is swapped for a synthetic identifier (`var_<k>`) before
//! evaluation and swapped back when an error has to be shown to the user.
//!
//! `k` is the position of the name in the sorted list of all known names, so
//! a given variable always maps to the same identifier for a given variable
//! set regardless of which expression is being normalized.

use regex::Regex;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::LazyLock;
use thiserror::Error;

use crate::expression::RESERVED_NAMES;

/// Prefix of generated identifiers
pub const SYNTHETIC_PREFIX: &str = "var_";

/// Identifiers starting with this prefix are reserved for internal bindings
pub const INTERNAL_PREFIX: &str = "__";

static IDENTIFIER_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").expect("Invalid regex pattern"));

static SYNTHETIC_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^var_[0-9]+$").expect("Invalid regex pattern"));

/// Errors raised while building a name mapping
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum NormalizeError {
    /// A real variable is named exactly like the identifier generated for another one
    #[error("Variable '{name}' conflicts with the generated identifier for '{shadowed}'")]
    SyntheticCollision { name: String, shadowed: String },
}

/// Check if a display name can be handed to the evaluator unchanged
pub fn is_safe_identifier(name: &str) -> bool {
    IDENTIFIER_REGEX.is_match(name)
        && !name.starts_with(INTERNAL_PREFIX)
        && !RESERVED_NAMES.contains(&name.to_lowercase().as_str())
}

/// Check if an identifier has the shape of a generated one
pub fn is_synthetic_identifier(name: &str) -> bool {
    SYNTHETIC_REGEX.is_match(name)
}

/// Check if a name is reserved for generated or internal identifiers.
///
/// Variables stored under such names would shadow the evaluator's own bindings.
pub fn is_reserved_name(name: &str) -> bool {
    is_synthetic_identifier(name) || name.starts_with(INTERNAL_PREFIX)
}

/// Name before a bracketed unit suffix: `"Torque[Nm]"` -> `"Torque"`
pub fn base_name(display: &str) -> Option<&str> {
    let (base, _) = display.split_once('[')?;
    let base = base.trim_end();
    if base.is_empty() {
        None
    } else {
        Some(base)
    }
}

#[inline]
fn is_word_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_'
}

/// Bidirectional display name <-> synthetic identifier mapping for one expression
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct NameMapping {
    to_synthetic: BTreeMap<String, String>,
    to_display: BTreeMap<String, String>,
}

impl NameMapping {
    fn insert(&mut self, display: &str, synthetic: &str) {
        self.to_synthetic
            .insert(display.to_string(), synthetic.to_string());
        self.to_display
            .insert(synthetic.to_string(), display.to_string());
    }

    /// Synthetic identifier assigned to a display name
    pub fn synthetic(&self, display: &str) -> Option<&str> {
        self.to_synthetic.get(display).map(String::as_str)
    }

    /// Display name behind a synthetic identifier
    pub fn display(&self, synthetic: &str) -> Option<&str> {
        self.to_display.get(synthetic).map(String::as_str)
    }

    /// (display, synthetic) pairs sorted by display name
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.to_synthetic
            .iter()
            .map(|(d, s)| (d.as_str(), s.as_str()))
    }

    pub fn len(&self) -> usize {
        self.to_synthetic.len()
    }

    pub fn is_empty(&self) -> bool {
        self.to_synthetic.is_empty()
    }
}

/// One literal replacement rule used by the scanner
struct Substitution {
    from: String,
    to: String,
    /// Reserved words are left alone when used as a function call
    skip_call: bool,
}

/// Single left-to-right pass replacing whole-token matches, longest rule first.
///
/// A match is skipped when the match or its replacement would touch an
/// identifier character of the surrounding text.
///
/// Returns the rewritten text and the indices of the rules that fired.
/// `rules` must already be sorted longest first.
fn substitute(text: &str, rules: &[Substitution]) -> (String, HashSet<usize>) {
    let mut out = String::with_capacity(text.len());
    let mut fired = HashSet::new();
    let mut pos = 0;

    while pos < text.len() {
        let rest = &text[pos..];
        let prev = text[..pos].chars().next_back();

        let hit = rules.iter().enumerate().find(|(_, rule)| {
            if !rest.starts_with(rule.from.as_str()) {
                return false;
            }
            let after = &rest[rule.from.len()..];
            // Either side of the match or of its replacement may form a token
            // with its neighbour
            let first_is_word = rule.from.chars().next().is_some_and(is_word_char)
                || rule.to.chars().next().is_some_and(is_word_char);
            let last_is_word = rule.from.chars().next_back().is_some_and(is_word_char)
                || rule.to.chars().next_back().is_some_and(is_word_char);

            if first_is_word && prev.is_some_and(is_word_char) {
                return false;
            }
            if last_is_word && after.chars().next().is_some_and(is_word_char) {
                return false;
            }
            if rule.skip_call && after.trim_start().starts_with('(') {
                return false;
            }
            true
        });

        match hit {
            Some((idx, rule)) => {
                out.push_str(&rule.to);
                fired.insert(idx);
                pos += rule.from.len();
            }
            None => {
                let Some(ch) = rest.chars().next() else { break };
                out.push(ch);
                pos += ch.len_utf8();
            }
        }
    }

    (out, fired)
}

fn sort_longest_first(rules: &mut [Substitution]) {
    rules.sort_by(|a, b| {
        b.from
            .len()
            .cmp(&a.from.len())
            .then_with(|| a.from.cmp(&b.from))
    });
}

/// Identifier assignment for one variable set
#[derive(Clone, Debug)]
pub struct NameNormalizer {
    /// display name -> identifier the evaluator sees (itself when already safe)
    identifiers: BTreeMap<String, String>,
}

impl NameNormalizer {
    /// Assign identifiers for every known name.
    ///
    /// Fails if a safe name is literally equal to an identifier generated for
    /// a different, unsafe name.
    pub fn new<'a, I>(known_names: I) -> Result<Self, NormalizeError>
    where
        I: IntoIterator<Item = &'a str>,
    {
        let mut sorted: Vec<&str> = known_names.into_iter().collect();
        sorted.sort_unstable();
        sorted.dedup();

        let mut identifiers = BTreeMap::new();
        for (k, name) in sorted.iter().enumerate() {
            let identifier = if is_safe_identifier(name) {
                name.to_string()
            } else {
                format!("{}{}", SYNTHETIC_PREFIX, k)
            };
            identifiers.insert(name.to_string(), identifier);
        }

        let generated: HashMap<&str, &str> = identifiers
            .iter()
            .filter(|(display, ident)| display != ident)
            .map(|(display, ident)| (ident.as_str(), display.as_str()))
            .collect();

        for (display, ident) in &identifiers {
            if display == ident {
                if let Some(shadowed) = generated.get(ident.as_str()) {
                    return Err(NormalizeError::SyntheticCollision {
                        name: display.clone(),
                        shadowed: shadowed.to_string(),
                    });
                }
            }
        }

        Ok(Self { identifiers })
    }

    /// Add a name that appeared after construction, such as a formula result.
    ///
    /// Existing assignments never change. An unsafe name gets the first
    /// `var_<k>` past the original name count that is not already in use.
    /// Registering a known name does nothing.
    pub fn register(&mut self, name: &str) -> Result<(), NormalizeError> {
        if self.identifiers.contains_key(name) {
            return Ok(());
        }

        let identifier = if is_safe_identifier(name) {
            if let Some((shadowed, _)) = self
                .identifiers
                .iter()
                .find(|(display, ident)| display != ident && ident.as_str() == name)
            {
                return Err(NormalizeError::SyntheticCollision {
                    name: name.to_string(),
                    shadowed: shadowed.clone(),
                });
            }
            name.to_string()
        } else {
            let used: HashSet<&str> = self.identifiers.values().map(String::as_str).collect();
            let mut k = self.identifiers.len();
            while used.contains(format!("{}{}", SYNTHETIC_PREFIX, k).as_str()) {
                k += 1;
            }
            format!("{}{}", SYNTHETIC_PREFIX, k)
        };

        tracing::debug!("Registered '{}' as {}", name, identifier);
        self.identifiers.insert(name.to_string(), identifier);
        Ok(())
    }

    /// Identifier bound for a display name
    pub fn identifier(&self, display: &str) -> Option<&str> {
        self.identifiers.get(display).map(String::as_str)
    }

    /// (display, identifier) for every known name, sorted by display name
    pub fn bindings(&self) -> impl Iterator<Item = (&str, &str)> {
        self.identifiers
            .iter()
            .map(|(d, i)| (d.as_str(), i.as_str()))
    }

    /// Short aliases for bracketed names: `Torque` for `Torque[Nm]`.
    ///
    /// An alias is only offered when it is a safe identifier, is not itself a
    /// known name, and no other bracketed name shares the same base.
    pub fn aliases(&self) -> Vec<(String, String)> {
        let mut by_base: BTreeMap<&str, Vec<&str>> = BTreeMap::new();
        for display in self.identifiers.keys() {
            if let Some(base) = base_name(display) {
                by_base.entry(base).or_default().push(display);
            }
        }

        by_base
            .into_iter()
            .filter_map(|(base, displays)| {
                if displays.len() != 1 {
                    tracing::debug!("Skipping ambiguous alias '{}' for {:?}", base, displays);
                    return None;
                }
                if !is_safe_identifier(base)
                    || is_synthetic_identifier(base)
                    || self.identifiers.contains_key(base)
                {
                    return None;
                }
                Some((base.to_string(), displays[0].to_string()))
            })
            .collect()
    }

    /// Replace every unsafe known name in `expression` by its identifier
    pub fn normalize(&self, expression: &str) -> (String, NameMapping) {
        let mut rules: Vec<Substitution> = self
            .identifiers
            .iter()
            .filter(|(display, ident)| display != ident)
            .map(|(display, ident)| Substitution {
                from: display.clone(),
                to: ident.clone(),
                skip_call: IDENTIFIER_REGEX.is_match(display),
            })
            .collect();
        sort_longest_first(&mut rules);

        let (safe, fired) = substitute(expression, &rules);

        let mut mapping = NameMapping::default();
        for idx in fired {
            mapping.insert(&rules[idx].from, &rules[idx].to);
        }

        if !mapping.is_empty() {
            tracing::debug!("Normalized expression: {} -> {}", expression, safe);
        }
        (safe, mapping)
    }
}

/// Normalize an expression against a set of known names
pub fn normalize<'a, I>(expression: &str, known_names: I) -> Result<(String, NameMapping), NormalizeError>
where
    I: IntoIterator<Item = &'a str>,
{
    Ok(NameNormalizer::new(known_names)?.normalize(expression))
}

/// Restore display names in a normalized expression (or an error message about one)
pub fn denormalize(safe_expression: &str, mapping: &NameMapping) -> String {
    let mut rules: Vec<Substitution> = mapping
        .to_display
        .iter()
        .map(|(synthetic, display)| Substitution {
            from: synthetic.clone(),
            to: display.clone(),
            skip_call: false,
        })
        .collect();
    sort_longest_first(&mut rules);

    substitute(safe_expression, &rules).0
}
