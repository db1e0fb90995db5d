// SPDX-License-Identifier: MIT

//! The `-t` filesystem type filter.
//!
//! A filter is a comma-separated list of terms. A term is either a plain
//! filesystem type (`ext4`), a required mount option (`opts=ro`, with `loop`
//! as shorthand for `opts=loop`), or a forbidden option (`noopts=ro`,
//! `!opts=ro`). Plain types all share one negation: `noext4,noxfs` checks
//! everything but those two, while `ext4,noxfs` is rejected.

use crate::catalog::entry::MountOptions;
use crate::error::{CoreError, CoreResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TermKind {
    Type,
    Opt,
    NegOpt,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Term {
    pub kind: TermKind,
    pub value: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TypeFilter {
    terms: Vec<Term>,
    negate: bool,
    raw: Option<String>,
}

impl TypeFilter {
    pub fn parse(spec: &str) -> CoreResult<Self> {
        let mut filter = TypeFilter {
            raw: Some(spec.to_string()),
            ..Default::default()
        };
        let mut first_type = true;

        for item in spec.split(',').filter(|s| !s.is_empty()) {
            let (negated, name) = if let Some(rest) = item.strip_prefix("no") {
                (true, rest)
            } else if let Some(rest) = item.strip_prefix('!') {
                (true, rest)
            } else {
                (false, item)
            };

            let option = if name == "loop" {
                Some(name)
            } else {
                name.strip_prefix("opts=")
            };

            let term = match option {
                Some(opt) => Term {
                    kind: if negated { TermKind::NegOpt } else { TermKind::Opt },
                    value: opt.to_string(),
                },
                None => {
                    if first_type {
                        filter.negate = negated;
                        first_type = false;
                    } else if negated != filter.negate {
                        return Err(CoreError::AmbiguousTypeFilter);
                    }
                    Term {
                        kind: TermKind::Type,
                        value: name.to_string(),
                    }
                }
            };
            filter.terms.push(term);
        }

        Ok(filter)
    }

    pub fn is_empty(&self) -> bool {
        self.terms.is_empty()
    }

    pub fn terms(&self) -> &[Term] {
        &self.terms
    }

    pub fn is_negated(&self) -> bool {
        self.negate
    }

    /// The single type to force on entries with an unknown type, if the user
    /// named exactly one plain, non-negated type.
    pub fn forced_type(&self) -> Option<&str> {
        let raw = self.raw.as_deref()?;
        if raw.starts_with("no")
            || raw.starts_with("opts=")
            || raw.starts_with("loop")
            || raw.contains(',')
        {
            return None;
        }
        Some(raw)
    }

    pub fn matches(&self, fstype: Option<&str>, options: &MountOptions) -> bool {
        if self.terms.is_empty() {
            return true;
        }

        let mut checked_type = false;
        let mut found = false;

        for term in &self.terms {
            match term.kind {
                TermKind::Type => {
                    checked_type = true;
                    if fstype == Some(term.value.as_str()) {
                        found = true;
                    }
                }
                TermKind::NegOpt => {
                    if options.has(&term.value) {
                        return false;
                    }
                }
                TermKind::Opt => {
                    if !options.has(&term.value) {
                        return false;
                    }
                }
            }
        }

        if !checked_type {
            return true;
        }
        found != self.negate
    }
}
