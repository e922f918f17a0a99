//! `Accept-Encoding` negotiation.
//!
//! The client's preferences are parsed into `(coding, q)` entries and matched against
//! the server's candidate list:
//!
//! - an entry matches a candidate when the coding is equal (case-insensitively) or `*`;
//!   exact matches beat `*`
//! - `q=0` makes a coding unacceptable
//! - `identity` is acceptable unless mentioned (directly or through `*`), with the
//!   lowest non-zero q the client used
//! - ties are broken by the client's order, then by the candidate order
//!
//! A missing or empty header only accepts identity.

use crate::encoding::Encoding;
use crate::error::TransmitError;
use http::HeaderValue;
use std::cmp::Ordering;
use tracing::debug;

#[derive(Debug, Clone, PartialEq)]
struct Accept {
    coding: String,
    q: f32,
    index: usize,
}

#[derive(Debug, Clone, Copy)]
struct Priority {
    q: f32,
    specificity: u8,
    order: usize,
    index: usize,
}

/// Picks the content coding for a response. Holds the immutable candidate table.
#[derive(Debug, Clone)]
pub struct Negotiator {
    candidates: Vec<Encoding>,
}

impl Default for Negotiator {
    fn default() -> Self {
        Self::new(vec![Encoding::Gzip, Encoding::Deflate, Encoding::Identity])
    }
}

impl Negotiator {
    pub fn new(candidates: Vec<Encoding>) -> Self {
        Self { candidates }
    }

    pub fn candidates(&self) -> &[Encoding] {
        &self.candidates
    }

    /// The preferred encoding for the given `Accept-Encoding` header value.
    ///
    /// Never fails: a malformed header negotiates to identity.
    pub fn preferred(&self, accept_encoding: Option<&HeaderValue>) -> Encoding {
        let result = accept_encoding
            .map(|value| value.to_str().map_err(TransmitError::negotiation))
            .transpose()
            .and_then(|accept| self.try_preferred(accept.unwrap_or("")));

        match result {
            Ok(Some(encoding)) => encoding,
            Ok(None) => Encoding::Identity,
            Err(e) => {
                debug!(cause = %e, "fall back to identity encoding");
                Encoding::Identity
            }
        }
    }

    /// Like [`preferred`](Self::preferred) but surfaces parse errors, and `None` when no
    /// candidate is acceptable at all.
    pub fn try_preferred(&self, accept_encoding: &str) -> Result<Option<Encoding>, TransmitError> {
        let accepts = parse(accept_encoding)?;

        let mut best: Option<(Encoding, Priority)> = None;
        for (index, candidate) in self.candidates.iter().enumerate() {
            let Some(priority) = priority_of(*candidate, index, &accepts) else {
                continue;
            };
            if priority.q <= 0.0 {
                continue;
            }
            let better = match &best {
                None => true,
                Some((_, current)) => compare(&priority, current) == Ordering::Less,
            };
            if better {
                best = Some((*candidate, priority));
            }
        }

        Ok(best.map(|(encoding, _)| encoding))
    }
}

fn parse(accept_encoding: &str) -> Result<Vec<Accept>, TransmitError> {
    let mut accepts = Vec::new();
    let mut has_identity = false;
    let mut min_q = 1.0_f32;

    for part in accept_encoding.split(',') {
        let part = part.trim();
        if part.is_empty() {
            continue;
        }

        let mut params = part.split(';');
        let coding = params.next().unwrap_or_default().trim();
        if coding.is_empty() || !coding.bytes().all(is_token) {
            return Err(TransmitError::negotiation(format!("invalid coding {coding:?}")));
        }

        let mut q = 1.0_f32;
        for param in params {
            let Some((key, value)) = param.split_once('=') else {
                return Err(TransmitError::negotiation(format!("invalid parameter {param:?}")));
            };
            if key.trim().eq_ignore_ascii_case("q") {
                q = value
                    .trim()
                    .parse::<f32>()
                    .ok()
                    .filter(|q| (0.0..=1.0).contains(q))
                    .ok_or_else(|| TransmitError::negotiation(format!("invalid quality {value:?}")))?;
            }
        }

        has_identity |= coding == "*" || coding.eq_ignore_ascii_case("identity");
        if q > 0.0 {
            min_q = min_q.min(q);
        }
        accepts.push(Accept { coding: coding.to_ascii_lowercase(), q, index: accepts.len() });
    }

    if !has_identity {
        let index = accepts.len();
        accepts.push(Accept { coding: "identity".to_string(), q: min_q, index });
    }

    Ok(accepts)
}

fn priority_of(candidate: Encoding, index: usize, accepts: &[Accept]) -> Option<Priority> {
    let mut priority: Option<Priority> = None;

    for accept in accepts {
        let specificity = if Encoding::from_token(&accept.coding) == Some(candidate) {
            1
        } else if accept.coding == "*" {
            0
        } else {
            continue;
        };

        let found = Priority { q: accept.q, specificity, order: accept.index, index };
        let replace = match &priority {
            None => true,
            Some(current) => (current.specificity, current.q) < (found.specificity, found.q),
        };
        if replace {
            priority = Some(found);
        }
    }

    priority
}

fn compare(a: &Priority, b: &Priority) -> Ordering {
    b.q.total_cmp(&a.q)
        .then(b.specificity.cmp(&a.specificity))
        .then(a.order.cmp(&b.order))
        .then(a.index.cmp(&b.index))
}

fn is_token(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b"!#$%&'*+-.^_`|~".contains(&b)
}
