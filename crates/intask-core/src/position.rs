//! Rational order keys and the sibling position engine.
//!
//! Every ordered element (a group in a user's list, a task in a group) carries
//! a key `p/q`. Siblings are displayed by ascending `p/q`. A new key is the
//! mediant `(p1 + p2) / (q1 + q2)` of its two neighbours, which always lies
//! strictly between them, so an insertion never touches other rows.
//!
//! Repeated insertions into the same gap grow the terms. Once a mediant would
//! exceed [`MAX_TERM`] the engine renumbers the whole scope to `1/1, 2/1, ...`
//! in current order and places the element between the renumbered keys.
//!
//! The engine is pure: it returns the keys to write and leaves persistence to
//! the caller's transaction.

use std::cmp::Ordering;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::errors::PositionError;

/// Largest numerator or denominator a stored key may carry.
///
/// With both terms at most 2^16, two distinct keys never round to the same
/// `f64` quotient, so `ORDER BY CAST(p AS REAL) / q` agrees with the exact
/// rational order.
pub const MAX_TERM: i64 = 1 << 16;

/// A rational position `p/q`.
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct OrderKey {
    /// Numerator.
    pub p: i64,
    /// Denominator.
    pub q: i64,
}

impl OrderKey {
    /// Lower sentinel, below every stored key.
    pub const ZERO: Self = Self { p: 0, q: 1 };
    /// Upper sentinel, above every stored key.
    pub const INFINITY: Self = Self { p: 1, q: 0 };

    /// Build a stored key. Both terms must be positive.
    pub fn new(p: i64, q: i64) -> Result<Self, PositionError> {
        if p > 0 && q > 0 {
            Ok(Self { p, q })
        } else {
            Err(PositionError::InvalidKey { p, q })
        }
    }

    /// Integer key `n/1`.
    pub const fn whole(n: i64) -> Self {
        Self { p: n, q: 1 }
    }

    /// The mediant of two keys, `None` on arithmetic overflow.
    pub fn mediant(self, other: Self) -> Option<Self> {
        Some(Self {
            p: self.p.checked_add(other.p)?,
            q: self.q.checked_add(other.q)?,
        })
    }

    /// Whether both terms are within [`MAX_TERM`].
    pub fn fits(self) -> bool {
        self.p <= MAX_TERM && self.q <= MAX_TERM
    }

    /// Approximate value, as used by SQL ordering.
    #[allow(clippy::cast_precision_loss)]
    pub fn as_f64(self) -> f64 {
        self.p as f64 / self.q as f64
    }
}

impl PartialEq for OrderKey {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for OrderKey {}

impl PartialOrd for OrderKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for OrderKey {
    fn cmp(&self, other: &Self) -> Ordering {
        // Cross-multiplied in i128: exact, and handles the 1/0 sentinel.
        (i128::from(self.p) * i128::from(other.q)).cmp(&(i128::from(other.p) * i128::from(self.q)))
    }
}

impl fmt::Display for OrderKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.p, self.q)
    }
}

/// Where to put an element among its siblings.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Placement {
    /// First in the scope.
    Head,
    /// Last in the scope.
    Tail,
    /// Immediately before the sibling with this key.
    Before(String),
    /// Immediately after the sibling with this key.
    After(String),
}

impl Placement {
    /// Placement for a newly created element: head unless `is_start` is false.
    pub fn for_create(is_start: bool) -> Self {
        if is_start { Self::Head } else { Self::Tail }
    }

    /// Placement for a drag-and-drop move.
    ///
    /// With a reference sibling the element lands before or after it; without
    /// one it goes to the head (`is_before`) or the tail of the scope.
    pub fn for_move(position: Option<String>, is_before: bool) -> Self {
        match (position, is_before) {
            (Some(id), true) => Self::Before(id),
            (Some(id), false) => Self::After(id),
            (None, true) => Self::Head,
            (None, false) => Self::Tail,
        }
    }

    /// The reference sibling, if any.
    pub fn reference(&self) -> Option<&str> {
        match self {
            Self::Before(id) | Self::After(id) => Some(id),
            Self::Head | Self::Tail => None,
        }
    }
}

/// A sibling in a scope with its current key.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Sibling {
    /// Element key.
    pub id: String,
    /// Current order key.
    pub key: OrderKey,
}

impl Sibling {
    /// Convenience constructor.
    pub fn new(id: impl Into<String>, key: OrderKey) -> Self {
        Self { id: id.into(), key }
    }
}

/// Outcome of placing an element.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PositionPlan {
    /// Key for the placed element.
    pub key: OrderKey,
    /// New keys for every other sibling when the scope had to be renumbered,
    /// empty otherwise.
    pub renumbered: Vec<Sibling>,
}

impl PositionPlan {
    /// Whether the caller must rewrite the other siblings' keys.
    pub fn is_renumbered(&self) -> bool {
        !self.renumbered.is_empty()
    }
}

/// Compute the key for an element placed into a scope.
///
/// `siblings` are the scope's current members in any order. When `moving` is
/// set, that element is ignored as a sibling (it is being reordered within
/// the scope it already sits in).
pub fn place(
    siblings: &[Sibling],
    moving: Option<&str>,
    placement: &Placement,
) -> Result<PositionPlan, PositionError> {
    if let (Some(reference), Some(moving)) = (placement.reference(), moving) {
        if reference == moving {
            return Err(PositionError::ReferenceNotFound(reference.to_string()));
        }
    }

    let mut ordered: Vec<Sibling> = siblings
        .iter()
        .filter(|s| Some(s.id.as_str()) != moving)
        .cloned()
        .collect();
    ordered.sort_by(|a, b| a.key.cmp(&b.key));

    let (lower, upper) = bounds(&ordered, placement)?;
    if let Some(key) = between(lower, upper) {
        return Ok(PositionPlan {
            key,
            renumbered: Vec::new(),
        });
    }

    let renumbered = renumber(&ordered)?;
    let (lower, upper) = bounds(&renumbered, placement)?;
    let key = between(lower, upper).ok_or(PositionError::ScopeFull {
        len: renumbered.len(),
    })?;
    Ok(PositionPlan { key, renumbered })
}

/// Reassign `1/1, 2/1, ...` to the siblings in their current order.
pub fn renumber(siblings: &[Sibling]) -> Result<Vec<Sibling>, PositionError> {
    let len = siblings.len();
    if i64::try_from(len).map_or(true, |n| n >= MAX_TERM) {
        return Err(PositionError::ScopeFull { len });
    }

    let mut ordered: Vec<&Sibling> = siblings.iter().collect();
    ordered.sort_by(|a, b| a.key.cmp(&b.key));

    Ok(ordered
        .into_iter()
        .zip(1_i64..)
        .map(|(s, n)| Sibling::new(s.id.clone(), OrderKey::whole(n)))
        .collect())
}

/// The keys bounding the gap selected by `placement`.
fn bounds(
    ordered: &[Sibling],
    placement: &Placement,
) -> Result<(OrderKey, OrderKey), PositionError> {
    let index_of = |id: &str| {
        ordered
            .iter()
            .position(|s| s.id == id)
            .ok_or_else(|| PositionError::ReferenceNotFound(id.to_string()))
    };

    match placement {
        Placement::Head => Ok((
            OrderKey::ZERO,
            ordered.first().map_or(OrderKey::INFINITY, |s| s.key),
        )),
        Placement::Tail => Ok((
            ordered.last().map_or(OrderKey::ZERO, |s| s.key),
            OrderKey::INFINITY,
        )),
        Placement::Before(id) => {
            let idx = index_of(id)?;
            let lower = if idx == 0 {
                OrderKey::ZERO
            } else {
                ordered[idx - 1].key
            };
            Ok((lower, ordered[idx].key))
        }
        Placement::After(id) => {
            let idx = index_of(id)?;
            let upper = ordered.get(idx + 1).map_or(OrderKey::INFINITY, |s| s.key);
            Ok((ordered[idx].key, upper))
        }
    }
}

/// A storable key strictly inside `(lower, upper)`, if the mediant qualifies.
fn between(lower: OrderKey, upper: OrderKey) -> Option<OrderKey> {
    let key = lower.mediant(upper)?;
    (key.fits() && lower < key && key < upper).then_some(key)
}
