//! Position arithmetic for dense, zero-based ordered domains.
//!
//! A domain is any container whose items occupy positions `0..n` exactly once:
//! the lanes of a board, or the entries of a lane. Functions here only compute
//! what has to change; applying the result is left to the caller.

use crate::error::{Result, TavlaError};

/// Direction of a single position shift
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delta {
    /// +1, opens a slot
    Up,
    /// -1, closes a gap
    Down,
}

/// Shift every item of `domain` whose position lies in `from..=to` by `delta`.
///
/// `to == None` means the range is unbounded above.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Shift<K> {
    pub domain: K,
    pub from: u32,
    pub to: Option<u32>,
    pub delta: Delta,
}

impl<K: PartialEq> Shift<K> {
    pub fn covers(&self, domain: &K, position: u32) -> bool {
        &self.domain == domain
            && position >= self.from
            && self.to.map_or(true, |to| position <= to)
    }
}

/// Final slot of the item being moved
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Placement<K> {
    pub domain: K,
    pub position: u32,
}

/// Sibling shifts needed to open or close a slot, plus where the mover lands
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShiftPlan<K> {
    pub shifts: Vec<Shift<K>>,
    pub placement: Option<Placement<K>>,
}

impl<K: PartialEq> ShiftPlan<K> {
    fn empty() -> Self {
        Self {
            shifts: Vec::new(),
            placement: None,
        }
    }

    /// True when applying the plan changes no sibling position
    pub fn is_noop(&self) -> bool {
        self.shifts.is_empty()
    }

    /// New position of a sibling currently at `position` in `domain`
    pub fn shifted(&self, domain: &K, position: u32) -> u32 {
        self.shifts
            .iter()
            .filter(|shift| shift.covers(domain, position))
            .fold(position, |pos, shift| match shift.delta {
                Delta::Up => pos + 1,
                Delta::Down => pos.saturating_sub(1),
            })
    }
}

/// Plans moving the item at `current` in `domain` to `target` in `target_domain`.
///
/// `target` must already be clamped by the caller: to `[0, count]` for a move
/// into another domain, and to `[0, count - 1]` within the same domain.
pub fn plan_move<K: Clone + PartialEq>(
    domain: &K,
    current: u32,
    target_domain: &K,
    target: u32,
) -> ShiftPlan<K> {
    let placement = Some(Placement {
        domain: target_domain.clone(),
        position: target,
    });

    if domain != target_domain {
        return ShiftPlan {
            shifts: vec![
                Shift {
                    domain: domain.clone(),
                    from: current + 1,
                    to: None,
                    delta: Delta::Down,
                },
                Shift {
                    domain: target_domain.clone(),
                    from: target,
                    to: None,
                    delta: Delta::Up,
                },
            ],
            placement,
        };
    }

    let shifts = if target > current {
        vec![Shift {
            domain: domain.clone(),
            from: current + 1,
            to: Some(target),
            delta: Delta::Down,
        }]
    } else if target < current {
        vec![Shift {
            domain: domain.clone(),
            from: target,
            to: Some(current - 1),
            delta: Delta::Up,
        }]
    } else {
        Vec::new()
    };

    ShiftPlan { shifts, placement }
}

/// Position for an item appended to a domain currently holding `count` items
pub fn plan_append<K>(_domain: &K, count: usize) -> Result<u32> {
    position_at(count)
}

/// Converts an item count or index into a position.
///
/// Positions are `u32`, so a domain can hold at most `u32::MAX` items.
pub fn position_at(index: usize) -> Result<u32> {
    u32::try_from(index).map_err(|_| {
        TavlaError::Conflict(format!("position {} exceeds the domain capacity", index))
    })
}

/// Plans closing the gap left by removing the item at `removed`
pub fn plan_removal<K: Clone + PartialEq>(domain: &K, removed: u32) -> ShiftPlan<K> {
    let mut plan = ShiftPlan::empty();
    plan.shifts.push(Shift {
        domain: domain.clone(),
        from: removed + 1,
        to: None,
        delta: Delta::Down,
    });
    plan
}

/// An explicit, validated new position for every item of a domain
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReorderPlan<K, I> {
    pub domain: K,
    pub assignments: Vec<(I, u32)>,
}

/// Accepts `assignments` verbatim if its positions are exactly `{0..current_size-1}`
pub fn plan_reorder<K, I>(
    domain: K,
    assignments: Vec<(I, u32)>,
    current_size: usize,
) -> Result<ReorderPlan<K, I>> {
    if assignments.len() != current_size {
        return Err(TavlaError::InvalidPermutation(format!(
            "expected {} positions, got {}",
            current_size,
            assignments.len()
        )));
    }

    if !is_dense(assignments.iter().map(|(_, pos)| *pos)) {
        return Err(TavlaError::InvalidPermutation(format!(
            "positions must be exactly 0..{}",
            current_size
        )));
    }

    Ok(ReorderPlan {
        domain,
        assignments,
    })
}

/// Clamps a requested position to `[0, upper]`
pub fn clamp_target(target: u32, upper: u32) -> u32 {
    target.min(upper)
}

/// Checks the dense zero-based invariant: `n` positions equal to `{0..n-1}`
pub fn is_dense(positions: impl IntoIterator<Item = u32>) -> bool {
    let positions: Vec<u32> = positions.into_iter().collect();
    let mut seen = vec![false; positions.len()];

    for pos in positions {
        match seen.get_mut(pos as usize) {
            Some(slot) if !*slot => *slot = true,
            _ => return false,
        }
    }

    true
}
