//! Per-request consistency knobs.
//!
//! These mirror the read/write quorum parameters of a replicated key/value
//! store. The mapping layer never interprets them; it forwards them to the
//! [`DocumentStore`](crate::DocumentStore) unchanged. Unset values mean "use
//! the bucket default".

use serde::{Deserialize, Serialize};

/// Number of replicas that must acknowledge a request.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Quorum {
    One,
    Quorum,
    All,
    Default,
    /// An explicit replica count.
    N(u32),
}

impl Quorum {
    /// Resolve to a replica count for a store with `replicas` copies.
    pub fn resolve(self, replicas: u32) -> u32 {
        match self {
            Self::One => 1,
            Self::Quorum | Self::Default => replicas / 2 + 1,
            Self::All => replicas,
            Self::N(n) => n,
        }
    }
}

/// Options for a read (`r`).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReadOptions {
    pub r: Option<Quorum>,
}

impl ReadOptions {
    pub fn r(r: Quorum) -> Self {
        Self { r: Some(r) }
    }

    /// Fill unset values from `fallback`.
    pub fn or(self, fallback: Self) -> Self {
        Self {
            r: self.r.or(fallback.r),
        }
    }
}

/// Options for a write (`w`, `dw`).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WriteOptions {
    pub w: Option<Quorum>,
    pub dw: Option<Quorum>,
}

impl WriteOptions {
    pub fn new(w: Option<Quorum>, dw: Option<Quorum>) -> Self {
        Self { w, dw }
    }

    /// Fill unset values from `fallback`.
    pub fn or(self, fallback: Self) -> Self {
        Self {
            w: self.w.or(fallback.w),
            dw: self.dw.or(fallback.dw),
        }
    }
}

/// Options for a delete (`rw`).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeleteOptions {
    pub rw: Option<Quorum>,
}

impl DeleteOptions {
    pub fn rw(rw: Quorum) -> Self {
        Self { rw: Some(rw) }
    }

    /// Fill unset values from `fallback`.
    pub fn or(self, fallback: Self) -> Self {
        Self {
            rw: self.rw.or(fallback.rw),
        }
    }
}
