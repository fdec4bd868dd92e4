//! Opaque identities for windows and periods.
//!
//! A composed timeline names each period by nesting the uid of the child that
//! owns it around the uid the child itself reports. Because child uids are
//! stable [`SourceId`]s or positions, a period uid held by a consumer keeps
//! resolving after the composed timeline is rebuilt.

use std::fmt;
use std::sync::Arc;

use td_core::SourceId;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Uid {
    /// A child identified by the source that produced it.
    Source(SourceId),
    /// A positional identity, such as a loop iteration.
    Index(u64),
    /// Stand-in for the first window and period of a source that has not
    /// reported its real timeline yet.
    Placeholder,
    /// `(child uid, uid inside the child)`.
    Nested(Arc<(Uid, Uid)>),
}

impl Uid {
    pub fn nested(outer: Uid, inner: Uid) -> Self {
        Self::Nested(Arc::new((outer, inner)))
    }

    /// Split a nested uid into its outer and inner parts.
    pub fn split(&self) -> Option<(&Uid, &Uid)> {
        match self {
            Self::Nested(pair) => Some((&pair.0, &pair.1)),
            _ => None,
        }
    }
}

impl fmt::Display for Uid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Source(id) => write!(f, "{id}"),
            Self::Index(index) => write!(f, "#{index}"),
            Self::Placeholder => write!(f, "placeholder"),
            Self::Nested(pair) => write!(f, "{}/{}", pair.0, pair.1),
        }
    }
}
