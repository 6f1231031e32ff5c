use core::fmt;
use core::str::FromStr;

use crate::lock::RawLock;
use crate::{ArrayLock, ClhLock, DefaultLock, HclhLock, HtLock, McsLock, RwTtasLock, TasLock};
use crate::{Error, TicketLock, TtasLock};

/// A generic routine run once per lock algorithm, see [`LockKind::visit`].
pub trait LockVisitor {
    /// Value returned by the routine.
    type Output;

    /// Runs the routine with `L` as the lock algorithm.
    fn visit<L: RawLock + 'static>(self) -> Self::Output;
}

/// The lock algorithms of this crate, for selection at run time.
///
/// A `LockKind` is resolved once, usually from a command line argument, and
/// then [`visit`]ed: the visitor is monomorphized for the selected algorithm,
/// so the lock operations it runs are not dispatched per call.
///
/// # Examples
///
/// ```
/// use slock::{LockKind, LockVisitor, RawLock};
///
/// struct Name;
///
/// impl LockVisitor for Name {
///     type Output = &'static str;
///
///     fn visit<L: RawLock + 'static>(self) -> &'static str {
///         L::NAME
///     }
/// }
///
/// let kind: LockKind = "mcs".parse()?;
/// assert_eq!(kind, LockKind::Mcs);
/// assert_eq!(kind.visit(Name), "mcs");
/// # Ok::<(), slock::Error>(())
/// ```
///
/// [`visit`]: LockKind::visit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LockKind {
    /// [`TasLock`].
    Tas,
    /// [`TtasLock`].
    Ttas,
    /// [`ArrayLock`].
    Array,
    /// [`ClhLock`].
    Clh,
    /// [`McsLock`].
    Mcs,
    /// [`TicketLock`].
    Ticket,
    /// [`HclhLock`].
    Hclh,
    /// [`HtLock`].
    HtLock,
    /// [`RwTtasLock`].
    RwTtas,
}

impl LockKind {
    /// Every algorithm.
    pub const ALL: [Self; 9] = [
        Self::Tas,
        Self::Ttas,
        Self::Array,
        Self::Clh,
        Self::Mcs,
        Self::Ticket,
        Self::Hclh,
        Self::HtLock,
        Self::RwTtas,
    ];

    /// Short lowercase name, the same as [`RawLock::NAME`].
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Tas => <TasLock as RawLock>::NAME,
            Self::Ttas => <TtasLock as RawLock>::NAME,
            Self::Array => <ArrayLock as RawLock>::NAME,
            Self::Clh => <ClhLock as RawLock>::NAME,
            Self::Mcs => <McsLock as RawLock>::NAME,
            Self::Ticket => <TicketLock as RawLock>::NAME,
            Self::Hclh => <HclhLock as RawLock>::NAME,
            Self::HtLock => <HtLock as RawLock>::NAME,
            Self::RwTtas => <RwTtasLock as RawLock>::NAME,
        }
    }

    /// Returns `true` if the algorithm has a single-attempt acquisition.
    #[must_use]
    pub const fn supports_try_lock(self) -> bool {
        !matches!(self, Self::Clh | Self::Hclh)
    }

    /// Runs `visitor` with the lock type of this algorithm.
    pub fn visit<V: LockVisitor>(self, visitor: V) -> V::Output {
        match self {
            Self::Tas => visitor.visit::<TasLock>(),
            Self::Ttas => visitor.visit::<TtasLock>(),
            Self::Array => visitor.visit::<ArrayLock>(),
            Self::Clh => visitor.visit::<ClhLock>(),
            Self::Mcs => visitor.visit::<McsLock>(),
            Self::Ticket => visitor.visit::<TicketLock>(),
            Self::Hclh => visitor.visit::<HclhLock>(),
            Self::HtLock => visitor.visit::<HtLock>(),
            Self::RwTtas => visitor.visit::<RwTtasLock>(),
        }
    }
}

impl Default for LockKind {
    /// The algorithm behind [`DefaultLock`].
    fn default() -> Self {
        let name = <DefaultLock as RawLock>::NAME;
        Self::ALL.into_iter().find(|kind| kind.name() == name).unwrap_or(Self::Ticket)
    }
}

impl fmt::Display for LockKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for LockKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Error> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.name().eq_ignore_ascii_case(s))
            .ok_or(Error::InvalidConfig("unknown lock algorithm"))
    }
}

#[cfg(all(not(loom), test))]
mod test {
    use super::{LockKind, LockVisitor};
    use crate::lock::RawLock;
    use crate::Error;

    struct Name;

    impl LockVisitor for Name {
        type Output = &'static str;

        fn visit<L: RawLock + 'static>(self) -> &'static str {
            L::NAME
        }
    }

    #[test]
    fn names_parse_back() {
        for kind in LockKind::ALL {
            assert_eq!(kind.to_string().parse(), Ok(kind));
            assert_eq!(kind.visit(Name), kind.name());
        }
        assert_eq!("HTLOCK".parse(), Ok(LockKind::HtLock));
        assert_eq!("rw_ttas".parse(), Ok(LockKind::RwTtas));
    }

    #[test]
    fn unknown_name() {
        let err = "futex".parse::<LockKind>();
        assert_eq!(err, Err(Error::InvalidConfig("unknown lock algorithm")));
    }

    #[test]
    fn default_matches_default_lock() {
        assert_eq!(LockKind::default().visit(Name), <crate::DefaultLock as RawLock>::NAME);
        assert!(!LockKind::Clh.supports_try_lock());
        assert!(LockKind::Ticket.supports_try_lock());
    }
}
