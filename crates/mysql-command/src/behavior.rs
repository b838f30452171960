//! Command kind and result-shape behavior flags.

/// The kind of a command: raw statement text or a stored-procedure call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CommandKind {
    /// The command text is a SQL statement.
    #[default]
    Text,
    /// The command text names a stored procedure to invoke.
    StoredProcedure,
}

/// Flags describing the requested result shape of an execution.
///
/// Behaviors combine with `|`. The session uses them as dispatch hints
/// (e.g. `SINGLE_ROW` lets it stop requesting rows after the first).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CommandBehavior(u8);

impl CommandBehavior {
    /// No special behavior; all result sets and rows are produced.
    pub const DEFAULT: Self = Self(0);
    /// The caller will read at most one row of the first result set.
    pub const SINGLE_ROW: Self = Self(1);
    /// Only column metadata is requested; no rows are produced.
    pub const SCHEMA_ONLY: Self = Self(1 << 1);
    /// Columns will be read strictly left-to-right, enabling streaming of
    /// large values without buffering whole rows.
    pub const SEQUENTIAL_ACCESS: Self = Self(1 << 2);

    /// Check whether all of `other`'s flags are set on `self`.
    #[must_use]
    pub fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    /// Raw flag bits.
    #[must_use]
    pub fn bits(self) -> u8 {
        self.0
    }
}

impl Default for CommandBehavior {
    fn default() -> Self {
        Self::DEFAULT
    }
}

impl std::ops::BitOr for CommandBehavior {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl std::ops::BitOrAssign for CommandBehavior {
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}
