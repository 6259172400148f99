//! JOIN steps and the alias namer.

use std::collections::HashMap;

/// Types of SQL joins.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum JoinKind {
    Inner,
    Left,
    Right,
    Full,
}

impl JoinKind {
    /// Get the SQL keyword for this join kind.
    pub const fn as_str(self) -> &'static str {
        match self {
            JoinKind::Inner => "INNER JOIN",
            JoinKind::Left => "LEFT JOIN",
            JoinKind::Right => "RIGHT JOIN",
            JoinKind::Full => "FULL JOIN",
        }
    }
}

/// Where a column lives inside one expression: the queried table itself, or the join
/// at the given index of the expression's join list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Place {
    Root,
    Join(usize),
}

impl Place {
    /// Shift a join index when two join lists are concatenated.
    pub(crate) const fn rebase(self, offset: usize) -> Place {
        match self {
            Place::Root => Place::Root,
            Place::Join(i) => Place::Join(i + offset),
        }
    }
}

/// One join required by an expression, before aliases are assigned.
///
/// Renders as `<kind> <table> AS <alias> ON <alias>.<join_column> = <base>.<base_column>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JoinStep {
    pub table: &'static str,
    pub kind: JoinKind,
    pub base: Place,
    pub base_column: &'static str,
    pub join_column: &'static str,
}

impl JoinStep {
    pub(crate) fn rebase(&self, offset: usize) -> JoinStep {
        JoinStep {
            base: self.base.rebase(offset),
            ..self.clone()
        }
    }
}

type JoinKey = (&'static str, JoinKind, String, &'static str, &'static str);

/// Assigns one alias per distinct join.
///
/// The same (table, kind, base, base column, join column) tuple always yields the same
/// alias; new tuples get `J1`, `J2`, ... in request order.
#[derive(Debug, Default)]
pub struct JoinNamer {
    aliases: HashMap<JoinKey, String>,
    counter: usize,
}

impl JoinNamer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Alias for a join of `table` onto `base`. Returns the alias and whether it was
    /// assigned by this call.
    pub fn alias(
        &mut self,
        table: &'static str,
        kind: JoinKind,
        base: &str,
        base_column: &'static str,
        join_column: &'static str,
    ) -> (String, bool) {
        let key = (table, kind, base.to_string(), base_column, join_column);
        if let Some(alias) = self.aliases.get(&key) {
            return (alias.clone(), false);
        }
        self.counter += 1;
        let alias = format!("J{}", self.counter);
        self.aliases.insert(key, alias.clone());
        (alias, true)
    }

    /// Number of aliases handed out.
    pub fn len(&self) -> usize {
        self.counter
    }

    pub fn is_empty(&self) -> bool {
        self.counter == 0
    }
}
