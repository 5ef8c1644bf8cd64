//! Composable filter predicates with bound parameters.
//!
//! A [`Predicates`] list collects independent, named clauses. Each clause owns
//! the values it binds and refers to them through numbered placeholders, so
//! user input never reaches the SQL text. The list renders to an `AND`-joined
//! clause whose placeholders continue after any parameters the surrounding
//! statement binds itself (the visibility query binds the user as `?1`).

use rusqlite::types::ToSql;

/// One named clause.
struct Predicate {
    name: &'static str,
    sql: String,
}

/// An ordered list of named predicates and the values they bind.
pub struct Predicates {
    predicates: Vec<Predicate>,
    values: Vec<Box<dyn ToSql>>,
    first_index: usize,
}

impl Predicates {
    /// Start a list whose first placeholder is `?{first_index}`.
    pub fn starting_at(first_index: usize) -> Self {
        Self {
            predicates: Vec::new(),
            values: Vec::new(),
            first_index,
        }
    }

    /// Index the next bound value will get.
    pub fn next_index(&self) -> usize {
        self.first_index + self.values.len()
    }

    /// Bind a value and return its placeholder.
    pub fn bind(&mut self, value: impl ToSql + 'static) -> String {
        let placeholder = format!("?{}", self.next_index());
        self.values.push(Box::new(value));
        placeholder
    }

    /// Add a clause built around freshly bound placeholders.
    ///
    /// `build` receives the placeholder for `value`.
    pub fn push(
        &mut self,
        name: &'static str,
        value: impl ToSql + 'static,
        build: impl FnOnce(&str) -> String,
    ) -> &mut Self {
        let placeholder = self.bind(value);
        self.predicates.push(Predicate {
            name,
            sql: build(&placeholder),
        });
        self
    }

    /// Add a clause that binds nothing.
    pub fn raw(&mut self, name: &'static str, sql: impl Into<String>) -> &mut Self {
        self.predicates.push(Predicate {
            name,
            sql: sql.into(),
        });
        self
    }

    /// `column = value`.
    pub fn eq(
        &mut self,
        name: &'static str,
        column: &str,
        value: impl ToSql + 'static,
    ) -> &mut Self {
        self.push(name, value, |p| format!("{column} = {p}"))
    }

    /// `column IS value`, which also matches `NULL` against `NULL`.
    pub fn is(
        &mut self,
        name: &'static str,
        column: &str,
        value: impl ToSql + 'static,
    ) -> &mut Self {
        self.push(name, value, |p| format!("{column} IS {p}"))
    }

    /// `column IN (values...)`. An empty list matches nothing.
    pub fn in_list(&mut self, name: &'static str, column: &str, values: Vec<String>) -> &mut Self {
        if values.is_empty() {
            return self.raw(name, "0");
        }
        let placeholders: Vec<String> = values.into_iter().map(|v| self.bind(v)).collect();
        self.raw(name, format!("{column} IN ({})", placeholders.join(", ")))
    }

    /// `column & mask > 0`.
    pub fn bits_any(&mut self, name: &'static str, column: &str, mask: i64) -> &mut Self {
        self.push(name, mask, |p| format!("({column} & {p}) > 0"))
    }

    /// Case-insensitive substring match over any of `columns`.
    ///
    /// LIKE wildcards in `text` are escaped and match literally.
    pub fn contains_text(&mut self, name: &'static str, columns: &[&str], text: &str) -> &mut Self {
        let escaped = escape_like(text);
        self.push(name, escaped, |p| {
            let alternatives: Vec<String> = columns
                .iter()
                .map(|c| format!("{c} LIKE '%' || {p} || '%' ESCAPE '\\'"))
                .collect();
            format!("({})", alternatives.join(" OR "))
        })
    }

    /// Whether no predicate was added.
    pub fn is_empty(&self) -> bool {
        self.predicates.is_empty()
    }

    /// Names of the predicates in order, for logging.
    pub fn names(&self) -> Vec<&'static str> {
        self.predicates.iter().map(|p| p.name).collect()
    }

    /// `AND`-joined clauses, each preceded by `AND` so the result can follow
    /// an existing `WHERE`. Empty when no predicate was added.
    pub fn and_clause(&self) -> String {
        self.predicates
            .iter()
            .map(|p| format!(" AND ({})", p.sql))
            .collect()
    }

    /// `WHERE ...` clause, or an empty string.
    pub fn where_clause(&self) -> String {
        if self.predicates.is_empty() {
            return String::new();
        }
        let joined: Vec<String> = self.predicates.iter().map(|p| format!("({})", p.sql)).collect();
        format!("WHERE {}", joined.join(" AND "))
    }

    /// Bound values in placeholder order.
    pub fn values(&self) -> impl Iterator<Item = &dyn ToSql> {
        self.values.iter().map(|v| v.as_ref() as &dyn ToSql)
    }
}

/// A listing window.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Page {
    /// Maximum rows, unbounded when `None`.
    pub limit: Option<i64>,
    /// Rows to skip.
    pub offset: i64,
}

impl Page {
    /// A window of `limit` rows starting at `offset`.
    pub fn new(limit: Option<i64>, offset: i64) -> Self {
        Self { limit, offset }
    }

    /// Bind the window into `predicates` and render the `LIMIT` clause.
    pub fn clause(&self, predicates: &mut Predicates) -> String {
        match self.limit {
            Some(limit) => {
                let limit = predicates.bind(limit);
                let offset = predicates.bind(self.offset);
                format!(" LIMIT {limit} OFFSET {offset}")
            }
            None if self.offset > 0 => {
                let offset = predicates.bind(self.offset);
                format!(" LIMIT -1 OFFSET {offset}")
            }
            None => String::new(),
        }
    }
}

/// Escape `%`, `_` and `\` for a LIKE pattern using `\` as escape character.
pub fn escape_like(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        if matches!(c, '%' | '_' | '\\') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

/// Parameters for a statement: leading values followed by a predicate list.
pub fn params_with<'a>(
    leading: &[&'a dyn ToSql],
    predicates: &'a Predicates,
) -> Vec<&'a dyn ToSql> {
    leading.iter().copied().chain(predicates.values()).collect()
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
