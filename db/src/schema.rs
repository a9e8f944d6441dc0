//! In-process table definitions and the SQL derived from them.

/// A type that maps to one table.
pub trait Model {
    fn schema() -> Schema;
}

/// Storage class of a column, using the affinities SQLite understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnType {
    Integer,
    Real,
    Text,
    Blob,
    Boolean,
    Timestamp,
}

impl ColumnType {
    pub fn sql(self) -> &'static str {
        match self {
            ColumnType::Integer => "INTEGER",
            ColumnType::Real => "REAL",
            ColumnType::Text => "TEXT",
            ColumnType::Blob => "BLOB",
            ColumnType::Boolean => "NUMERIC",
            ColumnType::Timestamp => "DATETIME",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Column {
    pub name: String,
    pub ty: ColumnType,
    pub primary_key: bool,
    pub not_null: bool,
    pub unique: bool,
    pub indexed: bool,
    /// Raw SQL default expression, e.g. `0` or `'pending'`.
    pub default: Option<String>,
}

impl Column {
    pub fn new(name: impl Into<String>, ty: ColumnType) -> Self {
        Self {
            name: name.into(),
            ty,
            primary_key: false,
            not_null: false,
            unique: false,
            indexed: false,
            default: None,
        }
    }

    pub fn primary_key(mut self) -> Self {
        self.primary_key = true;
        self
    }

    pub fn not_null(mut self) -> Self {
        self.not_null = true;
        self
    }

    pub fn unique(mut self) -> Self {
        self.unique = true;
        self
    }

    pub fn indexed(mut self) -> Self {
        self.indexed = true;
        self
    }

    pub fn default(mut self, expr: impl Into<String>) -> Self {
        self.default = Some(expr.into());
        self
    }

    /// Definition used inside `CREATE TABLE`.
    pub fn definition(&self) -> String {
        let mut def = format!("{} {}", quote_ident(&self.name), self.ty.sql());
        if self.primary_key {
            def.push_str(" PRIMARY KEY");
        }
        if self.not_null {
            def.push_str(" NOT NULL");
        }
        if self.unique {
            def.push_str(" UNIQUE");
        }
        if let Some(default) = &self.default {
            def.push_str(" DEFAULT ");
            def.push_str(default);
        }
        def
    }

    /// Definition used by `ALTER TABLE ... ADD COLUMN`.
    ///
    /// SQLite cannot add a primary key or unique column to an existing table,
    /// nor a NOT NULL column without a default; those constraints are dropped
    /// here (uniqueness comes back as an index).
    pub fn added_definition(&self) -> String {
        let mut def = format!("{} {}", quote_ident(&self.name), self.ty.sql());
        if let Some(default) = &self.default {
            if self.not_null {
                def.push_str(" NOT NULL");
            }
            def.push_str(" DEFAULT ");
            def.push_str(default);
        }
        def
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Schema {
    pub table: String,
    pub columns: Vec<Column>,
}

impl Schema {
    pub fn new(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            columns: Vec::new(),
        }
    }

    pub fn of<M: Model>() -> Self {
        M::schema()
    }

    pub fn column(mut self, column: Column) -> Self {
        self.columns.push(column);
        self
    }

    pub fn find(&self, name: &str) -> Option<&Column> {
        self.columns
            .iter()
            .find(|column| column.name.eq_ignore_ascii_case(name))
    }

    /// Fold `other` into `self`: columns not yet declared are appended; a
    /// column already present keeps its first definition.
    pub fn merge(&mut self, other: Schema) {
        for column in other.columns {
            if self.find(&column.name).is_none() {
                self.columns.push(column);
            }
        }
    }

    pub fn create_sql(&self) -> String {
        let columns: Vec<String> = self.columns.iter().map(Column::definition).collect();
        format!(
            "CREATE TABLE IF NOT EXISTS {} ({})",
            quote_ident(&self.table),
            columns.join(", ")
        )
    }

    pub fn add_column_sql(&self, column: &Column) -> String {
        format!(
            "ALTER TABLE {} ADD COLUMN {}",
            quote_ident(&self.table),
            column.added_definition()
        )
    }

    /// Index for `column`, if it asks for one.
    ///
    /// `added` marks a column appended to an existing table, whose inline
    /// UNIQUE constraint had to be dropped.
    pub fn index_sql(&self, column: &Column, added: bool) -> Option<String> {
        let (kind, prefix) = if column.unique && added {
            ("UNIQUE INDEX", "uidx")
        } else if column.indexed && !column.unique {
            ("INDEX", "idx")
        } else {
            return None;
        };
        Some(format!(
            "CREATE {kind} IF NOT EXISTS {} ON {} ({})",
            quote_ident(&format!("{prefix}_{}_{}", self.table, column.name)),
            quote_ident(&self.table),
            quote_ident(&column.name)
        ))
    }
}

/// Flatten groups of schemas into one list, merging definitions of the same
/// table in first-seen order.
pub fn flatten<G>(groups: G) -> Vec<Schema>
where
    G: IntoIterator,
    G::Item: IntoIterator<Item = Schema>,
{
    let mut merged: Vec<Schema> = Vec::new();
    for schema in groups.into_iter().flatten() {
        match merged
            .iter_mut()
            .find(|known| known.table.eq_ignore_ascii_case(&schema.table))
        {
            Some(known) => known.merge(schema),
            None => merged.push(schema),
        }
    }
    merged
}

pub(crate) fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn users() -> Schema {
        Schema::new("users")
            .column(Column::new("id", ColumnType::Integer).primary_key())
            .column(Column::new("email", ColumnType::Text).not_null().unique())
            .column(Column::new("active", ColumnType::Boolean).default("1"))
    }

    #[test]
    fn create_sql_lists_constraints() {
        assert_eq!(
            users().create_sql(),
            r#"CREATE TABLE IF NOT EXISTS "users" ("id" INTEGER PRIMARY KEY, "email" TEXT NOT NULL UNIQUE, "active" NUMERIC DEFAULT 1)"#
        );
    }

    #[test]
    fn added_columns_drop_unsupported_constraints() {
        let email = Column::new("email", ColumnType::Text).not_null().unique();
        assert_eq!(email.added_definition(), r#""email" TEXT"#);

        let age = Column::new("age", ColumnType::Integer).not_null().default("0");
        assert_eq!(age.added_definition(), r#""age" INTEGER NOT NULL DEFAULT 0"#);
    }

    #[test]
    fn unique_index_only_for_added_columns() {
        let schema = users();
        let email = schema.find("email").unwrap();
        assert_eq!(schema.index_sql(email, false), None);
        assert_eq!(
            schema.index_sql(email, true).unwrap(),
            r#"CREATE UNIQUE INDEX IF NOT EXISTS "uidx_users_email" ON "users" ("email")"#
        );
    }

    #[test]
    fn indexed_columns_get_plain_index() {
        let schema = Schema::new("posts").column(Column::new("author_id", ColumnType::Integer).indexed());
        let column = &schema.columns[0];
        let sql = schema.index_sql(column, false).unwrap();
        assert_eq!(
            sql,
            r#"CREATE INDEX IF NOT EXISTS "idx_posts_author_id" ON "posts" ("author_id")"#
        );
        assert_eq!(schema.index_sql(column, true).unwrap(), sql);
    }

    #[test]
    fn flatten_merges_same_table_across_groups() {
        let extra = Schema::new("USERS")
            .column(Column::new("email", ColumnType::Blob))
            .column(Column::new("nickname", ColumnType::Text));
        let posts = Schema::new("posts").column(Column::new("id", ColumnType::Integer));

        let flat = flatten(vec![vec![users()], vec![posts.clone(), extra]]);

        assert_eq!(flat.len(), 2);
        assert_eq!(flat[0].table, "users");
        let names: Vec<&str> = flat[0].columns.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["id", "email", "active", "nickname"]);
        assert_eq!(flat[0].find("email").unwrap().ty, ColumnType::Text);
        assert_eq!(flat[1], posts);
    }

    #[test]
    fn identifiers_are_quoted() {
        assert_eq!(quote_ident(r#"we"ird"#), r#""we""ird""#);
    }
}
