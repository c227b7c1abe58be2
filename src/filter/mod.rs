//! A small, typed filter expression language evaluated against list
//! results.
//!
//! Expressions address the element under test as `this`:
//!
//! ```text
//! this.kind == STORY && !this.hidden
//! has(this.read_time) || this.display_name.startsWith("The")
//! this.update_time >= timestamp("2023-01-01T00:00:00Z")
//! ```
//!
//! A [`FilterEnv`] is built once per element type and compiles source text
//! into a [`Program`]. Compilation type-checks the expression against the
//! element's declared fields, so a filter that names an unknown field or
//! compares mismatched types is rejected before any element is evaluated.

use std::collections::{HashMap, HashSet};
use std::marker::PhantomData;

use chrono::{DateTime, Utc};

mod compile;
mod lexer;
mod parser;
mod schema;

use compile::Expr;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid filter at offset {offset}: {message}")]
pub struct FilterError {
    message: String,
    offset: usize,
}

impl FilterError {
    pub(crate) fn new(message: impl Into<String>, offset: usize) -> Self {
        Self {
            message: message.into(),
            offset,
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn offset(&self) -> usize {
        self.offset
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldType {
    Bool,
    Int,
    String,
    Timestamp,
    Enum(&'static [&'static str]),
}

#[derive(Debug)]
pub struct Field {
    pub name: &'static str,
    pub ty: FieldType,
    /// Optional fields may evaluate to null and can be tested with `has()`.
    pub optional: bool,
}

impl Field {
    pub const fn required(name: &'static str, ty: FieldType) -> Self {
        Self {
            name,
            ty,
            optional: false,
        }
    }

    pub const fn optional(name: &'static str, ty: FieldType) -> Self {
        Self {
            name,
            ty,
            optional: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Value<'a> {
    Null,
    Bool(bool),
    Int(i64),
    Str(&'a str),
    Timestamp(DateTime<Utc>),
    Enum(&'a str),
}

impl From<Option<DateTime<Utc>>> for Value<'_> {
    fn from(time: Option<DateTime<Utc>>) -> Self {
        time.map_or(Value::Null, Value::Timestamp)
    }
}

/// Field access used during evaluation.
pub trait Fields {
    fn field(&self, name: &str) -> Value<'_>;
}

/// A message type filters can be compiled against.
pub trait Filterable: Fields {
    const FIELDS: &'static [Field];
}

pub(crate) struct Scope {
    fields: HashMap<&'static str, &'static Field>,
    constants: HashSet<&'static str>,
}

impl Scope {
    fn new(fields: &'static [Field]) -> Self {
        let constants = fields
            .iter()
            .filter_map(|field| match field.ty {
                FieldType::Enum(variants) => Some(variants.iter().copied()),
                _ => None,
            })
            .flatten()
            .collect();
        Self {
            fields: fields.iter().map(|field| (field.name, field)).collect(),
            constants,
        }
    }
}

/// Compilation environment for filters over `T`.
pub struct FilterEnv<T> {
    scope: Scope,
    _marker: PhantomData<fn(&T)>,
}

impl<T: Filterable> FilterEnv<T> {
    pub fn new() -> Self {
        Self {
            scope: Scope::new(T::FIELDS),
            _marker: PhantomData,
        }
    }

    pub fn compile(&self, source: &str) -> Result<Program, FilterError> {
        let tokens = lexer::tokenize(source)?;
        let ast = parser::parse(tokens)?;
        let expr = compile::compile(&self.scope, ast)?;
        Ok(Program { expr })
    }
}

impl<T: Filterable> Default for FilterEnv<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// A compiled filter.
#[derive(Debug)]
pub struct Program {
    expr: Expr,
}

impl Program {
    pub fn matches(&self, item: &dyn Fields) -> bool {
        self.expr.test(item)
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;
    use crate::model::{Category, Chapter, Entry, EntryKind};

    fn story(path: &str) -> Entry {
        Entry {
            path: format!("categories/fiction/entries/{path}"),
            display_name: crate::slug::to_title(path),
            kind: EntryKind::Story,
            update_time: Some(Utc.with_ymd_and_hms(2023, 3, 15, 4, 0, 0).unwrap()),
            ..Default::default()
        }
    }

    fn eval(filter: &str, entry: &Entry) -> bool {
        FilterEnv::<Entry>::new()
            .compile(filter)
            .unwrap_or_else(|err| panic!("{filter}: {err}"))
            .matches(entry)
    }

    #[test]
    fn enum_constants_and_strings() {
        let entry = story("the-long-road");
        assert!(eval("this.kind == STORY", &entry));
        assert!(!eval("this.kind == ANTHOLOGY", &entry));
        assert!(eval("this.kind == 'STORY'", &entry));
        assert!(eval("this.kind != ANTHOLOGY && !this.hidden", &entry));
    }

    #[test]
    fn optional_fields() {
        let mut entry = story("the-long-road");
        assert!(!eval("has(this.read_time)", &entry));
        assert!(eval("this.read_time == null", &entry));
        entry.read_time = Some(Utc::now());
        assert!(eval("has(this.read_time)", &entry));
        assert!(eval("this.read_time > this.update_time", &entry));
    }

    #[test]
    fn string_methods() {
        let entry = story("the-long-road");
        assert!(eval("this.display_name.startsWith('The')", &entry));
        assert!(eval("this.display_name.endsWith(\"Road\")", &entry));
        assert!(eval("this.path.contains('fiction')", &entry));
        assert!(eval("this.display_name.matches('^The [A-Z]')", &entry));
        assert!(!eval("this.display_name.matches('^road')", &entry));
    }

    #[test]
    fn timestamps_and_grouping() {
        let entry = story("the-long-road");
        assert!(eval(
            "this.update_time >= timestamp('2023-01-01T00:00:00Z') && (this.starred || !this.hidden)",
            &entry
        ));
        assert!(!eval(
            "this.update_time < timestamp('2023-03-15T04:00:00Z')",
            &entry
        ));
    }

    #[test]
    fn rejects_type_errors() {
        let env = FilterEnv::<Entry>::new();
        for filter in [
            "this.nope",
            "this.kind == SERIAL",
            "this.hidden == 'yes'",
            "this.display_name",
            "this.hidden && 1",
            "this.display_name.matches('(')",
            "timestamp('yesterday') < this.update_time",
            "has(this)",
            "this.path == null",
            "this",
        ] {
            assert!(env.compile(filter).is_err(), "{filter} should not compile");
        }
    }

    #[test]
    fn category_and_chapter_schemas() {
        let category = Category {
            path: "categories/fiction".into(),
            display_name: "Fiction".into(),
            description: "Made up".into(),
            hidden: true,
        };
        let program = FilterEnv::<Category>::new()
            .compile("this.hidden && this.description.contains('up')")
            .unwrap();
        assert!(program.matches(&category));

        let chapters = FilterEnv::<Chapter>::new();
        assert!(chapters.compile("this.starred").is_err());
        assert!(chapters.compile("!has(this.view_time)").is_ok());
    }
}
