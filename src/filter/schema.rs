use super::{Field, FieldType, Fields, Filterable, Value};
use crate::model::{Category, Chapter, Entry, EntryKind, User};

impl Filterable for Category {
    const FIELDS: &'static [Field] = &[
        Field::required("path", FieldType::String),
        Field::required("display_name", FieldType::String),
        Field::required("description", FieldType::String),
        Field::required("hidden", FieldType::Bool),
    ];
}

impl Fields for Category {
    fn field(&self, name: &str) -> Value<'_> {
        match name {
            "path" => Value::Str(&self.path),
            "display_name" => Value::Str(&self.display_name),
            "description" => Value::Str(&self.description),
            "hidden" => Value::Bool(self.hidden),
            _ => Value::Null,
        }
    }
}

impl Filterable for Entry {
    const FIELDS: &'static [Field] = &[
        Field::required("path", FieldType::String),
        Field::required("display_name", FieldType::String),
        Field::required("kind", FieldType::Enum(EntryKind::VARIANTS)),
        Field::optional("update_time", FieldType::Timestamp),
        Field::required("hidden", FieldType::Bool),
        Field::required("starred", FieldType::Bool),
        Field::optional("view_time", FieldType::Timestamp),
        Field::optional("read_time", FieldType::Timestamp),
    ];
}

impl Fields for Entry {
    fn field(&self, name: &str) -> Value<'_> {
        match name {
            "path" => Value::Str(&self.path),
            "display_name" => Value::Str(&self.display_name),
            "kind" => Value::Enum(self.kind.as_str()),
            "update_time" => self.update_time.into(),
            "hidden" => Value::Bool(self.hidden),
            "starred" => Value::Bool(self.starred),
            "view_time" => self.view_time.into(),
            "read_time" => self.read_time.into(),
            _ => Value::Null,
        }
    }
}

impl Filterable for Chapter {
    const FIELDS: &'static [Field] = &[
        Field::required("path", FieldType::String),
        Field::required("display_name", FieldType::String),
        Field::optional("update_time", FieldType::Timestamp),
        Field::optional("view_time", FieldType::Timestamp),
        Field::optional("read_time", FieldType::Timestamp),
    ];
}

impl Fields for Chapter {
    fn field(&self, name: &str) -> Value<'_> {
        match name {
            "path" => Value::Str(&self.path),
            "display_name" => Value::Str(&self.display_name),
            "update_time" => self.update_time.into(),
            "view_time" => self.view_time.into(),
            "read_time" => self.read_time.into(),
            _ => Value::Null,
        }
    }
}

impl Filterable for User {
    const FIELDS: &'static [Field] = &[
        Field::required("path", FieldType::String),
        Field::required("id", FieldType::String),
    ];
}

impl Fields for User {
    fn field(&self, name: &str) -> Value<'_> {
        match name {
            "path" => Value::Str(&self.path),
            "id" => Value::Str(&self.id),
            _ => Value::Null,
        }
    }
}
