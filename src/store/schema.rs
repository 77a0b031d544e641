//! Index definitions for the chat history collection
//!
//! Every compound index pairs one filter dimension with `timestamp` so that
//! "recent messages for X" reads walk the index in order without a sort stage.
//! `message_id_unique_idx` also enforces message id uniqueness.

use mongodb::bson::{Bson, Document};

/// Sort direction of an index key
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortOrder {
    Ascending,
    Descending,
}

impl SortOrder {
    pub fn as_i32(self) -> i32 {
        match self {
            SortOrder::Ascending => 1,
            SortOrder::Descending => -1,
        }
    }

    pub fn from_bson(value: &Bson) -> Option<Self> {
        let n = match value {
            Bson::Int32(n) => *n as i64,
            Bson::Int64(n) => *n,
            Bson::Double(n) => *n as i64,
            _ => return None,
        };
        match n {
            1 => Some(SortOrder::Ascending),
            -1 => Some(SortOrder::Descending),
            _ => None,
        }
    }
}

/// A named index over an ordered list of keys
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexSpec {
    pub name: String,
    pub keys: Vec<(String, SortOrder)>,
    pub unique: bool,
}

impl IndexSpec {
    pub fn new(name: &str, keys: &[(&str, SortOrder)]) -> Self {
        Self {
            name: name.to_string(),
            keys: keys.iter().map(|(f, o)| (f.to_string(), *o)).collect(),
            unique: false,
        }
    }

    pub fn unique(mut self) -> Self {
        self.unique = true;
        self
    }

    /// Key document in key order, e.g. `{ session_id: 1, timestamp: 1 }`
    pub fn keys_document(&self) -> Document {
        let mut doc = Document::new();
        for (field, order) in &self.keys {
            doc.insert(field.clone(), order.as_i32());
        }
        doc
    }

    /// Parse a key document as returned by listIndexes
    pub fn keys_from_document(doc: &Document) -> Option<Vec<(String, SortOrder)>> {
        doc.iter()
            .map(|(field, v)| SortOrder::from_bson(v).map(|o| (field.clone(), o)))
            .collect()
    }

    /// True if both specs would build the same index
    pub fn same_definition(&self, other: &IndexSpec) -> bool {
        self.keys == other.keys && self.unique == other.unique
    }

    /// Human readable key list for tables, e.g. `session_id asc, timestamp asc`
    pub fn describe_keys(&self) -> String {
        self.keys
            .iter()
            .map(|(f, o)| {
                let dir = match o {
                    SortOrder::Ascending => "asc",
                    SortOrder::Descending => "desc",
                };
                format!("{} {}", f, dir)
            })
            .collect::<Vec<_>>()
            .join(", ")
    }

    /// Whether this index serves a query with equality filters on `equality`
    /// and an optional sort on `sort`, without a separate sort stage.
    ///
    /// Leftmost-prefix rule: the equality fields must fill the first keys
    /// (in any order), and the sort field, if any, must be the next key.
    pub fn serves(&self, equality: &[&str], sort: Option<&str>) -> bool {
        let needed = equality.len() + usize::from(sort.is_some());
        if needed == 0 || needed > self.keys.len() {
            return false;
        }
        let prefix = &self.keys[..equality.len()];
        let equality_ok = equality
            .iter()
            .all(|field| prefix.iter().any(|(k, _)| k == field));
        let sort_ok = match sort {
            Some(field) => self.keys[equality.len()].0 == field,
            None => true,
        };
        equality_ok && sort_ok
    }
}

/// Indexes created on the message history collection, in creation order
pub fn chat_history_indexes() -> Vec<IndexSpec> {
    use SortOrder::Ascending as Asc;

    vec![
        IndexSpec::new(
            "session_timestamp_idx",
            &[("session_id", Asc), ("timestamp", Asc)],
        ),
        IndexSpec::new(
            "conversation_timestamp_idx",
            &[("conversation_id", Asc), ("timestamp", Asc)],
        ),
        IndexSpec::new(
            "user_timestamp_idx",
            &[("user_id", Asc), ("timestamp", Asc)],
        ),
        IndexSpec::new(
            "type_timestamp_idx",
            &[("message_type", Asc), ("timestamp", Asc)],
        ),
        IndexSpec::new(
            "session_context_idx",
            &[("session_id", Asc), ("context_info.window_position", Asc)],
        ),
        IndexSpec::new("message_id_unique_idx", &[("message_id", Asc)]).unique(),
    ]
}

/// A read performed by the chat application
#[derive(Debug, Clone, Copy)]
pub struct QueryPattern {
    pub description: &'static str,
    pub equality: &'static [&'static str],
    pub sort: Option<&'static str>,
}

pub const QUERY_PATTERNS: &[QueryPattern] = &[
    QueryPattern {
        description: "session history by time",
        equality: &["session_id"],
        sort: Some("timestamp"),
    },
    QueryPattern {
        description: "conversation history by time",
        equality: &["conversation_id"],
        sort: Some("timestamp"),
    },
    QueryPattern {
        description: "user messages by time",
        equality: &["user_id"],
        sort: Some("timestamp"),
    },
    QueryPattern {
        description: "messages of a type by time",
        equality: &["message_type"],
        sort: Some("timestamp"),
    },
    QueryPattern {
        description: "session context window",
        equality: &["session_id", "context_info.window_position"],
        sort: None,
    },
    QueryPattern {
        description: "lookup by message id",
        equality: &["message_id"],
        sort: None,
    },
];

/// First index (in creation order) that serves the query
pub fn index_for<'a>(
    indexes: &'a [IndexSpec],
    equality: &[&str],
    sort: Option<&str>,
) -> Option<&'a IndexSpec> {
    indexes.iter().find(|idx| idx.serves(equality, sort))
}
