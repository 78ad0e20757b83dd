use std::marker::PhantomData;

use serde::{Deserialize, Serialize};

use crate::ids::{Entity, Id};

/// Opaque version token assigned by the store on every successful save.
/// A document with the default (empty) version has never been saved.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, Default, Hash)]
pub struct Version(String);

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, Hash)]
#[serde(bound = "T: Entity")]
pub struct DocMeta<T> {
    #[serde(rename = "_id")]
    pub id: Id<T>,
    #[serde(rename = "_version", default)]
    pub version: Version,
    #[serde(skip)]
    pub _phantom: PhantomData<T>,
}

pub trait HasMeta: Entity + Sized {
    fn meta(&self) -> &DocMeta<Self>;
    fn meta_mut(&mut self) -> &mut DocMeta<Self>;
}

impl<T> Default for DocMeta<T> {
    fn default() -> Self {
        let id = Default::default();
        let version = Default::default();
        let _phantom = Default::default();
        DocMeta {
            id,
            version,
            _phantom,
        }
    }
}

impl<T> DocMeta<T> {
    pub fn new_with_id(id: Id<T>) -> Self {
        DocMeta {
            id,
            ..Default::default()
        }
    }

    pub fn is_new(&self) -> bool {
        self.version == Version::default()
    }
}

impl Version {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for Version {
    fn from(version: String) -> Self {
        Version(version)
    }
}

impl std::fmt::Display for Version {
    fn fmt(&self, fmt: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(fmt, "{}", self.0)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::ids::IdGen;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Note {
        #[serde(flatten)]
        meta: DocMeta<Note>,
        text: String,
    }

    impl Entity for Note {
        const PREFIX: &'static str = "note";
    }

    #[test]
    fn meta_is_flattened_into_the_body() {
        let note = Note {
            meta: DocMeta::new_with_id(IdGen::new().generate()),
            text: "mise en place".into(),
        };

        let json = serde_json::to_value(&note).expect("to_value");

        assert_eq!(json["_id"], serde_json::json!(note.meta.id.to_string()));
        assert_eq!(json["_version"], serde_json::json!(""));
        assert_eq!(json["text"], serde_json::json!("mise en place"));
    }

    #[test]
    fn missing_version_reads_as_new() {
        let id = IdGen::new().generate::<Note>();
        let json = serde_json::json!({ "_id": id.to_string(), "text": "hi" });

        let note: Note = serde_json::from_value(json).expect("from_value");

        assert!(note.meta.is_new());
        assert_eq!(note.meta.id, id);
    }
}
