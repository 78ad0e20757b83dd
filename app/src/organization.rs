use serde::{Deserialize, Serialize};

use infra::documents::{DocMeta, HasMeta};
use infra::ids::{Entity, Id};

/// The kitchen (or restaurant group) that owns catalog items, recipes and
/// staff. Nothing is shared across organizations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Organization {
    #[serde(flatten)]
    pub(crate) meta: DocMeta<Organization>,
    pub name: String,
}

impl Organization {
    pub fn new(id: Id<Organization>, name: &str) -> Self {
        let meta = DocMeta::new_with_id(id);
        let name = name.to_string();
        Organization { meta, name }
    }

    pub fn id(&self) -> Id<Organization> {
        self.meta.id
    }
}

impl Entity for Organization {
    const PREFIX: &'static str = "org";
}

impl HasMeta for Organization {
    fn meta(&self) -> &DocMeta<Self> {
        &self.meta
    }
    fn meta_mut(&mut self) -> &mut DocMeta<Self> {
        &mut self.meta
    }
}
