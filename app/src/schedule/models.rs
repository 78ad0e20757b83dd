use serde::{Deserialize, Serialize};

use infra::documents::{DocMeta, HasMeta};
use infra::ids::{Entity, Id};

use crate::organization::Organization;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TeamMember {
    #[serde(flatten)]
    pub(crate) meta: DocMeta<TeamMember>,
    pub organization: Id<Organization>,
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub roles: Vec<String>,
}

/// A person as named by an imported schedule. Either part of the name may be
/// missing, in which case it is read from `name`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScheduleEmployee {
    pub name: String,
    #[serde(default)]
    pub first_name: Option<String>,
    #[serde(default)]
    pub last_name: Option<String>,
}

impl TeamMember {
    pub fn new(
        id: Id<TeamMember>,
        organization: Id<Organization>,
        first_name: &str,
        last_name: &str,
    ) -> Self {
        TeamMember {
            meta: DocMeta::new_with_id(id),
            organization,
            first_name: first_name.trim().to_string(),
            last_name: last_name.trim().to_string(),
            email: None,
            roles: Vec::new(),
        }
    }

    pub fn id(&self) -> Id<TeamMember> {
        self.meta.id
    }

    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name.trim(), self.last_name.trim())
            .trim()
            .to_string()
    }
}

impl ScheduleEmployee {
    pub fn named(name: &str) -> Self {
        ScheduleEmployee {
            name: name.to_string(),
            first_name: None,
            last_name: None,
        }
    }

    pub fn first_name(&self) -> &str {
        self.first_name
            .as_ref()
            .map(|s| s.trim())
            .filter(|s| !s.is_empty())
            .or_else(|| self.name.split_whitespace().next())
            .unwrap_or("")
    }

    /// The explicit last name, or the final word of `name` when it has more
    /// than one.
    pub fn last_name(&self) -> &str {
        if let Some(last) = self
            .last_name
            .as_ref()
            .map(|s| s.trim())
            .filter(|s| !s.is_empty())
        {
            return last;
        }
        let mut words = self.name.split_whitespace();
        match (words.next(), words.last()) {
            (Some(_), Some(last)) => last,
            _ => "",
        }
    }

    pub fn full_name(&self) -> String {
        let name = self.name.split_whitespace().collect::<Vec<_>>().join(" ");
        if name.is_empty() {
            format!("{} {}", self.first_name(), self.last_name())
                .trim()
                .to_string()
        } else {
            name
        }
    }
}

impl Entity for TeamMember {
    const PREFIX: &'static str = "teammember";
}

impl HasMeta for TeamMember {
    fn meta(&self) -> &DocMeta<Self> {
        &self.meta
    }
    fn meta_mut(&mut self) -> &mut DocMeta<Self> {
        &mut self.meta
    }
}
