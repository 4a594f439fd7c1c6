use serde::{Deserialize, Serialize};

use crate::events::GroupEntry;

/// A named group: ordered members (creator first) and its message log.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GroupRoom {
    pub members: Vec<String>,
    pub messages: Vec<GroupEntry>,
}

impl GroupRoom {
    pub fn new(creator: &str) -> Self {
        Self {
            members: vec![creator.to_owned()],
            messages: Vec::new(),
        }
    }

    pub fn is_member(&self, identity: &str) -> bool {
        self.members.iter().any(|member| member == identity)
    }

    /// Appends `identity` unless already present. Returns whether it was added.
    pub fn add_member(&mut self, identity: &str) -> bool {
        if self.is_member(identity) {
            return false;
        }
        self.members.push(identity.to_owned());
        true
    }
}
