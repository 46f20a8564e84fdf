use serde::{Deserialize, Serialize};

use crate::record::{ContestableField, Resolution};

/// Static per-field resolution table.
///
/// Every field defaults to [`Resolution::RegistryWins`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResolutionPolicy {
    pub name: Resolution,
    pub status: Resolution,
    pub creation_count: Resolution,
}

impl ResolutionPolicy {
    pub fn resolution_for(&self, field: ContestableField) -> Resolution {
        match field {
            ContestableField::Name => self.name,
            ContestableField::Status => self.status,
            ContestableField::CreationCount => self.creation_count,
        }
    }

    #[must_use]
    pub fn with(mut self, field: ContestableField, resolution: Resolution) -> Self {
        match field {
            ContestableField::Name => self.name = resolution,
            ContestableField::Status => self.status = resolution,
            ContestableField::CreationCount => self.creation_count = resolution,
        }
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_to_registry_wins() {
        let policy = ResolutionPolicy::default();
        for field in ContestableField::ALL {
            assert_eq!(policy.resolution_for(field), Resolution::RegistryWins);
        }
    }

    #[test]
    fn partial_table_deserializes() {
        let policy: ResolutionPolicy =
            serde_json::from_value(serde_json::json!({"creation_count": "merge"})).unwrap();
        assert_eq!(
            policy.resolution_for(ContestableField::CreationCount),
            Resolution::Merge
        );
        assert_eq!(
            policy.resolution_for(ContestableField::Status),
            Resolution::RegistryWins
        );
    }

    #[test]
    fn with_overrides_one_field() {
        let policy = ResolutionPolicy::default().with(ContestableField::Status, Resolution::Skip);
        assert_eq!(policy.status, Resolution::Skip);
        assert_eq!(policy.name, Resolution::RegistryWins);
    }
}
