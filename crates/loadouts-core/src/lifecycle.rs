use crate::CoreError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Where a user is in the selection wizard.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum WizardState {
    #[default]
    Idle,
    SlotPicked,
    CategoryOpen,
    WeaponSelect,
    AttachmentSelect,
    /// Items are staged; waiting for save or cancel.
    Confirmed,
}

impl fmt::Display for WizardState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WizardState::Idle => write!(f, "idle"),
            WizardState::SlotPicked => write!(f, "slot-picked"),
            WizardState::CategoryOpen => write!(f, "category-open"),
            WizardState::WeaponSelect => write!(f, "weapon-select"),
            WizardState::AttachmentSelect => write!(f, "attachment-select"),
            WizardState::Confirmed => write!(f, "confirmed"),
        }
    }
}

pub fn validate_transition(from: WizardState, to: WizardState) -> Result<(), CoreError> {
    use WizardState::{AttachmentSelect, CategoryOpen, Confirmed, Idle, SlotPicked, WeaponSelect};

    let valid = matches!(
        (from, to),
        (Idle | SlotPicked | CategoryOpen, SlotPicked)
            | (SlotPicked | WeaponSelect | AttachmentSelect, CategoryOpen)
            | (CategoryOpen, WeaponSelect | AttachmentSelect)
            | (WeaponSelect, WeaponSelect)
            | (AttachmentSelect, AttachmentSelect)
            | (CategoryOpen | WeaponSelect | AttachmentSelect | Confirmed, Confirmed)
            | (
                SlotPicked | CategoryOpen | WeaponSelect | AttachmentSelect | Confirmed,
                Idle
            )
    );

    if valid {
        Ok(())
    } else {
        Err(CoreError::InvalidTransition {
            from: from.to_string(),
            to: to.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use WizardState::{AttachmentSelect, CategoryOpen, Confirmed, Idle, SlotPicked, WeaponSelect};

    #[test]
    fn valid_transitions() {
        assert!(validate_transition(Idle, SlotPicked).is_ok());
        assert!(validate_transition(SlotPicked, SlotPicked).is_ok()); // re-pick slot
        assert!(validate_transition(SlotPicked, CategoryOpen).is_ok());
        assert!(validate_transition(CategoryOpen, SlotPicked).is_ok());
        assert!(validate_transition(CategoryOpen, WeaponSelect).is_ok());
        assert!(validate_transition(CategoryOpen, AttachmentSelect).is_ok());
        assert!(validate_transition(WeaponSelect, WeaponSelect).is_ok()); // paging
        assert!(validate_transition(WeaponSelect, CategoryOpen).is_ok());
        assert!(validate_transition(AttachmentSelect, CategoryOpen).is_ok());
        assert!(validate_transition(CategoryOpen, Confirmed).is_ok());
        assert!(validate_transition(WeaponSelect, Confirmed).is_ok());
        assert!(validate_transition(Confirmed, Confirmed).is_ok());
        assert!(validate_transition(Confirmed, Idle).is_ok());
        assert!(validate_transition(SlotPicked, Idle).is_ok());
    }

    #[test]
    fn invalid_transitions() {
        assert!(validate_transition(Idle, CategoryOpen).is_err());
        assert!(validate_transition(Idle, Confirmed).is_err());
        assert!(validate_transition(Idle, Idle).is_err());
        assert!(validate_transition(SlotPicked, Confirmed).is_err());
        assert!(validate_transition(SlotPicked, WeaponSelect).is_err());
        assert!(validate_transition(WeaponSelect, AttachmentSelect).is_err());
        assert!(validate_transition(Confirmed, CategoryOpen).is_err());
        assert!(validate_transition(Confirmed, SlotPicked).is_err());
    }

    #[test]
    fn rejection_names_both_states() {
        let err = validate_transition(Confirmed, WeaponSelect).unwrap_err();
        assert_eq!(
            err.to_string(),
            "invalid wizard transition: confirmed -> weapon-select"
        );
    }
}
