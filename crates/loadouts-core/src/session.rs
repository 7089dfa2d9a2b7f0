use crate::lifecycle::WizardState;
use chrono::{DateTime, Utc};
use loadouts_schema::{
    now_millis, AttachmentId, AttachmentKey, Loadout, OwnerId, Scope, SlotAssignment, SlotNumber,
    SlotType, UserId,
};
use std::collections::BTreeMap;

/// The numbered slot an edit writes to, and whose slots they are.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EditTarget {
    pub slot: SlotNumber,
    pub scope: Scope,
}

impl EditTarget {
    pub fn new(slot: SlotNumber, scope: Scope) -> Self {
        Self { slot, scope }
    }

    pub fn owner_for(&self, user: UserId) -> OwnerId {
        self.scope.owner_for(user)
    }
}

/// What the wizard's item listing is currently showing.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum Cursor {
    #[default]
    None,
    SlotType(SlotType),
    Attachment(AttachmentKey),
}

/// One user's in-progress edit. Nothing here is persisted until save.
#[derive(Debug, Clone)]
pub struct EditSession {
    pub user: UserId,
    pub target: Option<EditTarget>,
    /// Target whose stored selections are currently in `selections`.
    pub loaded_for: Option<EditTarget>,
    pub state: WizardState,
    pub cursor: Cursor,
    pub page: usize,
    pub selections: BTreeMap<SlotType, SlotAssignment>,
    pub attachments: BTreeMap<AttachmentKey, AttachmentId>,
    pub started_at: DateTime<Utc>,
}

impl EditSession {
    pub fn new(user: UserId) -> Self {
        Self {
            user,
            target: None,
            loaded_for: None,
            state: WizardState::Idle,
            cursor: Cursor::None,
            page: 0,
            selections: BTreeMap::new(),
            attachments: BTreeMap::new(),
            started_at: now_millis(),
        }
    }

    /// Owner the current target writes to.
    pub fn owner(&self) -> Option<OwnerId> {
        self.target.map(|t| t.owner_for(self.user))
    }

    pub fn clear_selections(&mut self) {
        self.selections.clear();
        self.attachments.clear();
    }

    /// Replace the working selections with the ones stored in `loadout`.
    pub fn load_from(&mut self, loadout: &Loadout) {
        self.selections = loadout.assignments.clone();
        self.attachments = loadout.attachments.clone();
    }

    pub fn has_selections(&self) -> bool {
        !self.selections.is_empty() || !self.attachments.is_empty()
    }

    /// Write the working selections into `loadout`, keeping entries for
    /// slot-types and attachment slots that were not touched.
    pub fn merge_into(&self, loadout: &mut Loadout) {
        for assignment in self.selections.values() {
            loadout.set_assignment(assignment.clone());
        }
        for (key, id) in &self.attachments {
            loadout.attachments.insert(key.clone(), id.clone());
        }
    }
}
