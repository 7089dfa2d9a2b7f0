//! Menu events applied to an `EditSession`.
//!
//! `dispatch` validates each event against the session's wizard state,
//! mutates the working selections and tells the caller what else has to
//! happen (`Effect`). It never touches storage or inventories itself.

use crate::catalog::Catalog;
use crate::lifecycle::{validate_transition, WizardState};
use crate::session::{Cursor, EditSession, EditTarget};
use crate::CoreError;
use loadouts_schema::{
    AttachmentId, AttachmentKey, Category, ItemRef, LoadoutsConfig, OwnerId, Scope,
    SlotAssignment, SlotNumber, SlotType,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WizardEvent {
    PickSlot { slot: SlotNumber, scope: Scope },
    OpenCategories,
    PickCategory(SlotType),
    PickAttachmentSlot(AttachmentKey),
    PickItem(ItemRef),
    PickAttachment(AttachmentId),
    PageForward,
    PageBack,
    Back,
    Confirm,
    /// The user closed the menu without choosing anything.
    Close,
}

/// Follow-up work for the caller after a successful dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Effect {
    None,
    /// Selections were reset for a new target; load the stored ones, if any.
    Rehydrate { owner: OwnerId, slot: SlotNumber },
    /// Materialize the selections and stage them into the inventory.
    Stage,
    /// The wizard is finished without staging; drop the session.
    EndSession,
}

pub struct WizardContext<'a> {
    pub config: &'a LoadoutsConfig,
    pub catalog: &'a dyn Catalog,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageEntry {
    pub id: String,
    pub custom: bool,
    /// Currently chosen for the slot being edited.
    pub selected: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageView {
    pub page: usize,
    pub page_count: usize,
    pub entries: Vec<PageEntry>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Listed {
    Catalog { item: ItemRef, category: Category },
    Custom(ItemRef),
}

impl Listed {
    fn item(&self) -> &ItemRef {
        match self {
            Listed::Catalog { item, .. } | Listed::Custom(item) => item,
        }
    }
}

/// Catalog items of the slot-type's categories followed by its custom items.
fn weapon_listing(ctx: &WizardContext<'_>, slot_type: &SlotType) -> Vec<Listed> {
    let mut listing = Vec::new();
    if let Some(section) = ctx.config.slot(slot_type) {
        for category in &section.allowed_categories {
            listing.extend(
                ctx.catalog
                    .items_in_category(category)
                    .into_iter()
                    .map(|item| Listed::Catalog {
                        item,
                        category: category.clone(),
                    }),
            );
        }
    }
    listing.extend(
        ctx.config
            .custom_items_for(slot_type)
            .map(|(id, _)| Listed::Custom(id.clone())),
    );
    listing
}

fn attachment_listing(ctx: &WizardContext<'_>, key: &AttachmentKey) -> Vec<AttachmentId> {
    ctx.config
        .attachment_slot(key)
        .map(|section| ctx.catalog.attachments_in_categories(&section.categories))
        .unwrap_or_default()
}

fn page_count(len: usize, per_page: usize) -> usize {
    len.div_ceil(per_page.max(1)).max(1)
}

fn reject(from: WizardState, to: WizardState) -> CoreError {
    CoreError::InvalidTransition {
        from: from.to_string(),
        to: to.to_string(),
    }
}

fn enter(session: &mut EditSession, to: WizardState, cursor: Cursor) -> Result<(), CoreError> {
    validate_transition(session.state, to)?;
    session.state = to;
    session.cursor = cursor;
    session.page = 0;
    Ok(())
}

pub fn dispatch(
    session: &mut EditSession,
    event: WizardEvent,
    ctx: &WizardContext<'_>,
) -> Result<Effect, CoreError> {
    let state = session.state;
    match event {
        WizardEvent::PickSlot { slot, scope } => {
            if slot.get() > ctx.config.max_loadouts {
                return Err(CoreError::NotListed(format!("slot {slot}")));
            }
            enter(session, WizardState::SlotPicked, Cursor::None)?;
            session.target = Some(EditTarget::new(slot, scope));
            Ok(Effect::None)
        }

        WizardEvent::OpenCategories => {
            let target = session.target.ok_or(CoreError::NoSession)?;
            enter(session, WizardState::CategoryOpen, Cursor::None)?;
            if session.loaded_for == Some(target) {
                return Ok(Effect::None);
            }
            session.clear_selections();
            session.loaded_for = Some(target);
            Ok(Effect::Rehydrate {
                owner: target.owner_for(session.user),
                slot: target.slot,
            })
        }

        WizardEvent::PickCategory(slot_type) => {
            if ctx.config.slot(&slot_type).is_none() {
                return Err(CoreError::NotListed(slot_type.into_inner()));
            }
            enter(session, WizardState::WeaponSelect, Cursor::SlotType(slot_type))?;
            Ok(Effect::None)
        }

        WizardEvent::PickAttachmentSlot(key) => {
            if ctx.config.attachment_slot(&key).is_none() {
                return Err(CoreError::NotListed(key.into_inner()));
            }
            enter(session, WizardState::AttachmentSelect, Cursor::Attachment(key))?;
            Ok(Effect::None)
        }

        WizardEvent::PickItem(item) => {
            let Cursor::SlotType(slot_type) = session.cursor.clone() else {
                return Err(reject(state, WizardState::CategoryOpen));
            };
            if state != WizardState::WeaponSelect {
                return Err(reject(state, WizardState::CategoryOpen));
            }
            let listed = weapon_listing(ctx, &slot_type)
                .into_iter()
                .find(|listed| *listed.item() == item)
                .ok_or_else(|| CoreError::NotListed(item.to_string()))?;
            let assignment = match listed {
                Listed::Catalog { item, category } => {
                    let category = ctx.catalog.category_of(&item).unwrap_or(category);
                    let ammo = if ctx.catalog.has_ammo_config(&item) {
                        ctx.catalog
                            .magazine_size(&item)
                            .saturating_mul(ctx.config.ammo_multiplier(Some(&category)))
                    } else {
                        0
                    };
                    SlotAssignment::catalog(slot_type.clone(), item, Some(category), ammo)
                }
                Listed::Custom(item) => SlotAssignment::custom(slot_type.clone(), item),
            };
            session.selections.insert(slot_type, assignment);
            enter(session, WizardState::CategoryOpen, Cursor::None)?;
            Ok(Effect::None)
        }

        WizardEvent::PickAttachment(id) => {
            let Cursor::Attachment(key) = session.cursor.clone() else {
                return Err(reject(state, WizardState::CategoryOpen));
            };
            if state != WizardState::AttachmentSelect {
                return Err(reject(state, WizardState::CategoryOpen));
            }
            if !attachment_listing(ctx, &key).contains(&id) {
                return Err(CoreError::NotListed(id.into_inner()));
            }
            session.attachments.insert(key, id);
            enter(session, WizardState::CategoryOpen, Cursor::None)?;
            Ok(Effect::None)
        }

        WizardEvent::PageForward | WizardEvent::PageBack => {
            let Some(view) = page_view(session, ctx) else {
                return Err(reject(state, state));
            };
            session.page = if event == WizardEvent::PageForward {
                (session.page + 1).min(view.page_count - 1)
            } else {
                session.page.saturating_sub(1)
            };
            Ok(Effect::None)
        }

        WizardEvent::Back => match state {
            WizardState::WeaponSelect | WizardState::AttachmentSelect => {
                enter(session, WizardState::CategoryOpen, Cursor::None)?;
                Ok(Effect::None)
            }
            WizardState::CategoryOpen => {
                enter(session, WizardState::SlotPicked, Cursor::None)?;
                Ok(Effect::None)
            }
            WizardState::SlotPicked => {
                enter(session, WizardState::Idle, Cursor::None)?;
                Ok(Effect::EndSession)
            }
            WizardState::Idle | WizardState::Confirmed => {
                Err(reject(state, WizardState::SlotPicked))
            }
        },

        WizardEvent::Confirm => {
            if state == WizardState::Confirmed {
                return Err(reject(state, state));
            }
            validate_transition(state, WizardState::Confirmed)?;
            if !session.has_selections() {
                return Err(CoreError::NothingSelected);
            }
            session.state = WizardState::Confirmed;
            session.cursor = Cursor::None;
            Ok(Effect::Stage)
        }

        WizardEvent::Close => match state {
            WizardState::Confirmed => Ok(Effect::None),
            WizardState::CategoryOpen
            | WizardState::WeaponSelect
            | WizardState::AttachmentSelect
                if session.has_selections() =>
            {
                session.state = WizardState::Confirmed;
                session.cursor = Cursor::None;
                Ok(Effect::Stage)
            }
            WizardState::Idle => Ok(Effect::EndSession),
            _ => {
                enter(session, WizardState::Idle, Cursor::None)?;
                Ok(Effect::EndSession)
            }
        },
    }
}

/// The page the session's item listing is showing, if it shows one.
pub fn page_view(session: &EditSession, ctx: &WizardContext<'_>) -> Option<PageView> {
    let per_page = ctx.config.menu.items_per_page.max(1);
    let entries: Vec<PageEntry> = match (&session.state, &session.cursor) {
        (WizardState::WeaponSelect, Cursor::SlotType(slot_type)) => {
            let chosen = session.selections.get(slot_type).map(|a| &a.item_ref);
            weapon_listing(ctx, slot_type)
                .into_iter()
                .map(|listed| PageEntry {
                    id: listed.item().to_string(),
                    custom: matches!(listed, Listed::Custom(_)),
                    selected: chosen == Some(listed.item()),
                })
                .collect()
        }
        (WizardState::AttachmentSelect, Cursor::Attachment(key)) => {
            let chosen = session.attachments.get(key);
            attachment_listing(ctx, key)
                .into_iter()
                .map(|id| PageEntry {
                    selected: chosen == Some(&id),
                    id: id.into_inner(),
                    custom: false,
                })
                .collect()
        }
        _ => return None,
    };
    let page_count = page_count(entries.len(), per_page);
    let page = session.page.min(page_count - 1);
    Some(PageView {
        page,
        page_count,
        entries: entries
            .into_iter()
            .skip(page * per_page)
            .take(per_page)
            .collect(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::StaticCatalog;
    use loadouts_schema::{parse_config_str, UserId};

    fn config() -> LoadoutsConfig {
        parse_config_str(
            r#"
[menu]
items_per_page = 2
[slots.primary]
allowed_categories = ["rifle", "smg"]
[slots.tactical]
allowed_categories = []
[attachment_slots.optic]
categories = ["scopes"]
[custom_items.medkit]
slot_type = "tactical"
material = "golden_apple"
"#,
        )
        .unwrap()
    }

    fn catalog() -> StaticCatalog {
        StaticCatalog::new()
            .with_item("RifleX", "rifle", "crossbow")
            .with_magazine("RifleX", 30, "arrow")
            .with_item("RifleY", "rifle", "bow")
            .with_item("Smg1", "smg", "stick")
            .with_attachment("red_dot", "scopes", "spyglass")
    }

    struct Fixture {
        config: LoadoutsConfig,
        catalog: StaticCatalog,
    }

    impl Fixture {
        fn new() -> Self {
            Self {
                config: config(),
                catalog: catalog(),
            }
        }

        fn ctx(&self) -> WizardContext<'_> {
            WizardContext {
                config: &self.config,
                catalog: &self.catalog,
            }
        }
    }

    fn slot(n: u8) -> SlotNumber {
        SlotNumber::new(n).unwrap()
    }

    fn run(session: &mut EditSession, ctx: &WizardContext<'_>, events: Vec<WizardEvent>) -> Effect {
        let mut last = Effect::None;
        for event in events {
            last = dispatch(session, event, ctx).unwrap();
        }
        last
    }

    fn pick_slot(n: u8) -> WizardEvent {
        WizardEvent::PickSlot {
            slot: slot(n),
            scope: Scope::Personal,
        }
    }

    #[test]
    fn opening_categories_for_new_target_requests_rehydrate() {
        let f = Fixture::new();
        let user = UserId::random();
        let mut session = EditSession::new(user);
        let effect = run(
            &mut session,
            &f.ctx(),
            vec![pick_slot(3), WizardEvent::OpenCategories],
        );
        assert_eq!(
            effect,
            Effect::Rehydrate {
                owner: OwnerId::from(user),
                slot: slot(3)
            }
        );
        assert_eq!(session.state, WizardState::CategoryOpen);
    }

    #[test]
    fn picking_rifle_computes_ammo() {
        let f = Fixture::new();
        let mut session = EditSession::new(UserId::random());
        run(
            &mut session,
            &f.ctx(),
            vec![
                pick_slot(3),
                WizardEvent::OpenCategories,
                WizardEvent::PickCategory("primary".into()),
                WizardEvent::PickItem("RifleX".into()),
            ],
        );
        let assignment = &session.selections[&SlotType::from("primary")];
        assert_eq!(assignment.ammo_amount, 30 * 4);
        assert_eq!(assignment.category, Some(Category::from("rifle")));
        assert!(assignment.is_catalog_item);
        assert_eq!(session.state, WizardState::CategoryOpen);
    }

    #[test]
    fn item_without_ammo_config_gets_zero_ammo() {
        let f = Fixture::new();
        let mut session = EditSession::new(UserId::random());
        run(
            &mut session,
            &f.ctx(),
            vec![
                pick_slot(1),
                WizardEvent::OpenCategories,
                WizardEvent::PickCategory("primary".into()),
                WizardEvent::PickItem("Smg1".into()),
            ],
        );
        assert_eq!(session.selections[&SlotType::from("primary")].ammo_amount, 0);
    }

    #[test]
    fn custom_items_are_listed_for_their_slot() {
        let f = Fixture::new();
        let mut session = EditSession::new(UserId::random());
        run(
            &mut session,
            &f.ctx(),
            vec![
                pick_slot(1),
                WizardEvent::OpenCategories,
                WizardEvent::PickCategory("tactical".into()),
                WizardEvent::PickItem("medkit".into()),
            ],
        );
        assert!(!session.selections[&SlotType::from("tactical")].is_catalog_item);
    }

    #[test]
    fn unlisted_item_is_rejected() {
        let f = Fixture::new();
        let ctx = f.ctx();
        let mut session = EditSession::new(UserId::random());
        run(
            &mut session,
            &ctx,
            vec![
                pick_slot(1),
                WizardEvent::OpenCategories,
                WizardEvent::PickCategory("tactical".into()),
            ],
        );
        let err = dispatch(&mut session, WizardEvent::PickItem("RifleX".into()), &ctx).unwrap_err();
        assert!(matches!(err, CoreError::NotListed(id) if id == "RifleX"));
        assert_eq!(session.state, WizardState::WeaponSelect);
    }

    #[test]
    fn attachments_are_selected_per_key() {
        let f = Fixture::new();
        let mut session = EditSession::new(UserId::random());
        run(
            &mut session,
            &f.ctx(),
            vec![
                pick_slot(1),
                WizardEvent::OpenCategories,
                WizardEvent::PickAttachmentSlot("optic".into()),
                WizardEvent::PickAttachment("red_dot".into()),
            ],
        );
        assert_eq!(
            session.attachments.get(&AttachmentKey::from("optic")),
            Some(&AttachmentId::from("red_dot"))
        );
    }

    #[test]
    fn switching_target_resets_selections() {
        let f = Fixture::new();
        let ctx = f.ctx();
        let mut session = EditSession::new(UserId::random());
        run(
            &mut session,
            &ctx,
            vec![
                pick_slot(1),
                WizardEvent::OpenCategories,
                WizardEvent::PickCategory("primary".into()),
                WizardEvent::PickItem("RifleX".into()),
                WizardEvent::Back,
                pick_slot(2),
            ],
        );
        assert!(session.has_selections());
        let effect = dispatch(&mut session, WizardEvent::OpenCategories, &ctx).unwrap();
        assert!(matches!(effect, Effect::Rehydrate { slot, .. } if slot.get() == 2));
        assert!(!session.has_selections());
    }

    #[test]
    fn same_target_keeps_selections() {
        let f = Fixture::new();
        let mut session = EditSession::new(UserId::random());
        let effect = run(
            &mut session,
            &f.ctx(),
            vec![
                pick_slot(1),
                WizardEvent::OpenCategories,
                WizardEvent::PickCategory("primary".into()),
                WizardEvent::PickItem("RifleX".into()),
                WizardEvent::Back,
                pick_slot(1),
                WizardEvent::OpenCategories,
            ],
        );
        assert_eq!(effect, Effect::None);
        assert!(session.has_selections());
    }

    #[test]
    fn scope_change_is_a_new_target() {
        let f = Fixture::new();
        let ctx = f.ctx();
        let mut session = EditSession::new(UserId::random());
        run(&mut session, &ctx, vec![pick_slot(1), WizardEvent::OpenCategories, WizardEvent::Back]);
        run(
            &mut session,
            &ctx,
            vec![WizardEvent::PickSlot {
                slot: slot(1),
                scope: Scope::Global,
            }],
        );
        let effect = dispatch(&mut session, WizardEvent::OpenCategories, &ctx).unwrap();
        assert_eq!(
            effect,
            Effect::Rehydrate {
                owner: OwnerId::GLOBAL,
                slot: slot(1)
            }
        );
    }

    #[test]
    fn paging_is_clamped() {
        let f = Fixture::new();
        let ctx = f.ctx();
        let mut session = EditSession::new(UserId::random());
        run(
            &mut session,
            &ctx,
            vec![
                pick_slot(1),
                WizardEvent::OpenCategories,
                WizardEvent::PickCategory("primary".into()),
            ],
        );
        // RifleX, RifleY, Smg1 at two per page.
        let view = page_view(&session, &ctx).unwrap();
        assert_eq!(view.page_count, 2);
        assert_eq!(view.entries.len(), 2);

        run(
            &mut session,
            &ctx,
            vec![WizardEvent::PageForward, WizardEvent::PageForward],
        );
        let view = page_view(&session, &ctx).unwrap();
        assert_eq!(view.page, 1);
        assert_eq!(view.entries[0].id, "Smg1");

        run(
            &mut session,
            &ctx,
            vec![WizardEvent::PageBack, WizardEvent::PageBack],
        );
        assert_eq!(session.page, 0);
    }

    #[test]
    fn paging_outside_a_listing_is_rejected() {
        let f = Fixture::new();
        let ctx = f.ctx();
        let mut session = EditSession::new(UserId::random());
        run(&mut session, &ctx, vec![pick_slot(1), WizardEvent::OpenCategories]);
        assert!(dispatch(&mut session, WizardEvent::PageForward, &ctx).is_err());
    }

    #[test]
    fn page_view_marks_selection() {
        let f = Fixture::new();
        let ctx = f.ctx();
        let mut session = EditSession::new(UserId::random());
        run(
            &mut session,
            &ctx,
            vec![
                pick_slot(1),
                WizardEvent::OpenCategories,
                WizardEvent::PickCategory("primary".into()),
                WizardEvent::PickItem("RifleY".into()),
                WizardEvent::PickCategory("primary".into()),
            ],
        );
        let view = page_view(&session, &ctx).unwrap();
        let selected: Vec<&str> = view
            .entries
            .iter()
            .filter(|e| e.selected)
            .map(|e| e.id.as_str())
            .collect();
        assert_eq!(selected, vec!["RifleY"]);
    }

    #[test]
    fn confirm_requires_a_selection() {
        let f = Fixture::new();
        let ctx = f.ctx();
        let mut session = EditSession::new(UserId::random());
        run(&mut session, &ctx, vec![pick_slot(1), WizardEvent::OpenCategories]);
        assert!(matches!(
            dispatch(&mut session, WizardEvent::Confirm, &ctx),
            Err(CoreError::NothingSelected)
        ));
        assert_eq!(session.state, WizardState::CategoryOpen);
    }

    #[test]
    fn confirm_stages_once() {
        let f = Fixture::new();
        let ctx = f.ctx();
        let mut session = EditSession::new(UserId::random());
        let effect = run(
            &mut session,
            &ctx,
            vec![
                pick_slot(1),
                WizardEvent::OpenCategories,
                WizardEvent::PickCategory("primary".into()),
                WizardEvent::PickItem("RifleX".into()),
                WizardEvent::Confirm,
            ],
        );
        assert_eq!(effect, Effect::Stage);
        assert_eq!(session.state, WizardState::Confirmed);
        assert!(dispatch(&mut session, WizardEvent::Confirm, &ctx).is_err());
        assert_eq!(dispatch(&mut session, WizardEvent::Close, &ctx).unwrap(), Effect::None);
    }

    #[test]
    fn close_with_selections_proceeds_to_staging() {
        let f = Fixture::new();
        let mut session = EditSession::new(UserId::random());
        let effect = run(
            &mut session,
            &f.ctx(),
            vec![
                pick_slot(1),
                WizardEvent::OpenCategories,
                WizardEvent::PickCategory("primary".into()),
                WizardEvent::PickItem("RifleX".into()),
                WizardEvent::PickCategory("tactical".into()),
                WizardEvent::Close,
            ],
        );
        assert_eq!(effect, Effect::Stage);
        assert_eq!(session.state, WizardState::Confirmed);
    }

    #[test]
    fn close_without_selections_ends_session() {
        let f = Fixture::new();
        let ctx = f.ctx();
        let mut session = EditSession::new(UserId::random());
        let effect = run(
            &mut session,
            &ctx,
            vec![pick_slot(1), WizardEvent::OpenCategories, WizardEvent::Close],
        );
        assert_eq!(effect, Effect::EndSession);
        assert_eq!(session.state, WizardState::Idle);

        let mut session = EditSession::new(UserId::random());
        let effect = run(&mut session, &ctx, vec![pick_slot(2), WizardEvent::Close]);
        assert_eq!(effect, Effect::EndSession);
    }

    #[test]
    fn out_of_order_events_are_rejected() {
        let f = Fixture::new();
        let ctx = f.ctx();
        let mut session = EditSession::new(UserId::random());
        assert!(matches!(
            dispatch(&mut session, WizardEvent::OpenCategories, &ctx),
            Err(CoreError::NoSession)
        ));
        assert!(matches!(
            dispatch(&mut session, WizardEvent::PickCategory("primary".into()), &ctx),
            Err(CoreError::InvalidTransition { .. })
        ));
        assert!(matches!(
            dispatch(&mut session, WizardEvent::PickItem("RifleX".into()), &ctx),
            Err(CoreError::InvalidTransition { .. })
        ));
        assert!(matches!(
            dispatch(&mut session, WizardEvent::Back, &ctx),
            Err(CoreError::InvalidTransition { .. })
        ));
    }

    #[test]
    fn slots_beyond_max_loadouts_are_not_listed() {
        let f = Fixture {
            config: parse_config_str("max_loadouts = 2").unwrap(),
            catalog: catalog(),
        };
        let mut session = EditSession::new(UserId::random());
        assert!(matches!(
            dispatch(&mut session, pick_slot(3), &f.ctx()),
            Err(CoreError::NotListed(_))
        ));
        assert_eq!(session.state, WizardState::Idle);
    }

    #[test]
    fn unknown_category_is_not_listed() {
        let f = Fixture::new();
        let ctx = f.ctx();
        let mut session = EditSession::new(UserId::random());
        run(&mut session, &ctx, vec![pick_slot(1), WizardEvent::OpenCategories]);
        assert!(matches!(
            dispatch(&mut session, WizardEvent::PickCategory("melee".into()), &ctx),
            Err(CoreError::NotListed(_))
        ));
    }
}
