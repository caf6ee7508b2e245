use std::collections::HashSet;

use anyhow::Result;
use tracing::debug;

use souk_types::events::GatewayEvent;
use souk_types::models::{Audience, ConversationKind, Principal};

use crate::GatewayState;

/// Which template a recipient receives. Explicit recipients are the party the
/// action affects; role-resolved admins get the admin wording. An explicit,
/// named mapping — never array-index position.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecipientCategory {
    Primary,
    Admin,
}

/// Message text per recipient category. `admin` falls back to `primary` when
/// unset.
#[derive(Debug, Clone)]
pub struct Templates {
    pub primary: String,
    pub admin: Option<String>,
}

impl Templates {
    pub fn same_for_all(text: String) -> Self {
        Self {
            primary: text,
            admin: None,
        }
    }

    fn for_category(&self, category: RecipientCategory) -> &str {
        match category {
            RecipientCategory::Primary => &self.primary,
            RecipientCategory::Admin => self.admin.as_deref().unwrap_or(&self.primary),
        }
    }
}

#[derive(Debug, Clone)]
pub struct NotificationSpec {
    pub action_type: String,
    pub title: String,
    pub templates: Templates,
}

pub fn title_for(kind: ConversationKind) -> &'static str {
    match kind {
        ConversationKind::Direct => "Personal message",
        ConversationKind::Community => "Community message",
        ConversationKind::Stake => "Investor message",
    }
}

/// Creates exactly one notification per distinct recipient — the union of the
/// explicit list and every admin holding one of `admin_roles`, deduplicated
/// by principal — then emits one payload-free refresh signal per affected
/// audience. The refresh is best-effort push; clients refetch on reconnect.
pub async fn notify(
    state: &GatewayState,
    recipients: &[Principal],
    spec: &NotificationSpec,
    admin_roles: &[&str],
) -> Result<usize> {
    let mut seen: HashSet<Principal> = HashSet::new();
    let mut targets: Vec<(Principal, RecipientCategory)> = Vec::new();

    for recipient in recipients {
        if seen.insert(*recipient) {
            targets.push((*recipient, RecipientCategory::Primary));
        }
    }
    for role in admin_roles {
        for admin_id in state.db.admins_with_role(role)? {
            let admin = Principal::Admin(admin_id);
            if seen.insert(admin) {
                targets.push((admin, RecipientCategory::Admin));
            }
        }
    }

    let mut audiences: Vec<Audience> = Vec::new();
    for (recipient, category) in &targets {
        state.db.create_notification(
            recipient.id(),
            &spec.action_type,
            &spec.title,
            spec.templates.for_category(*category),
        )?;

        let audience = state.db.audience_of(*recipient);
        if !audiences.contains(&audience) {
            audiences.push(audience);
        }
    }

    for audience in audiences {
        state
            .dispatcher
            .broadcast(GatewayEvent::NotificationRefresh { audience })
            .await;
    }

    debug!(
        "fan-out '{}' created {} notifications",
        spec.action_type,
        targets.len()
    );
    Ok(targets.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use uuid::Uuid;

    use souk_db::Database;

    use crate::dispatcher::Dispatcher;

    fn test_state() -> GatewayState {
        GatewayState::new(Arc::new(Database::open_in_memory().unwrap()), Dispatcher::new())
    }

    fn spec() -> NotificationSpec {
        NotificationSpec {
            action_type: "message_reported".into(),
            title: "New Message Reported".into(),
            templates: Templates {
                primary: "your report was filed".into(),
                admin: Some("a message was reported".into()),
            },
        }
    }

    #[tokio::test]
    async fn union_with_role_resolution_deduplicates() {
        let state = test_state();
        let admin_id = Uuid::new_v4();
        let user_id = Uuid::new_v4();
        state.db.create_admin(admin_id, "root", "Root").unwrap();
        state.db.grant_role(admin_id, "SUPER_ADMIN").unwrap();
        state
            .db
            .create_user(user_id, "alia", "Alia", Audience::Buyer)
            .unwrap();

        // The admin is both an explicit recipient and resolves via the role:
        // exactly 2 notifications, not 3.
        let created = notify(
            &state,
            &[Principal::User(user_id), Principal::Admin(admin_id)],
            &spec(),
            &["SUPER_ADMIN"],
        )
        .await
        .unwrap();

        assert_eq!(created, 2);
        assert_eq!(state.db.notification_count(user_id).unwrap(), 1);
        assert_eq!(state.db.notification_count(admin_id).unwrap(), 1);
    }

    #[tokio::test]
    async fn role_resolved_admins_get_the_admin_template() {
        let state = test_state();
        let admin_id = Uuid::new_v4();
        state.db.create_admin(admin_id, "root", "Root").unwrap();
        state.db.grant_role(admin_id, "SUPER_ADMIN").unwrap();

        notify(&state, &[], &spec(), &["SUPER_ADMIN"]).await.unwrap();

        let (rows, _) = state.db.notifications_page(admin_id, 1, 10).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].message, "a message was reported");
    }
}
