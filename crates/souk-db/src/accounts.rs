use anyhow::Result;
use chrono::Utc;
use rusqlite::{OptionalExtension, params};
use uuid::Uuid;

use souk_types::models::{AccountStatus, Audience, Principal, PrincipalKind, ProfileView};

use crate::Database;

impl Database {
    // -- Accounts --

    pub fn create_user(
        &self,
        id: Uuid,
        username: &str,
        full_name: &str,
        audience: Audience,
    ) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO users (id, username, full_name, audience, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    id.to_string(),
                    username,
                    full_name,
                    audience.as_str(),
                    Utc::now().to_rfc3339(),
                ],
            )?;
            Ok(())
        })
    }

    pub fn create_admin(&self, id: Uuid, username: &str, full_name: &str) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO admins (id, username, full_name, created_at)
                 VALUES (?1, ?2, ?3, ?4)",
                params![id.to_string(), username, full_name, Utc::now().to_rfc3339()],
            )?;
            Ok(())
        })
    }

    // -- Roles --

    pub fn grant_role(&self, admin_id: Uuid, role_name: &str) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT OR IGNORE INTO admin_roles (admin_id, role_id)
                 SELECT ?1, id FROM roles WHERE name = ?2",
                params![admin_id.to_string(), role_name],
            )?;
            Ok(())
        })
    }

    /// The role→admin lookup used by channel seeding and notification fan-out.
    pub fn admins_with_role(&self, role_name: &str) -> Result<Vec<Uuid>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT a.id FROM admins a
                 JOIN admin_roles ar ON ar.admin_id = a.id
                 JOIN roles r ON r.id = ar.role_id
                 WHERE r.name = ?1
                 ORDER BY a.rowid",
            )?;
            let ids = stmt
                .query_map([role_name], |row| row.get::<_, String>(0))?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(ids
                .iter()
                .filter_map(|s| Uuid::parse_str(s).ok())
                .collect())
        })
    }

    // -- Display profiles --

    pub fn profile(&self, principal: Principal) -> Result<Option<ProfileView>> {
        self.with_conn(|conn| {
            let table = match principal.kind() {
                PrincipalKind::User => "users",
                PrincipalKind::Admin => "admins",
            };
            let sql = format!(
                "SELECT username, full_name, profile_picture FROM {table} WHERE id = ?1"
            );
            let row = conn
                .query_row(&sql, [principal.id().to_string()], |row| {
                    Ok(ProfileView {
                        id: principal.id(),
                        kind: principal.kind(),
                        username: row.get(0)?,
                        full_name: row.get(1)?,
                        profile_picture: row.get(2)?,
                    })
                })
                .optional()?;
            Ok(row)
        })
    }

    /// Display fields with a placeholder for accounts that vanished from the
    /// account tables; broadcasts must not fail on a dangling reference.
    pub fn profile_or_unknown(&self, principal: Principal) -> ProfileView {
        match self.profile(principal) {
            Ok(Some(p)) => p,
            _ => ProfileView {
                id: principal.id(),
                kind: principal.kind(),
                username: "unknown".to_string(),
                full_name: String::new(),
                profile_picture: None,
            },
        }
    }

    /// Notification category of a principal: admins are Admin, users carry
    /// buyer/seller on the account row (Buyer when the row is gone).
    pub fn audience_of(&self, principal: Principal) -> Audience {
        match principal {
            Principal::Admin(_) => Audience::Admin,
            Principal::User(id) => self
                .with_conn(|conn| {
                    let a: Option<String> = conn
                        .query_row(
                            "SELECT audience FROM users WHERE id = ?1",
                            [id.to_string()],
                            |row| row.get(0),
                        )
                        .optional()?;
                    Ok(a.and_then(|s| Audience::parse(&s)))
                })
                .ok()
                .flatten()
                .unwrap_or(Audience::Buyer),
        }
    }

    // -- Account status --

    pub fn account_status(&self, principal: Principal) -> Result<Option<AccountStatus>> {
        self.with_conn(|conn| {
            let table = match principal.kind() {
                PrincipalKind::User => "users",
                PrincipalKind::Admin => "admins",
            };
            let sql = format!("SELECT status FROM {table} WHERE id = ?1");
            let status: Option<String> = conn
                .query_row(&sql, [principal.id().to_string()], |row| row.get(0))
                .optional()?;
            Ok(status.and_then(|s| AccountStatus::parse(&s)))
        })
    }

    pub fn set_account_status(&self, principal: Principal, status: AccountStatus) -> Result<bool> {
        self.with_conn(|conn| {
            let table = match principal.kind() {
                PrincipalKind::User => "users",
                PrincipalKind::Admin => "admins",
            };
            let sql = format!("UPDATE {table} SET status = ?1 WHERE id = ?2");
            let changed = conn.execute(&sql, params![status.as_str(), principal.id().to_string()])?;
            Ok(changed > 0)
        })
    }

    // -- Auth sessions --

    pub fn upsert_session(&self, principal: Principal, token: &str) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO auth_sessions (principal_id, principal_kind, token, created_at)
                 VALUES (?1, ?2, ?3, ?4)
                 ON CONFLICT(principal_id, principal_kind)
                 DO UPDATE SET token = excluded.token, created_at = excluded.created_at",
                params![
                    principal.id().to_string(),
                    principal.kind().as_str(),
                    token,
                    Utc::now().to_rfc3339(),
                ],
            )?;
            Ok(())
        })
    }

    pub fn session_token(&self, principal: Principal) -> Result<Option<String>> {
        self.with_conn(|conn| {
            let token: Option<String> = conn
                .query_row(
                    "SELECT token FROM auth_sessions
                     WHERE principal_id = ?1 AND principal_kind = ?2",
                    params![principal.id().to_string(), principal.kind().as_str()],
                    |row| row.get(0),
                )
                .optional()?;
            Ok(token)
        })
    }

    /// Deletes the stored token. Must run before any forced disconnect so a
    /// reconnect with the stale token cannot slip through the gap.
    pub fn revoke_session(&self, principal: Principal) -> Result<bool> {
        self.with_conn(|conn| {
            let changed = conn.execute(
                "DELETE FROM auth_sessions WHERE principal_id = ?1 AND principal_kind = ?2",
                params![principal.id().to_string(), principal.kind().as_str()],
            )?;
            Ok(changed > 0)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn role_lookup_returns_only_admins_holding_the_role() {
        let db = Database::open_in_memory().unwrap();
        let super_admin = Uuid::new_v4();
        let support = Uuid::new_v4();
        db.create_admin(super_admin, "root", "Root Admin").unwrap();
        db.create_admin(support, "support", "Support Admin").unwrap();
        db.grant_role(super_admin, "SUPER_ADMIN").unwrap();

        let resolved = db.admins_with_role("SUPER_ADMIN").unwrap();
        assert_eq!(resolved, vec![super_admin]);
    }

    #[test]
    fn session_revoke_is_idempotent() {
        let db = Database::open_in_memory().unwrap();
        let user = Principal::User(Uuid::new_v4());
        db.upsert_session(user, "tok-1").unwrap();

        assert_eq!(db.session_token(user).unwrap().as_deref(), Some("tok-1"));
        assert!(db.revoke_session(user).unwrap());
        assert!(!db.revoke_session(user).unwrap());
        assert_eq!(db.session_token(user).unwrap(), None);
    }
}
