pub use crate::model::{Habitat, User};
use anyhow::{anyhow, Result};
use habitat_core::{ResourceKind, SubResource};
use rusqlite::{params, Connection, OptionalExtension};
use time::OffsetDateTime;
use uuid::Uuid;

/// Register a user profile. Ids are chosen by the caller.
pub fn add_user(
    conn: &Connection,
    id: &str,
    display_name: &str,
    avatar_url: Option<&str>,
) -> Result<User> {
    if id.trim().is_empty() {
        return Err(anyhow!("invalid_user_id"));
    }
    let res = conn.execute(
        "INSERT INTO users (id, display_name, avatar_url) VALUES (?1, ?2, ?3)",
        params![id, display_name, avatar_url],
    );
    match res {
        Ok(_) => Ok(User {
            id: id.into(),
            display_name: display_name.into(),
            avatar_url: avatar_url.map(Into::into),
        }),
        Err(e) if is_constraint(&e) => Err(anyhow!("duplicate_user")),
        Err(e) => Err(e.into()),
    }
}

/// Create a habitat. The owner becomes its first member.
pub fn create_habitat(conn: &Connection, name: &str, owner_id: &str, is_public: bool) -> Result<Habitat> {
    if name.trim().is_empty() {
        return Err(anyhow!("invalid_name"));
    }
    let id = Uuid::new_v4().to_string();
    let now = OffsetDateTime::now_utc().unix_timestamp();
    let tx = conn.unchecked_transaction()?;
    tx.execute(
        "INSERT INTO habitats (id, name, owner_id, is_public, created_at) VALUES (?1, ?2, ?3, ?4, ?5)",
        params![id, name, owner_id, is_public, now],
    )?;
    tx.execute(
        "INSERT INTO habitat_members (habitat_id, user_id, joined_at) VALUES (?1, ?2, ?3)",
        params![id, owner_id, now],
    )?;
    tx.commit()?;
    Ok(Habitat {
        id,
        name: name.into(),
        owner_id: owner_id.into(),
        is_public,
        created_at: now,
    })
}

pub fn get_habitat(conn: &Connection, id: &str) -> Result<Option<Habitat>> {
    let mut stmt = conn.prepare(
        "SELECT id, name, owner_id, is_public, created_at FROM habitats WHERE id = ?1",
    )?;
    let habitat = stmt
        .query_row([id], |row| {
            Ok(Habitat {
                id: row.get(0)?,
                name: row.get(1)?,
                owner_id: row.get(2)?,
                is_public: row.get::<_, i64>(3)? != 0,
                created_at: row.get(4)?,
            })
        })
        .optional()?;
    Ok(habitat)
}

pub fn add_member(conn: &Connection, habitat_id: &str, user_id: &str) -> Result<()> {
    if get_habitat(conn, habitat_id)?.is_none() {
        return Err(anyhow!("not_found"));
    }
    let now = OffsetDateTime::now_utc().unix_timestamp();
    let res = conn.execute(
        "INSERT INTO habitat_members (habitat_id, user_id, joined_at) VALUES (?1, ?2, ?3)",
        params![habitat_id, user_id, now],
    );
    match res {
        Ok(_) => Ok(()),
        Err(e) if is_constraint(&e) => Err(anyhow!("duplicate_member")),
        Err(e) => Err(e.into()),
    }
}

pub fn remove_member(conn: &Connection, habitat_id: &str, user_id: &str) -> Result<()> {
    let changed = conn.execute(
        "DELETE FROM habitat_members WHERE habitat_id = ?1 AND user_id = ?2",
        params![habitat_id, user_id],
    )?;
    if changed == 0 {
        anyhow::bail!("not_found");
    }
    Ok(())
}

pub fn is_member(conn: &Connection, habitat_id: &str, user_id: &str) -> Result<bool> {
    let mut stmt =
        conn.prepare("SELECT 1 FROM habitat_members WHERE habitat_id = ?1 AND user_id = ?2")?;
    let exists: Option<i64> = stmt
        .query_row(params![habitat_id, user_id], |row| row.get(0))
        .optional()?;
    Ok(exists.is_some())
}

/// Table and owner column backing each sub-resource kind.
fn sub_resource_table(kind: ResourceKind) -> Option<(&'static str, &'static str)> {
    match kind {
        ResourceKind::Habitat => None,
        ResourceKind::Message => Some(("messages", "author_id")),
        ResourceKind::Discussion => Some(("discussions", "creator_id")),
        ResourceKind::Poll => Some(("polls", "creator_id")),
        ResourceKind::WatchParty => Some(("watch_parties", "host_id")),
    }
}

/// Create a discussion, poll or watch party inside a habitat.
pub fn create_sub_resource(
    conn: &Connection,
    kind: ResourceKind,
    habitat_id: &str,
    owner_id: &str,
    title: &str,
) -> Result<String> {
    let Some((table, owner_col)) = sub_resource_table(kind) else {
        anyhow::bail!("not_a_sub_resource");
    };
    if kind == ResourceKind::Message {
        anyhow::bail!("use_create_message");
    }
    let id = Uuid::new_v4().to_string();
    let now = OffsetDateTime::now_utc().unix_timestamp();
    conn.execute(
        &format!(
            "INSERT INTO {table} (id, habitat_id, {owner_col}, title, created_at) VALUES (?1, ?2, ?3, ?4, ?5)"
        ),
        params![id, habitat_id, owner_id, title, now],
    )?;
    Ok(id)
}

/// Owner and habitat of a resource living inside a habitat.
pub fn get_sub_resource(conn: &Connection, id: &str, kind: ResourceKind) -> Result<Option<SubResource>> {
    let Some((table, owner_col)) = sub_resource_table(kind) else {
        return Ok(None);
    };
    let mut stmt = conn.prepare(&format!(
        "SELECT {owner_col}, habitat_id FROM {table} WHERE id = ?1"
    ))?;
    let sub = stmt
        .query_row([id], |row| {
            Ok(SubResource {
                owner_id: row.get(0)?,
                container_id: row.get(1)?,
            })
        })
        .optional()?;
    Ok(sub)
}

fn is_constraint(e: &rusqlite::Error) -> bool {
    matches!(
        e.sqlite_error_code(),
        Some(rusqlite::ErrorCode::ConstraintViolation)
    )
}
