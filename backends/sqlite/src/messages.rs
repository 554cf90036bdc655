use anyhow::{anyhow, Result};
use habitat_core::{AuthorProfile, Message};
use rusqlite::{params, Connection, OptionalExtension};
use time::OffsetDateTime;
use uuid::Uuid;

const SELECT_MESSAGE: &str = "SELECT m.id, m.habitat_id, m.author_id, m.content, m.created_at, u.display_name, u.avatar_url \
     FROM messages m LEFT JOIN users u ON u.id = m.author_id";

/// Create a new message in a habitat.
pub fn create_message(
    conn: &Connection,
    habitat_id: &str,
    author_id: &str,
    content: &str,
) -> Result<Message> {
    if content.trim().is_empty() {
        return Err(anyhow!("empty_message"));
    }
    let id = Uuid::new_v4().to_string();
    let now = OffsetDateTime::now_utc().unix_timestamp();
    conn.execute(
        "INSERT INTO messages (id, habitat_id, author_id, content, created_at) VALUES (?1, ?2, ?3, ?4, ?5)",
        params![id, habitat_id, author_id, content, now],
    )?;
    get_message(conn, &id)?.ok_or_else(|| anyhow!("not_found"))
}

fn row_to_msg(row: &rusqlite::Row<'_>) -> rusqlite::Result<Message> {
    let display_name: Option<String> = row.get(5)?;
    let avatar_url: Option<String> = row.get(6)?;
    Ok(Message {
        id: row.get(0)?,
        resource_id: row.get(1)?,
        author_id: row.get(2)?,
        content: row.get(3)?,
        created_at: row.get(4)?,
        author_profile: display_name.map(|display_name| AuthorProfile {
            display_name,
            avatar_url,
        }),
    })
}

pub fn get_message(conn: &Connection, id: &str) -> Result<Option<Message>> {
    let mut stmt = conn.prepare(&format!("{SELECT_MESSAGE} WHERE m.id = ?1"))?;
    let msg = stmt.query_row([id], row_to_msg).optional()?;
    Ok(msg)
}

/// One page of a habitat's messages, newest first. The page holds exactly
/// `limit` rows unless history runs out.
pub fn list_messages(
    conn: &Connection,
    habitat_id: &str,
    limit: usize,
    offset: usize,
) -> Result<Vec<Message>> {
    if limit == 0 {
        return Err(anyhow!("invalid_limit"));
    }
    let mut stmt = conn.prepare(&format!(
        "{SELECT_MESSAGE} WHERE m.habitat_id = ?1 ORDER BY m.created_at DESC, m.rowid DESC LIMIT ?2 OFFSET ?3"
    ))?;
    let msgs = stmt
        .query_map(
            params![habitat_id, limit as i64, offset as i64],
            row_to_msg,
        )?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(msgs)
}

/// Delete a message that belongs to `habitat_id`. Authorization happens
/// before this is called.
pub fn delete_message(conn: &Connection, message_id: &str, habitat_id: &str) -> Result<()> {
    let changed = conn.execute(
        "DELETE FROM messages WHERE id = ?1 AND habitat_id = ?2",
        params![message_id, habitat_id],
    )?;
    if changed == 0 {
        anyhow::bail!("not_found");
    }
    Ok(())
}
