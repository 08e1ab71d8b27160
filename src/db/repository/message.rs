use rusqlite::{params, Connection};
use uuid::Uuid;

use super::{format_datetime, parse_datetime, parse_uuid};
use crate::db::DatabaseError;
use crate::models::*;

pub fn insert_message(conn: &Connection, message: &Message) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT INTO messages (id, discussion_id, content, created_at)
         VALUES (?1, ?2, ?3, ?4)",
        params![
            message.id.to_string(),
            message.discussion_id.to_string(),
            message.content,
            format_datetime(&message.created_at),
        ],
    )?;
    Ok(())
}

/// Messages of a discussion in insertion order. Ties on `created_at`
/// fall back to rowid so the order is stable.
pub fn get_messages(conn: &Connection, discussion_id: &Uuid) -> Result<Vec<Message>, DatabaseError> {
    let mut stmt = conn.prepare(
        "SELECT id, discussion_id, content, created_at
         FROM messages WHERE discussion_id = ?1
         ORDER BY created_at ASC, rowid ASC",
    )?;

    let rows = stmt.query_map(params![discussion_id.to_string()], |row| {
        Ok((
            row.get::<_, String>(0)?,
            row.get::<_, String>(1)?,
            row.get::<_, String>(2)?,
            row.get::<_, String>(3)?,
        ))
    })?;

    let mut messages = Vec::new();
    for row in rows {
        let (id, discussion_id, content, created_at) = row?;
        messages.push(Message {
            id: parse_uuid(&id)?,
            discussion_id: parse_uuid(&discussion_id)?,
            content,
            created_at: parse_datetime(&created_at),
        });
    }
    Ok(messages)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{insert_discussion, sqlite::open_memory_database};

    #[test]
    fn messages_come_back_in_insertion_order() {
        let conn = open_memory_database().unwrap();
        let discussion = Discussion::new(Uuid::new_v4(), "Standup", "");
        insert_discussion(&conn, &discussion).unwrap();

        let stamp = chrono::Local::now().naive_local();
        for text in ["first", "second", "third"] {
            let mut message = Message::new(discussion.id, text);
            message.created_at = stamp;
            insert_message(&conn, &message).unwrap();
        }

        let contents: Vec<String> = get_messages(&conn, &discussion.id)
            .unwrap()
            .into_iter()
            .map(|m| m.content)
            .collect();
        assert_eq!(contents, vec!["first", "second", "third"]);
    }

    #[test]
    fn message_requires_existing_discussion() {
        let conn = open_memory_database().unwrap();
        let result = insert_message(&conn, &Message::new(Uuid::new_v4(), "orphan"));
        assert!(result.is_err());
    }
}
