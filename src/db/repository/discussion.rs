use std::str::FromStr;

use rusqlite::{params, Connection, OptionalExtension};
use uuid::Uuid;

use super::{format_datetime, parse_datetime, parse_uuid};
use crate::db::DatabaseError;
use crate::models::enums::*;
use crate::models::*;

pub fn insert_discussion(conn: &Connection, discussion: &Discussion) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT INTO discussions (id, owner_id, name, description, template, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![
            discussion.id.to_string(),
            discussion.owner_id.to_string(),
            discussion.name,
            discussion.description,
            discussion.template.map(|t| t.as_str()),
            format_datetime(&discussion.created_at),
        ],
    )?;
    Ok(())
}

pub fn get_discussion(conn: &Connection, id: &Uuid) -> Result<Option<Discussion>, DatabaseError> {
    let row = conn
        .query_row(
            "SELECT id, owner_id, name, description, template, created_at
             FROM discussions WHERE id = ?1",
            params![id.to_string()],
            |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, String>(3)?,
                    row.get::<_, Option<String>>(4)?,
                    row.get::<_, String>(5)?,
                ))
            },
        )
        .optional()?;

    let Some((id, owner_id, name, description, template, created_at)) = row else {
        return Ok(None);
    };

    Ok(Some(Discussion {
        id: parse_uuid(&id)?,
        owner_id: parse_uuid(&owner_id)?,
        name,
        description,
        template: template.as_deref().map(DiscussionTemplate::from_str).transpose()?,
        created_at: parse_datetime(&created_at),
    }))
}

/// Delete a discussion; its messages go with it (ON DELETE CASCADE).
pub fn delete_discussion(conn: &Connection, id: &Uuid) -> Result<(), DatabaseError> {
    let affected = conn.execute(
        "DELETE FROM discussions WHERE id = ?1",
        params![id.to_string()],
    )?;
    if affected == 0 {
        return Err(DatabaseError::NotFound {
            entity_type: "Discussion".into(),
            id: id.to_string(),
        });
    }
    Ok(())
}
