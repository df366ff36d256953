//! Roster persistence.

use super::{Database, now_ms};
use crate::roles::{Role, RosterSnapshot};
use crate::types::Person;
use anyhow::{Result, anyhow};
use rusqlite::{Connection, params};
use std::collections::HashMap;

/// Read every person with their roles, ordered by id.
pub(crate) fn read_people(conn: &Connection) -> Result<Vec<Person>> {
    let mut stmt = conn.prepare("SELECT person_id, role FROM person_roles ORDER BY person_id, role")?;
    let mut roles: HashMap<String, Vec<Role>> = HashMap::new();
    let rows = stmt.query_map([], |row| {
        Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
    })?;
    for row in rows {
        let (person_id, role) = row?;
        let role = Role::from_str(&role).ok_or_else(|| anyhow!("Unknown role in database: {}", role))?;
        roles.entry(person_id).or_default().push(role);
    }

    let mut stmt = conn.prepare("SELECT id, name, active FROM persons ORDER BY id")?;
    let people = stmt
        .query_map([], |row| {
            Ok(Person {
                id: row.get(0)?,
                name: row.get(1)?,
                roles: Vec::new(),
                active: row.get(2)?,
            })
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?
        .into_iter()
        .map(|mut person| {
            person.roles = roles.remove(&person.id).unwrap_or_default();
            person
        })
        .collect();

    Ok(people)
}

impl Database {
    /// Insert or replace a person and their roles.
    pub fn upsert_person(&self, person: &Person) -> Result<()> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            let now = now_ms();
            tx.execute(
                "INSERT INTO persons (id, name, active, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?4)
                 ON CONFLICT(id) DO UPDATE SET
                    name = excluded.name,
                    active = excluded.active,
                    updated_at = excluded.updated_at",
                params![person.id, person.name, person.active, now],
            )?;
            tx.execute("DELETE FROM person_roles WHERE person_id = ?1", params![person.id])?;
            for role in &person.roles {
                tx.execute(
                    "INSERT OR IGNORE INTO person_roles (person_id, role) VALUES (?1, ?2)",
                    params![person.id, role.as_str()],
                )?;
            }
            tx.commit()?;
            Ok(())
        })
    }

    /// Mark a person active or inactive. Returns false if no such person.
    pub fn set_person_active(&self, person_id: &str, active: bool) -> Result<bool> {
        self.with_conn(|conn| {
            let updated = conn.execute(
                "UPDATE persons SET active = ?1, updated_at = ?2 WHERE id = ?3",
                params![active, now_ms(), person_id],
            )?;
            Ok(updated > 0)
        })
    }

    /// All people, active or not.
    pub fn list_people(&self) -> Result<Vec<Person>> {
        self.with_conn(read_people)
    }

    /// Snapshot of the active roster, indexed by role.
    pub fn active_roster(&self) -> Result<RosterSnapshot> {
        self.with_conn(|conn| Ok(RosterSnapshot::new(&read_people(conn)?)))
    }
}
