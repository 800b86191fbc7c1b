use chrono::Utc;
use rusqlite::{Connection, OptionalExtension};
use tracing::instrument;

use shopfloor_core::ids::UserId;
use shopfloor_core::{Role, User};

use crate::error::StoreError;
use crate::row_helpers;

pub struct UserRepo;

impl UserRepo {
    #[instrument(skip(conn), fields(username, role = %role))]
    pub fn create(conn: &Connection, username: &str, role: Role) -> Result<User, StoreError> {
        let id = UserId::new();
        conn.execute(
            "INSERT INTO users (id, username, role, created_at) VALUES (?1, ?2, ?3, ?4)",
            rusqlite::params![
                id.as_str(),
                username,
                role.to_string(),
                row_helpers::ts(&Utc::now())
            ],
        )?;
        Ok(User {
            id,
            username: username.to_string(),
            role,
        })
    }

    #[instrument(skip(conn), fields(user_id = %id))]
    pub fn get(conn: &Connection, id: &UserId) -> Result<User, StoreError> {
        conn.query_row(
            "SELECT id, username, role FROM users WHERE id = ?1",
            [id.as_str()],
            |row| Ok(row_to_user(row)),
        )
        .optional()?
        .transpose()?
        .ok_or_else(|| StoreError::NotFound(format!("user {id}")))
    }

    #[instrument(skip(conn))]
    pub fn get_by_username(conn: &Connection, username: &str) -> Result<User, StoreError> {
        conn.query_row(
            "SELECT id, username, role FROM users WHERE username = ?1",
            [username],
            |row| Ok(row_to_user(row)),
        )
        .optional()?
        .transpose()?
        .ok_or_else(|| StoreError::NotFound(format!("user {username}")))
    }

    pub fn list(conn: &Connection) -> Result<Vec<User>, StoreError> {
        let mut stmt = conn.prepare("SELECT id, username, role FROM users ORDER BY username")?;
        let mut rows = stmt.query([])?;
        let mut users = Vec::new();
        while let Some(row) = rows.next()? {
            users.push(row_to_user(row)?);
        }
        Ok(users)
    }
}

fn row_to_user(row: &rusqlite::Row<'_>) -> Result<User, StoreError> {
    let role: String = row_helpers::get(row, 2, "users", "role")?;
    Ok(User {
        id: UserId::from_raw(row_helpers::get::<String>(row, 0, "users", "id")?),
        username: row_helpers::get(row, 1, "users", "username")?,
        role: row_helpers::parse_enum(&role, "users", "role")?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Database;

    #[test]
    fn create_and_fetch() {
        let db = Database::in_memory().unwrap();
        db.with_conn(|conn| {
            let user = UserRepo::create(conn, "ivanov", Role::Master)?;
            assert!(user.id.as_str().starts_with("usr_"));

            let by_id = UserRepo::get(conn, &user.id)?;
            assert_eq!(by_id, user);

            let by_name = UserRepo::get_by_username(conn, "ivanov")?;
            assert_eq!(by_name.role, Role::Master);
            Ok(())
        })
        .unwrap();
    }

    #[test]
    fn duplicate_username_conflicts() {
        let db = Database::in_memory().unwrap();
        db.with_conn(|conn| {
            UserRepo::create(conn, "petrov", Role::Admin)?;
            let dup = UserRepo::create(conn, "petrov", Role::Observer);
            assert!(matches!(dup, Err(StoreError::Conflict(_))));
            Ok(())
        })
        .unwrap();
    }

    #[test]
    fn unknown_user_not_found() {
        let db = Database::in_memory().unwrap();
        let result = db.with_conn(|conn| UserRepo::get(conn, &UserId::from_raw("usr_missing")));
        assert!(matches!(result, Err(StoreError::NotFound(_))));
    }

    #[test]
    fn corrupt_role_is_reported() {
        let db = Database::in_memory().unwrap();
        let result = db.with_conn(|conn| {
            conn.execute(
                "INSERT INTO users (id, username, role, created_at) VALUES ('usr_x', 'x', 'wizard', 'now')",
                [],
            )?;
            UserRepo::get(conn, &UserId::from_raw("usr_x"))
        });
        assert!(matches!(result, Err(StoreError::CorruptRow { column: "role", .. })));
    }

    #[test]
    fn list_is_sorted_by_username() {
        let db = Database::in_memory().unwrap();
        db.with_conn(|conn| {
            UserRepo::create(conn, "zed", Role::Observer)?;
            UserRepo::create(conn, "amy", Role::Technologist)?;
            let names: Vec<String> = UserRepo::list(conn)?.into_iter().map(|u| u.username).collect();
            assert_eq!(names, vec!["amy", "zed"]);
            Ok(())
        })
        .unwrap();
    }
}
