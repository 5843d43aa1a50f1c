use rusqlite::{params, Connection};

use crate::db::DatabaseError;

/// Active category names in creation order. The classifier is told to pick
/// from this set.
pub fn list_active_category_names(conn: &Connection) -> Result<Vec<String>, DatabaseError> {
    let mut stmt =
        conn.prepare("SELECT name FROM categories WHERE is_active = 1 ORDER BY id ASC")?;
    let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;

    let mut names = Vec::new();
    for row in rows {
        names.push(row?);
    }
    Ok(names)
}

pub fn add_category(conn: &Connection, name: &str) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT OR IGNORE INTO categories (name, is_active) VALUES (?1, 1)",
        params![name],
    )?;
    Ok(())
}

pub fn deactivate_category(conn: &Connection, name: &str) -> Result<(), DatabaseError> {
    conn.execute(
        "UPDATE categories SET is_active = 0 WHERE name = ?1",
        params![name],
    )?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::sqlite::open_memory_database;

    #[test]
    fn seeded_categories_include_general() {
        let conn = open_memory_database().unwrap();
        let names = list_active_category_names(&conn).unwrap();
        assert!(names.iter().any(|n| n == "General"));
    }

    #[test]
    fn deactivated_category_disappears() {
        let conn = open_memory_database().unwrap();
        add_category(&conn, "Tax").unwrap();
        assert!(list_active_category_names(&conn)
            .unwrap()
            .contains(&"Tax".to_string()));

        deactivate_category(&conn, "Tax").unwrap();
        assert!(!list_active_category_names(&conn)
            .unwrap()
            .contains(&"Tax".to_string()));
    }

    #[test]
    fn duplicate_add_is_ignored() {
        let conn = open_memory_database().unwrap();
        add_category(&conn, "General").unwrap();
        let names = list_active_category_names(&conn).unwrap();
        assert_eq!(names.iter().filter(|n| *n == "General").count(), 1);
    }
}
