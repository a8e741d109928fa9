use crate::sql::postgres::utils::quote_ident;
use model::records::record::RECORD_COLUMNS;

/// PostgreSQL accepts at most this many bind parameters per statement.
pub const MAX_BIND_PARAMS: usize = u16::MAX as usize;

/// Rows that fit into a single multi-row `INSERT` without exceeding [`MAX_BIND_PARAMS`].
pub const MAX_ROWS_PER_INSERT: usize = MAX_BIND_PARAMS / RECORD_COLUMNS.len();

fn column_list() -> String {
    RECORD_COLUMNS.join(", ")
}

pub fn truncate(table: &str) -> String {
    format!("TRUNCATE TABLE {}", quote_ident(table))
}

pub fn analyze(table: &str) -> String {
    format!("ANALYZE {}", quote_ident(table))
}

pub fn select_all_ordered(table: &str) -> String {
    format!(
        "SELECT {} FROM {} ORDER BY id",
        column_list(),
        quote_ident(table)
    )
}

pub fn count_rows(table: &str) -> String {
    format!("SELECT COUNT(*) FROM {}", quote_ident(table))
}

/// `INSERT INTO t (...) VALUES ($1, ..., $6), ($7, ...)` for `rows` rows.
pub fn insert_values(table: &str, rows: usize) -> String {
    let width = RECORD_COLUMNS.len();
    let mut sql = format!("INSERT INTO {} ({}) VALUES ", quote_ident(table), column_list());
    for row in 0..rows {
        if row > 0 {
            sql.push_str(", ");
        }
        sql.push('(');
        for col in 0..width {
            if col > 0 {
                sql.push_str(", ");
            }
            sql.push('$');
            sql.push_str(&(row * width + col + 1).to_string());
        }
        sql.push(')');
    }
    sql
}

pub fn copy_in_csv(table: &str) -> String {
    format!(
        "COPY {} ({}) FROM STDIN (FORMAT csv, NULL '\\N')",
        quote_ident(table),
        column_list()
    )
}

pub fn copy_in_binary(table: &str) -> String {
    format!(
        "COPY {} ({}) FROM STDIN (FORMAT BINARY)",
        quote_ident(table),
        column_list()
    )
}

pub fn copy_out_binary(table: &str) -> String {
    format!(
        "COPY (SELECT {} FROM {} ORDER BY id) TO STDOUT (FORMAT BINARY)",
        column_list(),
        quote_ident(table)
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insert_values_placeholders() {
        assert_eq!(
            insert_values("users", 2),
            "INSERT INTO \"users\" (id, surname, name, patronymic, created_at, is_active) \
             VALUES ($1, $2, $3, $4, $5, $6), ($7, $8, $9, $10, $11, $12)"
        );
    }

    #[test]
    fn test_copy_statements() {
        assert_eq!(
            copy_in_binary("users"),
            "COPY \"users\" (id, surname, name, patronymic, created_at, is_active) FROM STDIN (FORMAT BINARY)"
        );
        assert!(copy_in_csv("public.users").starts_with("COPY \"public\".\"users\" ("));
        assert!(copy_in_csv("users").ends_with("(FORMAT csv, NULL '\\N')"));
        assert!(copy_out_binary("users").contains("ORDER BY id) TO STDOUT (FORMAT BINARY)"));
    }

    #[test]
    fn test_rows_per_insert_respects_bind_limit() {
        assert_eq!(MAX_ROWS_PER_INSERT, 10922);
        assert!(MAX_ROWS_PER_INSERT * RECORD_COLUMNS.len() <= MAX_BIND_PARAMS);
    }
}
