//! LanceDB connection and housekeeping helpers.
use anyhow::Result;
use lancedb::{connect, Connection, Table};

pub async fn open_db(uri: &str) -> Result<Connection> {
    Ok(connect(uri).execute().await?)
}

pub async fn table_exists(conn: &Connection, name: &str) -> Result<bool> {
    let names = conn.table_names().execute().await?;
    Ok(names.iter().any(|n| n == name))
}

/// Open `name` if it exists. A missing table is an empty corpus, not an error.
pub async fn open_if_exists(conn: &Connection, name: &str) -> Result<Option<Table>> {
    if !table_exists(conn, name).await? { return Ok(None); }
    Ok(Some(conn.open_table(name).execute().await?))
}

/// SQL string literal for a LanceDB predicate.
pub fn quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

/// `filename IN (...)` for a non-empty set of filenames.
pub fn filename_predicate<'a>(names: impl Iterator<Item = &'a str>) -> Option<String> {
    let quoted: Vec<String> = names.map(quote).collect();
    if quoted.is_empty() { None } else { Some(format!("filename IN ({})", quoted.join(", "))) }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn predicate_escapes_quotes() {
        let names = ["it's.pdf", "b.pdf"];
        assert_eq!(filename_predicate(names.into_iter()).as_deref(), Some("filename IN ('it''s.pdf', 'b.pdf')"));
        assert_eq!(filename_predicate(std::iter::empty()), None);
    }
}
